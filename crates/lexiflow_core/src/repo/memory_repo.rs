//! In-process daily repository with the same optimistic semantics as SQLite.
//!
//! # Invariants
//! - The state mutex is held only for a single read or for the commit step,
//!   never across a transaction body.
//! - Every committed write bumps the record version.

use crate::clock::{Clock, SystemClock};
use crate::model::daily_record::{DailyRecord, RewardGrant};
use crate::model::ids::{DayId, UserId, WordId};
use crate::repo::daily_repo::{
    run_optimistic, CommitTransaction, DailyKey, DailyRepository, DailyTransaction, RepoError,
    RepoResult, StagedWrites, TransactionError,
};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone)]
struct VersionedRecord {
    record: DailyRecord,
    version: u64,
}

#[derive(Debug, Default)]
struct MemoryState {
    records: HashMap<DailyKey, VersionedRecord>,
    public_words: BTreeSet<WordId>,
}

/// Mutex-guarded in-memory store; the clock stamps committed writes.
#[derive(Debug)]
pub struct MemoryDailyRepository<C: Clock = SystemClock> {
    state: Mutex<MemoryState>,
    clock: C,
}

impl MemoryDailyRepository<SystemClock> {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for MemoryDailyRepository<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> MemoryDailyRepository<C> {
    pub fn with_clock(clock: C) -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            clock,
        }
    }

    /// Current committed version of one record, for diagnostics and tests.
    pub fn record_version(&self, user_id: &UserId, day_id: &DayId) -> Option<u64> {
        self.lock()
            .records
            .get(&(user_id.clone(), day_id.clone()))
            .map(|entry| entry.version)
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        // State is only mutated after validation succeeds, so a poisoned
        // guard still holds a consistent snapshot.
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl<C: Clock> DailyRepository for MemoryDailyRepository<C> {
    fn run_transaction<T, E, F>(
        &self,
        max_attempts: u32,
        body: F,
    ) -> Result<T, TransactionError<E>>
    where
        F: FnMut(&mut dyn DailyTransaction) -> Result<T, E>,
    {
        run_optimistic(
            max_attempts,
            || MemoryDailyTransaction {
                repo: self,
                staged: StagedWrites::default(),
            },
            body,
        )
    }

    fn get_daily_record(
        &self,
        user_id: &UserId,
        day_id: &DayId,
    ) -> RepoResult<Option<DailyRecord>> {
        Ok(self
            .lock()
            .records
            .get(&(user_id.clone(), day_id.clone()))
            .map(|entry| entry.record.clone()))
    }

    fn insert_daily_record(&self, user_id: &UserId, record: &DailyRecord) -> RepoResult<()> {
        record.validate()?;
        let key = (user_id.clone(), record.day_id.clone());
        let mut state = self.lock();
        if state.records.contains_key(&key) {
            return Err(RepoError::AlreadyExists {
                user_id: user_id.clone(),
                day_id: record.day_id.clone(),
            });
        }
        state.records.insert(
            key,
            VersionedRecord {
                record: record.clone(),
                version: 1,
            },
        );
        Ok(())
    }

    fn insert_public_words(&self, word_ids: &[WordId]) -> RepoResult<usize> {
        if let Some(blank) = word_ids.iter().find(|id| id.trim().is_empty()) {
            return Err(RepoError::InvalidData(format!(
                "public word id must not be blank, got `{blank}`"
            )));
        }
        let mut state = self.lock();
        Ok(word_ids
            .iter()
            .filter(|id| state.public_words.insert((*id).clone()))
            .count())
    }
}

struct MemoryDailyTransaction<'repo, C: Clock> {
    repo: &'repo MemoryDailyRepository<C>,
    staged: StagedWrites<u64>,
}

impl<C: Clock> DailyTransaction for MemoryDailyTransaction<'_, C> {
    fn get_daily_record(
        &mut self,
        user_id: &UserId,
        day_id: &DayId,
    ) -> RepoResult<Option<DailyRecord>> {
        let key = (user_id.clone(), day_id.clone());
        let Some(entry) = self.repo.lock().records.get(&key).cloned() else {
            return Ok(None);
        };
        self.staged.record_read(key, entry.version);
        Ok(Some(entry.record))
    }

    fn list_public_words(&mut self) -> RepoResult<Vec<WordId>> {
        Ok(self.repo.lock().public_words.iter().cloned().collect())
    }

    fn stage_reward_grant(
        &mut self,
        user_id: &UserId,
        day_id: &DayId,
        grant: RewardGrant,
    ) -> RepoResult<()> {
        self.staged.stage(user_id, day_id, grant)
    }
}

impl<C: Clock> CommitTransaction for MemoryDailyTransaction<'_, C> {
    fn commit(self) -> RepoResult<()> {
        if self.staged.is_empty() {
            return Ok(());
        }

        let mut state = self.repo.lock();
        for (key, read_version) in &self.staged.read_versions {
            let current = state.records.get(key).map(|entry| entry.version);
            if current != Some(*read_version) {
                return Err(RepoError::Conflict);
            }
        }

        // Validate every transition before mutating anything.
        let stamped_at = self.repo.clock.now_ms();
        let mut updated = Vec::with_capacity(self.staged.grants.len());
        for (key, grant) in &self.staged.grants {
            let Some(entry) = state.records.get(key) else {
                return Err(RepoError::Conflict);
            };
            let mut record = entry.record.clone();
            record
                .apply_reward_grant(grant, stamped_at)
                .map_err(|_| RepoError::Conflict)?;
            updated.push((key.clone(), record, entry.version + 1));
        }

        for (key, record, version) in updated {
            state
                .records
                .insert(key, VersionedRecord { record, version });
        }
        Ok(())
    }
}
