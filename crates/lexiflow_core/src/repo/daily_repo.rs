//! Daily record repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Define the optimistic read-validate-write transaction contract used by
//!   the reward engine.
//! - Keep SQL and version bookkeeping inside the persistence boundary.
//!
//! # Invariants
//! - Transaction bodies only stage writes; nothing is visible until commit.
//! - Commit re-checks the version of every record the body read and aborts
//!   with `RepoError::Conflict` when any of them moved.
//! - Conflicts re-run the whole body with fresh reads, never a partial replay.
//! - Read paths reject invalid persisted state instead of masking it.

use crate::db::DbError;
use crate::model::daily_record::{DailyRecord, RecordValidationError, RewardGrant};
use crate::model::ids::{DayId, UserId, WordId};
use log::{debug, warn};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

const DAILY_SELECT_SQL: &str = "SELECT
    day_id,
    assigned_word_ids,
    extra_word_ids,
    reward_claimed,
    last_rewarded_at,
    updated_at,
    version
FROM daily_words";

pub type RepoResult<T> = Result<T, RepoError>;

/// Key of one daily record.
pub type DailyKey = (UserId, DayId);

/// Repository error for daily record persistence.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    Validation(RecordValidationError),
    InvalidData(String),
    AlreadyExists { user_id: UserId, day_id: DayId },
    /// A record read by the transaction changed before commit.
    Conflict,
    /// A write was staged for a record the transaction never read.
    WriteWithoutRead { user_id: UserId, day_id: DayId },
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Validation(err) => write!(f, "invalid daily record: {err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted daily data: {message}"),
            Self::AlreadyExists { user_id, day_id } => {
                write!(f, "daily record already exists for {user_id} on {day_id}")
            }
            Self::Conflict => write!(f, "daily record changed during transaction"),
            Self::WriteWithoutRead { user_id, day_id } => write!(
                f,
                "write staged for unread daily record {user_id} on {day_id}"
            ),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Validation(err) => Some(err),
            Self::InvalidData(_) => None,
            Self::AlreadyExists { .. } => None,
            Self::Conflict => None,
            Self::WriteWithoutRead { .. } => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<RecordValidationError> for RepoError {
    fn from(value: RecordValidationError) -> Self {
        Self::Validation(value)
    }
}

/// Outcome of a failed `run_transaction` call.
#[derive(Debug)]
pub enum TransactionError<E> {
    /// The body returned an error; staged writes were discarded.
    Aborted(E),
    /// Non-conflict storage failure during commit.
    Repo(RepoError),
    /// Every attempt hit a commit conflict.
    RetriesExhausted { attempts: u32 },
}

impl<E: Display> Display for TransactionError<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Aborted(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "transaction commit failed: {err}"),
            Self::RetriesExhausted { attempts } => {
                write!(f, "transaction contention after {attempts} attempts")
            }
        }
    }
}

impl<E: Error + 'static> Error for TransactionError<E> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Aborted(err) => Some(err),
            Self::Repo(err) => Some(err),
            Self::RetriesExhausted { .. } => None,
        }
    }
}

/// Operations available inside one transaction attempt.
pub trait DailyTransaction {
    /// Point read; remembers the record version for commit validation.
    fn get_daily_record(
        &mut self,
        user_id: &UserId,
        day_id: &DayId,
    ) -> RepoResult<Option<DailyRecord>>;

    /// Enumerates the shared public pool. Order is unspecified.
    fn list_public_words(&mut self) -> RepoResult<Vec<WordId>>;

    /// Stages the bonus-field merge write for a record read earlier in this
    /// attempt. The store stamps `last_rewarded_at`/`updated_at` at commit.
    fn stage_reward_grant(
        &mut self,
        user_id: &UserId,
        day_id: &DayId,
        grant: RewardGrant,
    ) -> RepoResult<()>;
}

/// Transactional store of daily records and the public word pool.
pub trait DailyRepository {
    /// Runs `body` with optimistic concurrency, retrying on commit conflict.
    ///
    /// # Contract
    /// - `Ok` from `body` commits staged writes atomically.
    /// - `Err` from `body` discards staged writes and is returned as
    ///   `TransactionError::Aborted` without retry.
    /// - Conflicts re-run `body` from scratch, at most `max_attempts` times
    ///   in total; a bound of 0 still runs once.
    fn run_transaction<T, E, F>(
        &self,
        max_attempts: u32,
        body: F,
    ) -> Result<T, TransactionError<E>>
    where
        F: FnMut(&mut dyn DailyTransaction) -> Result<T, E>;

    /// Non-transactional point read.
    fn get_daily_record(&self, user_id: &UserId, day_id: &DayId)
        -> RepoResult<Option<DailyRecord>>;

    /// Creates a record for the daily initialization step.
    fn insert_daily_record(&self, user_id: &UserId, record: &DailyRecord) -> RepoResult<()>;

    /// Adds words to the public pool; existing ids are skipped.
    ///
    /// Returns the number of newly inserted ids.
    fn insert_public_words(&self, word_ids: &[WordId]) -> RepoResult<usize>;
}

impl<R: DailyRepository> DailyRepository for &R {
    fn run_transaction<T, E, F>(
        &self,
        max_attempts: u32,
        body: F,
    ) -> Result<T, TransactionError<E>>
    where
        F: FnMut(&mut dyn DailyTransaction) -> Result<T, E>,
    {
        (**self).run_transaction(max_attempts, body)
    }

    fn get_daily_record(
        &self,
        user_id: &UserId,
        day_id: &DayId,
    ) -> RepoResult<Option<DailyRecord>> {
        (**self).get_daily_record(user_id, day_id)
    }

    fn insert_daily_record(&self, user_id: &UserId, record: &DailyRecord) -> RepoResult<()> {
        (**self).insert_daily_record(user_id, record)
    }

    fn insert_public_words(&self, word_ids: &[WordId]) -> RepoResult<usize> {
        (**self).insert_public_words(word_ids)
    }
}

/// Transaction attempt that can be committed once.
pub(crate) trait CommitTransaction: DailyTransaction {
    fn commit(self) -> RepoResult<()>;
}

/// Shared optimistic retry loop for repository implementations.
pub(crate) fn run_optimistic<Tx, T, E, F>(
    max_attempts: u32,
    mut begin: impl FnMut() -> Tx,
    mut body: F,
) -> Result<T, TransactionError<E>>
where
    Tx: CommitTransaction,
    F: FnMut(&mut dyn DailyTransaction) -> Result<T, E>,
{
    let attempts = max_attempts.max(1);
    for attempt in 1..=attempts {
        let mut tx = begin();
        let tx_ref: &mut dyn DailyTransaction = &mut tx;
        let value = body(tx_ref).map_err(TransactionError::Aborted)?;
        match tx.commit() {
            Ok(()) => {
                if attempt > 1 {
                    debug!("event=repo_tx module=repo status=ok attempt={attempt}");
                }
                return Ok(value);
            }
            Err(RepoError::Conflict) => {
                warn!("event=repo_tx module=repo status=retry attempt={attempt} max_attempts={attempts}");
            }
            Err(err) => return Err(TransactionError::Repo(err)),
        }
    }
    Err(TransactionError::RetriesExhausted { attempts })
}

/// Tracks read versions and staged grants for one attempt.
#[derive(Debug, Default)]
pub(crate) struct StagedWrites<V> {
    pub(crate) read_versions: HashMap<DailyKey, V>,
    pub(crate) grants: Vec<(DailyKey, RewardGrant)>,
}

impl<V: Copy> StagedWrites<V> {
    pub(crate) fn record_read(&mut self, key: DailyKey, version: V) {
        self.read_versions.entry(key).or_insert(version);
    }

    pub(crate) fn stage(
        &mut self,
        user_id: &UserId,
        day_id: &DayId,
        grant: RewardGrant,
    ) -> RepoResult<()> {
        let key = (user_id.clone(), day_id.clone());
        if !self.read_versions.contains_key(&key) {
            return Err(RepoError::WriteWithoutRead {
                user_id: user_id.clone(),
                day_id: day_id.clone(),
            });
        }
        // Last staged write for a key wins, as with a merge update.
        self.grants.retain(|(staged_key, _)| staged_key != &key);
        self.grants.push((key, grant));
        Ok(())
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }
}

/// SQLite-backed daily repository.
///
/// Borrows one connection per request scope; open a separate connection per
/// concurrent caller.
pub struct SqliteDailyRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteDailyRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl DailyRepository for SqliteDailyRepository<'_> {
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
            || SqliteDailyTransaction {
                conn: self.conn,
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
        Ok(load_daily_row(self.conn, user_id, day_id)?.map(|(record, _)| record))
    }

    fn insert_daily_record(&self, user_id: &UserId, record: &DailyRecord) -> RepoResult<()> {
        record.validate()?;

        let changed = self.conn.execute(
            "INSERT INTO daily_words (
                user_id,
                day_id,
                assigned_word_ids,
                extra_word_ids,
                reward_claimed,
                last_rewarded_at,
                updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT (user_id, day_id) DO NOTHING;",
            params![
                user_id.as_str(),
                record.day_id.as_str(),
                encode_word_ids(&record.assigned_word_ids)?,
                encode_word_ids(&record.extra_word_ids)?,
                bool_to_int(record.reward_claimed),
                record.last_rewarded_at,
                record.updated_at,
            ],
        )?;

        if changed == 0 {
            return Err(RepoError::AlreadyExists {
                user_id: user_id.clone(),
                day_id: record.day_id.clone(),
            });
        }
        Ok(())
    }

    fn insert_public_words(&self, word_ids: &[WordId]) -> RepoResult<usize> {
        if let Some(blank) = word_ids.iter().find(|id| id.trim().is_empty()) {
            return Err(RepoError::InvalidData(format!(
                "public word id must not be blank, got `{blank}`"
            )));
        }

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO public_words (word_id) VALUES (?1)
                 ON CONFLICT (word_id) DO NOTHING;",
            )?;
            for word_id in word_ids {
                inserted += stmt.execute([word_id.as_str()])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }
}

struct SqliteDailyTransaction<'conn> {
    conn: &'conn Connection,
    staged: StagedWrites<i64>,
}

impl DailyTransaction for SqliteDailyTransaction<'_> {
    fn get_daily_record(
        &mut self,
        user_id: &UserId,
        day_id: &DayId,
    ) -> RepoResult<Option<DailyRecord>> {
        let Some((record, version)) = load_daily_row(self.conn, user_id, day_id)? else {
            return Ok(None);
        };
        self.staged
            .record_read((user_id.clone(), day_id.clone()), version);
        Ok(Some(record))
    }

    fn list_public_words(&mut self) -> RepoResult<Vec<WordId>> {
        let mut stmt = self.conn.prepare("SELECT word_id FROM public_words;")?;
        let words = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(words)
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

impl CommitTransaction for SqliteDailyTransaction<'_> {
    fn commit(self) -> RepoResult<()> {
        if self.staged.is_empty() {
            return Ok(());
        }

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)
            .map_err(contention_as_conflict)?;

        for ((user_id, day_id), read_version) in &self.staged.read_versions {
            let current: Option<i64> = tx
                .query_row(
                    "SELECT version FROM daily_words WHERE user_id = ?1 AND day_id = ?2;",
                    params![user_id.as_str(), day_id.as_str()],
                    |row| row.get(0),
                )
                .optional()?;
            if current != Some(*read_version) {
                return Err(RepoError::Conflict);
            }
        }

        for ((user_id, day_id), grant) in &self.staged.grants {
            let read_version = self.staged.read_versions[&(user_id.clone(), day_id.clone())];
            let changed = tx.execute(
                "UPDATE daily_words
                 SET
                    extra_word_ids = ?1,
                    reward_claimed = 1,
                    last_rewarded_at = CAST(ROUND(unixepoch('subsec') * 1000) AS INTEGER),
                    updated_at = CAST(ROUND(unixepoch('subsec') * 1000) AS INTEGER),
                    version = version + 1
                 WHERE user_id = ?2
                   AND day_id = ?3
                   AND version = ?4
                   AND reward_claimed = 0;",
                params![
                    encode_word_ids(&grant.extra_word_ids)?,
                    user_id.as_str(),
                    day_id.as_str(),
                    read_version,
                ],
            )?;
            if changed == 0 {
                return Err(RepoError::Conflict);
            }
        }

        tx.commit().map_err(contention_as_conflict)?;
        Ok(())
    }
}

fn contention_as_conflict(err: rusqlite::Error) -> RepoError {
    let err = DbError::Sqlite(err);
    if err.is_busy() {
        RepoError::Conflict
    } else {
        RepoError::Db(err)
    }
}

fn load_daily_row(
    conn: &Connection,
    user_id: &UserId,
    day_id: &DayId,
) -> RepoResult<Option<(DailyRecord, i64)>> {
    let mut stmt = conn.prepare(&format!(
        "{DAILY_SELECT_SQL}
         WHERE user_id = ?1
           AND day_id = ?2;"
    ))?;

    let mut rows = stmt.query(params![user_id.as_str(), day_id.as_str()])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(parse_daily_row(row)?));
    }

    Ok(None)
}

fn parse_daily_row(row: &Row<'_>) -> RepoResult<(DailyRecord, i64)> {
    let day_text: String = row.get("day_id")?;
    let day_id = DayId::parse(&day_text).map_err(|err| {
        RepoError::InvalidData(format!("{err} in daily_words.day_id"))
    })?;

    let reward_claimed = match row.get::<_, i64>("reward_claimed")? {
        0 => false,
        1 => true,
        other => {
            return Err(RepoError::InvalidData(format!(
                "invalid reward_claimed value `{other}` in daily_words.reward_claimed"
            )));
        }
    };

    let record = DailyRecord {
        day_id,
        assigned_word_ids: decode_word_ids(row, "assigned_word_ids")?,
        extra_word_ids: decode_word_ids(row, "extra_word_ids")?,
        reward_claimed,
        last_rewarded_at: row.get("last_rewarded_at")?,
        updated_at: row.get("updated_at")?,
    };
    record.validate()?;
    Ok((record, row.get("version")?))
}

fn decode_word_ids(row: &Row<'_>, column: &'static str) -> RepoResult<Vec<WordId>> {
    let text: String = row.get(column)?;
    serde_json::from_str(&text).map_err(|err| {
        RepoError::InvalidData(format!("invalid JSON array in daily_words.{column}: {err}"))
    })
}

fn encode_word_ids(word_ids: &[WordId]) -> RepoResult<String> {
    serde_json::to_string(word_ids)
        .map_err(|err| RepoError::InvalidData(format!("failed to encode word ids: {err}")))
}

fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}
