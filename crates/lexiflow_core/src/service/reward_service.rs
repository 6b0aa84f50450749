//! Rewarded-ad bonus word service.
//!
//! # Responsibility
//! - Authorize the caller against the requested user before any storage
//!   access.
//! - Run the read-validate-select-write cycle inside the repository's
//!   optimistic transaction runner.
//!
//! # Invariants
//! - A day's record moves `Unclaimed -> Claimed` at most once.
//! - Every failure path leaves the record untouched.
//! - Granted words are distinct and disjoint from assigned and prior bonus
//!   words.
//! - The service keeps no mutable state between calls.

use crate::clock::{Clock, SystemClock, TimeProvider};
use crate::config::{ConfigError, RewardConfig};
use crate::model::daily_record::{RewardGrant, RewardState};
use crate::model::ids::{DayId, UserId, WordId};
use crate::random::{select_uniform, RandomSource, ThreadRandom};
use crate::repo::daily_repo::{DailyRepository, DailyTransaction, RepoError, TransactionError};
use log::{error, info, warn};
use serde::Serialize;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};
use std::time::Instant;

pub type RewardResult<T> = Result<T, RewardError>;

/// Bonus words granted by one successful claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardClaim {
    pub day_id: DayId,
    pub extra_word_ids: Vec<WordId>,
}

/// Domain rule that blocked a claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreconditionFailure {
    /// No daily record exists yet; core never creates one.
    DailyStateMissing,
    AlreadyClaimed,
    CooldownActive { remaining_ms: i64 },
    InsufficientCandidates { available: usize, required: usize },
}

impl PreconditionFailure {
    /// Stable reason id for logs and diagnostics.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::DailyStateMissing => "daily_state_missing",
            Self::AlreadyClaimed => "already_claimed",
            Self::CooldownActive { .. } => "cooldown_active",
            Self::InsufficientCandidates { .. } => "insufficient_candidates",
        }
    }
}

impl Display for PreconditionFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DailyStateMissing => write!(f, "daily words not initialized for today"),
            Self::AlreadyClaimed => write!(f, "reward already claimed"),
            Self::CooldownActive { remaining_ms } => {
                write!(f, "cooldown active for another {remaining_ms} ms")
            }
            Self::InsufficientCandidates {
                available,
                required,
            } => write!(
                f,
                "not enough candidate words available for bonus: {available} < {required}"
            ),
        }
    }
}

/// Caller-visible failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RewardErrorKind {
    Unauthenticated,
    InvalidArgument,
    PermissionDenied,
    FailedPrecondition,
    /// Storage contention; safe to retry.
    Transient,
    Internal,
}

impl RewardErrorKind {
    /// Machine-readable code used at the invocation boundary.
    pub fn code(self) -> &'static str {
        match self {
            Self::Unauthenticated => "unauthenticated",
            Self::InvalidArgument => "invalid-argument",
            Self::PermissionDenied => "permission-denied",
            Self::FailedPrecondition => "failed-precondition",
            Self::Transient => "unavailable",
            Self::Internal => "internal",
        }
    }

    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Transient)
    }
}

/// Errors from reward claim operations.
#[derive(Debug)]
pub enum RewardError {
    Unauthenticated,
    InvalidArgument(String),
    PermissionDenied,
    FailedPrecondition(PreconditionFailure),
    Transient { attempts: u32 },
    /// Non-contention storage failure or invalid persisted data.
    Repo(RepoError),
}

impl RewardError {
    pub fn kind(&self) -> RewardErrorKind {
        match self {
            Self::Unauthenticated => RewardErrorKind::Unauthenticated,
            Self::InvalidArgument(_) => RewardErrorKind::InvalidArgument,
            Self::PermissionDenied => RewardErrorKind::PermissionDenied,
            Self::FailedPrecondition(_) => RewardErrorKind::FailedPrecondition,
            Self::Transient { .. } => RewardErrorKind::Transient,
            Self::Repo(_) => RewardErrorKind::Internal,
        }
    }

    pub fn precondition(&self) -> Option<&PreconditionFailure> {
        match self {
            Self::FailedPrecondition(failure) => Some(failure),
            _ => None,
        }
    }
}

impl Display for RewardError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unauthenticated => write!(f, "authentication is required"),
            Self::InvalidArgument(message) => write!(f, "{message}"),
            Self::PermissionDenied => {
                write!(f, "you can only claim rewards for your own account")
            }
            Self::FailedPrecondition(failure) => write!(f, "{failure}"),
            Self::Transient { attempts } => write!(
                f,
                "reward claim contended after {attempts} attempts; retry later"
            ),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for RewardError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for RewardError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

impl From<PreconditionFailure> for RewardError {
    fn from(value: PreconditionFailure) -> Self {
        Self::FailedPrecondition(value)
    }
}

impl From<TransactionError<RewardError>> for RewardError {
    fn from(value: TransactionError<RewardError>) -> Self {
        match value {
            TransactionError::Aborted(err) => err,
            TransactionError::Repo(err) => Self::Repo(err),
            TransactionError::RetriesExhausted { attempts } => Self::Transient { attempts },
        }
    }
}

/// Use-case service for the daily rewarded-ad bonus.
pub struct RewardService<R, C = SystemClock, G = ThreadRandom>
where
    R: DailyRepository,
    C: Clock,
    G: RandomSource,
{
    repo: R,
    time: TimeProvider<C>,
    rng: G,
    config: RewardConfig,
}

impl<R: DailyRepository> RewardService<R> {
    /// Creates a service on the wall clock and thread-local randomness.
    ///
    /// # Errors
    /// - Returns `ConfigError` when `config` fails validation.
    pub fn try_new(repo: R, config: RewardConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            repo,
            time: TimeProvider::new(SystemClock, config.utc_offset_minutes),
            rng: ThreadRandom,
            config,
        })
    }
}

impl<R, C, G> RewardService<R, C, G>
where
    R: DailyRepository,
    C: Clock,
    G: RandomSource,
{
    /// Replaces the clock used for day partitioning and cooldown checks.
    pub fn with_clock<C2: Clock>(self, clock: C2) -> RewardService<R, C2, G> {
        RewardService {
            repo: self.repo,
            time: TimeProvider::new(clock, self.config.utc_offset_minutes),
            rng: self.rng,
            config: self.config,
        }
    }

    /// Replaces the random source used for bonus selection.
    pub fn with_random<G2: RandomSource>(self, rng: G2) -> RewardService<R, C, G2> {
        RewardService {
            repo: self.repo,
            time: self.time,
            rng,
            config: self.config,
        }
    }

    pub fn config(&self) -> &RewardConfig {
        &self.config
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    /// Today's partition key in the configured civil offset.
    pub fn today(&self) -> DayId {
        self.time.today()
    }

    /// Grants today's bonus words to `requested_user_id`.
    ///
    /// # Contract
    /// - `caller` is the verified identity from the authentication layer.
    /// - Identity checks run before any repository access.
    /// - On success exactly `bonus_count` words are committed with
    ///   `reward_claimed = true`; on failure nothing is written.
    /// - Commit conflicts re-run the whole transaction up to
    ///   `max_transaction_attempts` times; exhaustion maps to
    ///   `RewardError::Transient`.
    pub fn claim_daily_reward(
        &self,
        caller: Option<&str>,
        requested_user_id: &str,
    ) -> RewardResult<RewardClaim> {
        let started_at = Instant::now();
        let user_id = authorize(caller, requested_user_id)?;
        let day_id = self.time.today();

        let result = self
            .repo
            .run_transaction(self.config.max_transaction_attempts, |tx| {
                self.grant_in_transaction(tx, &user_id, &day_id)
            })
            .map_err(RewardError::from);

        let user_hash = user_log_hash(&user_id);
        let duration_ms = started_at.elapsed().as_millis();
        match &result {
            Ok(words) => info!(
                "event=reward_claim module=reward status=ok user_hash={user_hash} day={day_id} granted={} duration_ms={duration_ms}",
                words.len()
            ),
            Err(RewardError::FailedPrecondition(failure)) => info!(
                "event=reward_claim module=reward status=rejected user_hash={user_hash} day={day_id} reason={} duration_ms={duration_ms}",
                failure.reason()
            ),
            Err(err @ RewardError::Transient { .. }) => warn!(
                "event=reward_claim module=reward status=error user_hash={user_hash} day={day_id} error_code={} duration_ms={duration_ms}",
                err.kind().code()
            ),
            Err(err) => error!(
                "event=reward_claim module=reward status=error user_hash={user_hash} day={day_id} error_code={} error={err}",
                err.kind().code()
            ),
        }

        result.map(|extra_word_ids| RewardClaim {
            day_id,
            extra_word_ids,
        })
    }

    fn grant_in_transaction(
        &self,
        tx: &mut dyn DailyTransaction,
        user_id: &UserId,
        day_id: &DayId,
    ) -> RewardResult<Vec<WordId>> {
        let record = tx
            .get_daily_record(user_id, day_id)?
            .ok_or(PreconditionFailure::DailyStateMissing)?;

        if record.reward_state() == RewardState::Claimed {
            return Err(PreconditionFailure::AlreadyClaimed.into());
        }

        // Applies to unclaimed records carrying a recent stamp too.
        let now_ms = self.time.now_ms();
        if let Some(remaining_ms) = record.cooldown_remaining_ms(now_ms, self.config.cooldown_ms())
        {
            return Err(PreconditionFailure::CooldownActive { remaining_ms }.into());
        }

        let excluded = record.excluded_word_ids();
        let mut seen = HashSet::new();
        let candidates: Vec<WordId> = tx
            .list_public_words()?
            .into_iter()
            .filter(|word_id| !excluded.contains(word_id.as_str()) && seen.insert(word_id.clone()))
            .collect();

        let available = candidates.len();
        let required = self.config.bonus_count;
        let selected = select_uniform(candidates, required, &self.rng).ok_or(
            PreconditionFailure::InsufficientCandidates {
                available,
                required,
            },
        )?;

        tx.stage_reward_grant(
            user_id,
            day_id,
            RewardGrant {
                extra_word_ids: selected.clone(),
            },
        )?;
        Ok(selected)
    }
}

/// Validates identity preconditions in a fixed order.
fn authorize(caller: Option<&str>, requested_user_id: &str) -> RewardResult<UserId> {
    let caller = caller
        .filter(|value| !value.trim().is_empty())
        .ok_or(RewardError::Unauthenticated)?;
    let user_id = UserId::parse(requested_user_id)
        .map_err(|err| RewardError::InvalidArgument(format!("a valid userId is required: {err}")))?;
    if caller != user_id.as_str() {
        return Err(RewardError::PermissionDenied);
    }
    Ok(user_id)
}

/// Short digest so logs stay free of raw account ids.
///
/// Stable within one build only; `DefaultHasher` output may change across
/// Rust releases.
fn user_log_hash(user_id: &UserId) -> String {
    let mut hasher = DefaultHasher::new();
    user_id.hash(&mut hasher);
    format!("{:08x}", hasher.finish() as u32)
}

#[cfg(test)]
mod tests {
    use super::{authorize, user_log_hash, PreconditionFailure, RewardError, RewardErrorKind};
    use crate::model::ids::UserId;

    #[test]
    fn authorize_checks_in_order() {
        assert!(matches!(
            authorize(None, ""),
            Err(RewardError::Unauthenticated)
        ));
        assert!(matches!(
            authorize(Some("  "), "alice"),
            Err(RewardError::Unauthenticated)
        ));
        assert!(matches!(
            authorize(Some("alice"), " "),
            Err(RewardError::InvalidArgument(_))
        ));
        assert!(matches!(
            authorize(Some("alice"), "bob"),
            Err(RewardError::PermissionDenied)
        ));
        assert_eq!(authorize(Some("alice"), "alice").unwrap().as_str(), "alice");
    }

    #[test]
    fn error_kinds_map_to_boundary_codes() {
        let err = RewardError::from(PreconditionFailure::AlreadyClaimed);
        assert_eq!(err.kind(), RewardErrorKind::FailedPrecondition);
        assert_eq!(err.kind().code(), "failed-precondition");
        assert_eq!(err.to_string(), "reward already claimed");

        let transient = RewardError::Transient { attempts: 5 };
        assert!(transient.kind().is_retryable());
        assert_eq!(transient.kind().code(), "unavailable");
        assert!(!RewardErrorKind::FailedPrecondition.is_retryable());
    }

    #[test]
    fn log_hash_is_repeatable_and_hides_raw_id() {
        let user = UserId::parse("user-123").unwrap();
        let hash = user_log_hash(&user);
        assert_eq!(hash, user_log_hash(&user));
        assert_eq!(hash.len(), 8);
        assert!(!hash.contains("user"));
    }
}
