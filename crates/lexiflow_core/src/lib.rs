//! Core domain logic for the LexiFlow daily bonus reward.
//! This crate is the single source of truth for reward invariants.

pub mod api;
pub mod clock;
pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod random;
pub mod repo;
pub mod service;

pub use api::{handle_claim, handle_claim_json, ApiError, ClaimResponse};
pub use clock::{Clock, FixedClock, SystemClock, TimeProvider};
pub use config::{ConfigError, RewardConfig};
pub use logging::{default_log_level, init_logging, init_logging_with, logging_status, LogEcho};
pub use model::daily_record::{DailyRecord, RewardGrant, RewardState};
pub use model::ids::{DayId, UserId, WordId};
pub use random::{RandomSource, ScriptedRandom, SeededRandom, ThreadRandom};
pub use repo::daily_repo::{
    DailyRepository, DailyTransaction, RepoError, RepoResult, SqliteDailyRepository,
    TransactionError,
};
pub use repo::memory_repo::MemoryDailyRepository;
pub use service::reward_service::{
    PreconditionFailure, RewardClaim, RewardError, RewardErrorKind, RewardResult, RewardService,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
