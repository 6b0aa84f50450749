//! Reward engine configuration.
//!
//! # Responsibility
//! - Expose the bonus size, cooldown, civil offset and retry bound as named,
//!   overridable values.
//! - Load overrides from process environment with logged fallbacks.
//!
//! # Invariants
//! - A validated config always grants at least one word and attempts each
//!   transaction at least once.

use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::time::Duration;

/// Words granted per successful claim.
pub const DEFAULT_BONUS_COUNT: usize = 5;
/// Minimum spacing between two rewards for one user.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(24 * 60 * 60);
/// Civil day offset (UTC+03:00, Turkey).
pub const DEFAULT_UTC_OFFSET_MINUTES: i32 = 3 * 60;
/// Optimistic transaction attempts before surfacing `Transient`.
pub const DEFAULT_MAX_TRANSACTION_ATTEMPTS: u32 = 5;

const MAX_UTC_OFFSET_MINUTES: i32 = 18 * 60;

pub const ENV_BONUS_COUNT: &str = "LEXIFLOW_BONUS_COUNT";
pub const ENV_COOLDOWN_SECS: &str = "LEXIFLOW_COOLDOWN_SECS";
pub const ENV_UTC_OFFSET_MINUTES: &str = "LEXIFLOW_UTC_OFFSET_MINUTES";
pub const ENV_MAX_TX_ATTEMPTS: &str = "LEXIFLOW_MAX_TX_ATTEMPTS";

/// Tunables for the reward transaction engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewardConfig {
    pub bonus_count: usize,
    pub cooldown: Duration,
    pub utc_offset_minutes: i32,
    pub max_transaction_attempts: u32,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            bonus_count: DEFAULT_BONUS_COUNT,
            cooldown: DEFAULT_COOLDOWN,
            utc_offset_minutes: DEFAULT_UTC_OFFSET_MINUTES,
            max_transaction_attempts: DEFAULT_MAX_TRANSACTION_ATTEMPTS,
        }
    }
}

impl RewardConfig {
    pub fn with_bonus_count(mut self, bonus_count: usize) -> Self {
        self.bonus_count = bonus_count;
        self
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn with_utc_offset_minutes(mut self, utc_offset_minutes: i32) -> Self {
        self.utc_offset_minutes = utc_offset_minutes;
        self
    }

    pub fn with_max_transaction_attempts(mut self, attempts: u32) -> Self {
        self.max_transaction_attempts = attempts;
        self
    }

    /// Cooldown in epoch-millisecond units, saturating on overflow.
    pub fn cooldown_ms(&self) -> i64 {
        i64::try_from(self.cooldown.as_millis()).unwrap_or(i64::MAX)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bonus_count == 0 {
            return Err(ConfigError::ZeroBonusCount);
        }
        if self.max_transaction_attempts == 0 {
            return Err(ConfigError::ZeroTransactionAttempts);
        }
        if self.utc_offset_minutes.abs() > MAX_UTC_OFFSET_MINUTES {
            return Err(ConfigError::UtcOffsetOutOfRange(self.utc_offset_minutes));
        }
        Ok(())
    }

    /// Loads config from `LEXIFLOW_*` environment variables.
    ///
    /// Missing or unparsable values fall back to defaults with a log line;
    /// the combined result is still validated.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env` with an injectable variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let config = Self {
            bonus_count: load_or_default(&lookup, ENV_BONUS_COUNT, DEFAULT_BONUS_COUNT),
            cooldown: Duration::from_secs(load_or_default(
                &lookup,
                ENV_COOLDOWN_SECS,
                DEFAULT_COOLDOWN.as_secs(),
            )),
            utc_offset_minutes: load_or_default(
                &lookup,
                ENV_UTC_OFFSET_MINUTES,
                DEFAULT_UTC_OFFSET_MINUTES,
            ),
            max_transaction_attempts: load_or_default(
                &lookup,
                ENV_MAX_TX_ATTEMPTS,
                DEFAULT_MAX_TRANSACTION_ATTEMPTS,
            ),
        };
        config.validate()?;
        Ok(config)
    }
}

fn load_or_default<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    let Some(raw) = lookup(key) else {
        info!("event=config_load module=config status=default key={key} value={default}");
        return default;
    };
    match raw.trim().parse::<T>() {
        Ok(value) => value,
        Err(err) => {
            warn!(
                "event=config_load module=config status=invalid key={key} error={err} fallback={default}"
            );
            default
        }
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    ZeroBonusCount,
    ZeroTransactionAttempts,
    UtcOffsetOutOfRange(i32),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ZeroBonusCount => write!(f, "bonus_count must be at least 1"),
            Self::ZeroTransactionAttempts => {
                write!(f, "max_transaction_attempts must be at least 1")
            }
            Self::UtcOffsetOutOfRange(value) => write!(
                f,
                "utc_offset_minutes must be within ±{MAX_UTC_OFFSET_MINUTES}, got {value}"
            ),
        }
    }
}

impl Error for ConfigError {}
