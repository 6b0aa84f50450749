//! Per-user, per-day vocabulary state.
//!
//! # Responsibility
//! - Hold the assigned and bonus word sets for one `(user, day)` pair.
//! - Own the `Unclaimed -> Claimed` reward transition.
//!
//! # Invariants
//! - `extra_word_ids` is written at most once per day.
//! - `reward_claimed` never flips back to `false`.
//! - A claimed record always carries `last_rewarded_at`.

use crate::model::ids::{DayId, WordId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Reward lifecycle derived from `DailyRecord::reward_claimed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardState {
    Unclaimed,
    /// Terminal for the day.
    Claimed,
}

/// Daily vocabulary record keyed by `(user, day_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyRecord {
    /// Civil day this record belongs to.
    pub day_id: DayId,
    /// Words presented today, fixed by the daily initialization step.
    pub assigned_word_ids: Vec<WordId>,
    /// Bonus words granted by the reward; empty until claimed.
    pub extra_word_ids: Vec<WordId>,
    pub reward_claimed: bool,
    /// Unix epoch milliseconds of the last granted reward.
    pub last_rewarded_at: Option<i64>,
    /// Unix epoch milliseconds.
    pub updated_at: i64,
}

/// Bonus words staged for commit by one successful claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewardGrant {
    pub extra_word_ids: Vec<WordId>,
}

impl DailyRecord {
    /// Creates an unclaimed record as produced by daily initialization.
    pub fn new(day_id: DayId, assigned_word_ids: Vec<WordId>, created_at: i64) -> Self {
        Self {
            day_id,
            assigned_word_ids,
            extra_word_ids: Vec::new(),
            reward_claimed: false,
            last_rewarded_at: None,
            updated_at: created_at,
        }
    }

    pub fn reward_state(&self) -> RewardState {
        if self.reward_claimed {
            RewardState::Claimed
        } else {
            RewardState::Unclaimed
        }
    }

    /// Words the user already has today: assigned plus previously granted.
    pub fn excluded_word_ids(&self) -> HashSet<&str> {
        self.assigned_word_ids
            .iter()
            .chain(self.extra_word_ids.iter())
            .map(String::as_str)
            .collect()
    }

    /// Returns how long the cooldown still runs at `now_ms`, if at all.
    ///
    /// A `last_rewarded_at` in the future counts as fully inside the window.
    pub fn cooldown_remaining_ms(&self, now_ms: i64, cooldown_ms: i64) -> Option<i64> {
        let last = self.last_rewarded_at?;
        let elapsed = now_ms.saturating_sub(last);
        if elapsed < cooldown_ms {
            Some(cooldown_ms.saturating_sub(elapsed.max(0)))
        } else {
            None
        }
    }

    /// Applies the `Unclaimed -> Claimed` transition with a store timestamp.
    ///
    /// # Errors
    /// - `RewardStateError::AlreadyClaimed` when the record is terminal.
    pub fn apply_reward_grant(
        &mut self,
        grant: &RewardGrant,
        stamped_at: i64,
    ) -> Result<(), RewardStateError> {
        if self.reward_claimed {
            return Err(RewardStateError::AlreadyClaimed);
        }
        self.extra_word_ids = grant.extra_word_ids.clone();
        self.reward_claimed = true;
        self.last_rewarded_at = Some(stamped_at);
        self.updated_at = stamped_at;
        Ok(())
    }

    /// Validates persisted record shape.
    pub fn validate(&self) -> Result<(), RecordValidationError> {
        validate_word_list("assigned_word_ids", &self.assigned_word_ids)?;
        validate_word_list("extra_word_ids", &self.extra_word_ids)?;
        if self.reward_claimed && self.last_rewarded_at.is_none() {
            return Err(RecordValidationError::ClaimedWithoutTimestamp);
        }
        Ok(())
    }
}

fn validate_word_list(
    field: &'static str,
    words: &[WordId],
) -> Result<(), RecordValidationError> {
    let mut seen = HashSet::with_capacity(words.len());
    for word in words {
        if word.trim().is_empty() {
            return Err(RecordValidationError::BlankWordId { field });
        }
        if !seen.insert(word.as_str()) {
            return Err(RecordValidationError::DuplicateWordId {
                field,
                word_id: word.clone(),
            });
        }
    }
    Ok(())
}

/// Rejected reward state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewardStateError {
    AlreadyClaimed,
}

impl Display for RewardStateError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlreadyClaimed => write!(f, "reward already claimed for this day"),
        }
    }
}

impl Error for RewardStateError {}

/// Daily record shape violations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordValidationError {
    BlankWordId {
        field: &'static str,
    },
    DuplicateWordId {
        field: &'static str,
        word_id: WordId,
    },
    ClaimedWithoutTimestamp,
}

impl Display for RecordValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankWordId { field } => write!(f, "{field} contains a blank word id"),
            Self::DuplicateWordId { field, word_id } => {
                write!(f, "{field} contains duplicate word id `{word_id}`")
            }
            Self::ClaimedWithoutTimestamp => {
                write!(f, "claimed record is missing last_rewarded_at")
            }
        }
    }
}

impl Error for RecordValidationError {}
