//! Domain model for daily vocabulary state.
//!
//! # Responsibility
//! - Define typed identifiers and the per-day record shared by repo and
//!   service layers.
//!
//! # Invariants
//! - Daily state is partitioned by `(UserId, DayId)`.
//! - Records are never deleted by core.

pub mod daily_record;
pub mod ids;
