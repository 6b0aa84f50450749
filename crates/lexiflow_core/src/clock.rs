//! Wall-clock access and civil day computation.
//!
//! # Responsibility
//! - Abstract the current instant so tests can pin "today".
//! - Map an instant to a `DayId` in a fixed UTC offset, independent of the
//!   host time zone.

use crate::model::ids::DayId;
use chrono::{DateTime, FixedOffset};
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of the current instant in Unix epoch milliseconds.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

/// Host wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(elapsed) => i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX),
            // Host clock before 1970.
            Err(err) => -i64::try_from(err.duration().as_millis()).unwrap_or(i64::MAX),
        }
    }
}

/// Manually driven clock for deterministic tests and replays.
#[derive(Debug, Default)]
pub struct FixedClock {
    now_ms: AtomicI64,
}

impl FixedClock {
    pub fn new(now_ms: i64) -> Self {
        Self {
            now_ms: AtomicI64::new(now_ms),
        }
    }

    pub fn set(&self, now_ms: i64) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance_ms(&self, delta_ms: i64) {
        self.now_ms.fetch_add(delta_ms, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now_ms(&self) -> i64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now_ms(&self) -> i64 {
        (**self).now_ms()
    }
}

impl<C: Clock + ?Sized> Clock for std::sync::Arc<C> {
    fn now_ms(&self) -> i64 {
        (**self).now_ms()
    }
}

impl DayId {
    /// Computes the civil day for `instant_ms` at `utc_offset_minutes`.
    ///
    /// Instants or offsets chrono cannot represent fall back to the Unix
    /// epoch day instead of failing.
    pub fn from_epoch_ms(instant_ms: i64, utc_offset_minutes: i32) -> Self {
        let date = FixedOffset::east_opt(utc_offset_minutes.saturating_mul(60))
            .and_then(|offset| {
                DateTime::from_timestamp_millis(instant_ms)
                    .map(|utc| utc.with_timezone(&offset).date_naive())
            })
            .unwrap_or_default();
        Self::from_date(date)
    }
}

/// Produces today's `DayId` from a clock and a fixed civil offset.
#[derive(Debug, Clone)]
pub struct TimeProvider<C: Clock> {
    clock: C,
    utc_offset_minutes: i32,
}

impl<C: Clock> TimeProvider<C> {
    pub fn new(clock: C, utc_offset_minutes: i32) -> Self {
        Self {
            clock,
            utc_offset_minutes,
        }
    }

    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    pub fn today(&self) -> DayId {
        DayId::from_epoch_ms(self.clock.now_ms(), self.utc_offset_minutes)
    }

    pub fn utc_offset_minutes(&self) -> i32 {
        self.utc_offset_minutes
    }
}
