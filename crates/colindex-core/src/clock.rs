//! Timestamp sources for mutations.
//!
//! Write timestamps are microseconds since the Unix epoch, the unit
//! wide-column stores use for last-write-wins resolution.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Microseconds in one second.
pub const MICROS_PER_SECOND: i64 = 1_000_000;

/// A source of mutation timestamps.
pub trait Clock: Send + Sync {
    /// Returns the current time in microseconds since the Unix epoch.
    fn now_micros(&self) -> i64;
}

/// Wall clock that never returns the same value twice.
///
/// Two reads in the same microsecond (or after the system clock stepped
/// backwards) yield `last + 1`.
#[derive(Debug, Default)]
pub struct MonotonicClock {
    last: AtomicI64,
}

impl MonotonicClock {
    /// Creates a new clock.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn system_micros() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| i64::try_from(d.as_micros()).unwrap_or(i64::MAX))
    }
}

impl Clock for MonotonicClock {
    fn now_micros(&self) -> i64 {
        let wall = Self::system_micros();
        let mut last = self.last.load(Ordering::Acquire);
        loop {
            let next = wall.max(last.saturating_add(1));
            match self
                .last
                .compare_exchange_weak(last, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return next,
                Err(observed) => last = observed,
            }
        }
    }
}

/// Manually driven clock for tests and simulations.
#[derive(Debug)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    /// Creates a clock frozen at `start_micros`.
    #[must_use]
    pub fn new(start_micros: i64) -> Self {
        Self {
            now: AtomicI64::new(start_micros),
        }
    }

    /// Moves the clock forward.
    pub fn advance_micros(&self, micros: i64) {
        self.now.fetch_add(micros, Ordering::AcqRel);
    }

    /// Moves the clock forward by whole seconds.
    pub fn advance_secs(&self, secs: i64) {
        self.advance_micros(secs.saturating_mul(MICROS_PER_SECOND));
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(1_000 * MICROS_PER_SECOND)
    }
}

impl Clock for ManualClock {
    fn now_micros(&self) -> i64 {
        self.now.load(Ordering::Acquire)
    }
}
