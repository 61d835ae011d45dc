//! # Clocks
//!
//! Token expiry, replay TTLs and approval windows all compare against "now".
//! Components take an `Arc<dyn Clock>` so that tests (and replay tooling) can
//! pin time instead of sleeping.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::temporal::Timestamp;

/// Source of the current time.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// The current UTC time, seconds precision.
    fn now(&self) -> Timestamp;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

impl SystemClock {
    /// A shareable system clock.
    pub fn shared() -> Arc<dyn Clock> {
        Arc::new(SystemClock)
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Timestamp>,
}

impl ManualClock {
    /// Start the clock at `start`.
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Move the clock forward by `secs` seconds.
    pub fn advance_secs(&self, secs: i64) {
        let mut now = self.now.lock();
        *now = now.plus_secs(secs);
    }

    /// Jump to an absolute time.
    pub fn set(&self, ts: Timestamp) {
        *self.now.lock() = ts;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.now.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_only_moves_when_advanced() {
        let start = Timestamp::parse("2026-01-15T12:00:00Z").unwrap();
        let clock = ManualClock::new(start);
        assert_eq!(clock.now(), start);
        clock.advance_secs(301);
        assert_eq!(clock.now().epoch_secs(), start.epoch_secs() + 301);
        clock.set(start);
        assert_eq!(clock.now(), start);
    }

    #[test]
    fn system_clock_is_truncated_utc() {
        let now = SystemClock.now();
        assert!(now.to_iso8601().ends_with('Z'));
    }
}
