//! Real-time clock access.

use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use thiserror::Error;

/// Errors reading the real-time clock.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClockError {
    /// The system has not synchronised its clock yet.
    #[error("real time not synchronised")]
    NotSynchronized,

    /// The clock could not be read.
    #[error("real time unavailable: {0}")]
    Unavailable(String),
}

/// Source of wall-clock time.
pub trait Clock {
    /// Milliseconds since the Unix epoch.
    fn real_time_ms(&self) -> Result<u64, ClockError>;
}

/// The host clock, always considered synchronised.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn real_time_ms(&self) -> Result<u64, ClockError> {
        let now = Utc::now().timestamp_millis();
        u64::try_from(now).map_err(|_| ClockError::Unavailable(format!("clock before epoch: {}", now)))
    }
}

/// A clock set by hand. Clones share the same time.
///
/// Starts unsynchronised.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now_ms: Arc<Mutex<Option<u64>>>,
}

impl ManualClock {
    /// Create an unsynchronised clock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a clock synchronised to `now_ms`.
    pub fn synchronized_at(now_ms: u64) -> Self {
        let clock = Self::new();
        clock.set(now_ms);
        clock
    }

    /// Synchronise to `now_ms`.
    pub fn set(&self, now_ms: u64) {
        *self.now_ms.lock() = Some(now_ms);
    }

    /// Move time forward. No effect while unsynchronised.
    pub fn advance(&self, delta_ms: u64) {
        if let Some(now) = self.now_ms.lock().as_mut() {
            *now = now.saturating_add(delta_ms);
        }
    }

    /// Forget the time.
    pub fn unsynchronize(&self) {
        *self.now_ms.lock() = None;
    }
}

impl Clock for ManualClock {
    fn real_time_ms(&self) -> Result<u64, ClockError> {
        self.now_ms.lock().ok_or(ClockError::NotSynchronized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new();
        assert_eq!(clock.real_time_ms(), Err(ClockError::NotSynchronized));

        let shared = clock.clone();
        shared.set(1_000);
        clock.advance(250);
        assert_eq!(shared.real_time_ms(), Ok(1_250));

        clock.unsynchronize();
        assert_eq!(shared.real_time_ms(), Err(ClockError::NotSynchronized));
    }

    #[test]
    fn test_system_clock_after_2020() {
        let now = SystemClock.real_time_ms().unwrap();
        assert!(now > 1_577_836_800_000);
    }
}
