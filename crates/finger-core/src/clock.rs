//! Injectable wall clock
//!
//! Timestamps, lock expiry, and quota windows read time through the
//! `Clock` trait so tests can advance time deterministically. Timers
//! (queue timeouts, expiry scans) run on `tokio::time` and are covered
//! by paused-time tests instead.

use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};

/// Source of wall-clock time
pub trait Clock: Send + Sync {
    /// Current wall-clock time
    fn now(&self) -> DateTime<Utc>;

    /// Current time as epoch milliseconds
    fn now_millis(&self) -> u64 {
        self.now().timestamp_millis().max(0) as u64
    }
}

/// System wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually advanced clock for tests
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Create a manual clock starting at the given instant
    pub fn starting_at(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Advance the clock by the given number of milliseconds
    pub fn advance_millis(&self, millis: i64) {
        let mut guard = self.now.lock().unwrap();
        *guard += chrono::Duration::milliseconds(millis);
    }

    /// Set the clock to an absolute instant
    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap() = now;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// Shared clock handle
pub type SharedClock = Arc<dyn Clock>;

/// Default shared system clock
pub fn system_clock() -> SharedClock {
    Arc::new(SystemClock)
}
