//! Time sources for the rate limiter.

use parking_lot::RwLock;

/// A source of the current time in seconds since the Unix epoch.
pub trait Clock: Send + Sync {
    /// Current time in (fractional) seconds since the Unix epoch.
    fn now(&self) -> f64;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: RwLock<f64>,
}

impl ManualClock {
    /// Create a clock frozen at `now`.
    pub fn new(now: f64) -> Self {
        Self {
            now: RwLock::new(now),
        }
    }

    /// Jump to an absolute time.
    pub fn set(&self, now: f64) {
        *self.now.write() = now;
    }

    /// Move forward by `secs` seconds.
    pub fn advance(&self, secs: f64) {
        *self.now.write() += secs;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        *self.now.read()
    }
}
