//! Wall-clock abstraction for token expiry checks
//!
//! Expiry decisions compare JWT `exp` claims (Unix seconds) against
//! [`Clock::now_unix`]. Production code uses [`SystemClock`]; tests inject a
//! controllable clock.

use chrono::Utc;

/// Source of the current time in Unix seconds
pub trait Clock: Send + Sync {
    /// Seconds since the Unix epoch
    fn now_unix(&self) -> i64;
}

/// Real system clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_unix(&self) -> i64 {
        Utc::now().timestamp()
    }
}
