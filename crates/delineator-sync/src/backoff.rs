//! Reconnect delay schedule.
//!
//! After every failed or ended connection the retry counter grows by one,
//! up to a cap, and the synchronizer waits `base * 2^retry` before the next
//! attempt. A successful connect resets the counter to zero. With the
//! default 500 ms base and cap of 6 the waits are 1 s, 2 s, 4 s, 8 s, 16 s,
//! 32 s, 32 s, ...

use std::time::Duration;

use delineator_core::config::SyncConfig;

/// Exponential reconnect schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    base: Duration,
    max_exponent: u32,
}

impl Backoff {
    /// Create a schedule with the given unit delay and exponent cap.
    pub const fn new(base: Duration, max_exponent: u32) -> Self {
        Self { base, max_exponent }
    }

    /// Schedule from the synchronizer configuration.
    pub const fn from_config(config: &SyncConfig) -> Self {
        Self::new(
            Duration::from_millis(config.backoff_base_ms),
            config.backoff_max_exponent,
        )
    }

    /// Retry counter after one more failure.
    pub fn next_retry(&self, retry: u32) -> u32 {
        retry.saturating_add(1).min(self.max_exponent)
    }

    /// Wait before the attempt numbered `retry`.
    pub fn delay(&self, retry: u32) -> Duration {
        let exponent = retry.min(self.max_exponent);
        let factor = 1_u32.checked_shl(exponent).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::from_config(&SyncConfig::default())
    }
}
