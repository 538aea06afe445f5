//! Reconnect backoff policy.
//!
//! The delay for attempt `n` is `base × 2^n`, clamped to `cap`. The policy is
//! stateless: the caller owns the attempt counter, so the same attempt always
//! yields the same delay.

use crate::config::ReconnectConfig;
use std::time::Duration;

/// Default first delay.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Default delay ceiling.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Default number of reconnect attempts before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// Exponential backoff with a delay cap and an attempt ceiling.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before the first retry (attempt 0).
    pub base: Duration,
    /// Upper bound on any single delay.
    pub cap: Duration,
    /// Attempts allowed before the connection is declared lost.
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base: DEFAULT_BASE_DELAY,
            cap: DEFAULT_MAX_DELAY,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl From<&ReconnectConfig> for ReconnectPolicy {
    fn from(config: &ReconnectConfig) -> Self {
        Self {
            base: Duration::from_millis(config.base_delay_ms),
            cap: Duration::from_millis(config.max_delay_ms),
            max_attempts: config.max_attempts,
        }
    }
}

impl ReconnectPolicy {
    /// Delay to wait before reconnect attempt `attempt` (0-indexed).
    ///
    /// Saturates at `cap` instead of overflowing for large attempts.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt);
        factor
            .and_then(|f| self.base.checked_mul(f))
            .map_or(self.cap, |delay| delay.min(self.cap))
    }

    /// Whether another reconnect may be attempted.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}
