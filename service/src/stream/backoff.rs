//! Exponential backoff with additive jitter.

use std::time::Duration;

use rand::Rng;

/// Reconnection timing for a chat stream.
///
/// The delay before retry `n` (0-based) is
/// `min(base_delay * 2^n + uniform(0..=max_jitter), max_delay)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Retries allowed per provider before giving up on it.
    pub max_attempts: u32,
    pub max_jitter: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_attempts: 5,
            max_jitter: Duration::from_secs(1),
        }
    }
}

impl BackoffPolicy {
    /// Replace the base delay, e.g. with a server-sent `retry:` hint.
    #[must_use]
    pub const fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Whether a retry is allowed after `attempts` retries already made.
    #[must_use]
    pub const fn allows_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }

    /// Delay before retry `attempt` (0-based), with random jitter.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        self.delay_with_jitter(attempt, self.sample_jitter())
    }

    /// Delay before retry `attempt` (0-based) using the given jitter.
    #[must_use]
    pub fn delay_with_jitter(&self, attempt: u32, jitter: Duration) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay
            .saturating_mul(factor)
            .saturating_add(jitter.min(self.max_jitter))
            .min(self.max_delay)
    }

    fn sample_jitter(&self) -> Duration {
        let max_ms = u64::try_from(self.max_jitter.as_millis()).unwrap_or(u64::MAX);
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
    }
}
