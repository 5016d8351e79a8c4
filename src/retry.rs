//! Retry policy for failed exchanges
//!
//! Only retryable failures (network and api) are retried, and only when the
//! failed attempt delivered no content. A partially streamed reply is left
//! for the user to retry by hand so text is never duplicated.
//!
//! Delays grow exponentially from `base_delay`, are capped at `max_delay`
//! and, with jitter enabled, are scaled by a random factor in `[0.5, 1.0]`.

use std::time::Duration;

use rand::Rng;

use crate::classifier::ErrorContext;
use crate::config::RetryConfig;

/// Backoff schedule for one exchange.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use agentchat::retry::RetryPolicy;
///
/// let policy = RetryPolicy::new(3, Duration::from_millis(100), Duration::from_secs(1), false);
/// assert_eq!(policy.delay_for(1), Duration::from_millis(100));
/// assert_eq!(policy.delay_for(2), Duration::from_millis(200));
/// assert_eq!(policy.delay_for(10), Duration::from_secs(1));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.base_delay_ms),
            Duration::from_millis(config.max_delay_ms),
            config.jitter,
        )
    }
}

impl RetryPolicy {
    /// Create a policy; `max_attempts` counts the first attempt and is at
    /// least one.
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration, jitter: bool) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
            jitter,
        }
    }

    /// A policy that never retries.
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO, false)
    }

    /// Total attempts allowed, including the first
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Whether attempt number `attempt` (1-based) that failed with `error`
    /// should be followed by another one.
    ///
    /// `delivered` is true when the failed attempt already produced
    /// visible content.
    pub fn should_retry(&self, error: &ErrorContext, attempt: u32, delivered: bool) -> bool {
        error.retryable && !delivered && attempt < self.max_attempts
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let delay = self
            .base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay);

        if self.jitter && !delay.is_zero() {
            let factor: f64 = rand::rng().random_range(0.5..=1.0);
            delay.mul_f64(factor)
        } else {
            delay
        }
    }
}
