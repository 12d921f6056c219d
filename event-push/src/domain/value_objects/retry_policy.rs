//! Retry policy value object.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Bounded retry policy for calls that are safe to repeat.
///
/// `max_attempts` counts the first try, so `3` means one call plus two retries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the first retry in milliseconds.
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    /// Upper bound for a single delay in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Whether to spread delays by ±25%.
    #[serde(default = "default_true")]
    pub use_jitter: bool,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    4000
}

fn default_true() -> bool {
    true
}

impl RetryPolicy {
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }

    /// A single attempt, never retried.
    pub fn no_retry() -> Self {
        Self::with_max_attempts(1)
    }

    /// Whether another attempt may follow `attempts_made` completed attempts.
    pub fn should_retry(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts
    }

    /// Delay to wait after the given failed attempt (1-indexed).
    ///
    /// Exponential: `initial * 2^(attempt-1)`, capped at `max_delay_ms`.
    pub fn delay_after_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(30);
        let delay_ms = self
            .initial_delay_ms
            .saturating_mul(1u64 << exponent)
            .min(self.max_delay_ms);

        if !self.use_jitter {
            return Duration::from_millis(delay_ms);
        }

        let jitter_range = delay_ms / 4;
        if jitter_range == 0 {
            return Duration::from_millis(delay_ms);
        }
        let offset = rand::random::<u64>() % (jitter_range * 2 + 1);
        Duration::from_millis(delay_ms - jitter_range + offset)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            use_jitter: default_true(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.initial_delay_ms, 500);
        assert!(policy.use_jitter);
    }

    #[test]
    fn test_should_retry() {
        let policy = RetryPolicy::with_max_attempts(3);
        assert!(policy.should_retry(1));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
        assert!(!RetryPolicy::no_retry().should_retry(1));
    }

    #[test]
    fn test_delay_without_jitter() {
        let policy = RetryPolicy {
            max_attempts: 6,
            initial_delay_ms: 100,
            max_delay_ms: 500,
            use_jitter: false,
        };
        assert_eq!(policy.delay_after_attempt(1), Duration::from_millis(100));
        assert_eq!(policy.delay_after_attempt(2), Duration::from_millis(200));
        assert_eq!(policy.delay_after_attempt(3), Duration::from_millis(400));
        assert_eq!(policy.delay_after_attempt(4), Duration::from_millis(500));
    }

    #[test]
    fn test_delay_with_jitter_stays_in_band() {
        let policy = RetryPolicy {
            initial_delay_ms: 1000,
            max_delay_ms: 60_000,
            ..Default::default()
        };
        for _ in 0..50 {
            let delay = policy.delay_after_attempt(2).as_millis();
            assert!((1500..=2500).contains(&delay), "delay {delay} out of band");
        }
    }
}
