//! Reconnect policy value object.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Outcome of a reconnect decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// Retry after the given delay.
    Retry(Duration),
    /// The retry budget is exhausted.
    GiveUp,
}

/// Backoff and retry-budget policy governing automatic session recovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconnectPolicy {
    /// Maximum number of reconnect attempts per session.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Initial delay between attempts in milliseconds.
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    /// Maximum delay between attempts in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Backoff multiplier applied per consecutive failure.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    /// Whether to add jitter to delays.
    #[serde(default)]
    pub use_jitter: bool,
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    2000
}

fn default_max_delay_ms() -> u64 {
    60000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            use_jitter: false,
        }
    }
}

impl ReconnectPolicy {
    /// Create a policy with a custom retry budget.
    pub fn with_max_retries(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    /// Create a policy that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Calculate the delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_delay =
            self.initial_delay_ms as f64 * self.backoff_multiplier.powi(attempt.min(32) as i32);
        let delay_ms = base_delay.min(self.max_delay_ms as f64) as u64;

        if self.use_jitter {
            // Up to 25% jitter
            let jitter = (delay_ms as f64 * 0.25 * rand::random::<f64>()) as u64;
            Duration::from_millis(delay_ms + jitter)
        } else {
            Duration::from_millis(delay_ms)
        }
    }

    /// Check if more retries are allowed for the given attempt count.
    pub fn should_retry(&self, attempts_so_far: u32) -> bool {
        attempts_so_far < self.max_retries
    }

    /// Decide whether to retry given the number of attempts already made.
    pub fn decide(&self, attempts_so_far: u32) -> ReconnectDecision {
        if self.should_retry(attempts_so_far) {
            ReconnectDecision::Retry(self.delay_for_attempt(attempts_so_far))
        } else {
            ReconnectDecision::GiveUp
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.initial_delay_ms, 2000);
        assert!(!policy.use_jitter);
    }

    #[test]
    fn test_no_retry() {
        let policy = ReconnectPolicy::no_retry();
        assert_eq!(policy.decide(0), ReconnectDecision::GiveUp);
    }

    #[test]
    fn test_should_retry_budget() {
        let policy = ReconnectPolicy::with_max_retries(3);
        assert!(policy.should_retry(0));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
    }

    #[test]
    fn test_delay_strictly_increases_until_cap() {
        let policy = ReconnectPolicy {
            max_retries: 10,
            initial_delay_ms: 1000,
            max_delay_ms: 30000,
            backoff_multiplier: 2.0,
            use_jitter: false,
        };

        let mut previous = Duration::ZERO;
        for attempt in 0..5 {
            let delay = policy.delay_for_attempt(attempt);
            assert!(
                delay > previous,
                "delay for attempt {attempt} should exceed the previous delay"
            );
            previous = delay;
        }
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(1000));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_millis(16000));
    }

    #[test]
    fn test_delay_capped_at_max() {
        let policy = ReconnectPolicy {
            max_retries: 10,
            initial_delay_ms: 1000,
            max_delay_ms: 5000,
            backoff_multiplier: 2.0,
            use_jitter: false,
        };
        assert_eq!(policy.delay_for_attempt(5), Duration::from_millis(5000));
        assert_eq!(policy.delay_for_attempt(9), Duration::from_millis(5000));
    }

    #[test]
    fn test_decide() {
        let policy = ReconnectPolicy {
            max_retries: 2,
            initial_delay_ms: 100,
            max_delay_ms: 1000,
            backoff_multiplier: 2.0,
            use_jitter: false,
        };
        assert_eq!(
            policy.decide(0),
            ReconnectDecision::Retry(Duration::from_millis(100))
        );
        assert_eq!(
            policy.decide(1),
            ReconnectDecision::Retry(Duration::from_millis(200))
        );
        assert_eq!(policy.decide(2), ReconnectDecision::GiveUp);
    }

    #[test]
    fn test_serialization() {
        let policy = ReconnectPolicy::default();
        let json = serde_json::to_string(&policy).unwrap();
        let parsed: ReconnectPolicy = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, policy);
    }
}
