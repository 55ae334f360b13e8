//! Bounded exponential backoff for optimistic-concurrency retry loops.

use std::time::Duration;

use canary_core::CanarydConfig;

/// How many times, and how patiently, a conflicting write is retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&CanarydConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &CanarydConfig) -> Self {
        Self {
            max_attempts: config.max_attempts(),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms()),
            max_backoff: Duration::from_millis(config.max_backoff_ms()),
            multiplier: config.backoff_multiplier(),
        }
    }

    /// Delay to wait after the given (1-based) failed attempt.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1);
        let factor = self.multiplier.max(1).saturating_pow(exp);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    /// Start tracking a new retry loop.
    pub fn backoff(&self) -> Backoff {
        Backoff {
            policy: self.clone(),
            attempt: 1,
        }
    }
}

/// Attempt counter for a single retry loop.
#[derive(Debug)]
pub struct Backoff {
    policy: RetryPolicy,
    attempt: u32,
}

impl Backoff {
    /// The attempt currently in progress (1-based).
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Record a failed attempt. Sleeps for the backoff delay and returns
    /// true when another attempt is allowed, false once the budget is spent.
    pub async fn wait(&mut self) -> bool {
        if self.attempt >= self.policy.max_attempts {
            return false;
        }
        let delay = self.policy.delay_after(self.attempt);
        self.attempt += 1;
        tokio::time::sleep(delay).await;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(50),
            multiplier: 2,
        }
    }

    #[test]
    fn delay_grows_exponentially_and_caps() {
        let p = policy(10);
        assert_eq!(p.delay_after(1), Duration::from_millis(10));
        assert_eq!(p.delay_after(2), Duration::from_millis(20));
        assert_eq!(p.delay_after(3), Duration::from_millis(40));
        assert_eq!(p.delay_after(4), Duration::from_millis(50));
        assert_eq!(p.delay_after(40), Duration::from_millis(50));
    }

    #[test]
    fn defaults_come_from_config() {
        let p = RetryPolicy::default();
        assert_eq!(p.max_attempts, 5);
        assert_eq!(p.initial_backoff, Duration::from_millis(50));
        assert_eq!(p.max_backoff, Duration::from_secs(2));
    }

    #[tokio::test]
    async fn backoff_stops_at_budget() {
        let mut b = RetryPolicy {
            initial_backoff: Duration::from_millis(1),
            ..policy(3)
        }
        .backoff();
        assert_eq!(b.attempt(), 1);
        assert!(b.wait().await);
        assert!(b.wait().await);
        assert_eq!(b.attempt(), 3);
        assert!(!b.wait().await);
        assert_eq!(b.attempt(), 3);
    }

    #[tokio::test]
    async fn single_attempt_never_retries() {
        let mut b = policy(1).backoff();
        assert!(!b.wait().await);
    }
}
