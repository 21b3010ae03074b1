//! Exponential backoff around a single network/disk operation.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{info, warn};

/// Errors a [`RetryPolicy`] knows how to classify.
pub trait Retryable {
    fn is_transient(&self) -> bool;
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub multiplier: Duration,
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            multiplier: Duration::from_secs(1),
            min_delay: Duration::from_secs(4),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// A policy that retries `max_attempts` times without sleeping.
    #[cfg(test)]
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            multiplier: Duration::ZERO,
            min_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// `multiplier * 2^(attempt - 1)`, clamped to `[min_delay, max_delay]`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let delay = self.multiplier.saturating_mul(1u32 << exponent);
        delay.max(self.min_delay).min(self.max_delay.max(self.min_delay))
    }

    /// Runs `op` until it succeeds, fails permanently, or attempts run out.
    pub async fn run<T, E, F, Fut>(&self, label: &str, mut op: F) -> Result<T, E>
    where
        E: Retryable + std::fmt::Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    let backoff = self.delay(attempt);
                    warn!(
                        "{} failed (attempt {}/{}): {}",
                        label, attempt, self.max_attempts, e
                    );
                    info!("Backing off for {}ms before retry", backoff.as_millis());
                    sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct Flaky(bool);

    impl std::fmt::Display for Flaky {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "flaky(transient={})", self.0)
        }
    }

    impl Retryable for Flaky {
        fn is_transient(&self) -> bool {
            self.0
        }
    }

    #[test]
    fn test_delay_is_clamped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay(1), Duration::from_secs(4));
        assert_eq!(policy.delay(3), Duration::from_secs(4));
        assert_eq!(policy.delay(4), Duration::from_secs(8));
        assert_eq!(policy.delay(5), Duration::from_secs(10));
        assert_eq!(policy.delay(40), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_transient_errors_exhaust_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<(), Flaky> = RetryPolicy::immediate(4)
            .run("op", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(Flaky(true)) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), Flaky> = RetryPolicy::immediate(4)
            .run("op", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(Flaky(false)) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failure() {
        let result: Result<u32, Flaky> = RetryPolicy::immediate(3)
            .run("op", |attempt| async move {
                if attempt < 2 { Err(Flaky(true)) } else { Ok(attempt) }
            })
            .await;

        assert_eq!(result.unwrap(), 2);
    }
}
