//! Rate limiting and bounded retry for outbound model calls.
//!
//! Every call to the hosted service passes through a [`CallGate`]: a shared
//! request-per-minute budget, then the call itself, then bounded retry with
//! exponential backoff and jitter when the failure is transient.

use std::future::Future;
use std::num::NonZeroU32;
use std::time::Duration;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use rand::Rng;

use crate::core::errors::Result;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    pub fn with_max_retries(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    /// Exponential backoff capped at `max_delay`, with up to 25% jitter so
    /// parallel sessions do not retry in lockstep.
    fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
            .min(self.max_delay);
        let jitter_ms = exp.as_millis() as u64 / 4;
        let jitter = if jitter_ms == 0 {
            0
        } else {
            rand::rng().random_range(0..=jitter_ms)
        };
        exp + Duration::from_millis(jitter)
    }
}

/// Shared gate in front of the external model service.
pub struct CallGate {
    limiter: DefaultDirectRateLimiter,
    policy: RetryPolicy,
}

impl CallGate {
    pub fn new(requests_per_minute: u32, policy: RetryPolicy) -> Self {
        let per_minute =
            NonZeroU32::new(requests_per_minute.max(1)).expect("max(1) is non-zero");
        Self {
            limiter: RateLimiter::direct(Quota::per_minute(per_minute)),
            policy,
        }
    }

    /// Wait for rate-limit headroom without running anything. Used for
    /// streaming calls, which cannot be replayed.
    pub async fn throttle(&self) {
        self.limiter.until_ready().await;
    }

    /// Run `operation` under the rate limit, retrying transient failures up
    /// to the policy bound. Non-retryable errors surface immediately.
    pub async fn run<T, F, Fut>(&self, what: &str, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt: u32 = 0;

        loop {
            self.limiter.until_ready().await;

            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < self.policy.max_retries => {
                    attempt += 1;
                    let delay = self.policy.delay_for(attempt);
                    tracing::warn!(
                        "{} transient failure (attempt {}/{}), retrying in {:?}: {}",
                        what,
                        attempt,
                        self.policy.max_retries,
                        delay,
                        err
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::core::errors::RagError;

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
        }
    }

    #[tokio::test]
    async fn retries_transient_failures_until_success() {
        let gate = CallGate::new(10_000, fast_policy(3));
        let calls = AtomicU32::new(0);

        let result = gate
            .run("test", || async {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(RagError::service_transient("test", "flaky"))
                } else {
                    Ok(n)
                }
            })
            .await
            .unwrap();

        assert_eq!(result, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_failures_are_not_retried() {
        let gate = CallGate::new(10_000, fast_policy(3));
        let calls = AtomicU32::new(0);

        let result: Result<()> = gate
            .run("test", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(RagError::service("test", "bad request"))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn attempts_are_bounded() {
        let gate = CallGate::new(10_000, fast_policy(2));
        let calls = AtomicU32::new(0);

        let result: Result<()> = gate
            .run("test", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(RagError::service_transient("test", "always down"))
            })
            .await;

        assert!(result.is_err());
        // Initial attempt plus two retries.
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn backoff_grows_and_is_capped() {
        let policy = RetryPolicy {
            max_retries: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(400),
        };
        // Jitter adds at most 25%, so compare against the deterministic floor.
        assert!(policy.delay_for(1) >= Duration::from_millis(100));
        assert!(policy.delay_for(2) >= Duration::from_millis(200));
        assert!(policy.delay_for(4) <= Duration::from_millis(500));
    }
}
