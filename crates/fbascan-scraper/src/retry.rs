//! Retry policy with exponential back-off and jitter.

use std::future::Future;
use std::time::Duration;

use crate::error::FetchError;
use crate::rate_limit::RateLimiter;

/// When and how long to wait between attempts.
///
/// The wait before retry `n` (1-based) is `base * 2^(n-1)`, capped at
/// `cap`, then scaled by a random factor in `[0.75, 1.25)` when `jitter`
/// is set. `retryable` decides which errors get another attempt.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts including the first. Always at least 1.
    pub max_attempts: u32,
    pub base: Duration,
    pub cap: Duration,
    pub jitter: bool,
    pub retryable: fn(&FetchError) -> bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base: Duration::from_millis(500),
            cap: Duration::from_secs(30),
            jitter: true,
            retryable: FetchError::is_transient,
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn new(max_attempts: u32, base: Duration, cap: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base,
            cap,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    #[must_use]
    pub fn with_predicate(mut self, retryable: fn(&FetchError) -> bool) -> Self {
        self.retryable = retryable;
        self
    }

    /// Delay before retry number `retry` (1-based).
    #[must_use]
    pub fn backoff(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(20);
        let capped = self.base.saturating_mul(1u32 << exponent).min(self.cap);
        if self.jitter {
            capped.mul_f64(rand::random::<f64>() * 0.5 + 0.75)
        } else {
            capped
        }
    }

    /// Runs `operation` until it succeeds, fails permanently, or attempts
    /// run out. When `limiter` is given every attempt, retries included,
    /// first takes a token from it.
    ///
    /// # Errors
    ///
    /// Permanent errors are returned as-is after one attempt. A transient
    /// error on the last attempt is wrapped in [`FetchError::Exhausted`].
    pub async fn run<T, F, Fut>(
        &self,
        limiter: Option<&RateLimiter>,
        mut operation: F,
    ) -> Result<T, FetchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1u32;
        loop {
            if let Some(limiter) = limiter {
                limiter.acquire().await;
            }

            let err = match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !(self.retryable)(&err) {
                return Err(err);
            }
            if attempt >= max_attempts {
                return Err(FetchError::Exhausted {
                    attempts: attempt,
                    last: Box::new(err),
                });
            }

            let delay = self.backoff(attempt);
            tracing::warn!(
                attempt,
                max_attempts,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %err,
                "transient fetch error, retrying after back-off"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}
