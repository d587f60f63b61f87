use std::sync::Arc;

use crate::error::FetchError;
use crate::rate_limit::RateLimiter;
use crate::retry::RetryPolicy;
use crate::transport::{Page, Transport};

/// A [`Transport`] gated by one source's [`RateLimiter`] and wrapped in a
/// [`RetryPolicy`]. Every attempt, retries included, consumes a token.
#[derive(Debug)]
pub struct RetryingFetcher<T> {
    transport: T,
    limiter: Arc<RateLimiter>,
    policy: RetryPolicy,
}

impl<T: Transport> RetryingFetcher<T> {
    pub fn new(transport: T, limiter: Arc<RateLimiter>, policy: RetryPolicy) -> Self {
        Self {
            transport,
            limiter,
            policy,
        }
    }

    /// # Errors
    ///
    /// Returns the permanent [`FetchError`] from the first attempt that
    /// produced one, or [`FetchError::Exhausted`] when every attempt failed
    /// transiently.
    pub async fn fetch(&self, url: &str) -> Result<Page, FetchError> {
        let result = self
            .policy
            .run(Some(self.limiter.as_ref()), || self.transport.get(url))
            .await;
        if let Err(e) = &result {
            tracing::warn!(url, error = %e, "fetch failed");
        }
        result
    }

    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}
