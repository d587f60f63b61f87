//! Token-bucket rate limiting for outbound calls, one bucket per source.
//!
//! A bucket starts full with `rate` tokens and refills continuously at
//! `rate / per` tokens per second. [`RateLimiter::acquire`] takes one token,
//! suspending the caller when the bucket is empty. Callers reserve their
//! token under the lock and sleep outside it, so waiting callers are granted
//! in arrival order and a token is never handed out twice.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use fbascan_core::{RateLimitConfig, MAX_RATE_WINDOW_SECS};
use tokio::time::Instant;

#[derive(Debug)]
struct Bucket {
    /// May go negative: each unit below zero is a caller already waiting.
    tokens: f64,
    last_refill: Instant,
}

#[derive(Debug)]
pub struct RateLimiter {
    capacity: f64,
    refill_per_sec: f64,
    bucket: tokio::sync::Mutex<Bucket>,
}

impl RateLimiter {
    /// `rate` calls per `per`. A zero `rate` or `per` is raised to the
    /// smallest usable value rather than producing a bucket that never fills.
    #[must_use]
    pub fn new(rate: u32, per: Duration) -> Self {
        let capacity = f64::from(rate.max(1));
        let per_secs = per.as_secs_f64().max(f64::EPSILON);
        Self {
            capacity,
            refill_per_sec: capacity / per_secs,
            bucket: tokio::sync::Mutex::new(Bucket {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Out-of-range windows are clamped to `0..=MAX_RATE_WINDOW_SECS`; a
    /// NaN window falls back to one second.
    #[must_use]
    pub fn from_config(config: &RateLimitConfig) -> Self {
        let per = Duration::try_from_secs_f64(config.per_secs.clamp(0.0, MAX_RATE_WINDOW_SECS))
            .unwrap_or(Duration::from_secs(1));
        Self::new(config.rate, per)
    }

    /// Takes one token, waiting for a refill when none is available.
    /// Never fails.
    pub async fn acquire(&self) {
        let wait = {
            let mut bucket = self.bucket.lock().await;
            let now = Instant::now();
            let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
            bucket.tokens = (bucket.tokens + elapsed * self.refill_per_sec).min(self.capacity);
            bucket.last_refill = now;

            bucket.tokens -= 1.0;
            if bucket.tokens >= 0.0 {
                return;
            }
            Duration::from_secs_f64(-bucket.tokens / self.refill_per_sec)
        };

        tracing::trace!(wait_ms = wait.as_millis(), "rate limiter empty, waiting");
        tokio::time::sleep(wait).await;
    }
}

/// Hands out one shared [`RateLimiter`] per source id for the life of the
/// process.
#[derive(Debug, Default)]
pub struct RateLimiterRegistry {
    limiters: Mutex<HashMap<String, Arc<RateLimiter>>>,
}

impl RateLimiterRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the limiter for `source`, creating it from `config` on first
    /// use. Later calls ignore `config` and return the existing bucket.
    pub fn for_source(&self, source: &str, config: &RateLimitConfig) -> Arc<RateLimiter> {
        let mut limiters = self.limiters.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            limiters
                .entry(source.to_string())
                .or_insert_with(|| Arc::new(RateLimiter::from_config(config))),
        )
    }
}
