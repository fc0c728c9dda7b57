//! Retry policy for rate-limited requests.
//!
//! The delay before retry `r` (0-based) is `base_delay * 2^(r + jitter)`
//! with `jitter` drawn uniformly from `[0, 1)`.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::is_rate_limited;

/// Source of jitter in `[0, 1)`.
pub type JitterFn = Arc<dyn Fn() -> f64 + Send + Sync>;

/// Decides whether an error may be retried.
pub type RetryablePredicate = Arc<dyn Fn(&anyhow::Error) -> bool + Send + Sync>;

/// Exponential backoff with jitter for retryable errors.
#[derive(Clone)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt.
    pub max_retries: u32,
    /// Multiplier applied to `2^(retry + jitter)`.
    pub base_delay: Duration,
    jitter: JitterFn,
    retryable: RetryablePredicate,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            jitter: Arc::new(rand::random::<f64>),
            retryable: Arc::new(is_rate_limited),
        }
    }

    /// Replace the jitter source, e.g. with a constant in tests.
    pub fn with_jitter(mut self, jitter: impl Fn() -> f64 + Send + Sync + 'static) -> Self {
        self.jitter = Arc::new(jitter);
        self
    }

    /// Replace the retryable-error predicate.
    pub fn with_retryable(
        mut self,
        retryable: impl Fn(&anyhow::Error) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.retryable = Arc::new(retryable);
        self
    }

    pub fn is_retryable(&self, err: &anyhow::Error) -> bool {
        (self.retryable)(err)
    }

    /// Delay to wait before retry number `retry` (0-based), or `None` once
    /// the retry budget is spent.
    pub fn next_delay(&self, retry: u32) -> Option<Duration> {
        if retry >= self.max_retries {
            return None;
        }
        let jitter = (self.jitter)().clamp(0.0, 1.0);
        let factor = 2f64.powf(retry as f64 + jitter);
        Some(self.base_delay.mul_f64(factor))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(1))
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .finish_non_exhaustive()
    }
}
