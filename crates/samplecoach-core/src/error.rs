//! Error types for the evaluation engine.
//!
//! `ProviderError` is defined here rather than in `samplecoach-providers` so
//! the dispatcher can downcast and classify errors for retry decisions
//! without string matching.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when interacting with a text-generation API.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The API returned a 429 rate limit response.
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// Authentication failed (invalid API key).
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The requested model was not found.
    #[error("model not found: {0}")]
    ModelNotFound(String),

    /// The API returned an error response.
    #[error("API error (HTTP {status}): {message}")]
    ApiError { status: u16, message: String },

    /// The request timed out.
    #[error("request timed out after {0}s")]
    Timeout(u64),

    /// A network error occurred.
    #[error("network error: {0}")]
    NetworkError(String),
}

impl ProviderError {
    /// Returns `true` if the remote asked us to slow down.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ProviderError::RateLimited { .. })
    }
}

/// Returns `true` if `err` wraps a [`ProviderError::RateLimited`].
pub fn is_rate_limited(err: &anyhow::Error) -> bool {
    err.downcast_ref::<ProviderError>()
        .is_some_and(ProviderError::is_rate_limited)
}

/// Configuration problems detected before any request is dispatched.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("no sample column selected")]
    MissingSampleColumn,

    #[error("no goal source selected: choose a goal column or supply a manual goal")]
    MissingGoalSource,

    #[error("sample {sample_index} has no column '{column}'")]
    MissingField { sample_index: usize, column: String },

    #[error("requests per window must be at least 1")]
    ZeroRequestLimit,

    #[error("concurrency must be at least 1")]
    ZeroConcurrency,

    #[error("question '{0}' must request at least one response")]
    ZeroResponses(String),

    #[error("question '{0}' has a negative or non-finite weight")]
    InvalidWeight(String),
}

/// The error recorded against a single task that did not succeed.
///
/// Task errors never abort a run; they are folded into aggregation as an
/// unsuccessful question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskError {
    /// Every retry was consumed by rate-limit responses.
    #[error("timeout: rate limit retries exhausted")]
    Timeout,

    /// A non-retryable failure from the remote service.
    #[error("remote error: {message}")]
    Remote { message: String },

    /// The run was cancelled before this task resolved.
    #[error("cancelled")]
    Cancelled,
}
