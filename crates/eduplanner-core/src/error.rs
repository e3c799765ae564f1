//! Error types shared across the workspace.
//!
//! `ProviderError` is defined here (not in `eduplanner-providers`) so the
//! iteration engine can downcast and classify provider failures without
//! string matching.

use thiserror::Error;

/// Errors that can occur when interacting with an LLM provider.
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
    /// Returns `true` if the model could not be reached at all.
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            ProviderError::NetworkError(_) | ProviderError::Timeout(_)
        )
    }
}

/// Returns `true` if `err` wraps a connectivity failure anywhere in its chain.
pub fn is_connectivity_error(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<ProviderError>()
            .is_some_and(ProviderError::is_connectivity)
    })
}

/// Validation failures surfaced to the caller.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("level must be 1, 2, 3 or 'easy', 'intermediate', 'hard' (got '{0}')")]
    InvalidLevel(String),

    #[error("invalid user id '{0}': use letters, digits, '-', '_' or '.'")]
    InvalidUserId(String),

    #[error("no JSON array in model response")]
    MissingQuestionArray,

    #[error("model response contains a malformed JSON array: {0}")]
    InvalidQuestionArray(String),

    #[error("question count must be at least 1")]
    InvalidQuestionCount,
}
