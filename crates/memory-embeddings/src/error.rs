//! Embedding error types.

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during embedding operations.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// Transport-level failure talking to the embedding backend
    #[error("Request failed: {0}")]
    Request(String),

    /// Backend answered with a non-success status
    #[error("API error: HTTP {status}: {body}")]
    Api { status: u16, body: String },

    /// Backend is throttling requests
    #[error("Rate limit exceeded")]
    RateLimited,

    /// Response body could not be interpreted
    #[error("Parse error: {0}")]
    Parse(String),

    /// Backend did not answer in time
    #[error("Embedding timed out after {0:?}")]
    Timeout(Duration),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Dimension mismatch
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

impl EmbeddingError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            EmbeddingError::Request(_)
            | EmbeddingError::RateLimited
            | EmbeddingError::Timeout(_) => true,
            EmbeddingError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}
