//! Error types for the result cache.

use thiserror::Error;

/// Errors from cache operations.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Value could not be encoded for storage
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
