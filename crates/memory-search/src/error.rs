//! Search error types.

use thiserror::Error;

use memory_cache::CacheError;

/// Errors from vector similarity.
#[derive(Debug, Error)]
pub enum SimilarityError {
    /// Vectors have different lengths
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Batch called with no queries or no candidates
    #[error("Empty input: {0}")]
    EmptyInput(&'static str),

    /// Worker task panicked or was cancelled
    #[error("Worker failed: {0}")]
    Worker(String),
}

/// Errors from the reranker.
#[derive(Debug, Error)]
pub enum RerankError {
    /// Candidate carries a NaN or infinite score
    #[error("Invalid score on candidate {id}: {field} = {value}")]
    InvalidScore {
        id: String,
        field: &'static str,
        value: f32,
    },

    /// Weights rejected by validation
    #[error("Invalid weights: {0}")]
    InvalidWeights(String),
}

/// Errors returned by the hybrid search engine.
#[derive(Debug, Error)]
pub enum SearchError {
    /// Request rejected before any backend call
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Cache key derivation failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<CacheError> for SearchError {
    fn from(e: CacheError) -> Self {
        SearchError::Serialization(e.to_string())
    }
}
