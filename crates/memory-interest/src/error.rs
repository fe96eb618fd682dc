//! Error types for interest calculation.

use thiserror::Error;

use memory_cache::CacheError;

#[derive(Debug, Error)]
pub enum InterestError {
    /// Event or argument rejected before any work
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Vectors of different lengths in one centroid
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Behaviour history source failed
    #[error("History error: {0}")]
    History(String),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Configuration error: {0}")]
    Config(String),
}
