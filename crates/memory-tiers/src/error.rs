//! Error types for the tiered memory store.

use thiserror::Error;

/// Errors returned to callers of the tiered store.
///
/// Tier failures are never returned here; they are logged and reported in
/// the operation outcome.
#[derive(Debug, Error)]
pub enum TierError {
    /// Missing or malformed argument
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Invalid store configuration
    #[error("Configuration error: {0}")]
    Config(String),
}
