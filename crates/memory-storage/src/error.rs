//! Storage layer error types.

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur in the long-term store
#[derive(Error, Debug)]
pub enum StorageError {
    /// Transport failure talking to the backend
    #[error("Backend error: {0}")]
    Backend(String),

    /// Backend answered with a non-success status
    #[error("Backend returned HTTP {status}: {body}")]
    Api { status: u16, body: String },

    /// Backend did not answer in time
    #[error("Backend timed out after {0:?}")]
    Timeout(Duration),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Malformed query or record
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}
