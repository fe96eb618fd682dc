//! # memory-embeddings
//!
//! Embedding generation for the tiered memory system.
//!
//! Turns message content and behaviour events into vectors for KNN retrieval
//! and interest centroids.
//!
//! ## Features
//! - OpenAI-compatible and HuggingFace inference backends over HTTP
//! - Deterministic hashing embedder for offline use
//! - Provider selection from [`EmbeddingSettings`]
//!
//! Failures surface as [`EmbeddingError`]; callers fall back to lexical paths.

pub mod api;
pub mod error;
pub mod hash;
pub mod model;

use std::sync::Arc;

use memory_types::{EmbeddingProvider, EmbeddingSettings};

pub use api::{ApiEmbedder, ApiEmbedderConfig, ApiFlavor};
pub use error::EmbeddingError;
pub use hash::HashEmbedder;
pub use model::{truncate_chars, Embedding, EmbeddingModel, ModelInfo};

/// Build the embedder selected by `settings.provider`.
pub fn build_embedder(
    settings: &EmbeddingSettings,
) -> Result<Arc<dyn EmbeddingModel>, EmbeddingError> {
    match settings.provider {
        EmbeddingProvider::Hash => Ok(Arc::new(HashEmbedder::new(
            settings.dimension,
            settings.max_length,
        )?)),
        EmbeddingProvider::OpenAi | EmbeddingProvider::HuggingFace => {
            let config = ApiEmbedderConfig::from_settings(settings)?;
            Ok(Arc::new(ApiEmbedder::new(config)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_default_is_hash() {
        let embedder = build_embedder(&EmbeddingSettings::default()).unwrap();
        assert_eq!(embedder.info().name, "hash-embedding");
        assert_eq!(embedder.info().dimension, 768);
    }

    #[test]
    fn test_build_openai_without_key_fails() {
        let settings = EmbeddingSettings {
            provider: EmbeddingProvider::OpenAi,
            ..Default::default()
        };
        assert!(matches!(
            build_embedder(&settings),
            Err(EmbeddingError::Config(_))
        ));
    }
}
