//! Deterministic offline embedder.
//!
//! Hashes word tokens (and individual CJK characters) into signed buckets.
//! Texts sharing vocabulary land close together, which is enough for demos
//! and tests without a model server.

use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use memory_types::text::tokenize;

use crate::error::EmbeddingError;
use crate::model::{truncate_chars, Embedding, EmbeddingModel, ModelInfo};

/// Feature-hashing embedder.
pub struct HashEmbedder {
    info: ModelInfo,
}

impl HashEmbedder {
    pub fn new(dimension: usize, max_input_chars: usize) -> Result<Self, EmbeddingError> {
        if dimension == 0 {
            return Err(EmbeddingError::Config("dimension must be > 0".to_string()));
        }
        Ok(Self {
            info: ModelInfo {
                name: "hash-embedding".to_string(),
                dimension,
                max_input_chars,
            },
        })
    }

    fn bucket(&self, token: &str) -> (usize, f32) {
        let mut hasher = DefaultHasher::new();
        token.hash(&mut hasher);
        let hash = hasher.finish();
        let index = (hash % self.info.dimension as u64) as usize;
        let sign = if (hash >> 63) == 0 { 1.0 } else { -1.0 };
        (index, sign)
    }
}

#[async_trait]
impl EmbeddingModel for HashEmbedder {
    fn info(&self) -> &ModelInfo {
        &self.info
    }

    async fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::InvalidInput("empty text".to_string()));
        }
        let text = truncate_chars(text, self.info.max_input_chars);
        let mut values = vec![0.0f32; self.info.dimension];
        for token in tokenize(text) {
            let (index, sign) = self.bucket(&token);
            values[index] += sign;
        }
        Ok(Embedding::new(values))
    }
}
