//! Embedding model trait and types.
//!
//! Defines the interface for generating vector embeddings from text.

use async_trait::async_trait;

use crate::error::EmbeddingError;

/// Vector embedding - a normalized float array.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    /// The embedding vector (normalized to unit length)
    pub values: Vec<f32>,
}

impl Embedding {
    /// Create a new embedding from a vector.
    /// Normalizes the vector to unit length.
    pub fn new(values: Vec<f32>) -> Self {
        let norm: f32 = values.iter().map(|x| x * x).sum::<f32>().sqrt();
        let normalized = if norm > 0.0 {
            values.iter().map(|x| x / norm).collect()
        } else {
            values
        };
        Self { values: normalized }
    }

    /// Create embedding without normalization (for pre-normalized vectors)
    pub fn from_normalized(values: Vec<f32>) -> Self {
        Self { values }
    }

    /// Get the embedding dimension
    pub fn dimension(&self) -> usize {
        self.values.len()
    }

    /// L2 norm of the stored values.
    pub fn norm(&self) -> f32 {
        self.values.iter().map(|x| x * x).sum::<f32>().sqrt()
    }

    pub fn into_values(self) -> Vec<f32> {
        self.values
    }
}

/// Model information
#[derive(Debug, Clone)]
pub struct ModelInfo {
    /// Model name (e.g., "text-embedding-3-small")
    pub name: String,
    /// Embedding dimension
    pub dimension: usize,
    /// Inputs longer than this many characters are truncated
    pub max_input_chars: usize,
}

/// Trait for embedding models.
///
/// Implementations must be thread-safe (Send + Sync) for concurrent use.
/// Callers own the deadline: wrap calls in `tokio::time::timeout`.
#[async_trait]
pub trait EmbeddingModel: Send + Sync {
    /// Get model information
    fn info(&self) -> &ModelInfo;

    /// Generate embedding for a single text.
    async fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError>;

    /// Generate embeddings for multiple texts, in input order.
    /// Default implementation calls embed() for each text.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>, EmbeddingError> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }
}

/// Truncate `text` to at most `max_chars` characters on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
