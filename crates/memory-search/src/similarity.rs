//! Vector similarity with sigmoid sharpening.
//!
//! Scores map cosine similarity onto `[0, 1]` and push mid-range values
//! toward the extremes so that ranks separate more clearly:
//!
//! ```text
//! s     = (cos + 1) / 2
//! sharp = (σ(5(s - 0.5)) - σ(-2.5)) / (σ(2.5) - σ(-2.5))
//! ```
//!
//! The rescaling keeps `0 -> 0`, `0.5 -> 0.5` and `1 -> 1`.

use futures::stream::{self, StreamExt, TryStreamExt};
use std::sync::Arc;
use tracing::debug;

use memory_types::SearchConfig;

use crate::error::SimilarityError;

const SHARPNESS: f32 = 5.0;

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Sigmoid sharpening rescaled to fix both endpoints.
fn sharpen(s: f32) -> f32 {
    let low = sigmoid(-SHARPNESS * 0.5);
    let high = sigmoid(SHARPNESS * 0.5);
    ((sigmoid(SHARPNESS * (s - 0.5)) - low) / (high - low)).clamp(0.0, 1.0)
}

/// Similarity of two vectors in `[0, 1]`.
///
/// If either vector has zero norm, the raw dot product stands in for the
/// cosine.
pub fn similarity(v1: &[f32], v2: &[f32]) -> Result<f32, SimilarityError> {
    if v1.len() != v2.len() {
        return Err(SimilarityError::DimensionMismatch {
            expected: v1.len(),
            actual: v2.len(),
        });
    }
    let dot: f32 = v1.iter().zip(v2).map(|(a, b)| a * b).sum();
    let n1 = v1.iter().map(|x| x * x).sum::<f32>().sqrt();
    let n2 = v2.iter().map(|x| x * x).sum::<f32>().sqrt();

    let cosine = if n1 == 0.0 || n2 == 0.0 {
        dot
    } else {
        dot / (n1 * n2)
    };
    let s = (cosine.clamp(-1.0, 1.0) + 1.0) / 2.0;
    Ok(sharpen(s))
}

/// Batch similarity on a bounded pool of blocking workers.
#[derive(Debug, Clone)]
pub struct SimilarityScorer {
    batch_size: usize,
}

impl SimilarityScorer {
    /// `batch_size` caps the rows computed concurrently.
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
        }
    }

    pub fn from_config(config: &SearchConfig) -> Self {
        Self::new(config.similarity_batch_size)
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// `M x N` matrix: row `i` holds the similarity of `queries[i]` to every
    /// candidate, in candidate order.
    pub async fn batch_similarity(
        &self,
        queries: &[Vec<f32>],
        candidates: &[Vec<f32>],
    ) -> Result<Vec<Vec<f32>>, SimilarityError> {
        if queries.is_empty() {
            return Err(SimilarityError::EmptyInput("no query vectors"));
        }
        if candidates.is_empty() {
            return Err(SimilarityError::EmptyInput("no candidate vectors"));
        }
        let dim = queries[0].len();
        if let Some(bad) = queries.iter().chain(candidates).find(|v| v.len() != dim) {
            return Err(SimilarityError::DimensionMismatch {
                expected: dim,
                actual: bad.len(),
            });
        }

        let candidates: Arc<Vec<Vec<f32>>> = Arc::new(candidates.to_vec());
        let rows: Vec<Vec<f32>> = stream::iter(queries.iter().cloned())
            .map(|query| {
                let candidates = Arc::clone(&candidates);
                async move {
                    tokio::task::spawn_blocking(move || {
                        candidates
                            .iter()
                            .map(|c| similarity(&query, c))
                            .collect::<Result<Vec<f32>, _>>()
                    })
                    .await
                    .map_err(|e| SimilarityError::Worker(e.to_string()))?
                }
            })
            .buffered(self.batch_size)
            .try_collect()
            .await?;

        debug!(
            queries = rows.len(),
            candidates = candidates.len(),
            batch_size = self.batch_size,
            "Computed similarity matrix"
        );
        Ok(rows)
    }
}
