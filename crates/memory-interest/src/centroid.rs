//! Weighted centroids.

use crate::error::InterestError;

/// `Σ(v_i · w_i) / Σw_i`.
///
/// When the weights sum to zero every vector counts equally. The result is
/// not normalised. Returns an empty vector for empty input.
pub fn weighted_centroid(vectors: &[&[f32]], weights: &[f32]) -> Result<Vec<f32>, InterestError> {
    if vectors.len() != weights.len() {
        return Err(InterestError::InvalidInput(format!(
            "{} vectors but {} weights",
            vectors.len(),
            weights.len()
        )));
    }
    let Some(first) = vectors.first() else {
        return Ok(Vec::new());
    };
    let dim = first.len();
    if let Some(bad) = vectors.iter().find(|v| v.len() != dim) {
        return Err(InterestError::DimensionMismatch {
            expected: dim,
            actual: bad.len(),
        });
    }

    let total: f32 = weights.iter().sum();
    let equal = 1.0 / vectors.len() as f32;
    let mut centroid = vec![0.0f32; dim];
    for (vector, &weight) in vectors.iter().zip(weights) {
        let w = if total > 0.0 { weight / total } else { equal };
        for (acc, &x) in centroid.iter_mut().zip(vector.iter()) {
            *acc += x * w;
        }
    }
    Ok(centroid)
}

pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}
