//! # memory-search
//!
//! Personalised hybrid search over long-term memory.
//!
//! ## Pipeline
//! - Initial filter: interest-vector KNN and lexical match, run concurrently
//! - Rerank: sharpened vector similarity plus a five-factor personalised score
//! - Final blend with caller-supplied vector and text weights
//!
//! Results are cached per request in a [`memory_cache::ResultCache`] and
//! invalidated per user when interests change.

pub mod category;
pub mod engine;
pub mod error;
pub mod rerank;
pub mod similarity;

pub use category::{category_similarity, infer_category};
pub use engine::{
    final_score, merge_candidates, validate_request, HybridSearchEngine, SearchMetrics,
    SearchMetricsSnapshot,
};
pub use error::{RerankError, SearchError, SimilarityError};
pub use rerank::{ContentType, RerankFactors, Reranker};
pub use similarity::{similarity, SimilarityScorer};
