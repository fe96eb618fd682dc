//! Hybrid search engine.
//!
//! ```text
//! validate -> cache lookup
//!          -> initial filter (vector KNN || lexical match), dedup, cap 2*limit
//!          -> similarity row (SimilarityScorer, blocking pool)
//!          -> rerank in at most worker_pool_size blocking batches -> final score
//!          -> sort, truncate to limit, cache
//! ```
//!
//! `final = similarity * vector_weight + text_score * text_weight
//!        + rerank * (1 - vector_weight - text_weight)`
//!
//! A failing or slow branch is logged and contributes nothing; results
//! computed with a failed branch are not cached.

use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use memory_cache::{CacheStats, ResultCache};
use memory_storage::{KnnQuery, LongTermStore, MatchQuery, ResultOrder};
use memory_types::{
    SearchCandidate, SearchConfig, SearchRequest, SearchResult, StoredDocument,
    UserInterestProfile,
};

use crate::error::{RerankError, SearchError, SimilarityError};
use crate::rerank::Reranker;
use crate::similarity::SimilarityScorer;

/// Counters for search activity.
#[derive(Debug, Default)]
pub struct SearchMetrics {
    pub searches: AtomicU64,
    pub cache_hits: AtomicU64,
    pub branch_failures: AtomicU64,
    pub dropped_candidates: AtomicU64,
    pub rerank_batches: AtomicU64,
}

impl SearchMetrics {
    pub fn snapshot(&self) -> SearchMetricsSnapshot {
        SearchMetricsSnapshot {
            searches: self.searches.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            branch_failures: self.branch_failures.load(Ordering::Relaxed),
            dropped_candidates: self.dropped_candidates.load(Ordering::Relaxed),
            rerank_batches: self.rerank_batches.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SearchMetricsSnapshot {
    pub searches: u64,
    pub cache_hits: u64,
    pub branch_failures: u64,
    pub dropped_candidates: u64,
    pub rerank_batches: u64,
}

/// Inputs shared by every rerank batch of one search.
struct ScoringContext {
    reranker: Arc<Reranker>,
    profile: UserInterestProfile,
    vector_weight: f32,
    text_weight: f32,
}

impl ScoringContext {
    fn score(&self, candidate: SearchCandidate, similarity: f32) -> Result<SearchResult, RerankError> {
        let rerank_score = self.reranker.score(&candidate, &self.profile)?;
        let final_score = final_score(
            similarity,
            candidate.text_score,
            rerank_score,
            self.vector_weight,
            self.text_weight,
        );
        Ok(SearchResult {
            id: candidate.id,
            content: candidate.content,
            vector_score: candidate.vector_score,
            text_score: candidate.text_score,
            rerank_score,
            final_score,
            metadata: candidate.metadata,
        })
    }
}

/// Split `items` into at most `pool` batches of near-equal size.
fn into_batches<T>(items: Vec<T>, pool: usize) -> Vec<Vec<T>> {
    if items.is_empty() {
        return Vec::new();
    }
    let size = items.len().div_ceil(pool.max(1));
    let count = items.len().div_ceil(size);
    let mut batches: Vec<Vec<T>> = (0..count).map(|_| Vec::with_capacity(size)).collect();
    for (i, item) in items.into_iter().enumerate() {
        batches[i / size].push(item);
    }
    batches
}

/// Weighted blend of the three signals.
pub fn final_score(
    similarity: f32,
    text_score: f32,
    rerank_score: f32,
    vector_weight: f32,
    text_weight: f32,
) -> f32 {
    similarity * vector_weight
        + text_score * text_weight
        + rerank_score * (1.0 - vector_weight - text_weight)
}

/// Reject requests that cannot be served.
pub fn validate_request(request: &SearchRequest) -> Result<(), SearchError> {
    if request.limit == 0 {
        return Err(SearchError::InvalidInput("limit must be > 0".to_string()));
    }
    if request.rerank_limit == 0 {
        return Err(SearchError::InvalidInput(
            "rerank_limit must be > 0".to_string(),
        ));
    }
    for (name, w) in [
        ("vector_weight", request.vector_weight),
        ("text_weight", request.text_weight),
    ] {
        if !w.is_finite() || !(0.0..=1.0).contains(&w) {
            return Err(SearchError::InvalidInput(format!(
                "{name} must be in [0, 1], got {w}"
            )));
        }
    }
    let sum = request.vector_weight + request.text_weight;
    if sum > 1.0 + f32::EPSILON {
        return Err(SearchError::InvalidInput(format!(
            "vector_weight + text_weight must be <= 1, got {sum}"
        )));
    }
    Ok(())
}

/// Concatenate branches, keep the first occurrence of each id, cap at `cap`.
pub fn merge_candidates(
    vector: Vec<SearchCandidate>,
    lexical: Vec<SearchCandidate>,
    cap: usize,
) -> Vec<SearchCandidate> {
    let mut seen = HashSet::new();
    vector
        .into_iter()
        .chain(lexical)
        .filter(|c| seen.insert(c.id.clone()))
        .take(cap)
        .collect()
}

/// Scale lexical scores into `[0, 1]` by the best score.
fn normalize_scores(docs: &mut [StoredDocument]) {
    let max = docs.iter().map(|d| d.score).fold(0.0f32, f32::max);
    if max > 0.0 {
        for doc in docs.iter_mut() {
            doc.score = (doc.score / max).clamp(0.0, 1.0);
        }
    }
}

/// Personalised hybrid search over a long-term store.
pub struct HybridSearchEngine {
    config: SearchConfig,
    store: Arc<dyn LongTermStore>,
    reranker: Arc<Reranker>,
    scorer: SimilarityScorer,
    cache: Arc<ResultCache>,
    metrics: Arc<SearchMetrics>,
}

impl HybridSearchEngine {
    pub fn new(
        config: SearchConfig,
        store: Arc<dyn LongTermStore>,
        cache: Arc<ResultCache>,
    ) -> Result<Self, SearchError> {
        config.validate().map_err(SearchError::Config)?;
        let reranker =
            Reranker::from_config(&config).map_err(|e| SearchError::Config(e.to_string()))?;
        Ok(Self {
            scorer: SimilarityScorer::from_config(&config),
            config,
            store,
            reranker: Arc::new(reranker),
            cache,
            metrics: Arc::new(SearchMetrics::default()),
        })
    }

    pub fn reranker(&self) -> &Reranker {
        &self.reranker
    }

    pub fn metrics(&self) -> Arc<SearchMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Drop cached results of `user_id`.
    pub fn invalidate_user(&self, user_id: &str) -> usize {
        let dropped = self.cache.invalidate_user(user_id);
        debug!(user_id = %user_id, dropped, "Invalidated cached search results");
        dropped
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Periodically sweep expired results until `cancel` fires.
    pub fn spawn_cache_sweeper(
        &self,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        self.cache.spawn_sweeper(interval, cancel)
    }

    /// Run a personalised search.
    pub async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchResult>, SearchError> {
        validate_request(request)?;
        self.metrics.searches.fetch_add(1, Ordering::Relaxed);

        let user_id = request.user_interest.user_id.as_str();
        let key = ResultCache::key_for(request)?;
        if let Some(results) = self.cache.get(&key) {
            self.metrics.cache_hits.fetch_add(1, Ordering::Relaxed);
            debug!(user_id = %user_id, query = %request.query, "Search cache hit");
            return Ok(results);
        }

        let fetch = request.limit.saturating_mul(2);
        let (mut candidates, degraded) = self.initial_filter(request, fetch).await;
        candidates.truncate(request.rerank_limit);
        let considered = candidates.len();

        let similarities = self
            .similarities(&request.user_interest.interest_vector, &candidates)
            .await;
        let mut scorable = Vec::with_capacity(considered);
        for (candidate, similarity) in candidates.into_iter().zip(similarities) {
            match similarity {
                Ok(similarity) => scorable.push((candidate, similarity)),
                Err(e) => self.drop_candidate(&candidate.id, &e),
            }
        }

        let mut results = self.rerank(request, scorable).await;
        results.sort_by(|a, b| {
            b.final_score
                .total_cmp(&a.final_score)
                .then_with(|| a.id.cmp(&b.id))
        });
        results.truncate(request.limit);

        if degraded {
            debug!(user_id = %user_id, "Initial filter degraded, not caching results");
        } else if let Err(e) = self.cache.set(&key, &results, user_id) {
            warn!(user_id = %user_id, error = %e, "Failed to cache search results");
        }

        info!(
            user_id = %user_id,
            query = %request.query,
            considered,
            returned = results.len(),
            degraded,
            "Search complete"
        );
        Ok(results)
    }

    /// Both branches concurrently. Returns merged candidates and whether any
    /// branch failed.
    async fn initial_filter(
        &self,
        request: &SearchRequest,
        fetch: usize,
    ) -> (Vec<SearchCandidate>, bool) {
        let (vector, lexical) = tokio::join!(
            self.vector_branch(request, fetch),
            self.lexical_branch(request, fetch)
        );

        let mut degraded = false;
        let vector = vector.unwrap_or_else(|reason| {
            degraded = true;
            self.metrics.branch_failures.fetch_add(1, Ordering::Relaxed);
            warn!(error = %reason, "Vector branch failed");
            Vec::new()
        });
        let mut lexical = lexical.unwrap_or_else(|reason| {
            degraded = true;
            self.metrics.branch_failures.fetch_add(1, Ordering::Relaxed);
            warn!(error = %reason, "Lexical branch failed");
            Vec::new()
        });
        normalize_scores(&mut lexical);

        debug!(
            vector_hits = vector.len(),
            lexical_hits = lexical.len(),
            "Initial filter complete"
        );

        let candidates = merge_candidates(
            vector.into_iter().map(SearchCandidate::from_vector_hit).collect(),
            lexical.into_iter().map(SearchCandidate::from_text_hit).collect(),
            fetch,
        );
        (candidates, degraded)
    }

    async fn vector_branch(
        &self,
        request: &SearchRequest,
        k: usize,
    ) -> Result<Vec<StoredDocument>, String> {
        if !request.user_interest.has_vector() {
            return Ok(Vec::new());
        }
        let query = KnnQuery {
            session_id: None,
            vector: request.user_interest.interest_vector.clone(),
            k,
        };
        let timeout = self.config.backend_timeout();
        match tokio::time::timeout(timeout, self.store.knn_query(&query)).await {
            Ok(result) => result.map_err(|e| e.to_string()),
            Err(_) => Err(format!("timed out after {timeout:?}")),
        }
    }

    async fn lexical_branch(
        &self,
        request: &SearchRequest,
        size: usize,
    ) -> Result<Vec<StoredDocument>, String> {
        if request.query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let query = MatchQuery {
            session_id: None,
            text: request.query.clone(),
            size,
            order: ResultOrder::Relevance,
        };
        let timeout = self.config.backend_timeout();
        match tokio::time::timeout(timeout, self.store.match_query(&query)).await {
            Ok(result) => result.map_err(|e| e.to_string()),
            Err(_) => Err(format!("timed out after {timeout:?}")),
        }
    }

    fn drop_candidate(&self, id: &str, error: &dyn std::fmt::Display) {
        self.metrics
            .dropped_candidates
            .fetch_add(1, Ordering::Relaxed);
        warn!(candidate_id = %id, error = %error, "Dropping candidate");
    }

    /// Similarity of `interest` to each candidate, in candidate order.
    ///
    /// Candidates without a vector, or all of them when there is no
    /// interest vector, score 0. A vector of another dimension fails only
    /// its own candidate.
    async fn similarities(
        &self,
        interest: &[f32],
        candidates: &[SearchCandidate],
    ) -> Vec<Result<f32, SimilarityError>> {
        let mut out: Vec<Result<f32, SimilarityError>> = Vec::with_capacity(candidates.len());
        let mut comparable = Vec::new();
        for (idx, candidate) in candidates.iter().enumerate() {
            if interest.is_empty() || candidate.vector.is_empty() {
                out.push(Ok(0.0));
            } else if candidate.vector.len() != interest.len() {
                out.push(Err(SimilarityError::DimensionMismatch {
                    expected: interest.len(),
                    actual: candidate.vector.len(),
                }));
            } else {
                out.push(Ok(0.0));
                comparable.push(idx);
            }
        }
        if comparable.is_empty() {
            return out;
        }

        let vectors: Vec<Vec<f32>> = comparable
            .iter()
            .map(|&idx| candidates[idx].vector.clone())
            .collect();
        match self
            .scorer
            .batch_similarity(&[interest.to_vec()], &vectors)
            .await
        {
            Ok(rows) => {
                let row = rows.into_iter().next().unwrap_or_default();
                for (idx, score) in comparable.into_iter().zip(row) {
                    out[idx] = Ok(score);
                }
            }
            Err(e) => {
                let reason = e.to_string();
                for idx in comparable {
                    out[idx] = Err(SimilarityError::Worker(reason.clone()));
                }
            }
        }
        out
    }

    /// Rerank `scorable` in at most `worker_pool_size` blocking batches,
    /// run concurrently.
    async fn rerank(
        &self,
        request: &SearchRequest,
        scorable: Vec<(SearchCandidate, f32)>,
    ) -> Vec<SearchResult> {
        let pool = self.config.worker_pool_size;
        let context = Arc::new(ScoringContext {
            reranker: Arc::clone(&self.reranker),
            profile: request.user_interest.clone(),
            vector_weight: request.vector_weight,
            text_weight: request.text_weight,
        });

        let batches: Vec<(usize, Result<Vec<Result<SearchResult, RerankError>>, JoinError>)> =
            stream::iter(into_batches(scorable, pool))
                .map(|batch| {
                    let context = Arc::clone(&context);
                    self.metrics.rerank_batches.fetch_add(1, Ordering::Relaxed);
                    let size = batch.len();
                    async move {
                        let scored = tokio::task::spawn_blocking(move || {
                            batch
                                .into_iter()
                                .map(|(candidate, similarity)| context.score(candidate, similarity))
                                .collect::<Vec<_>>()
                        })
                        .await;
                        (size, scored)
                    }
                })
                .buffer_unordered(pool)
                .collect()
                .await;

        let mut results = Vec::new();
        for (size, scored) in batches {
            match scored {
                Ok(scored) => {
                    for outcome in scored {
                        match outcome {
                            Ok(result) => results.push(result),
                            Err(e) => {
                                self.metrics
                                    .dropped_candidates
                                    .fetch_add(1, Ordering::Relaxed);
                                warn!(error = %e, "Dropping candidate");
                            }
                        }
                    }
                }
                Err(e) => {
                    self.metrics
                        .dropped_candidates
                        .fetch_add(size as u64, Ordering::Relaxed);
                    warn!(candidates = size, error = %e, "Rerank batch failed");
                }
            }
        }
        results
    }
}
