//! Search result cache.
//!
//! Keys hash every request parameter that influences ranking, so two
//! searches that differ only in their weights never share an entry.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use memory_types::{CacheConfig, SearchRequest, SearchResult};

use crate::error::CacheError;
use crate::ttl::{CacheStats, TtlCache};

/// Cache key of one search request (hex SHA-256).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SearchCacheKey(String);

impl SearchCacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SearchCacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fields hashed into a key. Field order is fixed by the struct definition.
#[derive(Serialize)]
struct KeyMaterial<'a> {
    query: &'a str,
    user_id: &'a str,
    limit: usize,
    rerank_limit: usize,
    vector_weight: f32,
    text_weight: f32,
}

/// TTL cache of ranked search results, owned per user.
pub struct ResultCache {
    inner: Arc<TtlCache>,
    ttl: Duration,
}

impl ResultCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            inner: Arc::new(TtlCache::new()),
            ttl: config.ttl(),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(&CacheConfig::default())
    }

    /// Derive the cache key for `request`.
    pub fn key_for(request: &SearchRequest) -> Result<SearchCacheKey, CacheError> {
        let material = KeyMaterial {
            query: &request.query,
            user_id: &request.user_interest.user_id,
            limit: request.limit,
            rerank_limit: request.rerank_limit,
            vector_weight: request.vector_weight,
            text_weight: request.text_weight,
        };
        let canonical = serde_json::to_vec(&material)?;
        let digest = Sha256::digest(&canonical);
        let hex = digest.iter().map(|b| format!("{b:02x}")).collect::<String>();
        Ok(SearchCacheKey(hex))
    }

    pub fn get(&self, key: &SearchCacheKey) -> Option<Vec<SearchResult>> {
        self.inner.get(key.as_str())
    }

    pub fn set(
        &self,
        key: &SearchCacheKey,
        results: &[SearchResult],
        user_id: &str,
    ) -> Result<(), CacheError> {
        self.inner
            .set(key.as_str(), &results, self.ttl, Some(user_id))?;
        debug!(key = %key, count = results.len(), "Cached search results");
        Ok(())
    }

    /// Drop every cached result computed for `user_id`.
    pub fn invalidate_user(&self, user_id: &str) -> usize {
        self.inner.invalidate_for_user(user_id)
    }

    pub fn sweep(&self) -> usize {
        self.inner.sweep()
    }

    pub fn spawn_sweeper(&self, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        self.inner.spawn_sweeper(interval, cancel)
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.stats()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn clear(&self) {
        self.inner.clear()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memory_types::UserInterestProfile;
    use std::collections::HashMap;

    fn request(query: &str, user: &str) -> SearchRequest {
        SearchRequest::new(query, UserInterestProfile::empty(user))
    }

    fn result(id: &str, score: f32) -> SearchResult {
        SearchResult {
            id: id.to_string(),
            content: format!("content {id}"),
            vector_score: 0.0,
            text_score: score,
            rerank_score: 0.5,
            final_score: score,
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn test_key_is_deterministic_hex() {
        let a = ResultCache::key_for(&request("rust", "u1")).unwrap();
        let b = ResultCache::key_for(&request("rust", "u1")).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
        assert!(a.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_key_covers_every_parameter() {
        let base = ResultCache::key_for(&request("rust", "u1")).unwrap();
        let variants = [
            request("go", "u1"),
            request("rust", "u2"),
            request("rust", "u1").with_limits(5, 20),
            request("rust", "u1").with_limits(10, 30),
            request("rust", "u1").with_weights(0.5, 0.3),
            request("rust", "u1").with_weights(0.4, 0.2),
        ];
        for variant in variants {
            assert_ne!(ResultCache::key_for(&variant).unwrap(), base);
        }
    }

    #[test]
    fn test_key_ignores_interest_vector() {
        let mut with_vector = request("rust", "u1");
        with_vector.user_interest.interest_vector = vec![0.1, 0.2];
        assert_eq!(
            ResultCache::key_for(&with_vector).unwrap(),
            ResultCache::key_for(&request("rust", "u1")).unwrap()
        );
    }

    #[tokio::test]
    async fn test_set_get_and_invalidate_user() {
        let cache = ResultCache::with_defaults();
        let key = ResultCache::key_for(&request("rust", "u1")).unwrap();
        let other = ResultCache::key_for(&request("rust", "u2")).unwrap();

        cache.set(&key, &[result("a", 0.9)], "u1").unwrap();
        cache.set(&other, &[result("b", 0.8)], "u2").unwrap();

        let hit = cache.get(&key).unwrap();
        assert_eq!(hit[0].id, "a");

        assert_eq!(cache.invalidate_user("u1"), 1);
        assert!(cache.get(&key).is_none());
        assert!(cache.get(&other).is_some());
    }

    #[test]
    fn test_default_ttl() {
        assert_eq!(ResultCache::with_defaults().ttl(), Duration::from_secs(900));
    }
}
