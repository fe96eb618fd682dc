//! End-to-end test infrastructure for the tiered memory system.
//!
//! Provides a shared TestHarness wiring every component over the in-memory
//! long-term store and the hashing embedder, plus helpers for seeding
//! documents and behaviour events.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use memory_cache::ResultCache;
use memory_embeddings::{EmbeddingModel, HashEmbedder};
use memory_interest::{BehaviorHistory, InMemoryBehaviorHistory, InterestCalculator};
use memory_search::HybridSearchEngine;
use memory_storage::{
    InMemoryLongTermStore, KnnQuery, LongTermStore, MatchQuery, StorageError,
};
use memory_tiers::TieredMemoryStore;
use memory_types::{
    BehaviorAction, CacheConfig, InterestConfig, LongTermMemoryRecord, Role, SearchConfig,
    StoredDocument, TierConfig, UserBehaviorEvent,
};

/// Embedding dimension used by every harness.
pub const TEST_DIMENSION: usize = 64;

/// Shared test harness for E2E tests.
///
/// All components share one long-term store, one embedder and one result
/// cache, so writes through any of them are visible to the others.
pub struct TestHarness {
    pub store: Arc<dyn LongTermStore>,
    pub embedder: Arc<dyn EmbeddingModel>,
    pub history: Arc<InMemoryBehaviorHistory>,
    pub results: Arc<ResultCache>,
    pub tiers: TieredMemoryStore,
    pub interest: InterestCalculator,
    pub search: HybridSearchEngine,
}

impl TestHarness {
    /// Harness over a fresh in-memory store with default configuration.
    pub fn new() -> Self {
        Self::with_store(Arc::new(InMemoryLongTermStore::new()), TierConfig::default())
    }

    /// Harness over `store` with the given tier configuration.
    pub fn with_store(store: Arc<dyn LongTermStore>, tiers: TierConfig) -> Self {
        let embedder: Arc<dyn EmbeddingModel> = Arc::new(
            HashEmbedder::new(TEST_DIMENSION, 2_048).expect("Failed to create embedder"),
        );
        let results = Arc::new(ResultCache::new(&CacheConfig::default()));
        let interest_config = InterestConfig::default();
        let history = Arc::new(InMemoryBehaviorHistory::new(
            interest_config.max_events_per_user,
        ));

        let tiers = TieredMemoryStore::new(tiers, Arc::clone(&store), Some(Arc::clone(&embedder)))
            .expect("Failed to create tiered store");
        let interest = InterestCalculator::new(
            interest_config,
            Arc::clone(&embedder),
            history.clone(),
        )
        .expect("Failed to create interest calculator")
        .with_result_cache(Arc::clone(&results));
        let search = HybridSearchEngine::new(
            SearchConfig::default(),
            Arc::clone(&store),
            Arc::clone(&results),
        )
        .expect("Failed to create search engine");

        Self {
            store,
            embedder,
            history,
            results,
            tiers,
            interest,
            search,
        }
    }

    /// Embed `text` with the harness embedder.
    pub async fn embed(&self, text: &str) -> Vec<f32> {
        self.embedder
            .embed(text)
            .await
            .expect("Failed to embed")
            .into_values()
    }

    /// Index a searchable document with its embedding and metadata.
    pub async fn index_document(
        &self,
        session_id: &str,
        content: &str,
        metadata: &[(&str, serde_json::Value)],
    ) -> String {
        let embedding = self.embed(content).await;
        let metadata: HashMap<String, serde_json::Value> = metadata
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        let record = LongTermMemoryRecord::new(session_id, Role::User, content)
            .with_embedding(embedding)
            .with_metadata(metadata);
        let id = record.id.clone();
        self.store
            .index(&record)
            .await
            .expect("Failed to index document");
        id
    }

    /// Record one behaviour event for `user_id`.
    pub async fn record_event(&self, user_id: &str, content: &str, category: &str, weight: f32) {
        self.history
            .record(event(user_id, content, category, weight))
            .await
            .expect("Failed to record event");
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// A `View` event in `category`.
pub fn event(user_id: &str, content: &str, category: &str, weight: f32) -> UserBehaviorEvent {
    UserBehaviorEvent::new(user_id, BehaviorAction::View, content, weight).with_category(category)
}

/// RFC 3339 publish time `days` before now.
pub fn published_days_ago(days: i64) -> serde_json::Value {
    let at: DateTime<Utc> = Utc::now() - chrono::Duration::days(days);
    serde_json::Value::String(at.to_rfc3339())
}

/// Long-term store whose every call fails.
pub struct UnavailableStore;

#[async_trait]
impl LongTermStore for UnavailableStore {
    fn name(&self) -> &str {
        "unavailable"
    }

    async fn index(&self, _record: &LongTermMemoryRecord) -> Result<(), StorageError> {
        Err(StorageError::Backend("connection refused".to_string()))
    }

    async fn knn_query(&self, _query: &KnnQuery) -> Result<Vec<StoredDocument>, StorageError> {
        Err(StorageError::Backend("connection refused".to_string()))
    }

    async fn match_query(&self, _query: &MatchQuery) -> Result<Vec<StoredDocument>, StorageError> {
        Err(StorageError::Backend("connection refused".to_string()))
    }

    async fn delete_by(&self, _session_id: &str) -> Result<u64, StorageError> {
        Err(StorageError::Backend("connection refused".to_string()))
    }
}
