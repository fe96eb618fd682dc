//! Personalised hybrid search E2E tests.
//!
//! Exercises the full path: behaviour events build a profile, documents are
//! indexed into the long-term store, and the engine merges, reranks, scores
//! and caches results. Covers cache coherence when interests change.

use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::json;

use e2e_tests::{event, published_days_ago, TestHarness, UnavailableStore};
use memory_search::final_score;
use memory_types::{Role, SearchRequest, TierConfig, UserInterestProfile};

/// 0.9 * 0.4 + 0.8 * 0.3 + 0.5 * 0.3 = 0.75
#[test]
fn test_final_score_composition() {
    let score = final_score(0.9, 0.8, 0.5, 0.4, 0.3);
    assert!((score - 0.75).abs() < 1e-6, "got {score}");
}

async fn seeded_harness() -> TestHarness {
    let harness = TestHarness::new();
    harness
        .index_document(
            "docs",
            "rust async runtime internals",
            &[
                ("category", json!("technology")),
                ("publish_time", published_days_ago(2)),
                ("clicks", json!(250)),
            ],
        )
        .await;
    harness
        .index_document(
            "docs",
            "rust ownership explained for beginners",
            &[("publish_time", published_days_ago(40))],
        )
        .await;
    harness
        .index_document("docs", "sourdough baking at home", &[])
        .await;
    harness
        .index_document(
            "docs",
            "central bank rate decision and markets",
            &[("category", json!("business"))],
        )
        .await;
    harness
}

/// Behaviour and documents flow through to ranked, bounded results.
#[tokio::test]
async fn test_personalised_search_ranks_relevant_documents() {
    let harness = seeded_harness().await;
    harness.record_event("u1", "rust async runtime", "technology", 1.0).await;
    harness.record_event("u1", "rust ownership", "technology", 0.5).await;

    let profile = harness.interest.calculate_user_interest("u1").await.unwrap();
    let request = SearchRequest::new("rust", profile).with_limits(2, 20);
    let results = harness.search.search(&request).await.unwrap();

    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.content.starts_with("rust")));
    assert!(results[0].final_score >= results[1].final_score);
    for r in &results {
        assert!((0.0..=1.0).contains(&r.rerank_score));
        assert!((0.0..=1.0).contains(&r.vector_score));
    }
}

/// Repeat searches hit the cache; new behaviour invalidates it.
#[tokio::test]
async fn test_interest_update_invalidates_cached_results() {
    let harness = seeded_harness().await;
    harness.record_event("u1", "rust async runtime", "technology", 1.0).await;
    let profile = harness.interest.calculate_user_interest("u1").await.unwrap();

    let request = SearchRequest::new("rust", profile).with_limits(3, 20);
    let first = harness.search.search(&request).await.unwrap();
    let second = harness.search.search(&request).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(harness.search.metrics().snapshot().cache_hits, 1);
    assert_eq!(harness.results.len(), 1);

    let updated = harness
        .interest
        .update_user_interest("u1", event("u1", "interest rates", "business", 2.0))
        .await
        .unwrap();
    assert!(harness.results.is_empty());

    let request = SearchRequest::new("rust", updated).with_limits(3, 20);
    harness.search.search(&request).await.unwrap();
    let metrics = harness.search.metrics().snapshot();
    assert_eq!(metrics.searches, 3);
    assert_eq!(metrics.cache_hits, 1);
}

/// Without history the vector branch is skipped and lexical matching decides.
#[tokio::test]
async fn test_cold_start_search_is_lexical() {
    let harness = seeded_harness().await;
    let profile = harness.interest.calculate_user_interest("nobody").await.unwrap();
    assert!(!profile.has_vector());

    let request = SearchRequest::new("sourdough", profile);
    let results = harness.search.search(&request).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].content, "sourdough baking at home");
    assert_eq!(results[0].vector_score, 0.0);
    assert!(results[0].text_score > 0.0);
}

/// Messages stored through the tiers become searchable documents.
#[tokio::test]
async fn test_stored_messages_are_searchable() {
    let harness = TestHarness::new();
    harness
        .tiers
        .store("chat", Role::User, "tokio select loops need cancellation safety")
        .await
        .unwrap();
    harness
        .tiers
        .store("chat", Role::Assistant, "prefer bounded channels")
        .await
        .unwrap();

    let request = SearchRequest::new("cancellation", UserInterestProfile::empty("u1"));
    let results = harness.search.search(&request).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(
        results[0].content,
        "tokio select loops need cancellation safety"
    );
}

/// A dead backend yields empty, uncached results rather than an error.
#[tokio::test]
async fn test_backend_outage_degrades_search() {
    let harness = TestHarness::with_store(Arc::new(UnavailableStore), TierConfig::default());
    let mut profile = UserInterestProfile::empty("u1");
    profile.interest_vector = harness.embed("rust").await;

    let request = SearchRequest::new("rust", profile);
    let results = harness.search.search(&request).await.unwrap();
    assert!(results.is_empty());
    assert!(harness.results.is_empty());
    assert_eq!(harness.search.metrics().snapshot().branch_failures, 2);
}

/// Invalid weights are rejected before touching the backend.
#[tokio::test]
async fn test_invalid_request_rejected() {
    let harness = TestHarness::new();
    let request = SearchRequest::new("rust", UserInterestProfile::empty("u1"))
        .with_weights(0.8, 0.5);
    assert!(harness.search.search(&request).await.is_err());
    assert_eq!(harness.search.metrics().snapshot().searches, 0);
}
