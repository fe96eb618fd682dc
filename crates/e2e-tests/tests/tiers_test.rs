//! Tiered memory E2E tests.
//!
//! Covers slot eviction, cross-tier retrieval and session clearing through
//! the public store API.

use std::sync::Arc;

use pretty_assertions::assert_eq;

use e2e_tests::{TestHarness, UnavailableStore};
use memory_storage::InMemoryLongTermStore;
use memory_tiers::ShortTermMemoryBank;
use memory_types::{MemorySlot, MemoryTier, PriorityConfig, Role, TierConfig};

/// Full bank of two: A(5), B(3); inserting C(8) evicts B.
#[test]
fn test_lowest_priority_slot_is_evicted() {
    let mut bank = ShortTermMemoryBank::new("s1", 2);
    assert!(bank.insert(MemorySlot::new(Role::User, "A", 5)).is_none());
    assert!(bank.insert(MemorySlot::new(Role::User, "B", 3)).is_none());

    let evicted = bank
        .insert(MemorySlot::new(Role::User, "C", 8))
        .expect("a slot should be evicted");
    assert_eq!(evicted.content, "B");

    let mut remaining: Vec<&str> = bank.slots().iter().map(|s| s.content.as_str()).collect();
    remaining.sort();
    assert_eq!(remaining, vec!["A", "C"]);
}

/// Identical bank states always evict the same slot.
#[test]
fn test_eviction_is_deterministic() {
    let build = || {
        let mut bank = ShortTermMemoryBank::new("s1", 3);
        for content in ["x", "y", "z"] {
            bank.insert(MemorySlot::new(Role::User, content, 4));
        }
        bank
    };

    let mut first = build();
    let mut second = build();
    let a = first.insert(MemorySlot::new(Role::User, "new", 9)).unwrap();
    let b = second.insert(MemorySlot::new(Role::User, "new", 9)).unwrap();
    assert_eq!(a.content, b.content);
    assert_eq!(first.len(), 3);
}

fn keyword_priorities() -> TierConfig {
    TierConfig {
        working_memory_size: 3,
        short_term_slots: 2,
        priority: PriorityConfig {
            base: 3,
            keyword_boost: 2,
            keywords: vec!["important".to_string(), "summary".to_string()],
            ..PriorityConfig::default()
        },
        ..TierConfig::default()
    }
}

/// The store scores content and evicts the least important short-term slot.
#[tokio::test]
async fn test_store_evicts_least_important_message() {
    let harness = TestHarness::with_store(
        Arc::new(InMemoryLongTermStore::new()),
        keyword_priorities(),
    );

    let a = harness
        .tiers
        .store("s1", Role::User, "an important note")
        .await
        .unwrap();
    let b = harness
        .tiers
        .store("s1", Role::Assistant, "small talk")
        .await
        .unwrap();
    let c = harness
        .tiers
        .store("s1", Role::User, "important summary of the call")
        .await
        .unwrap();

    assert_eq!((a.priority, b.priority, c.priority), (5, 3, 7));
    assert_eq!(c.evicted.map(|s| s.content), Some("small talk".to_string()));

    let mut kept: Vec<String> = harness
        .tiers
        .short_term_slots("s1")
        .into_iter()
        .map(|s| s.content)
        .collect();
    kept.sort();
    assert_eq!(kept, vec!["an important note", "important summary of the call"]);
}

/// Retrieval concatenates working, short-term and long-term tiers.
#[tokio::test]
async fn test_retrieve_spans_all_tiers() {
    let harness = TestHarness::new();
    for i in 0..8 {
        let outcome = harness
            .tiers
            .store("s1", Role::User, &format!("message {i} about rust lifetimes"))
            .await
            .unwrap();
        assert!(outcome.failures.is_empty());
        assert!(outcome.long_term_persisted);
    }

    let messages = harness.tiers.retrieve("s1", "rust lifetimes", 9).await.unwrap();
    assert_eq!(messages.len(), 9);

    let tiers: Vec<MemoryTier> = messages.iter().map(|m| m.tier).collect();
    assert_eq!(&tiers[..3], &[MemoryTier::Working; 3]);
    assert_eq!(&tiers[3..6], &[MemoryTier::ShortTerm; 3]);
    assert_eq!(&tiers[6..], &[MemoryTier::LongTerm; 3]);

    // most recent working messages, oldest first
    assert_eq!(messages[2].content, "message 7 about rust lifetimes");
}

/// Sessions are isolated and clearing removes every tier.
#[tokio::test]
async fn test_clear_drops_one_session_only() {
    let harness = TestHarness::new();
    harness.tiers.store("s1", Role::User, "first session").await.unwrap();
    harness.tiers.store("s2", Role::User, "second session").await.unwrap();

    let outcome = harness.tiers.clear("s1").await.unwrap();
    assert!(outcome.working_cleared);
    assert!(outcome.short_term_cleared);
    assert_eq!(outcome.long_term_deleted, Some(1));
    assert!(outcome.failures.is_empty());

    assert!(harness.tiers.retrieve("s1", "", 10).await.unwrap().is_empty());
    let remaining = harness.tiers.retrieve("s2", "", 10).await.unwrap();
    assert!(remaining.iter().all(|m| m.content == "second session"));
    assert!(!remaining.is_empty());
}

/// A dead long-term backend degrades store, retrieve and clear without failing them.
#[tokio::test]
async fn test_long_term_outage_is_tolerated() {
    let harness = TestHarness::with_store(Arc::new(UnavailableStore), TierConfig::default());

    let outcome = harness
        .tiers
        .store("s1", Role::User, "still remembered")
        .await
        .unwrap();
    assert!(!outcome.long_term_persisted);
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].tier, MemoryTier::LongTerm);

    let messages = harness.tiers.retrieve("s1", "remembered", 6).await.unwrap();
    assert!(messages.iter().all(|m| m.tier != MemoryTier::LongTerm));
    assert_eq!(messages.len(), 2);

    let cleared = harness.tiers.clear("s1").await.unwrap();
    assert!(cleared.working_cleared);
    assert_eq!(cleared.long_term_deleted, None);
    assert_eq!(cleared.failures.len(), 1);
}
