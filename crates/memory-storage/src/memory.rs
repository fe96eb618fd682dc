//! Process-local long-term store.
//!
//! Brute-force cosine KNN and token-overlap matching over a vector of
//! records. Suitable for tests, demos and small single-process deployments.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::RwLock;
use tracing::debug;

use memory_types::text::tokenize;
use memory_types::{LongTermMemoryRecord, StoredDocument};

use crate::error::StorageError;
use crate::store::{KnnQuery, LongTermStore, MatchQuery, ResultOrder};

/// In-memory [`LongTermStore`].
#[derive(Default)]
pub struct InMemoryLongTermStore {
    records: RwLock<Vec<LongTermMemoryRecord>>,
}

impl InMemoryLongTermStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().expect("records lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the records of one session, in insertion order.
    pub fn session_records(&self, session_id: &str) -> Vec<LongTermMemoryRecord> {
        self.records
            .read()
            .expect("records lock poisoned")
            .iter()
            .filter(|r| r.session_id == session_id)
            .cloned()
            .collect()
    }
}

fn in_scope(record: &LongTermMemoryRecord, session_id: Option<&str>) -> bool {
    session_id.map_or(true, |s| record.session_id == s)
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        (dot / (na * nb)).clamp(-1.0, 1.0)
    }
}

/// Fraction of distinct query tokens present in `content`.
fn overlap_score(query_tokens: &HashSet<String>, content: &str) -> f32 {
    if query_tokens.is_empty() {
        return 0.0;
    }
    let content_tokens: HashSet<String> = tokenize(content).into_iter().collect();
    let hits = query_tokens
        .iter()
        .filter(|t| content_tokens.contains(*t))
        .count();
    hits as f32 / query_tokens.len() as f32
}

#[async_trait]
impl LongTermStore for InMemoryLongTermStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn index(&self, record: &LongTermMemoryRecord) -> Result<(), StorageError> {
        if record.session_id.is_empty() {
            return Err(StorageError::InvalidInput("empty session_id".to_string()));
        }
        self.records
            .write()
            .expect("records lock poisoned")
            .push(record.clone());
        Ok(())
    }

    async fn knn_query(&self, query: &KnnQuery) -> Result<Vec<StoredDocument>, StorageError> {
        if query.vector.is_empty() {
            return Err(StorageError::InvalidInput("empty query vector".to_string()));
        }
        let records = self.records.read().expect("records lock poisoned");
        let mut hits: Vec<StoredDocument> = records
            .iter()
            .filter(|r| in_scope(r, query.session_id.as_deref()))
            .filter_map(|r| {
                let embedding = r.embedding.as_ref()?;
                if embedding.len() != query.vector.len() {
                    return None;
                }
                Some(StoredDocument {
                    record: r.clone(),
                    score: (1.0 + cosine(&query.vector, embedding)) / 2.0,
                })
            })
            .collect();
        drop(records);

        hits.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| b.record.created_at.cmp(&a.record.created_at))
                .then_with(|| a.record.id.cmp(&b.record.id))
        });
        hits.truncate(query.k);
        debug!(hits = hits.len(), k = query.k, "In-memory KNN query");
        Ok(hits)
    }

    async fn match_query(&self, query: &MatchQuery) -> Result<Vec<StoredDocument>, StorageError> {
        let query_tokens: HashSet<String> = tokenize(&query.text).into_iter().collect();
        let records = self.records.read().expect("records lock poisoned");
        let scored = records
            .iter()
            .filter(|r| in_scope(r, query.session_id.as_deref()))
            .map(|r| StoredDocument {
                record: r.clone(),
                score: overlap_score(&query_tokens, &r.content),
            });

        let mut hits: Vec<StoredDocument> = match query.order {
            ResultOrder::Relevance => scored.filter(|d| d.score > 0.0).collect(),
            ResultOrder::Recency => scored.collect(),
        };
        drop(records);

        match query.order {
            ResultOrder::Relevance => hits.sort_by(|a, b| {
                b.score
                    .total_cmp(&a.score)
                    .then_with(|| b.record.created_at.cmp(&a.record.created_at))
                    .then_with(|| a.record.id.cmp(&b.record.id))
            }),
            ResultOrder::Recency => hits.sort_by(|a, b| {
                b.record
                    .created_at
                    .cmp(&a.record.created_at)
                    .then_with(|| b.record.id.cmp(&a.record.id))
            }),
        }
        hits.truncate(query.size);
        debug!(hits = hits.len(), size = query.size, order = ?query.order, "In-memory match query");
        Ok(hits)
    }

    async fn delete_by(&self, session_id: &str) -> Result<u64, StorageError> {
        let mut records = self.records.write().expect("records lock poisoned");
        let before = records.len();
        records.retain(|r| r.session_id != session_id);
        Ok((before - records.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use memory_types::Role;

    fn record(session: &str, content: &str, embedding: Option<Vec<f32>>) -> LongTermMemoryRecord {
        let r = LongTermMemoryRecord::new(session, Role::User, content);
        match embedding {
            Some(e) => r.with_embedding(e),
            None => r,
        }
    }

    #[tokio::test]
    async fn test_knn_filters_session_and_ranks() {
        let store = InMemoryLongTermStore::new();
        store.index(&record("s1", "a", Some(vec![1.0, 0.0]))).await.unwrap();
        store.index(&record("s1", "b", Some(vec![0.0, 1.0]))).await.unwrap();
        store.index(&record("s2", "c", Some(vec![1.0, 0.0]))).await.unwrap();
        store.index(&record("s1", "text only", None)).await.unwrap();

        let hits = store
            .knn_query(&KnnQuery {
                session_id: Some("s1".into()),
                vector: vec![1.0, 0.1],
                k: 5,
            })
            .await
            .unwrap();

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].record.content, "a");
        assert!(hits[0].score > hits[1].score);
        assert!(hits.iter().all(|h| (0.0..=1.0).contains(&h.score)));
    }

    #[tokio::test]
    async fn test_knn_without_session_searches_all() {
        let store = InMemoryLongTermStore::new();
        store.index(&record("s1", "a", Some(vec![1.0, 0.0]))).await.unwrap();
        store.index(&record("s2", "c", Some(vec![1.0, 0.0]))).await.unwrap();
        store.index(&record("s3", "wrong dim", Some(vec![1.0, 0.0, 0.0]))).await.unwrap();

        let hits = store
            .knn_query(&KnnQuery {
                session_id: None,
                vector: vec![1.0, 0.0],
                k: 1,
            })
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn test_match_relevance_excludes_non_matching() {
        let store = InMemoryLongTermStore::new();
        store.index(&record("s1", "rust ownership rules", None)).await.unwrap();
        store.index(&record("s1", "python decorators", None)).await.unwrap();
        store.index(&record("s1", "rust async", None)).await.unwrap();

        let hits = store
            .match_query(&MatchQuery {
                session_id: Some("s1".into()),
                text: "rust ownership".into(),
                size: 10,
                order: ResultOrder::Relevance,
            })
            .await
            .unwrap();

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].record.content, "rust ownership rules");
        assert!((hits[0].score - 1.0).abs() < 1e-6);
        assert!((hits[1].score - 0.5).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_match_recency_returns_latest_session_docs() {
        let store = InMemoryLongTermStore::new();
        let now = Utc::now();
        for (i, content) in ["oldest", "middle", "newest"].iter().enumerate() {
            let r = record("s1", content, None).with_created_at(now + Duration::seconds(i as i64));
            store.index(&r).await.unwrap();
        }
        store.index(&record("s2", "other session", None)).await.unwrap();

        let hits = store
            .match_query(&MatchQuery {
                session_id: Some("s1".into()),
                text: "unrelated".into(),
                size: 2,
                order: ResultOrder::Recency,
            })
            .await
            .unwrap();

        let contents: Vec<_> = hits.iter().map(|h| h.record.content.as_str()).collect();
        assert_eq!(contents, vec!["newest", "middle"]);
    }

    #[tokio::test]
    async fn test_delete_by_session() {
        let store = InMemoryLongTermStore::new();
        store.index(&record("s1", "a", None)).await.unwrap();
        store.index(&record("s1", "b", None)).await.unwrap();
        store.index(&record("s2", "c", None)).await.unwrap();

        assert_eq!(store.delete_by("s1").await.unwrap(), 2);
        assert_eq!(store.len(), 1);
        assert!(store.session_records("s1").is_empty());
        assert_eq!(store.delete_by("s1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_empty_vector_rejected() {
        let store = InMemoryLongTermStore::new();
        let err = store
            .knn_query(&KnnQuery {
                session_id: None,
                vector: vec![],
                k: 3,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidInput(_)));
    }
}
