//! Long-term store interface.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use memory_types::{LongTermMemoryRecord, StoredDocument};

use crate::error::StorageError;

/// Nearest-neighbour query over stored embeddings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnnQuery {
    /// Restrict to one session; `None` searches every session
    pub session_id: Option<String>,
    pub vector: Vec<f32>,
    pub k: usize,
}

/// Ordering of lexical match results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResultOrder {
    /// Best lexical score first; documents without a match are excluded
    #[default]
    Relevance,
    /// Newest first; the text only contributes to the score
    Recency,
}

/// Lexical query over stored content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchQuery {
    /// Restrict to one session; `None` searches every session
    pub session_id: Option<String>,
    pub text: String,
    pub size: usize,
    #[serde(default)]
    pub order: ResultOrder,
}

/// Append-only store of long-term records.
///
/// Scores: KNN hits carry `(1 + cosine) / 2`; match hits carry a
/// backend-specific non-negative lexical score.
#[async_trait]
pub trait LongTermStore: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &str;

    /// Append a record.
    async fn index(&self, record: &LongTermMemoryRecord) -> Result<(), StorageError>;

    /// Up to `k` records nearest to `query.vector`, best first.
    async fn knn_query(&self, query: &KnnQuery) -> Result<Vec<StoredDocument>, StorageError>;

    /// Up to `size` records matching `query.text`, in `query.order`.
    async fn match_query(&self, query: &MatchQuery) -> Result<Vec<StoredDocument>, StorageError>;

    /// Delete every record of `session_id`. Returns the number deleted.
    async fn delete_by(&self, session_id: &str) -> Result<u64, StorageError>;
}
