//! Conversation messages and the records each memory tier keeps.
//!
//! A message enters the system once through `store` and is fanned out to
//! three tiers: a bounded FIFO working buffer, a prioritised short-term
//! bank of [`MemorySlot`]s, and the append-only long-term store, which
//! keeps [`LongTermMemoryRecord`]s.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

use crate::error::MemoryError;

/// Role of the message author
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// User input
    User,
    /// Assistant response
    Assistant,
    /// System message
    System,
    /// Tool invocation or result
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::System => write!(f, "system"),
            Role::Tool => write!(f, "tool"),
        }
    }
}

impl FromStr for Role {
    type Err = MemoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            "system" => Ok(Role::System),
            "tool" => Ok(Role::Tool),
            other => Err(MemoryError::InvalidInput(format!("unknown role: {other}"))),
        }
    }
}

/// Retention tier a message was served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryTier {
    /// Bounded FIFO of the most recent messages
    Working,
    /// Prioritised slot bank
    ShortTerm,
    /// Backend-persisted history
    LongTerm,
}

impl std::fmt::Display for MemoryTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MemoryTier::Working => write!(f, "working"),
            MemoryTier::ShortTerm => write!(f, "short_term"),
            MemoryTier::LongTerm => write!(f, "long_term"),
        }
    }
}

/// A message as returned by retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    pub tier: MemoryTier,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>, tier: MemoryTier) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
            tier,
        }
    }

    /// Override the timestamp (defaults to now).
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// One entry of a short-term bank.
///
/// Slots are mutated on read (`access_count`, `last_access`) and replaced
/// wholesale on eviction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemorySlot {
    /// Unique identifier (ULID string)
    pub id: String,
    pub role: Role,
    pub content: String,
    /// Importance in [1, 10]
    pub priority: u8,
    pub access_count: u64,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_access: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

impl MemorySlot {
    pub fn new(role: Role, content: impl Into<String>, priority: u8) -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            role,
            content: content.into(),
            priority,
            access_count: 0,
            last_access: now,
            created_at: now,
        }
    }

    /// Record a read of this slot.
    pub fn touch(&mut self) {
        self.access_count += 1;
        self.last_access = Utc::now();
    }

    pub fn to_message(&self) -> Message {
        Message::new(self.role, self.content.clone(), MemoryTier::ShortTerm)
            .with_timestamp(self.created_at)
    }
}

/// A message persisted to the long-term store.
///
/// Records are append-only and deleted in bulk by `session_id`. The
/// `metadata` map carries optional signals consumed by the reranker
/// (`category`, `publish_time`, `authority`, `citations`, `clicks`,
/// `shares`, `comments`, `bookmarks`, `content_type`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LongTermMemoryRecord {
    /// Unique identifier (ULID string)
    pub id: String,
    pub session_id: String,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl LongTermMemoryRecord {
    pub fn new(session_id: impl Into<String>, role: Role, content: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            session_id: session_id.into(),
            role,
            content: content.into(),
            created_at: Utc::now(),
            embedding: None,
            metadata: HashMap::new(),
        }
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    pub fn with_metadata(mut self, metadata: HashMap<String, serde_json::Value>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }
}

/// A long-term record as returned by a backend query, with its score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDocument {
    pub record: LongTermMemoryRecord,
    /// Backend relevance score (cosine for KNN, lexical for match)
    pub score: f32,
}

impl StoredDocument {
    pub fn to_message(&self) -> Message {
        Message::new(
            self.record.role,
            self.record.content.clone(),
            MemoryTier::LongTerm,
        )
        .with_timestamp(self.record.created_at)
    }
}

/// Generate a new ULID string identifier.
pub fn new_id() -> String {
    ulid::Ulid::new().to_string()
}
