//! Tiered memory store.
//!
//! Every stored message is fanned out to three tiers:
//!
//! ```text
//! store(session, role, content)
//!      │
//!      ├─► Working     bounded FIFO, oldest dropped
//!      ├─► Short-Term  prioritised slots, lowest evicted
//!      └─► Long-Term   embed (optional) + index in the backend
//! ```
//!
//! Tier failures are logged and reported in the outcome; only invalid
//! arguments are returned as errors.
//!
//! ## Locking
//!
//! Each in-process tier is a `RwLock<HashMap<session, Arc<Mutex<_>>>>`. The
//! map lock is held only to look up, insert or remove a session entry; all
//! mutation happens under the per-session mutex, so sessions never block
//! each other.

use serde::Serialize;
use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tracing::{debug, warn};

use memory_embeddings::EmbeddingModel;
use memory_storage::{KnnQuery, LongTermStore, MatchQuery, ResultOrder};
use memory_types::{
    LongTermMemoryRecord, MemorySlot, MemoryTier, Message, PriorityScorer, Role, StoredDocument,
    TierConfig,
};

use crate::error::TierError;
use crate::short_term::ShortTermMemoryBank;
use crate::working::WorkingMemoryBuffer;

type SessionMap<T> = RwLock<HashMap<String, Arc<Mutex<T>>>>;

/// A tier that failed during an operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TierFailure {
    pub tier: MemoryTier,
    pub reason: String,
}

/// Result of `store`.
#[derive(Debug, Clone, Serialize)]
pub struct StoreOutcome {
    /// Priority assigned to the short-term slot
    pub priority: u8,
    /// Slot replaced because the bank was full
    pub evicted: Option<MemorySlot>,
    /// Whether the long-term record carries an embedding
    pub embedded: bool,
    /// Whether the long-term backend accepted the record
    pub long_term_persisted: bool,
    pub failures: Vec<TierFailure>,
}

/// Result of `clear`.
#[derive(Debug, Clone, Serialize)]
pub struct ClearOutcome {
    pub working_cleared: bool,
    pub short_term_cleared: bool,
    /// Records deleted by the backend; `None` when the delete failed
    pub long_term_deleted: Option<u64>,
    pub failures: Vec<TierFailure>,
}

/// Split a retrieval limit across tiers: working, short-term, long-term.
/// The remainder goes to working first, then short-term.
pub fn split_limit(limit: usize) -> (usize, usize, usize) {
    let base = limit / 3;
    let rem = limit % 3;
    (
        base + usize::from(rem > 0),
        base + usize::from(rem > 1),
        base,
    )
}

/// Run `fut` under `duration`, flattening errors and timeouts into a reason.
async fn bounded<T, E, F>(duration: Duration, fut: F) -> Result<T, String>
where
    F: Future<Output = Result<T, E>>,
    E: Display,
{
    match tokio::time::timeout(duration, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err(format!("timed out after {duration:?}")),
    }
}

/// Three-tier conversational memory.
pub struct TieredMemoryStore {
    config: TierConfig,
    scorer: PriorityScorer,
    working: SessionMap<WorkingMemoryBuffer>,
    short_term: SessionMap<ShortTermMemoryBank>,
    long_term: Arc<dyn LongTermStore>,
    embedder: Option<Arc<dyn EmbeddingModel>>,
}

impl TieredMemoryStore {
    /// Create a store. Without an embedder, vector search is disabled.
    pub fn new(
        config: TierConfig,
        long_term: Arc<dyn LongTermStore>,
        embedder: Option<Arc<dyn EmbeddingModel>>,
    ) -> Result<Self, TierError> {
        config.validate().map_err(TierError::Config)?;
        Ok(Self {
            scorer: PriorityScorer::new(config.priority.clone()),
            config,
            working: RwLock::new(HashMap::new()),
            short_term: RwLock::new(HashMap::new()),
            long_term,
            embedder,
        })
    }

    pub fn config(&self) -> &TierConfig {
        &self.config
    }

    fn vector_search_enabled(&self) -> Option<&Arc<dyn EmbeddingModel>> {
        if self.config.enable_vector_search {
            self.embedder.as_ref()
        } else {
            None
        }
    }

    fn session_entry<T>(
        map: &SessionMap<T>,
        session_id: &str,
        create: impl FnOnce() -> T,
    ) -> Arc<Mutex<T>> {
        if let Some(entry) = map.read().expect("session map poisoned").get(session_id) {
            return Arc::clone(entry);
        }
        let mut guard = map.write().expect("session map poisoned");
        Arc::clone(
            guard
                .entry(session_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(create()))),
        )
    }

    fn existing_entry<T>(map: &SessionMap<T>, session_id: &str) -> Option<Arc<Mutex<T>>> {
        map.read()
            .expect("session map poisoned")
            .get(session_id)
            .map(Arc::clone)
    }

    /// Store a message in all three tiers.
    pub async fn store(
        &self,
        session_id: &str,
        role: Role,
        content: &str,
    ) -> Result<StoreOutcome, TierError> {
        if session_id.is_empty() {
            return Err(TierError::InvalidInput("session_id is empty".to_string()));
        }
        if content.trim().is_empty() {
            return Err(TierError::InvalidInput("content is empty".to_string()));
        }

        // Working memory
        {
            let entry = Self::session_entry(&self.working, session_id, || {
                WorkingMemoryBuffer::new(session_id, self.config.working_memory_size)
            });
            let mut buffer = entry.lock().expect("working buffer poisoned");
            buffer.push(Message::new(role, content, MemoryTier::Working));
        }

        // Short-term memory
        let priority = self.scorer.score(content);
        let evicted = {
            let entry = Self::session_entry(&self.short_term, session_id, || {
                ShortTermMemoryBank::new(session_id, self.config.short_term_slots)
            });
            let mut bank = entry.lock().expect("short-term bank poisoned");
            bank.insert(MemorySlot::new(role, content, priority))
        };
        if let Some(slot) = &evicted {
            debug!(
                session_id = %session_id,
                evicted_id = %slot.id,
                evicted_priority = slot.priority,
                "Evicted short-term slot"
            );
        }

        // Long-term memory
        let mut failures = Vec::new();
        let mut record = LongTermMemoryRecord::new(session_id, role, content);
        let mut embedded = false;
        if let Some(embedder) = self.vector_search_enabled() {
            match bounded(self.config.backend_timeout(), embedder.embed(content)).await {
                Ok(embedding) => {
                    record.embedding = Some(embedding.into_values());
                    embedded = true;
                }
                Err(reason) => {
                    warn!(
                        session_id = %session_id,
                        error = %reason,
                        "Embedding failed, storing long-term record without vector"
                    );
                    failures.push(TierFailure {
                        tier: MemoryTier::LongTerm,
                        reason: format!("embedding: {reason}"),
                    });
                }
            }
        }

        let long_term_persisted =
            match bounded(self.config.backend_timeout(), self.long_term.index(&record)).await {
                Ok(()) => true,
                Err(reason) => {
                    warn!(
                        session_id = %session_id,
                        backend = self.long_term.name(),
                        error = %reason,
                        "Failed to persist long-term record"
                    );
                    failures.push(TierFailure {
                        tier: MemoryTier::LongTerm,
                        reason: format!("index: {reason}"),
                    });
                    false
                }
            };

        debug!(
            session_id = %session_id,
            role = %role,
            priority,
            embedded,
            long_term_persisted,
            "Stored message"
        );

        Ok(StoreOutcome {
            priority,
            evicted,
            embedded,
            long_term_persisted,
            failures,
        })
    }

    /// Retrieve up to `limit` messages (0 means `max_retrieve`), ordered
    /// working, then short-term, then long-term.
    pub async fn retrieve(
        &self,
        session_id: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<Message>, TierError> {
        if session_id.is_empty() {
            return Err(TierError::InvalidInput("session_id is empty".to_string()));
        }
        let limit = if limit == 0 {
            self.config.max_retrieve
        } else {
            limit
        };
        let (working_n, short_n, long_n) = split_limit(limit);

        let mut messages = Vec::with_capacity(limit);

        if let Some(entry) = Self::existing_entry(&self.working, session_id) {
            let buffer = entry.lock().expect("working buffer poisoned");
            messages.extend(buffer.recent(working_n));
        }

        if let Some(entry) = Self::existing_entry(&self.short_term, session_id) {
            let mut bank = entry.lock().expect("short-term bank poisoned");
            messages.extend(bank.take_top(short_n).iter().map(MemorySlot::to_message));
        }

        if long_n > 0 {
            let docs = self.retrieve_long_term(session_id, query, long_n).await;
            messages.extend(docs.iter().map(StoredDocument::to_message));
        }

        messages.truncate(limit);
        debug!(
            session_id = %session_id,
            limit,
            returned = messages.len(),
            "Retrieved messages"
        );
        Ok(messages)
    }

    async fn retrieve_long_term(
        &self,
        session_id: &str,
        query: &str,
        n: usize,
    ) -> Vec<StoredDocument> {
        let timeout = self.config.backend_timeout();

        if let Some(embedder) = self.vector_search_enabled() {
            if !query.trim().is_empty() {
                match bounded(timeout, embedder.embed(query)).await {
                    Ok(embedding) => {
                        let knn = KnnQuery {
                            session_id: Some(session_id.to_string()),
                            vector: embedding.into_values(),
                            k: n,
                        };
                        return match bounded(timeout, self.long_term.knn_query(&knn)).await {
                            Ok(docs) => docs,
                            Err(reason) => {
                                warn!(
                                    session_id = %session_id,
                                    error = %reason,
                                    "Long-term KNN query failed"
                                );
                                Vec::new()
                            }
                        };
                    }
                    Err(reason) => {
                        warn!(
                            session_id = %session_id,
                            error = %reason,
                            "Query embedding failed, falling back to lexical match"
                        );
                    }
                }
            }
        }

        let lexical = MatchQuery {
            session_id: Some(session_id.to_string()),
            text: query.to_string(),
            size: n,
            order: ResultOrder::Recency,
        };
        match bounded(timeout, self.long_term.match_query(&lexical)).await {
            Ok(docs) => docs,
            Err(reason) => {
                warn!(
                    session_id = %session_id,
                    error = %reason,
                    "Long-term match query failed"
                );
                Vec::new()
            }
        }
    }

    /// Drop a session's working and short-term state and delete its
    /// long-term records.
    pub async fn clear(&self, session_id: &str) -> Result<ClearOutcome, TierError> {
        if session_id.is_empty() {
            return Err(TierError::InvalidInput("session_id is empty".to_string()));
        }

        let working_cleared = self
            .working
            .write()
            .expect("session map poisoned")
            .remove(session_id)
            .is_some();
        let short_term_cleared = self
            .short_term
            .write()
            .expect("session map poisoned")
            .remove(session_id)
            .is_some();

        let mut failures = Vec::new();
        let long_term_deleted =
            match bounded(self.config.backend_timeout(), self.long_term.delete_by(session_id))
                .await
            {
                Ok(count) => Some(count),
                Err(reason) => {
                    warn!(
                        session_id = %session_id,
                        error = %reason,
                        "Failed to delete long-term records"
                    );
                    failures.push(TierFailure {
                        tier: MemoryTier::LongTerm,
                        reason,
                    });
                    None
                }
            };

        debug!(
            session_id = %session_id,
            working_cleared,
            short_term_cleared,
            ?long_term_deleted,
            "Cleared session"
        );

        Ok(ClearOutcome {
            working_cleared,
            short_term_cleared,
            long_term_deleted,
            failures,
        })
    }

    /// Number of messages in a session's working buffer.
    pub fn working_len(&self, session_id: &str) -> usize {
        Self::existing_entry(&self.working, session_id)
            .map(|entry| entry.lock().expect("working buffer poisoned").len())
            .unwrap_or(0)
    }

    /// Snapshot of a session's short-term slots, in bank order.
    pub fn short_term_slots(&self, session_id: &str) -> Vec<MemorySlot> {
        Self::existing_entry(&self.short_term, session_id)
            .map(|entry| {
                entry
                    .lock()
                    .expect("short-term bank poisoned")
                    .slots()
                    .to_vec()
            })
            .unwrap_or_default()
    }

    /// Sessions with working or short-term state.
    pub fn session_count(&self) -> usize {
        let working = self.working.read().expect("session map poisoned");
        let short_term = self.short_term.read().expect("session map poisoned");
        let extra = short_term
            .keys()
            .filter(|k| !working.contains_key(*k))
            .count();
        working.len() + extra
    }
}
