//! # memory-types
//!
//! Shared domain types for the tiered memory system.
//!
//! This crate defines the core data structures used throughout the workspace:
//! - Messages and slots: what each retention tier stores and returns
//! - Interest: behaviour events and derived user interest profiles
//! - Search: hybrid search requests, candidates and results
//! - Priority: short-term slot priority scoring
//! - Text: tokenization shared by lexical matching and hashing
//! - Settings: layered configuration for every component
//!
//! ## Usage
//!
//! ```rust
//! use memory_types::{Message, MemoryTier, Role};
//!
//! let msg = Message::new(Role::User, "hello", MemoryTier::Working);
//! assert_eq!(msg.tier, MemoryTier::Working);
//! ```

pub mod config;
pub mod error;
pub mod interest;
pub mod message;
pub mod priority;
pub mod search;
pub mod text;

pub use config::{
    default_config_dir, CacheConfig, ElasticSettings, EmbeddingProvider, EmbeddingSettings,
    InterestConfig, RerankWeights, SearchConfig, Settings, StorageSettings, StoreBackend,
    TierConfig,
};
pub use error::MemoryError;
pub use interest::{BehaviorAction, UserBehaviorEvent, UserInterestProfile, DEFAULT_CATEGORY};
pub use message::{
    new_id, LongTermMemoryRecord, MemorySlot, MemoryTier, Message, Role, StoredDocument,
};
pub use priority::{PriorityConfig, PriorityScorer, MAX_PRIORITY, MIN_PRIORITY};
pub use search::{SearchCandidate, SearchRequest, SearchResult};
