//! # memory-tiers
//!
//! Three-tier conversational memory keyed by session.
//!
//! - **Working**: the most recent messages, FIFO-bounded
//! - **Short-Term**: a fixed number of prioritised slots with deterministic eviction
//! - **Long-Term**: durable records in a [`memory_storage::LongTermStore`],
//!   embedded when an embedder is configured
//!
//! Retrieval concatenates tiers in that order under a caller-supplied limit.

pub mod error;
pub mod short_term;
pub mod store;
pub mod working;

pub use error::TierError;
pub use short_term::ShortTermMemoryBank;
pub use store::{split_limit, ClearOutcome, StoreOutcome, TierFailure, TieredMemoryStore};
pub use working::WorkingMemoryBuffer;
