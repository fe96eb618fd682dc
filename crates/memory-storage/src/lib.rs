//! Long-term storage for the tiered memory system.
//!
//! Provides the [`LongTermStore`] interface with:
//! - An in-memory backend (brute-force KNN, token-overlap matching)
//! - An Elasticsearch 8 backend (dense_vector KNN, BM25 matching)
//! - Session-scoped bulk deletion

pub mod elastic;
pub mod error;
pub mod memory;
pub mod store;

use std::sync::Arc;

use memory_types::{StorageSettings, StoreBackend};

pub use elastic::ElasticStore;
pub use error::StorageError;
pub use memory::InMemoryLongTermStore;
pub use store::{KnnQuery, LongTermStore, MatchQuery, ResultOrder};

/// Build the backend selected by `settings.backend`.
pub fn build_store(settings: &StorageSettings) -> Result<Arc<dyn LongTermStore>, StorageError> {
    match settings.backend {
        StoreBackend::Memory => Ok(Arc::new(InMemoryLongTermStore::new())),
        StoreBackend::Elasticsearch => Ok(Arc::new(ElasticStore::new(&settings.elasticsearch)?)),
    }
}
