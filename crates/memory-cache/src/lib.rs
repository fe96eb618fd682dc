//! # memory-cache
//!
//! TTL caching for the tiered memory system.
//!
//! - [`TtlCache`]: concurrent cache of JSON-encoded values with expiry,
//!   per-user invalidation, periodic sweeping and hit/miss statistics
//! - [`ResultCache`]: search result cache keyed by a hash of the full
//!   request parameter set

pub mod error;
pub mod results;
pub mod ttl;

pub use error::CacheError;
pub use results::{ResultCache, SearchCacheKey};
pub use ttl::{CacheStats, TtlCache};
