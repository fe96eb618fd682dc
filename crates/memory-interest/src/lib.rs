//! # memory-interest
//!
//! User interest profiles derived from behaviour history.
//!
//! Events are grouped by category, each category is embedded and reduced to
//! a weighted centroid, and category centroids are combined by category
//! importance into one interest vector. Profiles are cached with a TTL and
//! recomputed when a new event arrives.

pub mod calculator;
pub mod centroid;
pub mod error;
pub mod history;

pub use calculator::InterestCalculator;
pub use centroid::weighted_centroid;
pub use error::InterestError;
pub use history::{BehaviorHistory, InMemoryBehaviorHistory};
