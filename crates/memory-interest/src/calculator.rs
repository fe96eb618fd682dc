//! Interest centroid calculator.
//!
//! A user's interest profile is built from their behaviour history:
//!
//! 1. Events are grouped by category (`"general"` when unset).
//! 2. Each category is embedded in one batch and reduced to a weighted
//!    centroid of its events.
//! 3. Category centroids are combined using the configured category weights.
//!
//! Categories run on a bounded pool. A category whose embedding fails or
//! times out is skipped; a profile built with skipped categories is returned
//! but not cached, so the next call retries.
//!
//! ## Coherence with updates
//!
//! Every user has a generation that `update_user_interest` bumps after
//! recording its event. A calculation reads the generation before reading
//! history and only caches its profile if the generation is unchanged, so a
//! reader racing an update can never overwrite the fresh profile. A stale
//! reader recomputes, up to [`MAX_ATTEMPTS`] times.

use chrono::Utc;
use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use memory_cache::{CacheStats, ResultCache, TtlCache};
use memory_embeddings::EmbeddingModel;
use memory_types::{InterestConfig, UserBehaviorEvent, UserInterestProfile};

use crate::centroid::{l2_norm, weighted_centroid};
use crate::error::InterestError;
use crate::history::BehaviorHistory;

/// Calculations per call before an uncached profile is returned.
pub const MAX_ATTEMPTS: usize = 3;

/// Events of one category, owned so that centroid futures stay `Send`.
struct CategoryGroup {
    name: String,
    texts: Vec<String>,
    weights: Vec<f32>,
}

/// Centroid of one category.
#[derive(Debug, Clone)]
struct CategoryCentroid {
    name: String,
    vector: Vec<f32>,
}

enum CategoryOutcome {
    Ready(CategoryCentroid),
    Skipped(String),
}

/// Computes and caches user interest profiles.
pub struct InterestCalculator {
    config: InterestConfig,
    embedder: Arc<dyn EmbeddingModel>,
    history: Arc<dyn BehaviorHistory>,
    profiles: TtlCache,
    versions: DashMap<String, u64>,
    generations: DashMap<String, u64>,
    result_cache: Option<Arc<ResultCache>>,
}

impl InterestCalculator {
    pub fn new(
        config: InterestConfig,
        embedder: Arc<dyn EmbeddingModel>,
        history: Arc<dyn BehaviorHistory>,
    ) -> Result<Self, InterestError> {
        config.validate().map_err(InterestError::Config)?;
        Ok(Self {
            config,
            embedder,
            history,
            profiles: TtlCache::new(),
            versions: DashMap::new(),
            generations: DashMap::new(),
            result_cache: None,
        })
    }

    /// Invalidate this search-result cache whenever a user's interest changes.
    pub fn with_result_cache(mut self, cache: Arc<ResultCache>) -> Self {
        self.result_cache = Some(cache);
        self
    }

    pub fn config(&self) -> &InterestConfig {
        &self.config
    }

    /// Profile-cache statistics.
    pub fn cache_stats(&self) -> CacheStats {
        self.profiles.stats()
    }

    /// Drop the cached profile of a user. Returns true if one was cached.
    pub fn invalidate(&self, user_id: &str) -> bool {
        self.profiles.remove(user_id)
    }

    /// Current profile of `user_id`, from cache when fresh.
    pub async fn calculate_user_interest(
        &self,
        user_id: &str,
    ) -> Result<UserInterestProfile, InterestError> {
        if user_id.is_empty() {
            return Err(InterestError::InvalidInput("user_id is empty".to_string()));
        }
        if let Some(profile) = self.profiles.get::<UserInterestProfile>(user_id) {
            debug!(user_id = %user_id, version = profile.version, "Interest profile cache hit");
            return Ok(profile);
        }

        let mut attempt = 1;
        loop {
            let generation = self.generation(user_id);
            let events = self.history.events_for(user_id).await?;
            let (mut profile, skipped) = self.build_profile(user_id, &events).await?;

            if !self.publish(user_id, generation, &mut profile, skipped == 0)? {
                if attempt < MAX_ATTEMPTS {
                    debug!(user_id = %user_id, attempt, "Interest changed during calculation, recomputing");
                    attempt += 1;
                    continue;
                }
                profile.version = self.next_version(user_id);
                warn!(
                    user_id = %user_id,
                    attempts = attempt,
                    "Interest kept changing during calculation, not caching"
                );
            } else if skipped > 0 {
                warn!(
                    user_id = %user_id,
                    skipped,
                    "Interest profile incomplete, not caching"
                );
            }

            info!(
                user_id = %user_id,
                events = events.len(),
                categories = ?profile.categories,
                confidence = profile.confidence,
                version = profile.version,
                "Computed interest profile"
            );
            return Ok(profile);
        }
    }

    /// Record `event` for `user_id` and return the recomputed profile.
    pub async fn update_user_interest(
        &self,
        user_id: &str,
        event: UserBehaviorEvent,
    ) -> Result<UserInterestProfile, InterestError> {
        if user_id.is_empty() {
            return Err(InterestError::InvalidInput("user_id is empty".to_string()));
        }
        if event.user_id != user_id {
            return Err(InterestError::InvalidInput(format!(
                "event belongs to {}, not {user_id}",
                event.user_id
            )));
        }
        if !event.weight.is_finite() || event.weight < 0.0 {
            return Err(InterestError::InvalidInput(format!(
                "event weight must be finite and >= 0, got {}",
                event.weight
            )));
        }
        if event.content.trim().is_empty() {
            return Err(InterestError::InvalidInput(
                "event content is empty".to_string(),
            ));
        }

        self.history.record(event).await?;

        // After the record, before invalidation: readers holding the old
        // generation may lack this event.
        *self.generations.entry(user_id.to_string()).or_insert(0) += 1;
        self.profiles.remove(user_id);
        if let Some(cache) = &self.result_cache {
            let dropped = cache.invalidate_user(user_id);
            debug!(user_id = %user_id, dropped, "Invalidated cached search results");
        }

        self.calculate_user_interest(user_id).await
    }

    fn generation(&self, user_id: &str) -> u64 {
        self.generations.get(user_id).map(|g| *g).unwrap_or(0)
    }

    fn next_version(&self, user_id: &str) -> u64 {
        let mut version = self.versions.entry(user_id.to_string()).or_insert(0);
        *version += 1;
        *version
    }

    /// Version `profile` and cache it when `cacheable`, unless an update
    /// landed after `generation` was read. Returns false for a stale profile.
    ///
    /// The generation entry stays locked while caching, so an update cannot
    /// slip in between the check and the write.
    fn publish(
        &self,
        user_id: &str,
        generation: u64,
        profile: &mut UserInterestProfile,
        cacheable: bool,
    ) -> Result<bool, InterestError> {
        let current = self.generations.entry(user_id.to_string()).or_insert(0);
        if *current != generation {
            return Ok(false);
        }
        profile.version = self.next_version(user_id);
        if cacheable {
            self.profiles
                .set(user_id, &*profile, self.config.cache_ttl(), Some(user_id))?;
        }
        Ok(true)
    }

    /// Build a profile from `events`. Returns the profile and the number of
    /// skipped categories.
    async fn build_profile(
        &self,
        user_id: &str,
        events: &[UserBehaviorEvent],
    ) -> Result<(UserInterestProfile, usize), InterestError> {
        let mut grouped: BTreeMap<String, (Vec<String>, Vec<f32>)> = BTreeMap::new();
        for event in events {
            let (texts, weights) = grouped.entry(event.category_or_default()).or_default();
            texts.push(event.content.clone());
            weights.push(event.weight);
        }
        if grouped.is_empty() {
            return Ok((UserInterestProfile::empty(user_id), 0));
        }
        let groups: Vec<CategoryGroup> = grouped
            .into_iter()
            .map(|(name, (texts, weights))| CategoryGroup {
                name,
                texts,
                weights,
            })
            .collect();

        let outcomes: Vec<CategoryOutcome> = stream::iter(groups)
            .map(|group| self.category_centroid(user_id, group))
            .buffer_unordered(self.config.worker_pool_size)
            .collect()
            .await;

        let mut skipped = 0;
        let mut centroids: Vec<CategoryCentroid> = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            match outcome {
                CategoryOutcome::Ready(c) => centroids.push(c),
                CategoryOutcome::Skipped(name) => {
                    debug!(user_id = %user_id, category = %name, "Category left out of profile");
                    skipped += 1;
                }
            }
        }
        centroids.sort_by(|a, b| a.name.cmp(&b.name));

        // Categories must agree on dimension to be combined
        if let Some(dim) = centroids.first().map(|c| c.vector.len()) {
            let before = centroids.len();
            centroids.retain(|c| {
                let keep = c.vector.len() == dim;
                if !keep {
                    warn!(
                        user_id = %user_id,
                        category = %c.name,
                        expected = dim,
                        actual = c.vector.len(),
                        "Dropping category with mismatched dimension"
                    );
                }
                keep
            });
            skipped += before - centroids.len();
        }

        if centroids.is_empty() {
            let mut profile = UserInterestProfile::empty(user_id);
            profile.last_updated = Utc::now();
            return Ok((profile, skipped));
        }

        let vectors: Vec<&[f32]> = centroids.iter().map(|c| c.vector.as_slice()).collect();
        let weights: Vec<f32> = centroids
            .iter()
            .map(|c| self.config.category_weight(&c.name))
            .collect();
        let interest_vector = weighted_centroid(&vectors, &weights)?;

        let nonzero = centroids.iter().filter(|c| l2_norm(&c.vector) > 0.0).count();
        let confidence = (centroids.len() as f32 / 5.0 + 0.1 * nonzero as f32).min(1.0);

        let mut ranked: Vec<(&str, f32)> = centroids
            .iter()
            .map(|c| (c.name.as_str(), self.config.category_weight(&c.name)))
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        let categories = ranked
            .into_iter()
            .take(self.config.max_top_categories)
            .map(|(name, _)| name.to_string())
            .collect();

        Ok((
            UserInterestProfile {
                user_id: user_id.to_string(),
                interest_vector,
                categories,
                confidence,
                last_updated: Utc::now(),
                version: 0,
            },
            skipped,
        ))
    }

    async fn category_centroid(&self, user_id: &str, group: CategoryGroup) -> CategoryOutcome {
        let CategoryGroup {
            name,
            texts,
            weights,
        } = group;

        let timeout = self.config.embedding_timeout();
        let embeddings =
            match tokio::time::timeout(timeout, self.embedder.embed_batch(&texts)).await {
                Ok(Ok(embeddings)) => embeddings,
                Ok(Err(e)) => {
                    warn!(user_id = %user_id, category = %name, error = %e, "Category embedding failed, skipping");
                    return CategoryOutcome::Skipped(name);
                }
                Err(_) => {
                    warn!(user_id = %user_id, category = %name, ?timeout, "Category embedding timed out, skipping");
                    return CategoryOutcome::Skipped(name);
                }
            };

        if embeddings.len() != texts.len() {
            warn!(
                user_id = %user_id,
                category = %name,
                expected = texts.len(),
                actual = embeddings.len(),
                "Embedder returned wrong number of vectors, skipping"
            );
            return CategoryOutcome::Skipped(name);
        }

        let vectors: Vec<&[f32]> = embeddings.iter().map(|e| e.values.as_slice()).collect();
        match weighted_centroid(&vectors, &weights) {
            Ok(vector) => {
                debug!(user_id = %user_id, category = %name, events = texts.len(), "Category centroid ready");
                CategoryOutcome::Ready(CategoryCentroid { name, vector })
            }
            Err(e) => {
                warn!(user_id = %user_id, category = %name, error = %e, "Inconsistent category embeddings, skipping");
                CategoryOutcome::Skipped(name)
            }
        }
    }
}
