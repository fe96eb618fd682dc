//! Configuration loading for the tiered memory workspace.
//!
//! Layered config: defaults -> config file -> env vars -> CLI flags.
//! The default config file lives at `~/.config/tiered-memory/config.toml`.
//! Nested keys are addressed from the environment with a double underscore,
//! e.g. `MEMORY_TIERS__SHORT_TERM_SLOTS=32`.

use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::MemoryError;
use crate::priority::PriorityConfig;

const APP_NAME: &str = "tiered-memory";

fn default_true() -> bool {
    true
}

/// Tiered memory store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierConfig {
    /// Messages kept per session in the working buffer
    #[serde(default = "default_working_memory_size")]
    pub working_memory_size: usize,

    /// Slots per session in the short-term bank
    #[serde(default = "default_short_term_slots")]
    pub short_term_slots: usize,

    /// Retrieval limit used when the caller passes 0
    #[serde(default = "default_max_retrieve")]
    pub max_retrieve: usize,

    /// Embed messages on store and use KNN on retrieve
    #[serde(default = "default_true")]
    pub enable_vector_search: bool,

    /// Timeout for each embedding or long-term store call (ms)
    #[serde(default = "default_backend_timeout_ms")]
    pub backend_timeout_ms: u64,

    #[serde(default)]
    pub priority: PriorityConfig,
}

fn default_working_memory_size() -> usize {
    20
}

fn default_short_term_slots() -> usize {
    16
}

fn default_max_retrieve() -> usize {
    10
}

fn default_backend_timeout_ms() -> u64 {
    5_000
}

impl Default for TierConfig {
    fn default() -> Self {
        Self {
            working_memory_size: default_working_memory_size(),
            short_term_slots: default_short_term_slots(),
            max_retrieve: default_max_retrieve(),
            enable_vector_search: true,
            backend_timeout_ms: default_backend_timeout_ms(),
            priority: PriorityConfig::default(),
        }
    }
}

impl TierConfig {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.working_memory_size == 0 {
            return Err("working_memory_size must be > 0".to_string());
        }
        if self.short_term_slots == 0 {
            return Err("short_term_slots must be > 0".to_string());
        }
        if self.max_retrieve == 0 {
            return Err("max_retrieve must be > 0".to_string());
        }
        if self.backend_timeout_ms == 0 {
            return Err("backend_timeout_ms must be > 0".to_string());
        }
        self.priority.validate()
    }

    pub fn backend_timeout(&self) -> Duration {
        Duration::from_millis(self.backend_timeout_ms)
    }
}

/// Interest centroid calculator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterestConfig {
    /// Profile cache TTL (seconds)
    #[serde(default = "default_interest_ttl_secs")]
    pub cache_ttl_secs: u64,

    #[serde(default = "default_max_top_categories")]
    pub max_top_categories: usize,

    /// Categories embedded concurrently
    #[serde(default = "default_interest_pool_size")]
    pub worker_pool_size: usize,

    /// Timeout for one category's batch embedding (ms)
    #[serde(default = "default_embedding_timeout_ms")]
    pub embedding_timeout_ms: u64,

    /// Importance of categories missing from `category_weights`
    #[serde(default = "default_category_weight")]
    pub default_category_weight: f32,

    /// History events retained per user by the in-memory history
    #[serde(default = "default_max_events_per_user")]
    pub max_events_per_user: usize,

    /// Category importance used when combining category centroids
    #[serde(default = "default_category_weights")]
    pub category_weights: BTreeMap<String, f32>,
}

fn default_interest_ttl_secs() -> u64 {
    30 * 60
}

fn default_max_top_categories() -> usize {
    3
}

fn default_interest_pool_size() -> usize {
    4
}

fn default_embedding_timeout_ms() -> u64 {
    10_000
}

fn default_category_weights() -> BTreeMap<String, f32> {
    [
        ("technology", 1.0),
        ("business", 0.8),
        ("science", 0.7),
        ("culture", 0.6),
        ("politics", 0.5),
    ]
    .into_iter()
    .map(|(name, weight)| (name.to_string(), weight))
    .collect()
}

fn default_category_weight() -> f32 {
    0.5
}

fn default_max_events_per_user() -> usize {
    1_000
}

impl Default for InterestConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_interest_ttl_secs(),
            max_top_categories: default_max_top_categories(),
            worker_pool_size: default_interest_pool_size(),
            embedding_timeout_ms: default_embedding_timeout_ms(),
            category_weights: default_category_weights(),
            default_category_weight: default_category_weight(),
            max_events_per_user: default_max_events_per_user(),
        }
    }
}

impl InterestConfig {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.worker_pool_size == 0 {
            return Err("worker_pool_size must be > 0".to_string());
        }
        if self.embedding_timeout_ms == 0 {
            return Err("embedding_timeout_ms must be > 0".to_string());
        }
        if self.max_events_per_user == 0 {
            return Err("max_events_per_user must be > 0".to_string());
        }
        if !self.default_category_weight.is_finite() || self.default_category_weight < 0.0 {
            return Err(format!(
                "default_category_weight must be finite and >= 0, got {}",
                self.default_category_weight
            ));
        }
        if let Some((name, w)) = self
            .category_weights
            .iter()
            .find(|(_, w)| !w.is_finite() || **w < 0.0)
        {
            return Err(format!("category weight for {name} must be >= 0, got {w}"));
        }
        Ok(())
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn embedding_timeout(&self) -> Duration {
        Duration::from_millis(self.embedding_timeout_ms)
    }

    /// Importance weight of a category.
    /// Configured weight of `category`, matched case-insensitively.
    pub fn category_weight(&self, category: &str) -> f32 {
        if let Some(weight) = self.category_weights.get(category) {
            return *weight;
        }
        self.category_weights
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(category))
            .map(|(_, weight)| *weight)
            .unwrap_or(self.default_category_weight)
    }
}

/// Weights of the five rerank factors. Must sum to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RerankWeights {
    #[serde(default = "default_content_relevance")]
    pub content_relevance: f32,
    #[serde(default = "default_user_preference")]
    pub user_preference: f32,
    #[serde(default = "default_minor_weight")]
    pub freshness: f32,
    #[serde(default = "default_minor_weight")]
    pub quality: f32,
    #[serde(default = "default_minor_weight")]
    pub popularity: f32,
}

fn default_content_relevance() -> f32 {
    0.4
}

fn default_user_preference() -> f32 {
    0.3
}

fn default_minor_weight() -> f32 {
    0.1
}

impl Default for RerankWeights {
    fn default() -> Self {
        Self {
            content_relevance: default_content_relevance(),
            user_preference: default_user_preference(),
            freshness: default_minor_weight(),
            quality: default_minor_weight(),
            popularity: default_minor_weight(),
        }
    }
}

impl RerankWeights {
    pub fn sum(&self) -> f32 {
        self.content_relevance + self.user_preference + self.freshness + self.quality + self.popularity
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        let all = [
            self.content_relevance,
            self.user_preference,
            self.freshness,
            self.quality,
            self.popularity,
        ];
        if all.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(format!("rerank weights must be finite and >= 0: {self:?}"));
        }
        if (self.sum() - 1.0).abs() > 1e-3 {
            return Err(format!("rerank weights must sum to 1.0, got {}", self.sum()));
        }
        Ok(())
    }
}

/// Hybrid search configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Timeout for each initial-filter branch (ms)
    #[serde(default = "default_backend_timeout_ms")]
    pub backend_timeout_ms: u64,

    /// Candidates scored concurrently during rerank
    #[serde(default = "default_search_pool_size")]
    pub worker_pool_size: usize,

    /// Rows computed concurrently by batch similarity
    #[serde(default = "default_batch_size")]
    pub similarity_batch_size: usize,

    /// Freshness half-life (days)
    #[serde(default = "default_half_life_days")]
    pub freshness_half_life_days: f32,

    #[serde(default)]
    pub rerank_weights: RerankWeights,
}

fn default_search_pool_size() -> usize {
    8
}

fn default_batch_size() -> usize {
    32
}

fn default_half_life_days() -> f32 {
    30.0
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            backend_timeout_ms: default_backend_timeout_ms(),
            worker_pool_size: default_search_pool_size(),
            similarity_batch_size: default_batch_size(),
            freshness_half_life_days: default_half_life_days(),
            rerank_weights: RerankWeights::default(),
        }
    }
}

impl SearchConfig {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.backend_timeout_ms == 0 {
            return Err("backend_timeout_ms must be > 0".to_string());
        }
        if self.worker_pool_size == 0 {
            return Err("worker_pool_size must be > 0".to_string());
        }
        if self.similarity_batch_size == 0 {
            return Err("similarity_batch_size must be > 0".to_string());
        }
        if !self.freshness_half_life_days.is_finite() || self.freshness_half_life_days <= 0.0 {
            return Err(format!(
                "freshness_half_life_days must be > 0, got {}",
                self.freshness_half_life_days
            ));
        }
        self.rerank_weights.validate()
    }

    pub fn backend_timeout(&self) -> Duration {
        Duration::from_millis(self.backend_timeout_ms)
    }
}

/// Search result cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Search result TTL (seconds)
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,

    /// Interval of the background expiry sweep (seconds)
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_cache_ttl_secs() -> u64 {
    15 * 60
}

fn default_sweep_interval_secs() -> u64 {
    5 * 60
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_cache_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl CacheConfig {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.ttl_secs == 0 {
            return Err("ttl_secs must be > 0".to_string());
        }
        if self.sweep_interval_secs == 0 {
            return Err("sweep_interval_secs must be > 0".to_string());
        }
        Ok(())
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// Embedding backend selection
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// OpenAI-compatible `/embeddings` endpoint
    #[serde(alias = "open_ai")]
    OpenAi,
    /// HuggingFace inference API
    #[serde(alias = "hugging_face")]
    HuggingFace,
    /// Deterministic offline hashing embedder
    #[default]
    Hash,
}

impl std::fmt::Display for EmbeddingProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmbeddingProvider::OpenAi => write!(f, "openai"),
            EmbeddingProvider::HuggingFace => write!(f, "huggingface"),
            EmbeddingProvider::Hash => write!(f, "hash"),
        }
    }
}

/// Embedding generator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingSettings {
    #[serde(default)]
    pub provider: EmbeddingProvider,

    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// API key (loaded from env var, not stored in config file)
    #[serde(default)]
    pub api_key: Option<String>,

    /// API base URL; provider default when unset
    #[serde(default)]
    pub api_base_url: Option<String>,

    /// Expected vector dimension
    #[serde(default = "default_dimension")]
    pub dimension: usize,

    /// Input truncation limit (characters)
    #[serde(default = "default_max_length")]
    pub max_length: usize,

    /// Per-request HTTP timeout (ms)
    #[serde(default = "default_request_timeout_ms")]
    pub timeout_ms: u64,

    /// Retries on transient failure; 0 leaves retrying to the caller
    #[serde(default)]
    pub max_retries: u32,
}

fn default_embedding_model() -> String {
    "iic/nlp_corom_sentence-embedding_chinese-base".to_string()
}

fn default_dimension() -> usize {
    768
}

fn default_max_length() -> usize {
    512
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::default(),
            model: default_embedding_model(),
            api_key: None,
            api_base_url: None,
            dimension: default_dimension(),
            max_length: default_max_length(),
            timeout_ms: default_request_timeout_ms(),
            max_retries: 0,
        }
    }
}

impl EmbeddingSettings {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.dimension == 0 {
            return Err("dimension must be > 0".to_string());
        }
        if self.max_length == 0 {
            return Err("max_length must be > 0".to_string());
        }
        if self.timeout_ms == 0 {
            return Err("timeout_ms must be > 0".to_string());
        }
        if self.provider != EmbeddingProvider::Hash && self.model.trim().is_empty() {
            return Err(format!("model is required for provider {}", self.provider));
        }
        Ok(())
    }
}

/// Long-term store backend selection
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    /// Process-local store, lost on exit
    #[default]
    Memory,
    /// Elasticsearch 8 over REST
    Elasticsearch,
}

/// Elasticsearch connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElasticSettings {
    #[serde(default = "default_elastic_url")]
    pub url: String,

    #[serde(default = "default_index_name")]
    pub index: String,

    #[serde(default)]
    pub username: Option<String>,

    /// Password (loaded from env var, not stored in config file)
    #[serde(default)]
    pub password: Option<String>,

    /// Per-request HTTP timeout (ms)
    #[serde(default = "default_backend_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_elastic_url() -> String {
    "http://localhost:9200".to_string()
}

fn default_index_name() -> String {
    "memory_items".to_string()
}

impl Default for ElasticSettings {
    fn default() -> Self {
        Self {
            url: default_elastic_url(),
            index: default_index_name(),
            username: None,
            password: None,
            timeout_ms: default_backend_timeout_ms(),
        }
    }
}

/// Long-term store configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StorageSettings {
    #[serde(default)]
    pub backend: StoreBackend,

    #[serde(default)]
    pub elasticsearch: ElasticSettings,
}

impl StorageSettings {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.backend == StoreBackend::Elasticsearch {
            if self.elasticsearch.url.trim().is_empty() {
                return Err("elasticsearch.url is required".to_string());
            }
            if self.elasticsearch.index.trim().is_empty() {
                return Err("elasticsearch.index is required".to_string());
            }
            if self.elasticsearch.timeout_ms == 0 {
                return Err("elasticsearch.timeout_ms must be > 0".to_string());
            }
        }
        Ok(())
    }
}

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub tiers: TierConfig,

    #[serde(default)]
    pub interest: InterestConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub embedding: EmbeddingSettings,

    #[serde(default)]
    pub storage: StorageSettings,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            tiers: TierConfig::default(),
            interest: InterestConfig::default(),
            search: SearchConfig::default(),
            cache: CacheConfig::default(),
            embedding: EmbeddingSettings::default(),
            storage: StorageSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings with layered precedence:
    /// 1. Built-in defaults
    /// 2. Config file (~/.config/tiered-memory/config.toml)
    /// 3. CLI-specified config file (optional)
    /// 4. Environment variables (MEMORY_*)
    ///
    /// CLI flags should be applied by the caller after this returns.
    pub fn load(cli_config_path: Option<&str>) -> Result<Self, MemoryError> {
        let default_config_path = default_config_dir().join("config");

        let mut builder = Config::builder()
            .set_default("log_level", default_log_level())
            .map_err(|e| MemoryError::Config(e.to_string()))?
            .add_source(File::with_name(&default_config_path.to_string_lossy()).required(false));

        if let Some(path) = cli_config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // Format: MEMORY_LOG_LEVEL, MEMORY_TIERS__SHORT_TERM_SLOTS, MEMORY_EMBEDDING__API_KEY
        builder = builder.add_source(
            Environment::with_prefix("MEMORY")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder
            .build()
            .map_err(|e| MemoryError::Config(e.to_string()))?;

        let settings: Settings = config
            .try_deserialize()
            .map_err(|e| MemoryError::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate every section, naming the failing one.
    pub fn validate(&self) -> Result<(), MemoryError> {
        let sections: [(&str, Result<(), String>); 6] = [
            ("tiers", self.tiers.validate()),
            ("interest", self.interest.validate()),
            ("search", self.search.validate()),
            ("cache", self.cache.validate()),
            ("embedding", self.embedding.validate()),
            ("storage", self.storage.validate()),
        ];
        for (name, result) in sections {
            result.map_err(|e| MemoryError::Config(format!("{name}: {e}")))?;
        }
        Ok(())
    }
}

/// Directory holding the default config file.
pub fn default_config_dir() -> PathBuf {
    ProjectDirs::from("", "", APP_NAME)
        .map(|p| p.config_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}
