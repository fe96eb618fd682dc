//! Command implementations.
//!
//! Each command loads settings, wires the components selected by them and
//! prints its result as JSON (TOML for `config show`).

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use memory_cache::ResultCache;
use memory_embeddings::build_embedder;
use memory_interest::{BehaviorHistory, InMemoryBehaviorHistory, InterestCalculator};
use memory_search::HybridSearchEngine;
use memory_storage::{build_store, ElasticStore, LongTermStore};
use memory_tiers::{ClearOutcome, StoreOutcome, TieredMemoryStore};
use memory_types::{
    default_config_dir, BehaviorAction, Message, Role, SearchRequest, SearchResult, Settings,
    StoreBackend, UserBehaviorEvent, UserInterestProfile,
};

use crate::cli::{Cli, Commands, ConfigCommands};

/// One entry of a `--seed` file.
#[derive(Debug, Clone, Deserialize)]
pub struct SeedMessage {
    pub session_id: String,
    #[serde(default = "default_role")]
    pub role: Role,
    pub content: String,
}

fn default_role() -> Role {
    Role::User
}

/// One entry of an `--events` file.
#[derive(Debug, Clone, Deserialize)]
pub struct EventInput {
    pub action: BehaviorAction,
    pub content: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default = "default_event_weight")]
    pub weight: f32,
}

fn default_event_weight() -> f32 {
    1.0
}

/// Output of the `search` command.
#[derive(Debug, Serialize)]
pub struct SearchOutput {
    pub profile: UserInterestProfile,
    pub results: Vec<SearchResult>,
}

/// Components wired from settings.
pub struct MemorySystem {
    pub settings: Settings,
    pub tiers: TieredMemoryStore,
    pub history: Arc<InMemoryBehaviorHistory>,
    pub interest: InterestCalculator,
    pub search: HybridSearchEngine,
}

impl MemorySystem {
    pub async fn build(settings: Settings) -> Result<Self> {
        let embedder =
            build_embedder(&settings.embedding).context("Failed to build embedding model")?;
        info!(
            provider = %settings.embedding.provider,
            model = %embedder.info().name,
            dimension = embedder.info().dimension,
            "Embedding model ready"
        );

        let long_term: Arc<dyn LongTermStore> = match settings.storage.backend {
            StoreBackend::Elasticsearch => {
                let store = ElasticStore::new(&settings.storage.elasticsearch)
                    .context("Failed to configure Elasticsearch")?;
                let created = store
                    .ensure_index(settings.embedding.dimension)
                    .await
                    .context("Failed to prepare Elasticsearch index")?;
                info!(index = store.index_name(), created, "Elasticsearch index ready");
                Arc::new(store)
            }
            StoreBackend::Memory => {
                build_store(&settings.storage).context("Failed to build long-term store")?
            }
        };

        let tiers = TieredMemoryStore::new(
            settings.tiers.clone(),
            Arc::clone(&long_term),
            Some(Arc::clone(&embedder)),
        )
        .context("Invalid tier configuration")?;

        let results = Arc::new(ResultCache::new(&settings.cache));
        let history = Arc::new(InMemoryBehaviorHistory::new(
            settings.interest.max_events_per_user,
        ));
        let interest = InterestCalculator::new(
            settings.interest.clone(),
            Arc::clone(&embedder),
            history.clone(),
        )
        .context("Invalid interest configuration")?
        .with_result_cache(Arc::clone(&results));

        let search = HybridSearchEngine::new(settings.search.clone(), long_term, results)
            .context("Invalid search configuration")?;

        Ok(Self {
            settings,
            tiers,
            history,
            interest,
            search,
        })
    }

    /// Store every message of a seed file.
    pub async fn seed(&self, path: &Path) -> Result<usize> {
        let messages: Vec<SeedMessage> = read_json(path)?;
        for m in &messages {
            self.tiers
                .store(&m.session_id, m.role, &m.content)
                .await
                .with_context(|| format!("Failed to seed session {}", m.session_id))?;
        }
        debug!(count = messages.len(), path = %path.display(), "Seeded messages");
        Ok(messages.len())
    }

    /// Record every event of an events file for `user_id`.
    pub async fn load_events(&self, user_id: &str, path: &Path) -> Result<usize> {
        let events: Vec<EventInput> = read_json(path)?;
        for e in &events {
            let mut event =
                UserBehaviorEvent::new(user_id, e.action, e.content.clone(), e.weight);
            if let Some(category) = &e.category {
                event = event.with_category(category.clone());
            }
            self.history
                .record(event)
                .await
                .context("Failed to record behaviour event")?;
        }
        debug!(count = events.len(), user_id = %user_id, "Loaded behaviour events");
        Ok(events.len())
    }

    pub async fn store(
        &self,
        session_id: &str,
        role: Role,
        contents: &[String],
    ) -> Result<Vec<StoreOutcome>> {
        let mut outcomes = Vec::with_capacity(contents.len());
        for content in contents {
            outcomes.push(self.tiers.store(session_id, role, content).await?);
        }
        Ok(outcomes)
    }

    pub async fn retrieve(&self, session_id: &str, query: &str, limit: usize) -> Result<Vec<Message>> {
        Ok(self.tiers.retrieve(session_id, query, limit).await?)
    }

    pub async fn clear(&self, session_id: &str) -> Result<ClearOutcome> {
        Ok(self.tiers.clear(session_id).await?)
    }

    pub async fn interest(&self, user_id: &str) -> Result<UserInterestProfile> {
        Ok(self.interest.calculate_user_interest(user_id).await?)
    }

    pub async fn search(&self, request: SearchRequest) -> Result<Vec<SearchResult>> {
        Ok(self.search.search(&request).await?)
    }
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Failed to parse {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Settings with secrets blanked, for display.
pub fn redacted(settings: &Settings) -> Settings {
    let mut shown = settings.clone();
    if shown.embedding.api_key.is_some() {
        shown.embedding.api_key = Some("********".to_string());
    }
    if shown.storage.elasticsearch.password.is_some() {
        shown.storage.elasticsearch.password = Some("********".to_string());
    }
    shown
}

/// Initialise logging. `RUST_LOG` wins over the configured level.
fn init_logging(level: &str) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;
    Ok(())
}

/// Load settings and apply CLI overrides.
pub fn load_settings(config_path: Option<&str>, log_level: Option<&str>) -> Result<Settings> {
    let mut settings = Settings::load(config_path).context("Failed to load configuration")?;
    if let Some(level) = log_level {
        settings.log_level = level.to_string();
    }
    Ok(settings)
}

/// Dispatch a parsed command line.
pub async fn run(cli: Cli) -> Result<()> {
    let settings = load_settings(cli.config.as_deref(), cli.log_level.as_deref())?;
    init_logging(&settings.log_level)?;

    if let Commands::Config(command) = &cli.command {
        return match command {
            ConfigCommands::Show => {
                println!("{}", toml::to_string_pretty(&redacted(&settings))?);
                Ok(())
            }
            ConfigCommands::Path => {
                println!("{}", default_config_dir().join("config.toml").display());
                Ok(())
            }
        };
    }

    let system = MemorySystem::build(settings).await?;

    match cli.command {
        Commands::Store {
            session,
            role,
            content,
        } => print_json(&system.store(&session, role, &content).await?),
        Commands::Retrieve {
            session,
            query,
            limit,
            seed,
        } => {
            if let Some(path) = seed {
                system.seed(&path).await?;
            }
            print_json(&system.retrieve(&session, &query, limit).await?)
        }
        Commands::Clear { session } => print_json(&system.clear(&session).await?),
        Commands::Interest { user, events } => {
            if let Some(path) = events {
                system.load_events(&user, &path).await?;
            }
            print_json(&system.interest(&user).await?)
        }
        Commands::Search {
            user,
            query,
            events,
            seed,
            limit,
            rerank_limit,
            vector_weight,
            text_weight,
        } => {
            if let Some(path) = seed {
                system.seed(&path).await?;
            }
            if let Some(path) = events {
                system.load_events(&user, &path).await?;
            }
            let profile = system.interest(&user).await?;
            let request = SearchRequest::new(query, profile.clone())
                .with_limits(limit, rerank_limit)
                .with_weights(vector_weight, text_weight);
            let results = system.search(request).await?;
            print_json(&SearchOutput { profile, results })
        }
        Commands::Config(_) => Ok(()),
    }
}
