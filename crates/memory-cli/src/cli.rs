//! CLI argument parsing.
//!
//! Global flags override every other config source.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use memory_types::Role;

/// Tiered conversational memory and personalised search.
#[derive(Parser, Debug)]
#[command(name = "tiered-memory")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default ~/.config/tiered-memory/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Store messages in all three tiers
    Store {
        #[arg(short, long)]
        session: String,

        /// Role of the speaker (user, assistant, system, tool)
        #[arg(short, long, default_value = "user", value_parser = parse_role)]
        role: Role,

        /// One or more messages, stored in order
        #[arg(required = true)]
        content: Vec<String>,
    },

    /// Retrieve messages for a session
    Retrieve {
        #[arg(short, long)]
        session: String,

        /// Query for long-term lookup
        #[arg(short, long, default_value = "")]
        query: String,

        /// Maximum messages (0 = configured default)
        #[arg(short = 'n', long, default_value = "0")]
        limit: usize,

        /// JSON file of messages to store first
        #[arg(long)]
        seed: Option<PathBuf>,
    },

    /// Drop all tiers of a session
    Clear {
        #[arg(short, long)]
        session: String,
    },

    /// Compute a user's interest profile from behaviour events
    Interest {
        #[arg(short, long)]
        user: String,

        /// JSON file of behaviour events
        #[arg(short, long)]
        events: Option<PathBuf>,
    },

    /// Run a personalised hybrid search
    Search {
        #[arg(short, long)]
        user: String,

        #[arg(short, long)]
        query: String,

        /// JSON file of behaviour events
        #[arg(short, long)]
        events: Option<PathBuf>,

        /// JSON file of messages to store first
        #[arg(long)]
        seed: Option<PathBuf>,

        #[arg(short = 'n', long, default_value = "10")]
        limit: usize,

        #[arg(long, default_value = "20")]
        rerank_limit: usize,

        #[arg(long, default_value = "0.4")]
        vector_weight: f32,

        #[arg(long, default_value = "0.3")]
        text_weight: f32,
    },

    /// Configuration commands
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigCommands {
    /// Print the effective configuration as TOML
    Show,

    /// Print the default config file location
    Path,
}

fn parse_role(s: &str) -> Result<Role, String> {
    s.parse::<Role>().map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_store() {
        let cli = Cli::parse_from([
            "tiered-memory",
            "store",
            "--session",
            "s1",
            "--role",
            "assistant",
            "hello",
            "world",
        ]);
        match cli.command {
            Commands::Store {
                session,
                role,
                content,
            } => {
                assert_eq!(session, "s1");
                assert_eq!(role, Role::Assistant);
                assert_eq!(content, vec!["hello", "world"]);
            }
            _ => panic!("Expected Store command"),
        }
    }

    #[test]
    fn test_cli_store_rejects_unknown_role() {
        let result = Cli::try_parse_from(["tiered-memory", "store", "-s", "s1", "-r", "robot", "x"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_retrieve_defaults() {
        let cli = Cli::parse_from(["tiered-memory", "retrieve", "-s", "s1"]);
        match cli.command {
            Commands::Retrieve {
                query, limit, seed, ..
            } => {
                assert_eq!(query, "");
                assert_eq!(limit, 0);
                assert!(seed.is_none());
            }
            _ => panic!("Expected Retrieve command"),
        }
    }

    #[test]
    fn test_cli_search_weights() {
        let cli = Cli::parse_from([
            "tiered-memory",
            "search",
            "-u",
            "u1",
            "-q",
            "rust",
            "--vector-weight",
            "0.5",
            "--text-weight",
            "0.2",
            "-n",
            "5",
        ]);
        match cli.command {
            Commands::Search {
                user,
                query,
                limit,
                rerank_limit,
                vector_weight,
                text_weight,
                ..
            } => {
                assert_eq!(user, "u1");
                assert_eq!(query, "rust");
                assert_eq!(limit, 5);
                assert_eq!(rerank_limit, 20);
                assert_eq!(vector_weight, 0.5);
                assert_eq!(text_weight, 0.2);
            }
            _ => panic!("Expected Search command"),
        }
    }

    #[test]
    fn test_cli_config_show_with_globals() {
        let cli = Cli::parse_from([
            "tiered-memory",
            "config",
            "show",
            "--config",
            "/path/to/config.toml",
            "--log-level",
            "debug",
        ]);
        assert_eq!(cli.config, Some("/path/to/config.toml".to_string()));
        assert_eq!(cli.log_level, Some("debug".to_string()));
        assert!(matches!(cli.command, Commands::Config(ConfigCommands::Show)));
    }

    #[test]
    fn test_cli_clear() {
        let cli = Cli::parse_from(["tiered-memory", "clear", "--session", "s9"]);
        assert!(matches!(cli.command, Commands::Clear { session } if session == "s9"));
    }
}
