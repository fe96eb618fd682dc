//! Tiered memory CLI
//!
//! # Usage
//!
//! ```bash
//! tiered-memory store --session S [--role user] <content>...
//! tiered-memory retrieve --session S [--query Q] [--limit N] [--seed FILE]
//! tiered-memory clear --session S
//! tiered-memory interest --user U [--events FILE]
//! tiered-memory search --user U --query Q [--events FILE] [--seed FILE]
//! tiered-memory config show|path
//! ```
//!
//! # Configuration
//!
//! Configuration is loaded in order (later sources override earlier):
//! 1. Built-in defaults
//! 2. Config file (~/.config/tiered-memory/config.toml)
//! 3. `--config` file
//! 4. Environment variables (MEMORY_*, nested keys joined with `__`)
//! 5. CLI flags

use anyhow::Result;
use clap::Parser;

use memory_cli::{run, Cli};

#[tokio::main]
async fn main() -> Result<()> {
    run(Cli::parse()).await
}
