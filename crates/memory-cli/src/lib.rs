//! Operator CLI for the tiered memory system.
//!
//! # Modules
//!
//! - `cli`: Command-line argument parsing with clap
//! - `commands`: Component wiring and command implementations

pub mod cli;
pub mod commands;

pub use cli::{Cli, Commands, ConfigCommands};
pub use commands::{load_settings, redacted, run, EventInput, MemorySystem, SearchOutput, SeedMessage};
