//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Capability registry client
#[derive(Parser)]
#[command(
    name = "cr",
    about = "Capability registry client: correlated requests and provider heartbeats over pub/sub",
    version = env!("GIT_DESCRIBE"),
    after_help = "Logs are written to: ~/.local/share/capregistry/logs/capregistry.log"
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true, help = "Log level (trace, debug, info, warn, error)")]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands
#[derive(Subcommand)]
pub enum Command {
    /// Run a client against an in-process registry
    Demo {
        /// How long to keep the provider registered
        #[arg(short, long, default_value = "3")]
        duration_secs: u64,

        /// Interval between provider listings
        #[arg(long, default_value = "1000")]
        list_every_ms: u64,
    },

    /// Print the effective configuration as YAML
    Config,
}

/// Get the log file path
pub fn get_log_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("capregistry")
        .join("logs")
        .join("capregistry.log")
}
