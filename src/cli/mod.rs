//! CLI module for Voltwatch
//!
//! Command-line interface definitions and handlers for the dashboard relay.
//!
//! # Commands
//!
//! - `serve` - Start the relay server
//! - `config` - Configuration utilities (init)
//! - `completions` - Generate shell completions
//!
//! # Example
//!
//! ```bash
//! # Start server with default config
//! voltwatch serve
//!
//! # Point at a local feed and only connect once a dashboard shows up
//! voltwatch serve --upstream-url ws://127.0.0.1:9001/ws --lazy-connect
//!
//! # Generate shell completions
//! voltwatch completions bash > ~/.bash_completion.d/voltwatch
//! ```

pub mod completions;
pub mod config;
pub mod serve;

pub use completions::handle_completions;
pub use config::handle_config_init;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Voltwatch - power-quality telemetry relay
#[derive(Parser, Debug)]
#[command(
    name = "voltwatch",
    version,
    about = "WebSocket relay between a power-quality feed and its dashboards"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the relay server
    Serve(ServeArgs),
    /// Configuration utilities
    #[command(subcommand)]
    Config(ConfigCommands),
    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "voltwatch.toml")]
    pub config: PathBuf,

    /// Override server port
    #[arg(short, long, env = "VOLTWATCH_PORT")]
    pub port: Option<u16>,

    /// Override server host
    #[arg(short = 'H', long, env = "VOLTWATCH_HOST")]
    pub host: Option<String>,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "VOLTWATCH_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Override the upstream telemetry feed URL
    #[arg(long, env = "VOLTWATCH_UPSTREAM_URL")]
    pub upstream_url: Option<String>,

    /// Connect upstream on the first dashboard request instead of at startup
    #[arg(long)]
    pub lazy_connect: bool,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Initialize a new configuration file
    Init(ConfigInitArgs),
}

#[derive(Args, Debug)]
pub struct ConfigInitArgs {
    /// Output file path
    #[arg(short, long, default_value = "voltwatch.toml")]
    pub output: PathBuf,

    /// Overwrite existing file
    #[arg(short, long)]
    pub force: bool,
}

#[derive(Args, Debug)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: clap_complete::Shell,
}
