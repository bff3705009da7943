//! Command-line interface for airlift
//!
//! The CLI drives the update library with console implementations of every
//! host trait, making the full coordinated workflow usable from a terminal:
//!
//! - `airlift check` — one-shot version query, no UI, no download
//! - `airlift update` — the complete cycle: check, policy, prompts,
//!   download with progress, installer handoff
//!
//! Global flags control logging (`--verbose`, `--quiet`) and the
//! configuration file location (`--config`, defaulting to
//! `~/.airlift/config.toml`).

pub mod check;
pub mod console;
pub mod update;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use crate::config::UpdateConfig;

/// Top-level command-line interface
#[derive(Parser)]
#[command(
    name = "airlift",
    about = "Over-the-air update coordinator",
    version,
    author,
    long_about = "Airlift coordinates application self-updates: it queries an update \
endpoint for the latest build, applies prompt policy, downloads the artifact with \
progress reporting, and hands it to an installer."
)]
pub struct Cli {
    /// The subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output for debugging
    ///
    /// Equivalent to `RUST_LOG=debug`; also surfaces the notification
    /// relay's publish stream.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Path to the configuration file
    ///
    /// Defaults to `~/.airlift/config.toml` (or `AIRLIFT_CONFIG_PATH`).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

/// Available subcommands
#[derive(Subcommand)]
enum Commands {
    /// Check for a newer build without downloading anything
    Check(check::CheckArgs),
    /// Run a full update cycle: check, prompt, download, install handoff
    Update(update::UpdateArgs),
}

impl Cli {
    /// Execute the parsed command
    pub async fn execute(self) -> Result<()> {
        self.init_logging();

        let config = match &self.config {
            Some(path) => UpdateConfig::load_from(path).await?,
            None => UpdateConfig::load().await?,
        };

        match self.command {
            Commands::Check(args) => args.execute(config).await,
            Commands::Update(args) => args.execute(config).await,
        }
    }

    fn init_logging(&self) {
        let filter = if self.verbose {
            EnvFilter::new("debug")
        } else if self.quiet {
            EnvFilter::new("error")
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            EnvFilter::new("warn")
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .try_init();
    }
}
