//! Command-line interface for the Kubelens self-updater.
//!
//! The desktop application embeds the library directly; this binary exposes the same
//! pipeline for scripted installs, support sessions and CI smoke tests.
//!
//! # Commands
//!
//! - `check` - resolve the latest release and report whether it is newer
//! - `update` - download, verify and install the latest release, then relaunch
//! - `cleanup` - remove leftovers from earlier updates
//!
//! # Global Options
//!
//! - `--verbose` / `-v` - debug logging (overrides `RUST_LOG`)
//! - `--config <PATH>` / `-c` - alternate `updater.toml`
//! - `--no-progress` - never draw progress bars
//!
//! # Examples
//!
//! ```bash
//! kubelens-updater check --current 1.1.0
//! kubelens-updater update --no-relaunch
//! kubelens-updater --config ./updater.toml cleanup
//! ```

mod check;
mod cleanup;
mod update;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::UpdaterConfig;

/// Main CLI structure for `kubelens-updater`.
#[derive(Parser, Debug)]
#[command(
    name = "kubelens-updater",
    about = "Kubelens desktop self-updater - check for, install and clean up updates",
    version,
    author,
    long_about = "Downloads the latest Kubelens desktop release for this platform, verifies it \
                  against the published SHA-256 manifest and replaces the installation with \
                  rollback on failure."
)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to an alternate updater.toml
    #[arg(short, long, global = true, env = "KUBELENS_UPDATER_CONFIG")]
    config: Option<PathBuf>,

    /// Disable progress bars
    #[arg(long, global = true)]
    no_progress: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check whether a newer release is available
    Check(check::CheckCommand),

    /// Download, verify and install the latest release
    Update(update::UpdateCommand),

    /// Remove backups, scripts and partial downloads left by earlier updates
    Cleanup(cleanup::CleanupCommand),
}

impl Cli {
    /// Whether `--verbose` was given.
    #[must_use]
    pub const fn verbose(&self) -> bool {
        self.verbose
    }

    /// Loads configuration and runs the selected command.
    pub async fn execute(self) -> Result<()> {
        let config = UpdaterConfig::load_with_optional(self.config).await?;
        tracing::debug!("Using updates directory {}", config.updates_dir.display());

        match self.command {
            Commands::Check(cmd) => cmd.execute(&config).await,
            Commands::Update(cmd) => cmd.execute(&config, self.no_progress).await,
            Commands::Cleanup(cmd) => cmd.execute(&config),
        }
    }
}
