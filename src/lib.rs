//! Kubelens Updater - self-update engine for the Kubelens desktop application
//!
//! Discovers the latest published release, downloads the build for the running platform,
//! verifies it against the release's SHA-256 manifest and replaces the live installation,
//! rolling back when the swap fails part-way.
//!
//! # Architecture Overview
//!
//! A single [`update::Updater`] is created at application start. It owns the only mutable
//! state of the subsystem (an [`update::UpdateState`] plus the data of that state) and runs
//! the pipeline:
//!
//! ```text
//! release -> asset -> download -> verification -> applier (archive + backup) -> relaunch
//! ```
//!
//! The desktop UI polls [`update::Updater::status`] and receives a serializable
//! [`update::UpdateStatus`] snapshot.
//!
//! ## Platform strategies
//!
//! | Platform | Archive | Replacement |
//! |----------|---------|-------------|
//! | macOS | `.zip` | `.app` bundle renamed aside and replaced |
//! | Windows | `.zip` | batch trampoline swaps the `.exe` after the process exits |
//! | Linux | `.tar.gz` | binary renamed aside, new one copied in |
//!
//! # Core Modules
//!
//! - [`update`] - the update pipeline, appliers, status and startup cleanup
//! - [`config`] - `updater.toml` loading with defaults
//! - [`core`] - error types and user-facing error rendering
//! - [`cli`] - the `kubelens-updater` command tree
//! - [`utils`] - filesystem helpers, platform detection, progress bars
//! - [`constants`] - naming conventions and timeouts
//!
//! # Example
//!
//! ```rust,no_run
//! use kubelens_updater::config::UpdaterConfig;
//! use kubelens_updater::update::{Updater, startup_cleanup};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = UpdaterConfig::load().await?;
//! let report = startup_cleanup(&config);
//! println!("removed {} leftovers", report.removed.len());
//!
//! let updater = Updater::new(&config)?;
//! updater.start_download(&CancellationToken::new())?;
//! updater.wait().await;
//! println!("{}", serde_json::to_string(&updater.status())?);
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod constants;
pub mod core;
pub mod update;
pub mod utils;

// test_utils is available for tests and for the integration suite via `test-utils`
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
