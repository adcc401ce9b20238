//! Configuration for the updater.
//!
//! A single user-level TOML file controls where releases are fetched from, where downloads
//! land and which installation is replaced. See [`UpdaterConfig`].

mod updater;

pub use updater::{UpdaterConfig, default_updates_dir};
