//! Updater configuration (`~/.kubelens/updater.toml`).
//!
//! Every field has a serde default, so an empty or missing file is a valid configuration.
//!
//! # Configuration File Location
//!
//! - **Unix/macOS**: `~/.kubelens/updater.toml`
//! - **Windows**: `%LOCALAPPDATA%\kubelens\updater.toml`
//!
//! # File Format
//!
//! ```toml
//! releases_url = "https://api.github.com/repos/kubelens/kubelens/releases/latest"
//! updates_dir = "/home/me/.local/share/kubelens/updates"
//! # install_path = "/opt/kubelens/kubelens"
//! release_timeout_secs = 15
//! download_timeout_secs = 1800
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

use crate::constants::{DEFAULT_RELEASES_URL, DOWNLOAD_TIMEOUT, PRODUCT_NAME, RELEASE_TIMEOUT};

/// Settings for release discovery, downloads and installation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UpdaterConfig {
    /// Latest-release endpoint.
    #[serde(default = "default_releases_url")]
    pub releases_url: String,

    /// Directory downloads are written to.
    #[serde(default = "default_updates_dir")]
    pub updates_dir: PathBuf,

    /// Live installation to replace. Detected from the running executable when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_path: Option<PathBuf>,

    /// Timeout for the release metadata request, in seconds.
    #[serde(default = "default_release_timeout_secs")]
    pub release_timeout_secs: u64,

    /// Timeout for an asset download, in seconds.
    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,

    /// `User-Agent` header sent with every request.
    #[serde(default = "crate::constants::default_user_agent")]
    pub user_agent: String,
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            releases_url: default_releases_url(),
            updates_dir: default_updates_dir(),
            install_path: None,
            release_timeout_secs: default_release_timeout_secs(),
            download_timeout_secs: default_download_timeout_secs(),
            user_agent: crate::constants::default_user_agent(),
        }
    }
}

fn default_releases_url() -> String {
    DEFAULT_RELEASES_URL.to_string()
}

/// Per-user `updates` directory (`<data_local_dir>/kubelens/updates`).
pub fn default_updates_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(PRODUCT_NAME)
        .join("updates")
}

const fn default_release_timeout_secs() -> u64 {
    RELEASE_TIMEOUT.as_secs()
}

const fn default_download_timeout_secs() -> u64 {
    DOWNLOAD_TIMEOUT.as_secs()
}

impl UpdaterConfig {
    /// Load from the default location, falling back to defaults when the file is absent.
    pub async fn load() -> Result<Self> {
        Self::load_with_optional(None).await
    }

    /// Load from `path` if given, otherwise from the default location.
    ///
    /// A missing file yields the default configuration.
    pub async fn load_with_optional(path: Option<PathBuf>) -> Result<Self> {
        let path = match path {
            Some(path) => path,
            None => Self::default_path()?,
        };
        if path.exists() {
            Self::load_from(&path).await
        } else {
            Ok(Self::default())
        }
    }

    /// Load from a specific file.
    pub async fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read updater config from {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse updater config from {}", path.display()))
    }

    /// Write the configuration as pretty TOML, creating parent directories.
    pub async fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize updater config")?;

        fs::write(path, content)
            .await
            .with_context(|| format!("Failed to write updater config to {}", path.display()))
    }

    /// Platform default config path.
    ///
    /// - **Windows**: `%LOCALAPPDATA%\kubelens\updater.toml`
    /// - **Unix/macOS**: `~/.kubelens/updater.toml`
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = if cfg!(target_os = "windows") {
            dirs::data_local_dir()
                .ok_or_else(|| anyhow::anyhow!("Unable to determine local data directory"))?
                .join(PRODUCT_NAME)
        } else {
            dirs::home_dir()
                .ok_or_else(|| anyhow::anyhow!("Unable to determine home directory"))?
                .join(format!(".{PRODUCT_NAME}"))
        };

        Ok(config_dir.join("updater.toml"))
    }

    /// Release request timeout.
    #[must_use]
    pub const fn release_timeout(&self) -> Duration {
        Duration::from_secs(self.release_timeout_secs)
    }

    /// Download timeout.
    #[must_use]
    pub const fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }
}
