//! Release metadata and the latest-release resolver.
//!
//! The release service returns GitHub-style JSON:
//!
//! ```json
//! {
//!   "tag_name": "v1.2.3",
//!   "html_url": "https://github.com/kubelens/kubelens/releases/tag/v1.2.3",
//!   "body": "Changelog...",
//!   "assets": [
//!     { "name": "kubelens-desktop_1.2.3_linux_amd64.tar.gz",
//!       "browser_download_url": "https://...", "size": 123 }
//!   ]
//! }
//! ```
//!
//! [`Release`] is immutable once fetched.

use reqwest::Client;
use semver::Version;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use crate::core::UpdateError;

/// A published release.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Release {
    /// Version tag, usually `v<semver>`.
    #[serde(rename = "tag_name")]
    pub tag: String,
    /// Human-facing release page.
    #[serde(default)]
    pub html_url: String,
    /// Release notes.
    #[serde(default)]
    pub body: Option<String>,
    /// Attached assets in publication order.
    #[serde(default)]
    pub assets: Vec<Asset>,
}

/// A downloadable file attached to a release.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Asset {
    /// Exact file name; the identity of the asset.
    pub name: String,
    /// Direct download URL.
    #[serde(rename = "browser_download_url")]
    pub download_url: String,
    /// Size in bytes as published.
    #[serde(default)]
    pub size: u64,
}

impl Release {
    /// The tag without a leading `v`.
    #[must_use]
    pub fn version(&self) -> &str {
        self.tag.strip_prefix('v').unwrap_or(&self.tag)
    }

    /// Looks up an asset by exact name.
    #[must_use]
    pub fn asset_named(&self, name: &str) -> Option<&Asset> {
        self.assets.iter().find(|asset| asset.name == name)
    }

    /// Whether this release is a newer semantic version than `current`.
    ///
    /// Unparsable versions on either side compare as "not newer".
    #[must_use]
    pub fn is_newer_than(&self, current: &str) -> bool {
        let current = current.strip_prefix('v').unwrap_or(current);
        match (Version::parse(self.version()), Version::parse(current)) {
            (Ok(latest), Ok(current)) => latest > current,
            _ => false,
        }
    }
}

/// HTTP client for release metadata and small text assets.
#[derive(Debug, Clone)]
pub struct ReleaseClient {
    client: Client,
    releases_url: String,
}

impl ReleaseClient {
    /// Creates a client for `releases_url` with the given timeout and `User-Agent`.
    pub fn new(
        releases_url: impl Into<String>,
        user_agent: &str,
        timeout: Duration,
    ) -> Result<Self, UpdateError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .map_err(|e| UpdateError::network("building HTTP client", &e))?;
        Ok(Self {
            client,
            releases_url: releases_url.into(),
        })
    }

    /// Endpoint this client queries.
    #[must_use]
    pub fn releases_url(&self) -> &str {
        &self.releases_url
    }

    /// Fetches and decodes the latest release.
    pub async fn fetch_latest(&self) -> Result<Release, UpdateError> {
        debug!("Fetching latest release from {}", self.releases_url);

        let body = self.fetch_text(&self.releases_url, "release metadata").await?;
        let release: Release = serde_json::from_str(&body).map_err(|e| UpdateError::Decode {
            what: "release metadata".to_string(),
            reason: e.to_string(),
        })?;

        info!("Latest release is {} with {} assets", release.tag, release.assets.len());
        Ok(release)
    }

    /// GETs `url` and returns the body as text.
    ///
    /// Transport failures map to [`UpdateError::Network`], non-2xx statuses to
    /// [`UpdateError::Protocol`].
    pub async fn fetch_text(&self, url: &str, what: &str) -> Result<String, UpdateError> {
        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json, */*")
            .send()
            .await
            .map_err(|e| UpdateError::network(format!("fetching {what}"), &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpdateError::Protocol {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response.text().await.map_err(|e| UpdateError::network(format!("reading {what}"), &e))
    }
}
