//! Test utilities for the updater
//!
//! Builders for update archives (zip and tar.gz, including hostile entries the regular
//! builders refuse to write) and a stub release server built on `wiremock`.
//!
//! # Example
//!
//! ```rust,no_run
//! use kubelens_updater::test_utils::{ReleaseFixture, TestEntry, build_tar_gz};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let temp = tempfile::TempDir::new()?;
//! let archive = temp.path().join("build.tar.gz");
//! build_tar_gz(&archive, &[TestEntry::file("kubelens", b"#!/bin/sh\n", 0o755)])?;
//!
//! let server = wiremock::MockServer::start().await;
//! ReleaseFixture::new("1.2.3")
//!     .asset("kubelens-desktop_1.2.3_linux_amd64.tar.gz", std::fs::read(&archive)?)
//!     .mount(&server)
//!     .await;
//! # Ok(())
//! # }
//! ```

use anyhow::Result;
use flate2::Compression;
use flate2::write::GzEncoder;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::Once;
use tracing::Level;
use tracing_subscriber::EnvFilter;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use zip::write::SimpleFileOptions;

use crate::constants::CHECKSUM_MANIFEST_NAME;

/// Global flag to ensure logging is only initialized once in tests
static INIT_LOGGING: Once = Once::new();

/// Initialize logging for tests.
///
/// Uses `level` when given, otherwise `RUST_LOG`; with neither, logging stays off.
///
/// ```bash
/// RUST_LOG=kubelens_updater=debug cargo test
/// ```
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(false)
            .try_init();
    });
}

/// Lowercase hex SHA-256 of `data`.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// One entry of a test archive.
#[derive(Debug, Clone)]
pub enum TestEntry {
    /// Directory with permission bits.
    Dir {
        /// Entry name
        name: String,
        /// Unix mode
        mode: u32,
    },
    /// Regular file with content and permission bits.
    File {
        /// Entry name
        name: String,
        /// Content
        data: Vec<u8>,
        /// Unix mode
        mode: u32,
    },
    /// Symbolic link.
    Symlink {
        /// Entry name
        name: String,
        /// Link target
        target: String,
    },
}

impl TestEntry {
    /// Directory entry.
    pub fn dir(name: &str, mode: u32) -> Self {
        Self::Dir {
            name: name.to_string(),
            mode,
        }
    }

    /// File entry.
    pub fn file(name: &str, data: &[u8], mode: u32) -> Self {
        Self::File {
            name: name.to_string(),
            data: data.to_vec(),
            mode,
        }
    }

    /// Symlink entry.
    pub fn symlink(name: &str, target: &str) -> Self {
        Self::Symlink {
            name: name.to_string(),
            target: target.to_string(),
        }
    }
}

/// Writes a zip archive. Entry names are stored verbatim, so `../x` and `/x` are possible.
pub fn build_zip(archive: &Path, entries: &[TestEntry]) -> Result<()> {
    let mut writer = zip::ZipWriter::new(File::create(archive)?);
    for entry in entries {
        match entry {
            TestEntry::Dir {
                name,
                mode,
            } => {
                let options = SimpleFileOptions::default().unix_permissions(*mode);
                writer.add_directory(name.as_str(), options)?;
            }
            TestEntry::File {
                name,
                data,
                mode,
            } => {
                let options = SimpleFileOptions::default().unix_permissions(*mode);
                writer.start_file(name.as_str(), options)?;
                writer.write_all(data)?;
            }
            TestEntry::Symlink {
                name,
                target,
            } => {
                writer.add_symlink(name.as_str(), target.as_str(), SimpleFileOptions::default())?;
            }
        }
    }
    writer.finish()?;
    Ok(())
}

/// Writes a gzip-compressed tarball.
///
/// Names are written straight into the header so traversal and absolute entries can be
/// produced; they must fit the 100-byte name field.
pub fn build_tar_gz(archive: &Path, entries: &[TestEntry]) -> Result<()> {
    let encoder = GzEncoder::new(File::create(archive)?, Compression::default());
    let mut builder = tar::Builder::new(encoder);

    for entry in entries {
        let mut header = tar::Header::new_gnu();
        let (name, data): (&str, &[u8]) = match entry {
            TestEntry::Dir {
                name,
                mode,
            } => {
                header.set_entry_type(tar::EntryType::Directory);
                header.set_mode(*mode);
                (name, &[])
            }
            TestEntry::File {
                name,
                data,
                mode,
            } => {
                header.set_entry_type(tar::EntryType::Regular);
                header.set_mode(*mode);
                (name, data)
            }
            TestEntry::Symlink {
                name,
                target,
            } => {
                header.set_entry_type(tar::EntryType::Symlink);
                header.set_mode(0o777);
                header.set_link_name(target)?;
                (name, &[])
            }
        };

        anyhow::ensure!(name.len() <= 100, "test entry name too long: {name}");
        let gnu = header
            .as_gnu_mut()
            .ok_or_else(|| anyhow::anyhow!("expected a GNU header"))?;
        gnu.name[..name.len()].copy_from_slice(name.as_bytes());
        header.set_size(data.len() as u64);
        header.set_cksum();
        builder.append(&header, data)?;
    }

    builder.into_inner()?.finish()?;
    Ok(())
}

/// A release served by a [`MockServer`].
///
/// Mounts `GET /releases/latest` plus one `GET /download/<name>` per asset, and by default
/// a correct `checksums.txt` covering every asset.
#[derive(Debug, Clone)]
pub struct ReleaseFixture {
    version: String,
    assets: Vec<(String, Vec<u8>)>,
    manifest: Option<String>,
    manifest_overridden: bool,
}

impl ReleaseFixture {
    /// Release tagged `v<version>` with no assets.
    pub fn new(version: &str) -> Self {
        Self {
            version: version.to_string(),
            assets: Vec::new(),
            manifest: None,
            manifest_overridden: false,
        }
    }

    /// Adds an asset.
    #[must_use]
    pub fn asset(mut self, name: &str, data: Vec<u8>) -> Self {
        self.assets.push((name.to_string(), data));
        self
    }

    /// Publishes no checksum manifest.
    #[must_use]
    pub fn without_manifest(mut self) -> Self {
        self.manifest = None;
        self.manifest_overridden = true;
        self
    }

    /// Publishes `content` as the checksum manifest.
    #[must_use]
    pub fn with_manifest(mut self, content: impl Into<String>) -> Self {
        self.manifest = Some(content.into());
        self.manifest_overridden = true;
        self
    }

    /// Endpoint to configure as `releases_url`.
    pub fn releases_url(server: &MockServer) -> String {
        format!("{}/releases/latest", server.uri())
    }

    fn manifest_content(&self) -> Option<String> {
        if self.manifest_overridden {
            return self.manifest.clone();
        }
        Some(
            self.assets
                .iter()
                .map(|(name, data)| format!("{}  {}\n", sha256_hex(data), name))
                .collect(),
        )
    }

    /// Mounts the release on `server`.
    pub async fn mount(&self, server: &MockServer) {
        let base = server.uri();
        let mut assets: Vec<serde_json::Value> = self
            .assets
            .iter()
            .map(|(name, data)| {
                serde_json::json!({
                    "name": name,
                    "browser_download_url": format!("{base}/download/{name}"),
                    "size": data.len(),
                })
            })
            .collect();

        if let Some(manifest) = self.manifest_content() {
            assets.push(serde_json::json!({
                "name": CHECKSUM_MANIFEST_NAME,
                "browser_download_url": format!("{base}/download/{CHECKSUM_MANIFEST_NAME}"),
                "size": manifest.len(),
            }));
            Mock::given(method("GET"))
                .and(path(format!("/download/{CHECKSUM_MANIFEST_NAME}")))
                .respond_with(ResponseTemplate::new(200).set_body_string(manifest))
                .mount(server)
                .await;
        }

        for (name, data) in &self.assets {
            Mock::given(method("GET"))
                .and(path(format!("/download/{name}")))
                .respond_with(ResponseTemplate::new(200).set_body_bytes(data.clone()))
                .mount(server)
                .await;
        }

        Mock::given(method("GET"))
            .and(path("/releases/latest"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "tag_name": format!("v{}", self.version),
                "html_url": format!("{base}/releases/tag/v{}", self.version),
                "body": "Bug fixes and improvements",
                "assets": assets,
            })))
            .mount(server)
            .await;
    }
}
