//! SHA-256 verification against the release checksum manifest.
//!
//! Every release carries a `checksums.txt` asset with `sha256sum`-style lines:
//!
//! ```text
//! 3a7bd3e2360a3d29eea436fcfb7e44c735d117c42d1c1835420b6b9942dd4f1b  kubelens-desktop_1.2.3_linux_amd64.tar.gz
//! ```
//!
//! Verification fails closed: a missing manifest, a missing entry and a digest mismatch are
//! three distinct errors, and none of them lets the download through.

use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tracing::{debug, info, warn};

use crate::constants::{CHECKSUM_MANIFEST_NAME, DOWNLOAD_CHUNK_SIZE};
use crate::core::UpdateError;
use crate::update::release::{Release, ReleaseClient};

/// Verifies downloaded files against published SHA-256 digests.
pub struct ChecksumVerifier;

impl ChecksumVerifier {
    /// Computes the lowercase hex SHA-256 of a file, streaming it in chunks.
    pub async fn compute_sha256(file_path: &Path) -> Result<String, UpdateError> {
        debug!("Computing SHA256 checksum for {}", file_path.display());

        let mut file =
            File::open(file_path).await.map_err(|e| UpdateError::fs("open", file_path, &e))?;
        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; DOWNLOAD_CHUNK_SIZE];
        loop {
            let read =
                file.read(&mut buf).await.map_err(|e| UpdateError::fs("read", file_path, &e))?;
            if read == 0 {
                break;
            }
            hasher.update(&buf[..read]);
        }

        Ok(hex::encode(hasher.finalize()))
    }

    /// Finds the digest for `file_name` in manifest text.
    ///
    /// Lines are `<hex-digest> <filename>` separated by whitespace; the `*` binary-mode marker
    /// written by `sha256sum -b` is ignored. The file name must match exactly.
    #[must_use]
    pub fn parse_manifest(content: &str, file_name: &str) -> Option<String> {
        content.lines().find_map(|line| {
            let (digest, name) = line.trim().split_once(char::is_whitespace)?;
            let name = name.trim_start();
            let name = name.strip_prefix('*').unwrap_or(name);
            (name == file_name).then(|| digest.to_string())
        })
    }

    /// Compares a file against an expected digest, ignoring case.
    pub async fn verify_checksum(
        file_path: &Path,
        file_name: &str,
        expected: &str,
    ) -> Result<(), UpdateError> {
        info!("Verifying checksum for {}", file_path.display());

        let actual = Self::compute_sha256(file_path).await?;
        let expected = expected.to_ascii_lowercase();
        if actual != expected {
            warn!("Checksum mismatch for {}: expected {}, got {}", file_name, expected, actual);
            return Err(UpdateError::ChecksumMismatch {
                file: file_name.to_string(),
                expected,
                actual,
            });
        }

        info!("Checksum verification successful");
        Ok(())
    }

    /// Downloads the release manifest and verifies `file_path` (published as `asset_name`).
    pub async fn verify_from_release(
        client: &ReleaseClient,
        release: &Release,
        asset_name: &str,
        file_path: &Path,
    ) -> Result<(), UpdateError> {
        let manifest = release.asset_named(CHECKSUM_MANIFEST_NAME).ok_or_else(|| {
            UpdateError::ChecksumManifestMissing {
                manifest: CHECKSUM_MANIFEST_NAME.to_string(),
                version: release.version().to_string(),
            }
        })?;

        debug!("Fetching checksums from {}", manifest.download_url);
        let content = client.fetch_text(&manifest.download_url, "checksum manifest").await?;

        let expected = Self::parse_manifest(&content, asset_name).ok_or_else(|| {
            UpdateError::ChecksumEntryMissing {
                file: asset_name.to_string(),
                manifest: CHECKSUM_MANIFEST_NAME.to_string(),
            }
        })?;

        Self::verify_checksum(file_path, asset_name, &expected).await
    }
}
