//! Streaming asset downloads.
//!
//! Bytes are written to a `.tmp` sibling of the destination in fixed-size chunks and renamed
//! into place only after the whole body arrived. On any failure (transport, disk or
//! cancellation) both the temp file and the destination are removed, so a file at the
//! destination path is always complete.

use futures::StreamExt;
use reqwest::Client;
use std::io;
use std::path::Path;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::constants::{DOWNLOAD_CHUNK_SIZE, TEMP_SUFFIX};
use crate::core::UpdateError;
use crate::utils::fs::{ensure_parent_dir, remove_file_if_exists, with_suffix};

/// HTTP downloader with a long timeout.
#[derive(Debug, Clone)]
pub struct Downloader {
    client: Client,
}

impl Downloader {
    /// Creates a downloader. `timeout` bounds a whole transfer, not a single read.
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, UpdateError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .map_err(|e| UpdateError::network("building HTTP client", &e))?;
        Ok(Self {
            client,
        })
    }

    /// Downloads `url` to `destination`.
    ///
    /// `on_progress(bytes_so_far, total_bytes)` runs after every chunk when the server
    /// announced a length. Returns the number of bytes written.
    pub async fn download<F>(
        &self,
        url: &str,
        destination: &Path,
        cancel: &CancellationToken,
        mut on_progress: F,
    ) -> Result<u64, UpdateError>
    where
        F: FnMut(u64, u64) + Send,
    {
        ensure_parent_dir(destination)?;
        remove_file_if_exists(destination)?;

        let tmp = with_suffix(destination, TEMP_SUFFIX);
        debug!("Downloading {} to {}", url, tmp.display());

        let written = match self.stream_to(url, &tmp, cancel, &mut on_progress).await {
            Ok(written) => written,
            Err(e) => {
                discard(&tmp).await;
                discard(destination).await;
                return Err(e);
            }
        };

        if let Err(e) = tokio::fs::rename(&tmp, destination).await {
            discard(&tmp).await;
            return Err(UpdateError::fs("rename", &tmp, &e));
        }

        info!("Downloaded {} bytes to {}", written, destination.display());
        Ok(written)
    }

    async fn stream_to<F>(
        &self,
        url: &str,
        tmp: &Path,
        cancel: &CancellationToken,
        on_progress: &mut F,
    ) -> Result<u64, UpdateError>
    where
        F: FnMut(u64, u64) + Send,
    {
        let response = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(UpdateError::Cancelled),
            response = self.client.get(url).send() => {
                response.map_err(|e| UpdateError::network("downloading update", &e))?
            }
        };

        let status = response.status();
        if !status.is_success() {
            return Err(UpdateError::Protocol {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let total = response.content_length();
        let stream = response.bytes_stream().map(|chunk| chunk.map_err(io::Error::other));
        let mut reader = StreamReader::new(Box::pin(stream));

        let mut file = File::create(tmp).await.map_err(|e| UpdateError::fs("create", tmp, &e))?;
        let mut buf = vec![0u8; DOWNLOAD_CHUNK_SIZE];
        let mut done: u64 = 0;

        loop {
            let read = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    debug!("Download of {} cancelled after {} bytes", url, done);
                    return Err(UpdateError::Cancelled);
                }
                read = reader.read(&mut buf) => read.map_err(|e| UpdateError::Network {
                    operation: "downloading update".to_string(),
                    reason: e.to_string(),
                })?,
            };
            if read == 0 {
                break;
            }

            file.write_all(&buf[..read]).await.map_err(|e| UpdateError::fs("write", tmp, &e))?;
            done += read as u64;
            if let Some(total) = total {
                on_progress(done, total);
            }
        }

        file.flush().await.map_err(|e| UpdateError::fs("flush", tmp, &e))?;
        file.sync_all().await.map_err(|e| UpdateError::fs("sync", tmp, &e))?;
        drop(file);

        if let Some(total) = total {
            if done != total {
                return Err(UpdateError::Network {
                    operation: "downloading update".to_string(),
                    reason: format!("body truncated: received {done} of {total} bytes"),
                });
            }
        }

        Ok(done)
    }
}

async fn discard(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!("Removed partial download {}", path.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
    }
}
