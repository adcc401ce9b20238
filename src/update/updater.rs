//! The update orchestrator.
//!
//! [`Updater`] is the only stateful entity of the subsystem. It owns a single [`Phase`]
//! behind one mutex; every per-state datum (progress, cancel handle, downloaded file) lives
//! inside the phase variant it belongs to, so a status snapshot can never mix two states.
//!
//! ```text
//! Idle | Error --start_download--> Downloading --ok--> Ready --apply--> Applying --ok--> Idle
//!                                       \--err--> Error                    \--err--> Error
//! ```
//!
//! The mutex is never held across I/O: the download runs on a Tokio task and writes
//! progress under the lock per chunk, and `apply` runs the platform applier on the blocking
//! pool after recording `Applying`.

use futures::FutureExt;
use parking_lot::Mutex;
use std::any::Any;
use std::convert::Infallible;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::UpdaterConfig;
use crate::core::UpdateError;
use crate::update::applier::{PlatformApplier, native_applier};
use crate::update::asset::require_asset;
use crate::update::download::Downloader;
use crate::update::release::ReleaseClient;
use crate::update::status::{UpdateState, UpdateStatus};
use crate::update::verification::ChecksumVerifier;
use crate::utils::fs::remove_file_if_exists;
use crate::utils::platform::PlatformTarget;

/// Per-state data of the updater.
#[derive(Debug)]
enum Phase {
    Idle,
    Downloading {
        progress: f64,
        cancel: CancellationToken,
    },
    Ready {
        asset_path: PathBuf,
        asset_name: String,
    },
    Applying {
        asset_path: PathBuf,
    },
    Error {
        error: UpdateError,
    },
}

impl Phase {
    const fn state(&self) -> UpdateState {
        match self {
            Self::Idle => UpdateState::Idle,
            Self::Downloading {
                ..
            } => UpdateState::Downloading,
            Self::Ready {
                ..
            } => UpdateState::Ready,
            Self::Applying {
                ..
            } => UpdateState::Applying,
            Self::Error {
                ..
            } => UpdateState::Error,
        }
    }
}

#[derive(Debug)]
struct Inner {
    phase: Phase,
    version: String,
    task: Option<JoinHandle<()>>,
}

/// Everything the background download needs, shared with the task.
struct Pipeline {
    releases: ReleaseClient,
    downloader: Downloader,
    target: PlatformTarget,
    updates_dir: PathBuf,
}

/// Discovers, downloads, verifies and applies updates.
///
/// # Examples
///
/// ```rust,no_run
/// use kubelens_updater::config::UpdaterConfig;
/// use kubelens_updater::update::{UpdateState, Updater};
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> anyhow::Result<()> {
/// let updater = Updater::new(&UpdaterConfig::load().await?)?;
/// updater.start_download(&CancellationToken::new())?;
/// updater.wait().await;
///
/// if updater.status().state == UpdateState::Ready {
///     updater.apply().await?;
///     updater.relaunch()?;
/// }
/// # Ok(())
/// # }
/// ```
pub struct Updater {
    inner: Arc<Mutex<Inner>>,
    pipeline: Arc<Pipeline>,
    applier: Arc<dyn PlatformApplier>,
}

impl Updater {
    /// Updater for the running platform with its native applier.
    pub fn new(config: &UpdaterConfig) -> Result<Self, UpdateError> {
        let applier = native_applier(config.install_path.as_deref())?;
        Self::with_applier(config, PlatformTarget::current(), applier)
    }

    /// Updater for an explicit target and applier.
    pub fn with_applier(
        config: &UpdaterConfig,
        target: PlatformTarget,
        applier: Arc<dyn PlatformApplier>,
    ) -> Result<Self, UpdateError> {
        let releases = ReleaseClient::new(
            config.releases_url.clone(),
            &config.user_agent,
            config.release_timeout(),
        )?;
        let downloader = Downloader::new(&config.user_agent, config.download_timeout())?;

        debug!("Updater for {} using the {} applier", target, applier.name());
        Ok(Self {
            inner: Arc::new(Mutex::new(Inner {
                phase: Phase::Idle,
                version: String::new(),
                task: None,
            })),
            pipeline: Arc::new(Pipeline {
                releases,
                downloader,
                target,
                updates_dir: config.updates_dir.clone(),
            }),
            applier,
        })
    }

    /// Snapshot of the current state. Never waits on the background task.
    #[must_use]
    pub fn status(&self) -> UpdateStatus {
        let inner = self.inner.lock();
        let (progress, error) = match &inner.phase {
            Phase::Downloading {
                progress,
                ..
            } => (*progress, None),
            Phase::Ready {
                ..
            } => (1.0, None),
            Phase::Error {
                error,
            } => (0.0, Some(error.to_string())),
            Phase::Idle
            | Phase::Applying {
                ..
            } => (0.0, None),
        };
        UpdateStatus {
            state: inner.phase.state(),
            progress,
            version: inner.version.clone(),
            error,
        }
    }

    /// Location of the verified download; defined only in `Ready` and `Applying`.
    #[must_use]
    pub fn downloaded_asset(&self) -> Option<PathBuf> {
        match &self.inner.lock().phase {
            Phase::Ready {
                asset_path,
                ..
            }
            | Phase::Applying {
                asset_path,
            } => Some(asset_path.clone()),
            _ => None,
        }
    }

    /// The failure behind the `Error` state.
    #[must_use]
    pub fn last_error(&self) -> Option<UpdateError> {
        match &self.inner.lock().phase {
            Phase::Error {
                error,
            } => Some(error.clone()),
            _ => None,
        }
    }

    /// Starts resolve, select, download and verify in the background.
    ///
    /// Allowed from `Idle` and `Error`; rejected without any change otherwise. The download
    /// observes a child of `parent`, so cancelling `parent` (or calling
    /// [`cancel_download`](Self::cancel_download)) stops it. Must be called within a Tokio
    /// runtime.
    pub fn start_download(&self, parent: &CancellationToken) -> Result<(), UpdateError> {
        let cancel = parent.child_token();
        let mut inner = self.inner.lock();

        match inner.phase {
            Phase::Idle | Phase::Error { .. } => {}
            ref other => {
                return Err(UpdateError::InvalidState {
                    operation: "start a download",
                    state: other.state(),
                });
            }
        }

        info!("Starting update download");
        inner.phase = Phase::Downloading {
            progress: 0.0,
            cancel: cancel.clone(),
        };

        let state = Arc::clone(&self.inner);
        let pipeline = Arc::clone(&self.pipeline);
        inner.task = Some(tokio::spawn(async move {
            let outcome = AssertUnwindSafe(pipeline.run(&state, &cancel)).catch_unwind().await;
            let outcome = outcome.unwrap_or_else(|panic| {
                Err(UpdateError::TaskFailed {
                    task: "download",
                    reason: panic_message(panic.as_ref()),
                })
            });

            let mut inner = state.lock();
            inner.phase = match outcome {
                Ok((asset_path, asset_name)) => {
                    info!("Update {} is ready to apply", inner.version);
                    Phase::Ready {
                        asset_path,
                        asset_name,
                    }
                }
                Err(e) => {
                    error!("Update download failed: {}", e);
                    Phase::Error {
                        error: e,
                    }
                }
            };
        }));
        Ok(())
    }

    /// Cancels the in-flight download. Returns whether one was running.
    pub fn cancel_download(&self) -> bool {
        match &self.inner.lock().phase {
            Phase::Downloading {
                cancel,
                ..
            } => {
                info!("Cancelling update download");
                cancel.cancel();
                true
            }
            _ => false,
        }
    }

    /// Waits for the current background download, if any, to finish.
    pub async fn wait(&self) {
        let task = self.inner.lock().task.take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                // Only reachable if the task was aborted; panics are caught inside it
                warn!("Download task ended abnormally: {}", e);
            }
        }
    }

    /// Installs the downloaded update. Only allowed in `Ready`; not cancellable.
    ///
    /// On success the state returns to `Idle` and [`relaunch`](Self::relaunch) starts the
    /// new version.
    pub async fn apply(&self) -> Result<(), UpdateError> {
        let asset_path = {
            let mut inner = self.inner.lock();
            let Phase::Ready {
                asset_path,
                asset_name,
            } = &inner.phase
            else {
                return Err(UpdateError::InvalidState {
                    operation: "apply an update",
                    state: inner.phase.state(),
                });
            };
            info!("Applying {} ({})", asset_name, inner.version);
            let asset_path = asset_path.clone();
            inner.phase = Phase::Applying {
                asset_path: asset_path.clone(),
            };
            asset_path
        };

        let applier = Arc::clone(&self.applier);
        let joined = tokio::task::spawn_blocking(move || applier.apply_update(&asset_path)).await;
        let result = joined.unwrap_or_else(|e| {
            let reason = if e.is_panic() {
                panic_message(e.into_panic().as_ref())
            } else {
                e.to_string()
            };
            Err(UpdateError::TaskFailed {
                task: "apply",
                reason,
            })
        });

        let mut inner = self.inner.lock();
        match result {
            Ok(()) => {
                info!("Update {} applied", inner.version);
                inner.phase = Phase::Idle;
                Ok(())
            }
            Err(e) => {
                error!("Applying update failed: {}", e);
                inner.phase = Phase::Error {
                    error: e.clone(),
                };
                Err(e)
            }
        }
    }

    /// Starts the installed version and exits this process.
    ///
    /// Rejected while a download or apply is in progress.
    pub fn relaunch(&self) -> Result<Infallible, UpdateError> {
        {
            let inner = self.inner.lock();
            if matches!(inner.phase, Phase::Downloading { .. } | Phase::Applying { .. }) {
                return Err(UpdateError::InvalidState {
                    operation: "relaunch",
                    state: inner.phase.state(),
                });
            }
        }
        self.applier.relaunch()
    }
}

impl Pipeline {
    async fn run(
        &self,
        state: &Arc<Mutex<Inner>>,
        cancel: &CancellationToken,
    ) -> Result<(PathBuf, String), UpdateError> {
        let release = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(UpdateError::Cancelled),
            release = self.releases.fetch_latest() => release?,
        };
        state.lock().version = release.version().to_string();

        let asset = require_asset(&release, &self.target)?;
        info!("Selected {} ({} bytes) for {}", asset.name, asset.size, self.target);

        let destination = self.updates_dir.join(&asset.name);
        let progress_state = Arc::clone(state);
        self.downloader
            .download(&asset.download_url, &destination, cancel, move |done, total| {
                if total == 0 {
                    return;
                }
                if let Phase::Downloading {
                    progress,
                    ..
                } = &mut progress_state.lock().phase
                {
                    #[allow(clippy::cast_precision_loss)]
                    let fraction = done as f64 / total as f64;
                    *progress = fraction.clamp(0.0, 1.0);
                }
            })
            .await?;

        if let Err(e) =
            ChecksumVerifier::verify_from_release(&self.releases, &release, &asset.name, &destination)
                .await
        {
            if let Err(cleanup) = remove_file_if_exists(&destination) {
                warn!("Failed to delete unverified download: {}", cleanup);
            }
            return Err(e);
        }

        Ok((destination, asset.name.clone()))
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
