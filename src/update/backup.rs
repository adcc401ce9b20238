//! Move-aside backups of the live installation.
//!
//! Before an applier touches the live installation it renames it to a `.old` sibling. The
//! rename keeps the backup on the same filesystem as the live path, so both the move and the
//! restore are single atomic renames and work for files and bundle directories alike.
//!
//! [`BackupManager::swap`] wraps an install step in the shared failure discipline: the
//! result is either the new installation in place, or the previous one restored, or an
//! error that names the surviving backup.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::constants::BACKUP_SUFFIX;
use crate::core::{RollbackOutcome, UpdateError};
use crate::utils::fs::{remove_path_if_exists, with_suffix};

/// Attempts made to rename a backup back into place.
///
/// Windows can briefly hold handles on freshly written files (antivirus, indexer).
const RESTORE_ATTEMPTS: u32 = 3;
const RESTORE_RETRY_DELAY: Duration = Duration::from_millis(250);

/// Manages the `.old` sibling of a live installation.
///
/// # Examples
///
/// ```rust,no_run
/// use kubelens_updater::update::backup::BackupManager;
/// use std::path::PathBuf;
///
/// let manager = BackupManager::new(PathBuf::from("/opt/kubelens/kubelens"));
/// assert_eq!(manager.backup_path(), PathBuf::from("/opt/kubelens/kubelens.old"));
/// ```
#[derive(Debug, Clone)]
pub struct BackupManager {
    /// Path of the live installation (file or bundle directory).
    live_path: PathBuf,
    /// Where the live installation is parked during replacement.
    backup_path: PathBuf,
}

impl BackupManager {
    /// Manager for `live_path`; the backup lives at `<live_path>.old`.
    #[must_use]
    pub fn new(live_path: PathBuf) -> Self {
        let backup_path = with_suffix(&live_path, BACKUP_SUFFIX);
        Self {
            live_path,
            backup_path,
        }
    }

    /// The live installation path.
    #[must_use]
    pub fn live_path(&self) -> &Path {
        &self.live_path
    }

    /// The backup path.
    #[must_use]
    pub fn backup_path(&self) -> &Path {
        &self.backup_path
    }

    /// Whether a backup currently exists.
    #[must_use]
    pub fn backup_exists(&self) -> bool {
        fs::symlink_metadata(&self.backup_path).is_ok()
    }

    /// Removes a backup left by an earlier update.
    pub fn remove_stale_backup(&self) -> Result<(), UpdateError> {
        if self.backup_exists() {
            debug!("Removing stale backup at {}", self.backup_path.display());
        }
        remove_path_if_exists(&self.backup_path)
    }

    /// Renames the live installation to the backup path.
    pub fn move_aside(&self) -> Result<(), UpdateError> {
        info!("Moving {} aside to {}", self.live_path.display(), self.backup_path.display());
        fs::rename(&self.live_path, &self.backup_path)
            .map_err(|e| UpdateError::fs("move aside", &self.live_path, &e))
    }

    /// Renames the backup back to the live path.
    ///
    /// A partially written regular file at the live path is removed first. A directory at the
    /// live path is never deleted, so restoration fails rather than destroy unknown content.
    pub fn restore(&self) -> Result<(), UpdateError> {
        warn!("Restoring {} from {}", self.live_path.display(), self.backup_path.display());

        let mut last_error = None;
        for attempt in 1..=RESTORE_ATTEMPTS {
            match self.attempt_restore() {
                Ok(()) => {
                    info!("Successfully restored from backup");
                    return Ok(());
                }
                Err(e) => {
                    warn!("Restore attempt {} failed: {}", attempt, e);
                    last_error = Some(e);
                    if attempt < RESTORE_ATTEMPTS {
                        std::thread::sleep(RESTORE_RETRY_DELAY);
                    }
                }
            }
        }

        Err(last_error.unwrap_or(UpdateError::Filesystem {
            operation: "restore".to_string(),
            path: self.backup_path.clone(),
            kind: std::io::ErrorKind::Other,
            reason: "no restore attempt was made".to_string(),
        }))
    }

    fn attempt_restore(&self) -> Result<(), UpdateError> {
        if let Ok(metadata) = fs::symlink_metadata(&self.live_path) {
            if !metadata.is_dir() {
                fs::remove_file(&self.live_path)
                    .map_err(|e| UpdateError::fs("remove partial install", &self.live_path, &e))?;
            }
        }
        fs::rename(&self.backup_path, &self.live_path)
            .map_err(|e| UpdateError::fs("restore backup", &self.backup_path, &e))
    }

    /// Deletes the backup after a successful replacement.
    pub fn discard(&self) -> Result<(), UpdateError> {
        debug!("Cleaning up backup at {}", self.backup_path.display());
        remove_path_if_exists(&self.backup_path)
    }

    /// Moves the live installation aside, runs `install`, and restores on failure.
    ///
    /// `install` receives the now-vacant live path. The backup is kept on success; callers
    /// decide whether to [`discard`](Self::discard) it now or leave it for startup cleanup.
    ///
    /// Errors are always [`UpdateError::ApplyFailed`] with the [`RollbackOutcome`] set.
    pub fn swap<F>(&self, install: F) -> Result<(), UpdateError>
    where
        F: FnOnce(&Path) -> Result<(), UpdateError>,
    {
        let untouched = |e: UpdateError| UpdateError::ApplyFailed {
            reason: e.to_string(),
            rollback: RollbackOutcome::Untouched,
        };

        self.remove_stale_backup().map_err(untouched)?;
        self.move_aside().map_err(untouched)?;

        let Err(install_error) = install(&self.live_path) else {
            return Ok(());
        };

        warn!("Install step failed: {}", install_error);
        let rollback = match self.restore() {
            Ok(()) => RollbackOutcome::Restored,
            Err(restore_error) => RollbackOutcome::RestoreFailed {
                backup: self.backup_path.clone(),
                reason: restore_error.to_string(),
            },
        };

        Err(UpdateError::ApplyFailed {
            reason: install_error.to_string(),
            rollback,
        })
    }
}
