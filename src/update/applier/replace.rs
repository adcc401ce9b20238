//! Linux: replace the running binary in place.
//!
//! Unix keeps the old inode alive for the running process, so the live path can be
//! renamed aside and refilled while the application is still running.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Child, Command};
use tracing::{debug, info, warn};

use super::{PlatformApplier, current_executable, remove_archive, spawn_detached, untouched};
use crate::constants::SCRATCH_PREFIX;
use crate::core::UpdateError;
use crate::update::archive;
use crate::update::backup::BackupManager;
use crate::utils::fs::{find_by_name, set_executable};
use crate::utils::platform::ArchiveFormat;

/// Replaces a standalone executable by copy.
#[derive(Debug, Clone)]
pub struct ReplaceApplier {
    executable: PathBuf,
    args: Vec<OsString>,
}

impl ReplaceApplier {
    /// Applier for `executable`; relaunch passes no arguments.
    #[must_use]
    pub fn new(executable: PathBuf) -> Self {
        Self {
            executable,
            args: Vec::new(),
        }
    }

    /// Uses `install_path`, or the real path of the running executable. Relaunch reuses
    /// this process's arguments.
    pub fn detect(install_path: Option<&Path>) -> Result<Self, UpdateError> {
        let executable = match install_path {
            Some(path) => path.to_path_buf(),
            None => current_executable()?,
        };
        Ok(Self::new(executable).with_args(std::env::args_os().skip(1)))
    }

    /// Arguments passed to the relaunched process.
    #[must_use]
    pub fn with_args(mut self, args: impl IntoIterator<Item = OsString>) -> Self {
        self.args = args.into_iter().collect();
        self
    }

    /// The live executable.
    #[must_use]
    pub fn executable(&self) -> &Path {
        &self.executable
    }

    fn relaunch_command(&self) -> Command {
        let mut command = Command::new(&self.executable);
        command.args(&self.args);
        command
    }
}

impl PlatformApplier for ReplaceApplier {
    fn name(&self) -> &'static str {
        "replace"
    }

    fn apply_update(&self, asset_path: &Path) -> Result<(), UpdateError> {
        info!("Replacing executable {}", self.executable.display());

        let scratch = tempfile::Builder::new()
            .prefix(&format!("{SCRATCH_PREFIX}{}-", std::process::id()))
            .tempdir()
            .map_err(|e| untouched(UpdateError::fs("create scratch directory", &std::env::temp_dir(), &e)))?;
        archive::extract(asset_path, ArchiveFormat::TarGz, scratch.path()).map_err(untouched)?;

        let name = self.executable.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        let new_binary = find_by_name(scratch.path(), name, false).ok_or_else(|| {
            untouched(UpdateError::InvalidArchive {
                reason: format!("no '{name}' binary found in update archive"),
            })
        })?;
        debug!("New binary extracted to {}", new_binary.display());

        let backup = BackupManager::new(self.executable.clone());
        backup.swap(|live| {
            fs::copy(&new_binary, live).map_err(|e| UpdateError::fs("copy new binary to", live, &e))?;
            set_executable(live)
        })?;

        if let Err(e) = backup.discard() {
            warn!("Failed to delete backup, leaving it for startup cleanup: {}", e);
        }
        remove_archive(asset_path);
        info!("Executable replaced");
        Ok(())
    }

    fn spawn_relaunch(&self) -> Result<Child, UpdateError> {
        spawn_detached(self.relaunch_command(), &self.executable)
    }
}
