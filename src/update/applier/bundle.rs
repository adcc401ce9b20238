//! macOS: swap the `.app` bundle directory.

use std::path::{Path, PathBuf};
use std::process::{Child, Command};
use tracing::{debug, info, warn};

use super::{PlatformApplier, current_executable, remove_archive, spawn_detached, untouched};
use crate::constants::SCRATCH_PREFIX;
use crate::core::UpdateError;
use crate::update::archive;
use crate::update::backup::BackupManager;
use crate::utils::fs::{find_by_name, find_dir_with_extension, remove_path_if_exists, rename};
use crate::utils::platform::ArchiveFormat;

/// Replaces an application bundle by renaming directories.
///
/// The new bundle is extracted next to the live one, so both renames stay on one volume.
/// The previous bundle is left at `<bundle>.old` for startup cleanup; the running process
/// still has files open inside it.
#[derive(Debug, Clone)]
pub struct BundleApplier {
    bundle_path: PathBuf,
}

impl BundleApplier {
    /// Applier for the bundle at `bundle_path`.
    #[must_use]
    pub fn new(bundle_path: PathBuf) -> Self {
        Self {
            bundle_path,
        }
    }

    /// Uses `install_path`, or the `.app` directory enclosing the running executable.
    pub fn detect(install_path: Option<&Path>) -> Result<Self, UpdateError> {
        if let Some(path) = install_path {
            return Ok(Self::new(path.to_path_buf()));
        }
        let exe = current_executable()?;
        let bundle = exe
            .ancestors()
            .find(|p| p.extension().is_some_and(|ext| ext == "app"))
            .ok_or_else(|| UpdateError::Config {
                message: format!(
                    "{} is not inside an .app bundle; set install_path in updater.toml",
                    exe.display()
                ),
            })?;
        Ok(Self::new(bundle.to_path_buf()))
    }

    /// The live bundle.
    #[must_use]
    pub fn bundle_path(&self) -> &Path {
        &self.bundle_path
    }

    fn scratch_dir(&self) -> Result<PathBuf, UpdateError> {
        let parent = self.bundle_path.parent().ok_or_else(|| {
            untouched(UpdateError::Config {
                message: format!("{} has no parent directory", self.bundle_path.display()),
            })
        })?;
        Ok(parent.join(format!("{SCRATCH_PREFIX}{}", std::process::id())))
    }

    /// `open -n <bundle>`: a new instance even while this one is still exiting.
    fn relaunch_command(&self) -> Command {
        let mut command = Command::new("open");
        command.arg("-n").arg(&self.bundle_path);
        command
    }

    fn locate_new_bundle(&self, scratch: &Path) -> Result<PathBuf, UpdateError> {
        let name = self.bundle_path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        find_by_name(scratch, name, true)
            .or_else(|| find_dir_with_extension(scratch, "app"))
            .ok_or_else(|| {
                untouched(UpdateError::InvalidArchive {
                    reason: "no .app bundle found in update archive".to_string(),
                })
            })
    }

    fn install(&self, asset_path: &Path, scratch: &Path) -> Result<(), UpdateError> {
        remove_path_if_exists(scratch).map_err(untouched)?;
        archive::extract(asset_path, ArchiveFormat::Zip, scratch).map_err(untouched)?;
        let new_bundle = self.locate_new_bundle(scratch)?;
        debug!("New bundle extracted to {}", new_bundle.display());

        BackupManager::new(self.bundle_path.clone()).swap(|live| rename(&new_bundle, live))
    }
}

impl PlatformApplier for BundleApplier {
    fn name(&self) -> &'static str {
        "bundle"
    }

    fn apply_update(&self, asset_path: &Path) -> Result<(), UpdateError> {
        info!("Replacing bundle {}", self.bundle_path.display());
        let scratch = self.scratch_dir()?;

        let result = self.install(asset_path, &scratch);
        if let Err(e) = remove_path_if_exists(&scratch) {
            warn!("Failed to remove scratch directory: {}", e);
        }
        result?;

        clear_quarantine(&self.bundle_path);
        remove_archive(asset_path);
        info!("Bundle replaced");
        Ok(())
    }

    fn spawn_relaunch(&self) -> Result<Child, UpdateError> {
        spawn_detached(self.relaunch_command(), &self.bundle_path)
    }
}

/// Removes the Gatekeeper quarantine flag from a freshly extracted bundle.
///
/// Failure only means the user sees a confirmation dialog on next launch.
#[cfg(target_os = "macos")]
fn clear_quarantine(bundle: &Path) {
    match Command::new("xattr").args(["-dr", "com.apple.quarantine"]).arg(bundle).output() {
        Ok(output) if output.status.success() => debug!("Cleared quarantine attribute"),
        Ok(output) => warn!(
            "xattr exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        ),
        Err(e) => warn!("Failed to run xattr: {}", e),
    }
}

#[cfg(not(target_os = "macos"))]
fn clear_quarantine(_bundle: &Path) {}
