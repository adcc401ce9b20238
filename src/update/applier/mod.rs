//! Platform-specific replacement of the live installation.
//!
//! Three replacement models share one contract, [`PlatformApplier`]:
//!
//! | Platform | Applier | Archive | Model |
//! |----------|---------|---------|-------|
//! | macOS | [`BundleApplier`] | zip | rename the `.app` bundle aside, rename the new one in |
//! | Windows | [`TrampolineApplier`] | zip | the running `.exe` is locked; a batch script swaps it after exit |
//! | Linux | [`ReplaceApplier`] | tar.gz | rename the binary aside, copy the new one in |
//!
//! All three are compiled everywhere so they can be tested on any host; [`native_applier`]
//! picks the one for the build target.

mod bundle;
mod replace;
mod trampoline;

pub use bundle::BundleApplier;
pub use replace::ReplaceApplier;
pub use trampoline::TrampolineApplier;

use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use tracing::{info, warn};

use crate::core::{RollbackOutcome, UpdateError};
use crate::utils::fs::remove_file_if_exists;

/// Replaces the live installation and restarts into it.
pub trait PlatformApplier: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Installs the verified archive at `asset_path`.
    ///
    /// On error the installation is either untouched or restored, and the
    /// [`UpdateError::ApplyFailed`] rollback field says which.
    fn apply_update(&self, asset_path: &Path) -> Result<(), UpdateError>;

    /// Starts the updated application and returns its handle.
    fn spawn_relaunch(&self) -> Result<Child, UpdateError>;

    /// Starts the updated application and exits the current process.
    ///
    /// Only returns on failure to start.
    fn relaunch(&self) -> Result<Infallible, UpdateError> {
        let child = self.spawn_relaunch()?;
        info!("Relaunched via {} (pid {}); exiting", self.name(), child.id());
        std::process::exit(0)
    }
}

/// The applier for the platform this binary was built for.
///
/// `install_path` overrides the detected installation (bundle or executable).
pub fn native_applier(install_path: Option<&Path>) -> Result<Arc<dyn PlatformApplier>, UpdateError> {
    #[cfg(target_os = "macos")]
    {
        Ok(Arc::new(BundleApplier::detect(install_path)?))
    }

    #[cfg(target_os = "windows")]
    {
        Ok(Arc::new(TrampolineApplier::detect(install_path)?))
    }

    #[cfg(target_os = "linux")]
    {
        Ok(Arc::new(ReplaceApplier::detect(install_path)?))
    }

    #[cfg(not(any(target_os = "macos", target_os = "windows", target_os = "linux")))]
    {
        let _ = install_path;
        Err(UpdateError::PlatformNotSupported {
            os: std::env::consts::OS.to_string(),
        })
    }
}

/// Path of the running executable, following symlinks.
pub(crate) fn current_executable() -> Result<PathBuf, UpdateError> {
    let exe = std::env::current_exe()
        .map_err(|e| UpdateError::fs("locate running executable", Path::new("."), &e))?;
    exe.canonicalize().map_err(|e| UpdateError::fs("resolve", &exe, &e))
}

/// Wraps a failure that happened before the live installation was moved.
pub(crate) fn untouched(error: UpdateError) -> UpdateError {
    match error {
        already @ UpdateError::ApplyFailed {
            ..
        } => already,
        other => UpdateError::ApplyFailed {
            reason: other.to_string(),
            rollback: RollbackOutcome::Untouched,
        },
    }
}

/// Deletes the installed archive; failure only leaves a file for startup cleanup.
pub(crate) fn remove_archive(asset_path: &Path) {
    if let Err(e) = remove_file_if_exists(asset_path) {
        warn!("Failed to delete downloaded archive: {}", e);
    }
}

/// Spawns `command` detached from our stdio.
pub(crate) fn spawn_detached(mut command: Command, target: &Path) -> Result<Child, UpdateError> {
    command.stdin(Stdio::null()).stdout(Stdio::null()).stderr(Stdio::null());
    command.spawn().map_err(|e| UpdateError::Relaunch {
        target: target.to_path_buf(),
        reason: e.to_string(),
    })
}
