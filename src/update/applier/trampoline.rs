//! Windows: hand the swap to a batch script that runs after we exit.
//!
//! A running `.exe` cannot be overwritten on Windows. [`TrampolineApplier::apply_update`]
//! only extracts the new executable to `%TEMP%\kubelens-update-<pid>\` and writes
//! `%TEMP%\kubelens-update-<pid>.bat`. [`PlatformApplier::relaunch`] starts that script
//! detached and exits; the script waits for our PID to disappear, copies the new executable
//! over the live one, starts it and deletes its working directory and itself.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Child, Command};
use tracing::{debug, info, warn};

use super::{PlatformApplier, current_executable, remove_archive, spawn_detached, untouched};
use crate::constants::{SCRATCH_PREFIX, TEMP_SUFFIX};
use crate::core::UpdateError;
use crate::update::archive;
use crate::utils::fs::{find_by_name, remove_path_if_exists, with_suffix};
use crate::utils::platform::ArchiveFormat;

/// Copy attempts the script makes before giving up.
const COPY_ATTEMPTS: u32 = 5;

/// Prepares a deferred executable swap.
#[derive(Debug, Clone)]
pub struct TrampolineApplier {
    executable: PathBuf,
    temp_dir: PathBuf,
    pid: u32,
}

impl TrampolineApplier {
    /// Applier for `executable` using the OS temp directory and this process's PID.
    #[must_use]
    pub fn new(executable: PathBuf) -> Self {
        Self {
            executable,
            temp_dir: std::env::temp_dir(),
            pid: std::process::id(),
        }
    }

    /// Uses `install_path`, or the running executable.
    pub fn detect(install_path: Option<&Path>) -> Result<Self, UpdateError> {
        let executable = match install_path {
            Some(path) => path.to_path_buf(),
            None => current_executable()?,
        };
        Ok(Self::new(executable))
    }

    /// Places scratch files under `temp_dir` instead of the OS temp directory.
    #[must_use]
    pub fn with_temp_dir(mut self, temp_dir: PathBuf) -> Self {
        self.temp_dir = temp_dir;
        self
    }

    /// `%TEMP%\kubelens-update-<pid>`
    #[must_use]
    pub fn work_dir(&self) -> PathBuf {
        self.temp_dir.join(format!("{SCRATCH_PREFIX}{}", self.pid))
    }

    /// `%TEMP%\kubelens-update-<pid>.bat`
    #[must_use]
    pub fn script_path(&self) -> PathBuf {
        self.temp_dir.join(format!("{SCRATCH_PREFIX}{}.bat", self.pid))
    }

    /// `%TEMP%\kubelens-update-<pid>.log`, written only when the copy fails.
    #[must_use]
    pub fn log_path(&self) -> PathBuf {
        self.temp_dir.join(format!("{SCRATCH_PREFIX}{}.log", self.pid))
    }

    /// Batch script that swaps `new_executable` into place once this process has exited.
    #[must_use]
    pub fn render_script(&self, new_executable: &Path) -> String {
        let lines = [
            "@echo off".to_string(),
            "setlocal".to_string(),
            format!("set \"PID={}\"", self.pid),
            format!("set \"SOURCE={}\"", batch_literal(new_executable)),
            format!("set \"TARGET={}\"", batch_literal(&self.executable)),
            format!("set \"WORKDIR={}\"", batch_literal(&self.work_dir())),
            format!("set \"LOG={}\"", batch_literal(&self.log_path())),
            "set ATTEMPT=0".to_string(),
            String::new(),
            ":wait".to_string(),
            "tasklist /FI \"PID eq %PID%\" /NH 2>nul | find \"%PID%\" >nul".to_string(),
            "if not errorlevel 1 (".to_string(),
            "    timeout /t 1 /nobreak >nul".to_string(),
            "    goto wait".to_string(),
            ")".to_string(),
            String::new(),
            ":copy".to_string(),
            "set /a ATTEMPT+=1".to_string(),
            "copy /y \"%SOURCE%\" \"%TARGET%\" >nul 2>>\"%LOG%\"".to_string(),
            "if not errorlevel 1 goto launch".to_string(),
            format!("if %ATTEMPT% lss {COPY_ATTEMPTS} ("),
            "    timeout /t 1 /nobreak >nul".to_string(),
            "    goto copy".to_string(),
            ")".to_string(),
            "echo [%date% %time%] failed to copy \"%SOURCE%\" to \"%TARGET%\" >>\"%LOG%\""
                .to_string(),
            "goto end".to_string(),
            String::new(),
            ":launch".to_string(),
            "start \"\" \"%TARGET%\"".to_string(),
            "rmdir /s /q \"%WORKDIR%\"".to_string(),
            String::new(),
            ":end".to_string(),
            "(goto) 2>nul & del \"%~f0\"".to_string(),
        ];
        let mut script = lines.join("\r\n");
        script.push_str("\r\n");
        script
    }

    fn write_script(&self, content: &str) -> Result<(), UpdateError> {
        let script = self.script_path();
        let tmp = with_suffix(&script, TEMP_SUFFIX);
        fs::write(&tmp, content).map_err(|e| UpdateError::fs("write", &tmp, &e))?;
        fs::rename(&tmp, &script).map_err(|e| UpdateError::fs("rename", &tmp, &e))
    }

    fn prepare(&self, asset_path: &Path, work_dir: &Path) -> Result<(), UpdateError> {
        remove_path_if_exists(work_dir)?;
        archive::extract(asset_path, ArchiveFormat::Zip, work_dir)?;

        let name = self.executable.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        let new_executable = find_by_name(work_dir, name, false).ok_or_else(|| {
            UpdateError::InvalidArchive {
                reason: format!("no '{name}' executable found in update archive"),
            }
        })?;
        debug!("New executable extracted to {}", new_executable.display());

        self.write_script(&self.render_script(&new_executable))
    }

    fn relaunch_command(&self) -> Command {
        let mut command = Command::new("cmd");
        command.arg("/C").arg("start").arg("").arg("/min").arg(self.script_path());

        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            const DETACHED_PROCESS: u32 = 0x0000_0008;
            const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
            const CREATE_NO_WINDOW: u32 = 0x0800_0000;
            command.creation_flags(DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP | CREATE_NO_WINDOW);
        }

        command
    }
}

/// `path` as literal text inside a batch file, where `%` would start a variable expansion.
fn batch_literal(path: &Path) -> String {
    path.display().to_string().replace('%', "%%")
}

impl PlatformApplier for TrampolineApplier {
    fn name(&self) -> &'static str {
        "trampoline"
    }

    fn apply_update(&self, asset_path: &Path) -> Result<(), UpdateError> {
        info!("Preparing deferred replacement of {}", self.executable.display());
        let work_dir = self.work_dir();

        if let Err(e) = self.prepare(asset_path, &work_dir) {
            if let Err(cleanup) = remove_path_if_exists(&work_dir) {
                warn!("Failed to remove {}: {}", work_dir.display(), cleanup);
            }
            return Err(untouched(e));
        }

        remove_archive(asset_path);
        info!("Update staged; it is installed when the application restarts");
        Ok(())
    }

    fn spawn_relaunch(&self) -> Result<Child, UpdateError> {
        let script = self.script_path();
        if !script.is_file() {
            return Err(UpdateError::Relaunch {
                target: script,
                reason: "no update has been staged".to_string(),
            });
        }
        spawn_detached(self.relaunch_command(), &script)
    }
}
