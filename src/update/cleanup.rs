//! Best-effort removal of leftovers from earlier updates.
//!
//! Runs once at process start. Depending on the platform, a previous update may have left:
//!
//! - a `.old` backup of the bundle or executable (macOS, Linux)
//! - a trampoline script `%TEMP%\kubelens-update-<pid>.bat` and its extraction directory
//!   (Windows)
//! - extraction scratch directories `kubelens-update-<pid>` or `kubelens-update-<pid>-<random>`
//!   after a crash (in the temp dir, and next to the bundle on macOS)
//! - `*.tmp` partial downloads in the updates directory
//!
//! Only names of exactly those shapes are swept. The trampoline's failure log
//! `kubelens-update-<pid>.log` is kept for the user.
//!
//! Nothing here returns an error: failures are logged and collected in the
//! [`CleanupReport`].

use glob::Pattern;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::UpdaterConfig;
use crate::constants::{BACKUP_SUFFIX, SCRATCH_PREFIX, TEMP_SUFFIX};
use crate::update::applier::current_executable;
use crate::utils::fs::{remove_path_if_exists, with_suffix};

/// What a cleanup pass removed and what it could not.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CleanupReport {
    /// Paths that were deleted.
    pub removed: Vec<PathBuf>,
    /// One message per path that could not be inspected or deleted.
    pub warnings: Vec<String>,
}

impl CleanupReport {
    /// Whether nothing was found to clean.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.warnings.is_empty()
    }
}

/// How glob matches are filtered before removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Matches {
    /// Every match is removed.
    All,
    /// Only names produced by an applier, see [`scratch_owner`].
    ScratchOnly,
}

/// Paths and patterns a cleanup pass sweeps.
#[derive(Debug, Default, Clone)]
pub struct CleanupPlan {
    backups: Vec<PathBuf>,
    patterns: Vec<(String, Matches)>,
}

impl CleanupPlan {
    /// An empty plan.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The plan for the running platform.
    ///
    /// The live installation comes from `install_path` or the running executable; when
    /// neither can be determined the backup sweep is skipped.
    #[must_use]
    pub fn for_platform(config: &UpdaterConfig) -> Self {
        Self::for_platform_in(config, &std::env::temp_dir())
    }

    /// [`for_platform`](Self::for_platform) with scratch files looked up in `temp_dir`.
    #[must_use]
    pub fn for_platform_in(config: &UpdaterConfig, temp_dir: &Path) -> Self {
        let mut plan = Self::new().with_scratch_in(temp_dir).with_partial_downloads(&config.updates_dir);

        let install = match &config.install_path {
            Some(path) => Some(path.clone()),
            None => match current_executable() {
                Ok(exe) => Some(installation_root(&exe)),
                Err(e) => {
                    debug!("Skipping backup sweep: {}", e);
                    None
                }
            },
        };
        if let Some(install) = install {
            // The bundle applier extracts next to the bundle so the final rename stays on one volume.
            if cfg!(target_os = "macos") {
                if let Some(parent) = install.parent() {
                    plan = plan.with_scratch_in(parent);
                }
            }
            plan = plan.with_backup(with_suffix(&install, BACKUP_SUFFIX));
        }
        plan
    }

    /// Removes `path` (file or directory) if present.
    #[must_use]
    pub fn with_backup(mut self, path: PathBuf) -> Self {
        self.backups.push(path);
        self
    }

    /// Removes everything in `dir` matching the glob `pattern`.
    #[must_use]
    pub fn with_pattern_in(self, dir: &Path, pattern: &str) -> Self {
        self.push_pattern(dir, pattern, Matches::All)
    }

    /// Removes trampoline scripts and extraction directories in `dir` left by other processes.
    #[must_use]
    pub fn with_scratch_in(self, dir: &Path) -> Self {
        self.push_pattern(dir, &format!("{SCRATCH_PREFIX}*"), Matches::ScratchOnly)
    }

    /// Removes `*.tmp` partial downloads in `dir`.
    #[must_use]
    pub fn with_partial_downloads(self, dir: &Path) -> Self {
        self.with_pattern_in(dir, &format!("*{TEMP_SUFFIX}"))
    }

    fn push_pattern(mut self, dir: &Path, pattern: &str, matches: Matches) -> Self {
        let escaped = Pattern::escape(&dir.to_string_lossy());
        self.patterns.push((format!("{escaped}/{pattern}"), matches));
        self
    }

    /// Executes the plan.
    #[must_use]
    pub fn run(&self) -> CleanupReport {
        let mut report = CleanupReport::default();
        let own_pid = std::process::id();

        for backup in &self.backups {
            if std::fs::symlink_metadata(backup).is_ok() {
                remove(backup, &mut report);
            }
        }

        for (pattern, matches) in &self.patterns {
            let entries = match glob::glob(pattern) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!("Invalid cleanup pattern {}: {}", pattern, e);
                    report.warnings.push(format!("invalid pattern {pattern}: {e}"));
                    continue;
                }
            };
            for entry in entries {
                match entry {
                    Ok(path) => {
                        let owner = path.file_name().and_then(|n| n.to_str()).and_then(scratch_owner);
                        if *matches == Matches::ScratchOnly && owner.is_none() {
                            continue;
                        }
                        if owner == Some(own_pid) || report.removed.contains(&path) {
                            continue;
                        }
                        remove(&path, &mut report);
                    }
                    Err(e) => {
                        warn!("Failed to inspect {}: {}", e.path().display(), e);
                        report.warnings.push(e.to_string());
                    }
                }
            }
        }

        if report.removed.is_empty() {
            debug!("Startup cleanup found nothing to remove");
        } else {
            info!("Startup cleanup removed {} leftover update files", report.removed.len());
        }
        report
    }
}

/// The PID embedded in a name an applier produces, or `None` for any other name.
///
/// Recognised shapes: `kubelens-update-<pid>`, `kubelens-update-<pid>.bat` (and its
/// `.bat.tmp` staging file), and `kubelens-update-<pid>-<random>` from `tempfile`.
fn scratch_owner(name: &str) -> Option<u32> {
    let rest = name.strip_prefix(SCRATCH_PREFIX)?;
    let digits = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
    let pid = rest[..digits].parse().ok()?;
    match &rest[digits..] {
        "" | ".bat" | ".bat.tmp" => Some(pid),
        tail => {
            let random = tail.strip_prefix('-')?;
            (!random.is_empty() && random.chars().all(|c| c.is_ascii_alphanumeric())).then_some(pid)
        }
    }
}

fn remove(path: &Path, report: &mut CleanupReport) {
    match remove_path_if_exists(path) {
        Ok(()) => {
            debug!("Removed update leftover {}", path.display());
            report.removed.push(path.to_path_buf());
        }
        Err(e) => {
            warn!("Failed to remove update leftover: {}", e);
            report.warnings.push(e.to_string());
        }
    }
}

/// The replaceable unit containing `exe`: the enclosing `.app` bundle, or `exe` itself.
fn installation_root(exe: &Path) -> PathBuf {
    if cfg!(target_os = "macos") {
        if let Some(bundle) = exe.ancestors().find(|p| p.extension().is_some_and(|e| e == "app")) {
            return bundle.to_path_buf();
        }
    }
    exe.to_path_buf()
}

/// Runs the platform cleanup plan. Never fails.
#[must_use]
pub fn startup_cleanup(config: &UpdaterConfig) -> CleanupReport {
    CleanupPlan::for_platform(config).run()
}
