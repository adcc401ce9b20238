//! Error handling for the updater
//!
//! The error system follows two rules:
//! 1. **Strongly-typed errors** ([`UpdateError`]) so callers and tests can tell a checksum
//!    mismatch from a missing manifest, or a network blip from a missing build.
//! 2. **User-friendly messages** ([`ErrorContext`]) with actionable suggestions for the CLI.
//!
//! # Error Categories
//!
//! - **Transport**: [`UpdateError::Network`], [`UpdateError::Protocol`] (retryable)
//! - **Metadata**: [`UpdateError::Decode`], [`UpdateError::AssetNotFound`] (not retryable)
//! - **Integrity**: [`UpdateError::ChecksumManifestMissing`], [`UpdateError::ChecksumEntryMissing`],
//!   [`UpdateError::ChecksumMismatch`] (always fail closed)
//! - **Local**: [`UpdateError::Filesystem`], [`UpdateError::IllegalArchivePath`],
//!   [`UpdateError::InvalidArchive`]
//! - **Apply**: [`UpdateError::ApplyFailed`] carries a [`RollbackOutcome`] that says whether the
//!   previous installation survived
//!
//! # Examples
//!
//! ```rust,no_run
//! use kubelens_updater::core::{UpdateError, user_friendly_error};
//!
//! let error = UpdateError::AssetNotFound {
//!     os: "linux".to_string(),
//!     arch: "riscv64".to_string(),
//!     version: "1.2.3".to_string(),
//! };
//! assert!(!error.is_retryable());
//!
//! let ctx = user_friendly_error(anyhow::Error::from(error));
//! ctx.display();
//! ```

use colored::Colorize;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::update::status::UpdateState;

/// Result alias used across the update subsystem.
pub type Result<T, E = UpdateError> = std::result::Result<T, E>;

/// What happened to the live installation after a failed apply.
///
/// Every applier ends in one of two provable states: fully replaced, or restored to the
/// previous working version. When restoration itself fails the backup location is kept so a
/// human can recover manually.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RollbackOutcome {
    /// The failure happened before the live installation was moved; nothing changed.
    Untouched,
    /// The live installation was moved aside and has been put back.
    Restored,
    /// Restoring the backup failed too. The previous version survives at `backup`.
    RestoreFailed {
        /// Location of the surviving backup.
        backup: PathBuf,
        /// Why restoration failed.
        reason: String,
    },
}

impl fmt::Display for RollbackOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Untouched => write!(f, "the installation was not modified"),
            Self::Restored => write!(f, "the previous installation was restored successfully"),
            Self::RestoreFailed {
                backup,
                reason,
            } => write!(
                f,
                "restoration also failed ({reason}); backup retained at {}",
                backup.display()
            ),
        }
    }
}

/// The main error type for update operations.
///
/// Only the orchestrator sees these variants; the public status boundary exposes the
/// rendered message alone.
#[derive(Error, Debug, Clone)]
pub enum UpdateError {
    /// Transport failure (DNS, TLS, connection reset, timeout, truncated body).
    #[error("Network error while {operation}: {reason}")]
    Network {
        /// What was being fetched
        operation: String,
        /// Transport error text
        reason: String,
    },

    /// The server answered with a non-success status.
    #[error("Unexpected HTTP status {status} from {url}")]
    Protocol {
        /// Requested URL
        url: String,
        /// HTTP status code
        status: u16,
    },

    /// Release metadata could not be decoded.
    #[error("Failed to decode {what}: {reason}")]
    Decode {
        /// What was being decoded
        what: String,
        /// Parser error text
        reason: String,
    },

    /// No build is published for this platform and architecture.
    #[error("No update asset for {os}/{arch} in release {version}")]
    AssetNotFound {
        /// Normalized OS name
        os: String,
        /// Normalized architecture name
        arch: String,
        /// Release version that was searched
        version: String,
    },

    /// The release carries no checksum manifest.
    #[error("Checksum manifest '{manifest}' is missing from release {version}")]
    ChecksumManifestMissing {
        /// Expected manifest asset name
        manifest: String,
        /// Release version
        version: String,
    },

    /// The manifest has no line for the downloaded file.
    #[error("Checksum manifest '{manifest}' has no entry for '{file}'")]
    ChecksumEntryMissing {
        /// Asset name looked up
        file: String,
        /// Manifest asset name
        manifest: String,
    },

    /// The downloaded file does not match its published digest.
    #[error("Checksum mismatch for '{file}': expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Asset name
        file: String,
        /// Published digest
        expected: String,
        /// Digest of the local file
        actual: String,
    },

    /// A local filesystem operation failed.
    #[error("Failed to {operation} {}: {reason}", path.display())]
    Filesystem {
        /// Operation in progress ("create directory", "rename", ...)
        operation: String,
        /// Path involved
        path: PathBuf,
        /// I/O error kind, kept for suggestions
        kind: std::io::ErrorKind,
        /// I/O error text
        reason: String,
    },

    /// An archive entry resolves outside the extraction directory.
    #[error("Archive entry '{entry}' escapes the extraction directory")]
    IllegalArchivePath {
        /// Raw entry name
        entry: String,
    },

    /// The archive is malformed or does not contain the expected build.
    #[error("Invalid update archive: {reason}")]
    InvalidArchive {
        /// What is wrong with it
        reason: String,
    },

    /// The requested operation is not allowed in the current state.
    #[error("Cannot {operation} while the updater is {state}")]
    InvalidState {
        /// Requested operation
        operation: &'static str,
        /// State at the time of the request
        state: UpdateState,
    },

    /// The download was cancelled by the caller.
    #[error("Download cancelled")]
    Cancelled,

    /// Replacing the installation failed.
    #[error("Update failed: {reason}; {rollback}")]
    ApplyFailed {
        /// The step that failed
        reason: String,
        /// What happened to the previous installation
        rollback: RollbackOutcome,
    },

    /// Self-update is not available on this platform.
    #[error("Self-update is not supported on {os}")]
    PlatformNotSupported {
        /// Operating system name
        os: String,
    },

    /// Starting the updated installation failed.
    #[error("Failed to relaunch {}: {reason}", target.display())]
    Relaunch {
        /// What was being started
        target: PathBuf,
        /// Error text
        reason: String,
    },

    /// A background task panicked or was aborted.
    #[error("Background {task} task failed: {reason}")]
    TaskFailed {
        /// Which task ("download", "apply")
        task: &'static str,
        /// Panic message or join error
        reason: String,
    },

    /// Configuration could not be loaded.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the problem
        message: String,
    },
}

impl UpdateError {
    /// Build a [`UpdateError::Filesystem`] from an I/O error.
    pub fn fs(operation: impl Into<String>, path: &Path, err: &std::io::Error) -> Self {
        Self::Filesystem {
            operation: operation.into(),
            path: path.to_path_buf(),
            kind: err.kind(),
            reason: err.to_string(),
        }
    }

    /// Build a [`UpdateError::Network`] from a transport error.
    pub fn network(operation: impl Into<String>, err: &reqwest::Error) -> Self {
        Self::Network {
            operation: operation.into(),
            reason: err.to_string(),
        }
    }

    /// Whether re-invoking the download may succeed without any upstream change.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network { .. } | Self::Protocol { .. })
    }

    /// Whether this is one of the integrity failures.
    #[must_use]
    pub fn is_checksum_error(&self) -> bool {
        matches!(
            self,
            Self::ChecksumManifestMissing { .. }
                | Self::ChecksumEntryMissing { .. }
                | Self::ChecksumMismatch { .. }
        )
    }
}

/// Error wrapper with user-friendly suggestions for the CLI.
#[derive(Debug)]
pub struct ErrorContext {
    /// The underlying error
    pub error: UpdateError,
    /// Optional suggestion for resolving the error
    pub suggestion: Option<String>,
    /// Optional additional details about the error
    pub details: Option<String>,
}

impl ErrorContext {
    /// Create a new error context with no suggestion or details.
    #[must_use]
    pub const fn new(error: UpdateError) -> Self {
        Self {
            error,
            suggestion: None,
            details: None,
        }
    }

    /// Add a suggestion for resolving the error.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Add additional details explaining the error.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Print the error, details and suggestion to stderr with terminal colors.
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.error);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

/// Convert any error into an [`ErrorContext`] with contextual suggestions.
///
/// Known [`UpdateError`] variants get tailored advice; anything else is wrapped with its
/// full cause chain.
#[must_use]
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    if let Some(update_error) = error.downcast_ref::<UpdateError>() {
        return create_error_context(update_error.clone());
    }

    if let Some(toml_error) = error.downcast_ref::<toml::de::Error>() {
        return ErrorContext::new(UpdateError::Config {
            message: toml_error.to_string(),
        })
        .with_suggestion("Check the TOML syntax in updater.toml");
    }

    let mut message = error.to_string();
    let chain: Vec<String> = error.chain().skip(1).map(ToString::to_string).collect();
    if !chain.is_empty() {
        message.push_str("\n\nCaused by:");
        for (i, cause) in chain.iter().enumerate() {
            message.push_str(&format!("\n  {}: {}", i + 1, cause));
        }
    }

    ErrorContext::new(UpdateError::Config {
        message,
    })
}

fn create_error_context(error: UpdateError) -> ErrorContext {
    match &error {
        UpdateError::Network { .. } | UpdateError::Protocol { .. } => ErrorContext::new(error)
            .with_suggestion("Check your internet connection and try again")
            .with_details("Release metadata and builds are fetched over HTTPS; this failure is retryable"),

        UpdateError::Decode { .. } => ErrorContext::new(error)
            .with_details("The release service returned data this version cannot read. Retrying will not help until it is fixed upstream"),

        UpdateError::AssetNotFound { os, arch, .. } => {
            let suggestion = format!(
                "No desktop build is published for {os}/{arch}. Download an installer manually from the releases page"
            );
            ErrorContext::new(error).with_suggestion(suggestion)
        }

        UpdateError::ChecksumManifestMissing { .. }
        | UpdateError::ChecksumEntryMissing { .. }
        | UpdateError::ChecksumMismatch { .. } => ErrorContext::new(error)
            .with_suggestion("Retry the download. If this persists, report it: the published build may be corrupted or tampered with")
            .with_details("Updates are never applied unless their SHA-256 digest matches the release manifest"),

        UpdateError::Filesystem { kind, .. } => {
            let suggestion = if *kind == std::io::ErrorKind::PermissionDenied {
                if cfg!(windows) {
                    "Run as Administrator or check the installation folder permissions"
                } else {
                    "Check that you own the installation directory, or reinstall to a user-writable location"
                }
            } else {
                "Check free disk space and that the installation directory is writable"
            };
            ErrorContext::new(error).with_suggestion(suggestion)
        }

        UpdateError::IllegalArchivePath { .. } => ErrorContext::new(error)
            .with_details("The archive tried to write outside its extraction directory and was rejected"),

        UpdateError::ApplyFailed { rollback: RollbackOutcome::RestoreFailed { backup, .. }, .. } => {
            let suggestion = format!(
                "Move {} back to the installation path manually, or reinstall",
                backup.display()
            );
            ErrorContext::new(error).with_suggestion(suggestion)
        }

        _ => ErrorContext::new(error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_kinds() {
        assert!(
            UpdateError::Network {
                operation: "fetching release".into(),
                reason: "reset".into(),
            }
            .is_retryable()
        );
        assert!(
            UpdateError::Protocol {
                url: "https://example.com".into(),
                status: 503,
            }
            .is_retryable()
        );
        assert!(
            !UpdateError::Decode {
                what: "release".into(),
                reason: "eof".into(),
            }
            .is_retryable()
        );
        assert!(
            !UpdateError::AssetNotFound {
                os: "linux".into(),
                arch: "amd64".into(),
                version: "1.0.0".into(),
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_apply_failed_messages_distinguish_rollback() {
        let restored = UpdateError::ApplyFailed {
            reason: "copy failed".into(),
            rollback: RollbackOutcome::Restored,
        };
        assert!(restored.to_string().contains("restored successfully"));

        let stranded = UpdateError::ApplyFailed {
            reason: "copy failed".into(),
            rollback: RollbackOutcome::RestoreFailed {
                backup: PathBuf::from("/opt/kubelens/kubelens.old"),
                reason: "busy".into(),
            },
        };
        let message = stranded.to_string();
        assert!(message.contains("restoration also failed"));
        assert!(message.contains("/opt/kubelens/kubelens.old"));

        let untouched = UpdateError::ApplyFailed {
            reason: "no binary in archive".into(),
            rollback: RollbackOutcome::Untouched,
        };
        assert!(untouched.to_string().contains("not modified"));
    }

    #[test]
    fn test_checksum_errors_are_classified() {
        let mismatch = UpdateError::ChecksumMismatch {
            file: "a.zip".into(),
            expected: "00".into(),
            actual: "11".into(),
        };
        assert!(mismatch.is_checksum_error());
        assert!(mismatch.to_string().to_lowercase().contains("checksum"));
        assert!(!UpdateError::Cancelled.is_checksum_error());
    }

    #[test]
    fn test_user_friendly_error_keeps_backup_hint() {
        let error = UpdateError::ApplyFailed {
            reason: "rename failed".into(),
            rollback: RollbackOutcome::RestoreFailed {
                backup: PathBuf::from("/Applications/Kubelens.app.old"),
                reason: "denied".into(),
            },
        };
        let ctx = user_friendly_error(anyhow::Error::from(error));
        let suggestion = ctx.suggestion.unwrap();
        assert!(suggestion.contains("/Applications/Kubelens.app.old"));
    }

    #[test]
    fn test_user_friendly_error_generic_includes_chain() {
        let error = anyhow::anyhow!("root cause").context("outer");
        let ctx = user_friendly_error(error);
        let text = ctx.to_string();
        assert!(text.contains("outer"));
        assert!(text.contains("root cause"));
    }

    #[test]
    fn test_fs_helper_records_kind() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let error = UpdateError::fs("rename", Path::new("/tmp/x"), &io);
        match error {
            UpdateError::Filesystem {
                kind,
                ..
            } => assert_eq!(kind, std::io::ErrorKind::PermissionDenied),
            other => panic!("unexpected {other:?}"),
        }
    }
}
