//! Read-only view of the updater for callers and the UI.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of the updater. Exactly one at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateState {
    /// Nothing in progress.
    Idle,
    /// A download (resolve, fetch, verify) is running in the background.
    Downloading,
    /// A verified build is on disk and can be applied.
    Ready,
    /// The installation is being replaced.
    Applying,
    /// The last download or apply failed.
    Error,
}

impl fmt::Display for UpdateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Downloading => "downloading",
            Self::Ready => "ready",
            Self::Applying => "applying",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

/// Snapshot of the updater taken under its lock.
///
/// Serializes as `{"state":"ready","progress":1.0,"version":"1.2.3"}`; `error` is present
/// only in the error state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateStatus {
    /// Current state.
    pub state: UpdateState,
    /// Download progress in `[0, 1]`; zero outside downloading and ready.
    pub progress: f64,
    /// Version being downloaded or installed; empty until a release was resolved.
    pub version: String,
    /// Human-readable failure, set only in [`UpdateState::Error`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
