//! Self-update subsystem for the Kubelens desktop application.
//!
//! The pipeline runs in this order, driven by [`Updater`]:
//!
//! 1. [`release`] fetches the latest release metadata
//! 2. [`asset`] picks the archive built for this OS and architecture
//! 3. [`download`] streams it into the updates directory
//! 4. [`verification`] checks it against the release's `checksums.txt`
//! 5. [`applier`] extracts it with [`archive`] and swaps it into place, with [`backup`]
//!    providing rollback
//! 6. the applier relaunches the new installation
//!
//! [`cleanup`] runs once at startup and removes whatever an earlier update left behind.
//!
//! # Failure guarantees
//!
//! Everything before `apply` only writes into the updates directory, so those failures
//! leave the installation untouched and can be retried. A failed `apply` reports through
//! [`RollbackOutcome`](crate::core::RollbackOutcome) whether the installation was left
//! intact, restored, or could not be restored (with the backup location).

/// Platform strategies that replace the live installation.
pub mod applier;
/// Zip and tar.gz extraction with path-traversal checks.
pub mod archive;
/// Selection of the release asset for a platform.
pub mod asset;
/// Rename-aside backups with rollback.
pub mod backup;
/// Removal of leftovers from earlier updates.
pub mod cleanup;
/// Streaming, cancellable asset downloads.
pub mod download;
/// Latest-release metadata and the HTTP client for it.
pub mod release;
/// Status snapshot types.
pub mod status;
/// The orchestrating state machine.
pub mod updater;
/// SHA-256 verification against the release checksum manifest.
pub mod verification;


pub use applier::{BundleApplier, PlatformApplier, ReplaceApplier, TrampolineApplier, native_applier};
pub use cleanup::{CleanupPlan, CleanupReport, startup_cleanup};
pub use release::{Asset, Release, ReleaseClient};
pub use status::{UpdateState, UpdateStatus};
pub use updater::Updater;
pub use verification::ChecksumVerifier;
