//! Cross-platform utilities and helpers
//!
//! - [`fs`] - file and directory helpers returning [`crate::core::UpdateError`]
//! - [`platform`] - release naming for the running OS and architecture
//! - [`progress`] - terminal progress bar for downloads

pub mod fs;
pub mod platform;
pub mod progress;

pub use fs::{ensure_dir, ensure_parent_dir, with_suffix};
pub use platform::{ArchiveFormat, PlatformTarget};
pub use progress::DownloadProgress;
