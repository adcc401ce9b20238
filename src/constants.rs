//! Global constants used throughout the updater.
//!
//! Release naming conventions, timeouts and file-name patterns live here so the
//! release pipeline, the platform appliers and startup cleanup agree on them.

use std::time::Duration;

/// Product name used in asset names, scratch directories and trampoline scripts.
pub const PRODUCT_NAME: &str = "kubelens";

/// Prefix every desktop build asset starts with (`kubelens-desktop_<version>_<os>_<arch>.<ext>`).
pub const DESKTOP_ASSET_PREFIX: &str = "kubelens-desktop_";

/// Exact name of the checksum manifest attached to every release.
pub const CHECKSUM_MANIFEST_NAME: &str = "checksums.txt";

/// Architecture marker used by platforms that ship a single universal build.
pub const UNIVERSAL_ARCH: &str = "universal";

/// Default latest-release endpoint.
pub const DEFAULT_RELEASES_URL: &str =
    "https://api.github.com/repos/kubelens/kubelens/releases/latest";

/// Timeout for the release metadata request (15 seconds).
pub const RELEASE_TIMEOUT: Duration = Duration::from_secs(15);

/// Timeout for asset downloads (30 minutes).
///
/// Desktop builds are large and users may be on slow links.
pub const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Size of each read from the download stream (32 KiB).
pub const DOWNLOAD_CHUNK_SIZE: usize = 32 * 1024;

/// Suffix appended to in-flight downloads.
pub const TEMP_SUFFIX: &str = ".tmp";

/// Suffix appended to the live installation while it is moved aside.
pub const BACKUP_SUFFIX: &str = ".old";

/// Prefix of trampoline scripts and scratch directories, always followed by the owning PID.
pub const SCRATCH_PREFIX: &str = "kubelens-update-";

/// Default `User-Agent` sent with every request.
pub fn default_user_agent() -> String {
    format!("kubelens-desktop-updater/{}", env!("CARGO_PKG_VERSION"))
}
