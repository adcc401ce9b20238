//! Selection of the desktop build for a platform.

use crate::constants::DESKTOP_ASSET_PREFIX;
use crate::core::UpdateError;
use crate::update::release::{Asset, Release};
use crate::utils::platform::PlatformTarget;

/// Returns the first asset in `release` built for `target`.
///
/// A match starts with the desktop build prefix and contains `_<os>_<arch>.`. The target's
/// architecture is already normalized (`universal` on darwin).
#[must_use]
pub fn select_asset<'a>(release: &'a Release, target: &PlatformTarget) -> Option<&'a Asset> {
    let marker = target.asset_marker();
    release
        .assets
        .iter()
        .find(|asset| asset.name.starts_with(DESKTOP_ASSET_PREFIX) && asset.name.contains(&marker))
}

/// Like [`select_asset`] but turns "no build for this platform" into a terminal error.
pub fn require_asset<'a>(
    release: &'a Release,
    target: &PlatformTarget,
) -> Result<&'a Asset, UpdateError> {
    select_asset(release, target).ok_or_else(|| UpdateError::AssetNotFound {
        os: target.os.clone(),
        arch: target.arch.clone(),
        version: release.version().to_string(),
    })
}
