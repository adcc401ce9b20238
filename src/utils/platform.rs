//! Mapping between the running platform and release naming.
//!
//! Release assets use Go-style platform names (`darwin`, `amd64`, ...) while Rust reports
//! `macos`, `x86_64` and friends. [`PlatformTarget`] holds the normalized pair used for asset
//! selection and decides which archive format that platform ships.

use std::fmt;

use crate::constants::UNIVERSAL_ARCH;

/// Archive format of a desktop build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    /// Directory-tree archive used for macOS bundles and Windows builds.
    Zip,
    /// Gzip-compressed tarball used for Linux builds.
    TarGz,
}

impl ArchiveFormat {
    /// Format shipped for a normalized OS name.
    #[must_use]
    pub fn for_os(os: &str) -> Self {
        match os {
            "linux" => Self::TarGz,
            _ => Self::Zip,
        }
    }

    /// File extension without the leading dot.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Zip => "zip",
            Self::TarGz => "tar.gz",
        }
    }
}

/// Normalized (OS, architecture) pair as it appears in asset names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformTarget {
    /// `darwin`, `linux`, `windows`, ...
    pub os: String,
    /// `amd64`, `arm64`, `386`, or `universal` on darwin.
    pub arch: String,
}

impl PlatformTarget {
    /// Target for the platform this binary was built for.
    #[must_use]
    pub fn current() -> Self {
        Self::from_rust(std::env::consts::OS, std::env::consts::ARCH)
    }

    /// Builds a target from Rust's OS and architecture names.
    #[must_use]
    pub fn from_rust(os: &str, arch: &str) -> Self {
        let os = match os {
            "macos" => "darwin",
            other => other,
        };
        Self::new(os, arch)
    }

    /// Builds a target from release names, normalizing the architecture.
    ///
    /// darwin builds are universal binaries, so the raw architecture is replaced by the
    /// fixed marker.
    pub fn new(os: impl Into<String>, arch: &str) -> Self {
        let os = os.into();
        let arch = if os == "darwin" {
            UNIVERSAL_ARCH.to_string()
        } else {
            match arch {
                "x86_64" => "amd64".to_string(),
                "aarch64" => "arm64".to_string(),
                "x86" => "386".to_string(),
                other => other.to_string(),
            }
        };
        Self {
            os,
            arch,
        }
    }

    /// Substring every matching asset name contains (`_linux_amd64.`).
    #[must_use]
    pub fn asset_marker(&self) -> String {
        format!("_{}_{}.", self.os, self.arch)
    }

    /// Archive format shipped for this target.
    #[must_use]
    pub fn archive_format(&self) -> ArchiveFormat {
        ArchiveFormat::for_os(&self.os)
    }
}

impl fmt::Display for PlatformTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.os, self.arch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_darwin_is_universal() {
        let target = PlatformTarget::from_rust("macos", "aarch64");
        assert_eq!(target.os, "darwin");
        assert_eq!(target.arch, "universal");
        assert_eq!(target.archive_format(), ArchiveFormat::Zip);
    }

    #[test]
    fn test_arch_normalization() {
        assert_eq!(PlatformTarget::from_rust("linux", "x86_64").arch, "amd64");
        assert_eq!(PlatformTarget::from_rust("linux", "aarch64").arch, "arm64");
        assert_eq!(PlatformTarget::from_rust("windows", "x86").arch, "386");
        assert_eq!(PlatformTarget::from_rust("linux", "riscv64").arch, "riscv64");
    }

    #[test]
    fn test_marker_and_format() {
        let linux = PlatformTarget::new("linux", "amd64");
        assert_eq!(linux.asset_marker(), "_linux_amd64.");
        assert_eq!(linux.archive_format(), ArchiveFormat::TarGz);
        assert_eq!(linux.archive_format().extension(), "tar.gz");
        assert_eq!(linux.to_string(), "linux/amd64");

        let windows = PlatformTarget::new("windows", "amd64");
        assert_eq!(windows.archive_format(), ArchiveFormat::Zip);
    }
}
