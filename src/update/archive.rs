//! Archive extraction with path-traversal protection.
//!
//! Each entry name is resolved lexically against the destination before anything is
//! written. An entry that would land outside the destination (`../x`, `/etc/x`, `C:\x`)
//! aborts extraction with [`UpdateError::IllegalArchivePath`]; entries extracted before it
//! stay in place and the caller discards the whole scratch directory.
//!
//! Directories and regular files keep their archived permission bits. Symlinks, hard links
//! and device nodes are skipped.

use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, trace};

use crate::core::UpdateError;
use crate::utils::platform::ArchiveFormat;

/// Counts of what an extraction produced.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ExtractStats {
    /// Regular files written.
    pub files: usize,
    /// Directories created.
    pub dirs: usize,
    /// Entries skipped (links, devices).
    pub skipped: usize,
}

/// Extracts `archive` of `format` into `destination`, creating it if needed.
pub fn extract(
    archive: &Path,
    format: ArchiveFormat,
    destination: &Path,
) -> Result<ExtractStats, UpdateError> {
    debug!("Extracting {} into {}", archive.display(), destination.display());

    fs::create_dir_all(destination)
        .map_err(|e| UpdateError::fs("create directory", destination, &e))?;
    let file = File::open(archive).map_err(|e| UpdateError::fs("open", archive, &e))?;

    let mut sink = Sink::new(destination);
    match format {
        ArchiveFormat::Zip => extract_zip(file, &mut sink)?,
        ArchiveFormat::TarGz => extract_tar_gz(file, &mut sink)?,
    }
    let stats = sink.finish()?;

    debug!(
        "Extracted {} files and {} directories ({} entries skipped)",
        stats.files, stats.dirs, stats.skipped
    );
    Ok(stats)
}

/// Resolves an archive entry name to a path relative to the extraction root.
///
/// Both `/` and `\` separate components. `.` is ignored and `..` pops a previous component;
/// popping past the root, absolute paths and drive prefixes are rejected. An empty result
/// means the entry names the root itself.
pub fn resolve_entry_path(name: &str) -> Result<PathBuf, UpdateError> {
    let illegal = || UpdateError::IllegalArchivePath {
        entry: name.to_string(),
    };

    let normalized = name.replace('\\', "/");
    if normalized.starts_with('/') {
        return Err(illegal());
    }

    let mut resolved = PathBuf::new();
    for part in normalized.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                if !resolved.pop() {
                    return Err(illegal());
                }
            }
            part => {
                // A single segment must be a plain name on every platform
                let mut components = Path::new(part).components();
                match (components.next(), components.next()) {
                    (Some(Component::Normal(_)), None) if !part.contains(':') => {
                        resolved.push(part);
                    }
                    _ => return Err(illegal()),
                }
            }
        }
    }
    Ok(resolved)
}

/// Writes resolved entries under the destination root.
struct Sink<'a> {
    root: &'a Path,
    /// Directory modes are applied last so read-only directories can still be filled.
    dir_modes: Vec<(PathBuf, u32)>,
    stats: ExtractStats,
}

impl<'a> Sink<'a> {
    fn new(root: &'a Path) -> Self {
        Self {
            root,
            dir_modes: Vec::new(),
            stats: ExtractStats::default(),
        }
    }

    fn dir(&mut self, name: &str, mode: Option<u32>) -> Result<(), UpdateError> {
        let relative = resolve_entry_path(name)?;
        if relative.as_os_str().is_empty() {
            return Ok(());
        }
        let target = self.root.join(relative);
        trace!("dir  {}", target.display());
        fs::create_dir_all(&target)
            .map_err(|e| UpdateError::fs("create directory", &target, &e))?;
        if let Some(mode) = mode {
            self.dir_modes.push((target, mode & 0o7777));
        }
        self.stats.dirs += 1;
        Ok(())
    }

    fn file(&mut self, name: &str, mode: Option<u32>, reader: &mut dyn Read) -> Result<(), UpdateError> {
        let relative = resolve_entry_path(name)?;
        if relative.as_os_str().is_empty() {
            return Err(UpdateError::IllegalArchivePath {
                entry: name.to_string(),
            });
        }
        let target = self.root.join(relative);
        trace!("file {}", target.display());

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| UpdateError::fs("create directory", parent, &e))?;
        }
        let mut out = File::create(&target).map_err(|e| UpdateError::fs("create", &target, &e))?;
        io::copy(reader, &mut out).map_err(|e| UpdateError::fs("write", &target, &e))?;
        drop(out);

        if let Some(mode) = mode {
            set_mode(&target, mode & 0o7777)?;
        }
        self.stats.files += 1;
        Ok(())
    }

    fn skip(&mut self, name: &str, kind: &str) {
        debug!("Skipping {} entry '{}'", kind, name);
        self.stats.skipped += 1;
    }

    fn finish(self) -> Result<ExtractStats, UpdateError> {
        for (dir, mode) in self.dir_modes.iter().rev() {
            set_mode(dir, *mode)?;
        }
        Ok(self.stats)
    }
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<(), UpdateError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
        .map_err(|e| UpdateError::fs("set permissions on", path, &e))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<(), UpdateError> {
    Ok(())
}

fn invalid(reason: impl std::fmt::Display) -> UpdateError {
    UpdateError::InvalidArchive {
        reason: reason.to_string(),
    }
}

fn extract_zip(file: File, sink: &mut Sink<'_>) -> Result<(), UpdateError> {
    let mut archive = zip::ZipArchive::new(file).map_err(invalid)?;

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index).map_err(invalid)?;
        let name = entry.name().to_string();
        let mode = entry.unix_mode();

        if entry.is_symlink() {
            sink.skip(&name, "symlink");
        } else if entry.is_dir() {
            sink.dir(&name, mode)?;
        } else if entry.is_file() {
            sink.file(&name, mode, &mut entry)?;
        } else {
            sink.skip(&name, "special");
        }
    }
    Ok(())
}

fn extract_tar_gz(file: File, sink: &mut Sink<'_>) -> Result<(), UpdateError> {
    let mut archive = tar::Archive::new(GzDecoder::new(file));

    for entry in archive.entries().map_err(invalid)? {
        let mut entry = entry.map_err(invalid)?;
        let name = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
        let header = entry.header();
        let mode = header.mode().ok();
        let kind = header.entry_type();

        if kind.is_dir() {
            sink.dir(&name, mode)?;
        } else if kind.is_file() {
            sink.file(&name, mode, &mut entry)?;
        } else if kind.is_symlink() || kind.is_hard_link() {
            sink.skip(&name, "link");
        } else if kind.is_pax_global_extensions() || kind.is_pax_local_extensions() {
            // Metadata records; the tar reader already applies them to the next entry
        } else {
            sink.skip(&name, "special");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{TestEntry, build_tar_gz, build_zip};
    use tempfile::TempDir;

    fn sample_entries() -> Vec<TestEntry> {
        vec![
            TestEntry::dir("Kubelens.app/", 0o755),
            TestEntry::dir("Kubelens.app/Contents/", 0o755),
            TestEntry::file("Kubelens.app/Contents/Info.plist", b"<plist/>", 0o644),
            TestEntry::file("Kubelens.app/Contents/MacOS/kubelens", b"\x7fELF binary", 0o755),
        ]
    }

    #[test]
    fn test_resolve_entry_path() {
        assert_eq!(resolve_entry_path("a/b/c").unwrap(), PathBuf::from("a/b/c"));
        assert_eq!(resolve_entry_path("./a/./b/").unwrap(), PathBuf::from("a/b"));
        assert_eq!(resolve_entry_path("a/../b").unwrap(), PathBuf::from("b"));
        assert_eq!(resolve_entry_path("a\\b").unwrap(), PathBuf::from("a/b"));
        assert_eq!(resolve_entry_path("./").unwrap(), PathBuf::new());

        for bad in ["../evil", "a/../../evil", "/etc/passwd", "\\evil", "C:\\evil", "..\\evil"] {
            assert!(
                matches!(resolve_entry_path(bad), Err(UpdateError::IllegalArchivePath { .. })),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_extract_zip_preserves_tree_and_modes() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("build.zip");
        build_zip(&archive, &sample_entries()).unwrap();

        let out = temp.path().join("out");
        let stats = extract(&archive, ArchiveFormat::Zip, &out).unwrap();
        assert_eq!(stats.files, 2);

        let binary = out.join("Kubelens.app/Contents/MacOS/kubelens");
        assert_eq!(fs::read(&binary).unwrap(), b"\x7fELF binary");
        assert_eq!(fs::read(out.join("Kubelens.app/Contents/Info.plist")).unwrap(), b"<plist/>");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&binary).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o755);
        }
    }

    #[test]
    fn test_extract_tar_gz_preserves_tree_and_modes() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("build.tar.gz");
        build_tar_gz(
            &archive,
            &[
                TestEntry::dir("./", 0o755),
                TestEntry::dir("kubelens/", 0o750),
                TestEntry::file("kubelens/kubelens", b"#!/bin/sh\necho new\n", 0o755),
                TestEntry::file("kubelens/README", b"readme", 0o600),
            ],
        )
        .unwrap();

        let out = temp.path().join("out");
        let stats = extract(&archive, ArchiveFormat::TarGz, &out).unwrap();
        assert_eq!(stats.files, 2);
        assert_eq!(stats.dirs, 1);
        assert_eq!(fs::read(out.join("kubelens/kubelens")).unwrap(), b"#!/bin/sh\necho new\n");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = |p: &Path| fs::metadata(p).unwrap().permissions().mode() & 0o777;
            assert_eq!(mode(&out.join("kubelens/kubelens")), 0o755);
            assert_eq!(mode(&out.join("kubelens/README")), 0o600);
            assert_eq!(mode(&out.join("kubelens")), 0o750);
        }
    }

    #[test]
    fn test_existing_files_are_truncated() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("build.tar.gz");
        build_tar_gz(&archive, &[TestEntry::file("bin", b"new", 0o755)]).unwrap();

        let out = temp.path().join("out");
        fs::create_dir_all(&out).unwrap();
        fs::write(out.join("bin"), b"much longer old content").unwrap();

        extract(&archive, ArchiveFormat::TarGz, &out).unwrap();
        assert_eq!(fs::read(out.join("bin")).unwrap(), b"new");
    }

    #[test]
    fn test_tar_traversal_rejected() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("evil.tar.gz");
        build_tar_gz(
            &archive,
            &[
                TestEntry::file("ok.txt", b"fine", 0o644),
                TestEntry::file("../evil.txt", b"pwned", 0o644),
                TestEntry::file("after.txt", b"never", 0o644),
            ],
        )
        .unwrap();

        let out = temp.path().join("out");
        let err = extract(&archive, ArchiveFormat::TarGz, &out).unwrap_err();
        assert!(matches!(err, UpdateError::IllegalArchivePath { ref entry } if entry == "../evil.txt"));
        assert!(!temp.path().join("evil.txt").exists());
        assert!(out.join("ok.txt").exists());
        assert!(!out.join("after.txt").exists());
    }

    #[test]
    fn test_tar_absolute_rejected() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("abs.tar.gz");
        let absolute = format!("{}/abs.txt", temp.path().display());
        // Only meaningful when the temp path fits the header name field
        if absolute.len() > 100 {
            return;
        }
        build_tar_gz(&archive, &[TestEntry::file(&absolute, b"pwned", 0o644)]).unwrap();

        let err = extract(&archive, ArchiveFormat::TarGz, &temp.path().join("out")).unwrap_err();
        assert!(matches!(err, UpdateError::IllegalArchivePath { .. }));
        assert!(!temp.path().join("abs.txt").exists());
    }

    #[test]
    fn test_zip_traversal_rejected() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("evil.zip");
        build_zip(&archive, &[TestEntry::file("nested/../../evil.txt", b"pwned", 0o644)])
            .unwrap();

        let out = temp.path().join("out");
        let err = extract(&archive, ArchiveFormat::Zip, &out).unwrap_err();
        assert!(matches!(err, UpdateError::IllegalArchivePath { .. }));
        assert!(!temp.path().join("evil.txt").exists());
        assert!(!out.join("nested").exists());
    }

    #[test]
    fn test_symlinks_are_skipped() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("links.tar.gz");
        build_tar_gz(
            &archive,
            &[
                TestEntry::file("real", b"data", 0o644),
                TestEntry::symlink("link", "real"),
            ],
        )
        .unwrap();

        let out = temp.path().join("out");
        let stats = extract(&archive, ArchiveFormat::TarGz, &out).unwrap();
        assert_eq!(stats.skipped, 1);
        assert!(out.join("real").exists());
        assert!(fs::symlink_metadata(out.join("link")).is_err());
    }

    #[test]
    fn test_garbage_is_invalid_archive() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("garbage.zip");
        fs::write(&archive, b"this is not a zip").unwrap();

        let err = extract(&archive, ArchiveFormat::Zip, &temp.path().join("out")).unwrap_err();
        assert!(matches!(err, UpdateError::InvalidArchive { .. }));
    }
}
