//! File system helpers shared by the downloader, extractor, appliers and cleanup.
//!
//! All helpers return [`UpdateError::Filesystem`] with the failing operation and path, so
//! callers can propagate with `?` and still produce an actionable message.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::core::UpdateError;

/// Ensures a directory exists, creating it and all parents if necessary.
///
/// Fails if the path exists but is not a directory.
pub fn ensure_dir(path: &Path) -> Result<(), UpdateError> {
    if path.is_dir() {
        return Ok(());
    }
    if path.exists() {
        return Err(UpdateError::Filesystem {
            operation: "create directory".to_string(),
            path: path.to_path_buf(),
            kind: io::ErrorKind::AlreadyExists,
            reason: "path exists but is not a directory".to_string(),
        });
    }
    fs::create_dir_all(path).map_err(|e| UpdateError::fs("create directory", path, &e))
}

/// Ensures the parent directory of `path` exists.
pub fn ensure_parent_dir(path: &Path) -> Result<(), UpdateError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => ensure_dir(parent),
        _ => Ok(()),
    }
}

/// Returns `path` with `suffix` appended to its file name (`app.zip` + `.tmp` = `app.zip.tmp`).
#[must_use]
pub fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(suffix);
    path.with_file_name(name)
}

/// Removes a file, treating "not found" as success.
pub fn remove_file_if_exists(path: &Path) -> Result<(), UpdateError> {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!("Removed {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(UpdateError::fs("remove file", path, &e)),
    }
}

/// Removes a file or directory tree, treating "not found" as success.
pub fn remove_path_if_exists(path: &Path) -> Result<(), UpdateError> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(UpdateError::fs("inspect", path, &e)),
    };

    let result = if metadata.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    match result {
        Ok(()) => {
            debug!("Removed {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(UpdateError::fs("remove", path, &e)),
    }
}

/// Renames `from` to `to`.
pub fn rename(from: &Path, to: &Path) -> Result<(), UpdateError> {
    fs::rename(from, to).map_err(|e| UpdateError::fs("rename", from, &e))
}

/// Finds the first entry under `root` named exactly `name`.
///
/// Traversal is breadth-ordered by depth so a top-level match wins over a nested one.
/// `want_dir` selects directories (bundles) or regular files (executables).
#[must_use]
pub fn find_by_name(root: &Path, name: &str, want_dir: bool) -> Option<PathBuf> {
    let mut matches: Vec<(usize, PathBuf)> = WalkDir::new(root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_name() == name)
        .filter(|entry| {
            if want_dir {
                entry.file_type().is_dir()
            } else {
                entry.file_type().is_file()
            }
        })
        .map(|entry| (entry.depth(), entry.into_path()))
        .collect();
    matches.sort_by_key(|(depth, _)| *depth);
    matches.into_iter().next().map(|(_, path)| path)
}

/// Finds the shallowest directory under `root` whose name ends with `.{extension}`.
#[must_use]
pub fn find_dir_with_extension(root: &Path, extension: &str) -> Option<PathBuf> {
    let mut matches: Vec<(usize, PathBuf)> = WalkDir::new(root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_dir())
        .filter(|entry| entry.path().extension().is_some_and(|ext| ext == extension))
        .map(|entry| (entry.depth(), entry.into_path()))
        .collect();
    matches.sort_by_key(|(depth, _)| *depth);
    matches.into_iter().next().map(|(_, path)| path)
}

/// Marks a file as executable (`0o755`). No-op on Windows.
pub fn set_executable(path: &Path) -> Result<(), UpdateError> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o755))
            .map_err(|e| UpdateError::fs("set permissions on", path, &e))?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}
