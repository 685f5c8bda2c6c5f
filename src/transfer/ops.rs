use crate::{
    errors::{FileOpError, FileOpErrorCode, FileOpResult},
    path_safety::{
        ensure_readable_source, ensure_writable_target, exists_nofollow, validate_file_name,
    },
};
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::info;

/// Creates `parent/name` as a new directory; `name` must be a single valid entry name.
pub fn create_directory(parent: &Path, name: &str) -> FileOpResult<PathBuf> {
    let trimmed = name.trim();
    validate_file_name(trimmed)?;
    let meta = fs::metadata(parent).map_err(|e| {
        FileOpError::from_io_error(&format!("Invalid directory {}", parent.display()), e)
    })?;
    if !meta.is_dir() {
        return Err(FileOpError::invalid_path(format!(
            "Not a directory: {}",
            parent.display()
        )));
    }
    ensure_writable_target(parent)?;
    let target = parent.join(trimmed);
    if exists_nofollow(&target) {
        return Err(FileOpError::new(
            FileOpErrorCode::DestinationExists,
            format!("Already exists: {}", target.display()),
        ));
    }
    fs::create_dir(&target).map_err(|e| {
        FileOpError::from_io_error(&format!("Failed to create folder {}", target.display()), e)
    })?;
    info!(path = %target.display(), "created directory");
    Ok(target)
}

/// Renames an entry within its directory without clobbering a sibling.
pub fn rename_entry(path: &Path, new_name: &str) -> FileOpResult<PathBuf> {
    validate_file_name(new_name)?;
    ensure_readable_source(path)?;
    let parent = path
        .parent()
        .ok_or_else(|| FileOpError::invalid_path(format!("Invalid path: {}", path.display())))?;
    let target = parent.join(new_name);
    if target == path {
        return Ok(target);
    }
    ensure_writable_target(parent)?;
    if exists_nofollow(&target) {
        return Err(FileOpError::new(
            FileOpErrorCode::DestinationExists,
            format!("Already exists: {}", target.display()),
        ));
    }
    fs::rename(path, &target).map_err(|e| {
        FileOpError::from_io_error(
            &format!("Failed to rename {} -> {}", path.display(), target.display()),
            e,
        )
    })?;
    info!(from = %path.display(), to = %target.display(), "renamed entry");
    Ok(target)
}

/// Permanently removes a path. Symlinks are removed, never followed.
pub fn delete_entry(path: &Path) -> FileOpResult<()> {
    let meta = fs::symlink_metadata(path).map_err(|e| {
        FileOpError::from_io_error(&format!("Failed to read metadata for {}", path.display()), e)
    })?;
    if meta.is_dir() {
        fs::remove_dir_all(path).map_err(|e| {
            FileOpError::from_io_error(&format!("Failed to delete directory {}", path.display()), e)
        })
    } else {
        fs::remove_file(path).map_err(|e| {
            FileOpError::from_io_error(&format!("Failed to delete file {}", path.display()), e)
        })
    }
}
