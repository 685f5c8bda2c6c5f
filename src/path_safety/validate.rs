use crate::errors::{FileOpError, FileOpResult};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Component, Path, PathBuf};

pub const MAX_PATH_BYTES: usize = 4096;
pub const MAX_FILE_NAME_BYTES: usize = 255;

const INVALID_NAME_CHARS: &[char] = &['<', '>', ':', '"', '|', '?', '*', '/', '\\'];

static RESERVED_NAME: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?i)^(con|prn|aux|nul|com[1-9]|lpt[1-9])(\..*)?$").ok());

/// Rejects raw path strings that are empty, oversized, carry control bytes or climb with `..`.
pub fn validate_path(raw: &str) -> FileOpResult<PathBuf> {
    if raw.is_empty() {
        return Err(FileOpError::invalid_path("Invalid path: empty"));
    }
    if raw.len() > MAX_PATH_BYTES {
        return Err(FileOpError::invalid_path(format!(
            "Invalid path: longer than {MAX_PATH_BYTES} bytes"
        )));
    }
    if raw.chars().any(char::is_control) {
        return Err(FileOpError::invalid_path(
            "Invalid path: contains control characters",
        ));
    }
    let path = Path::new(raw);
    if path.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(FileOpError::invalid_path(format!(
            "Invalid path: traversal component in {raw}"
        )));
    }
    Ok(path.to_path_buf())
}

/// Validates a single entry name for create/rename.
pub fn validate_file_name(name: &str) -> FileOpResult<()> {
    if name.is_empty() || name == "." || name == ".." {
        return Err(FileOpError::invalid_path(format!(
            "Invalid name: '{name}'"
        )));
    }
    if name.len() > MAX_FILE_NAME_BYTES {
        return Err(FileOpError::invalid_path(format!(
            "Invalid name: longer than {MAX_FILE_NAME_BYTES} bytes"
        )));
    }
    if let Some(ch) = name
        .chars()
        .find(|c| c.is_control() || INVALID_NAME_CHARS.contains(c))
    {
        return Err(FileOpError::invalid_path(format!(
            "Invalid name: contains {ch:?}"
        )));
    }
    if name.starts_with(' ') || name.ends_with(' ') || name.ends_with('.') {
        return Err(FileOpError::invalid_path(
            "Invalid name: leading/trailing space or trailing dot",
        ));
    }
    if RESERVED_NAME
        .as_ref()
        .map(|re| re.is_match(name))
        .unwrap_or(false)
    {
        return Err(FileOpError::invalid_path(format!(
            "Invalid name: '{name}' is reserved"
        )));
    }
    Ok(())
}
