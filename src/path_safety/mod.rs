//! Guards every mutation runs before touching the filesystem.
//!
//! Normalization rule: an existing target is canonicalized. Anything else is made
//! absolute, cleaned lexically (`.` dropped, `..` pops), and then rebuilt on top of the
//! canonical form of its deepest existing ancestor. The result is idempotent, which the
//! KeepBoth and trash comparisons rely on.

use crate::errors::{FileOpError, FileOpErrorCode, FileOpResult};
use std::{
    fs, io,
    path::{Component, Path, PathBuf},
};
use tracing::debug;

mod validate;

pub use validate::{validate_file_name, validate_path, MAX_FILE_NAME_BYTES, MAX_PATH_BYTES};

pub fn normalize(path: &Path) -> PathBuf {
    let absolute = absolutize(path);
    if let Ok(canon) = absolute.canonicalize() {
        return normalize_verbatim(&canon);
    }
    let cleaned = lexical_clean(&absolute);
    let resolved = resolve_existing_prefix(&cleaned);
    debug!(
        raw = %path.display(),
        resolved = %resolved.display(),
        "normalized non-existing path"
    );
    resolved
}

/// Like `normalize`, but the final component is kept as named, so a symlink stays the link.
pub fn normalize_entry(path: &Path) -> PathBuf {
    let absolute = absolutize(path);
    let cleaned = lexical_clean(&absolute);
    match (cleaned.parent(), cleaned.file_name()) {
        (Some(parent), Some(name)) => normalize(parent).join(name),
        _ => normalize(&cleaned),
    }
}

fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path.to_path_buf(),
    }
}

fn lexical_clean(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::Prefix(p) => out.push(p.as_os_str()),
            Component::RootDir => out.push(Component::RootDir.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                // popping past the root is a no-op, like the OS does
                if out.parent().is_some() {
                    out.pop();
                }
            }
            Component::Normal(seg) => out.push(seg),
        }
    }
    out
}

/// Canonicalizes the deepest existing ancestor of an already-clean absolute path and
/// re-appends the missing tail.
fn resolve_existing_prefix(cleaned: &Path) -> PathBuf {
    let mut tail: Vec<&std::ffi::OsStr> = Vec::new();
    let mut cursor = Some(cleaned);
    while let Some(candidate) = cursor {
        if let Ok(canon) = candidate.canonicalize() {
            let mut out = normalize_verbatim(&canon);
            for seg in tail.iter().rev() {
                out.push(seg);
            }
            return out;
        }
        if let Some(name) = candidate.file_name() {
            tail.push(name);
        }
        cursor = candidate.parent();
    }
    cleaned.to_path_buf()
}

#[cfg(target_os = "windows")]
fn normalize_verbatim(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    if let Some(rest) = s.strip_prefix(r"\\?\UNC\") {
        return PathBuf::from(format!(r"\\{rest}"));
    }
    if let Some(rest) = s.strip_prefix(r"\\?\") {
        return PathBuf::from(rest);
    }
    path.to_path_buf()
}

#[cfg(not(target_os = "windows"))]
fn normalize_verbatim(path: &Path) -> PathBuf {
    path.to_path_buf()
}

/// Checks that something could be created at `path`: the nearest existing directory at
/// or above it must be writable and live on a read-write filesystem.
pub fn ensure_writable_target(path: &Path) -> FileOpResult<()> {
    let mut cursor = Some(path);
    while let Some(candidate) = cursor {
        match fs::metadata(candidate) {
            Ok(meta) if meta.is_dir() => return check_dir_writable(candidate),
            Ok(_) if candidate == path => {}
            Ok(_) => {
                return Err(FileOpError::new(
                    FileOpErrorCode::NoWritableParent,
                    format!(
                        "Ancestor is not a directory: {} (for {})",
                        candidate.display(),
                        path.display()
                    ),
                ))
            }
            Err(e) if is_missing(&e) => {}
            Err(e) => {
                return Err(FileOpError::from_io_error(
                    &format!("Failed to read metadata for {}", candidate.display()),
                    e,
                ))
            }
        }
        cursor = candidate.parent().filter(|p| !p.as_os_str().is_empty());
    }
    Err(FileOpError::new(
        FileOpErrorCode::NoWritableParent,
        format!("No existing parent directory for {}", path.display()),
    ))
}

fn is_missing(error: &io::Error) -> bool {
    if error.kind() == io::ErrorKind::NotFound {
        return true;
    }
    #[cfg(unix)]
    {
        error.raw_os_error() == Some(libc::ENOTDIR)
    }
    #[cfg(not(unix))]
    {
        false
    }
}

fn check_dir_writable(dir: &Path) -> FileOpResult<()> {
    if is_read_only_filesystem(dir) {
        return Err(FileOpError::new(
            FileOpErrorCode::ReadOnlyFilesystem,
            format!("Read-only file system: {}", dir.display()),
        ));
    }
    match access(dir, Access::Write) {
        Ok(()) => Ok(()),
        Err(e) => {
            let err = FileOpError::from_io_error(&format!("Cannot write to {}", dir.display()), e);
            match err.code() {
                FileOpErrorCode::ReadOnlyFilesystem | FileOpErrorCode::PermissionDenied => Err(err),
                _ => Err(FileOpError::new(FileOpErrorCode::PermissionDenied, err.to_string())),
            }
        }
    }
}

/// Existence and readability of a source, without following a final symlink.
pub fn ensure_readable_source(path: &Path) -> FileOpResult<fs::Metadata> {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(FileOpError::new(
                FileOpErrorCode::PathNotFound,
                format!("Source does not exist: {}", path.display()),
            ))
        }
        Err(e) => {
            return Err(FileOpError::from_io_error(
                &format!("Failed to read metadata for {}", path.display()),
                e,
            ))
        }
    };
    if meta.file_type().is_symlink() {
        // Only the link text is needed, which any listable parent allows.
        return Ok(meta);
    }
    let mode = if meta.is_dir() {
        Access::ReadDir
    } else {
        Access::Read
    };
    access(path, mode).map_err(|e| {
        let err = FileOpError::from_io_error(&format!("Cannot read {}", path.display()), e);
        FileOpError::new(FileOpErrorCode::PermissionDenied, err.to_string())
    })?;
    Ok(meta)
}

pub fn metadata_if_exists_nofollow(path: &Path) -> FileOpResult<Option<fs::Metadata>> {
    match fs::symlink_metadata(path) {
        Ok(meta) => Ok(Some(meta)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(FileOpError::from_io_error(
            &format!("Failed to read metadata for {}", path.display()),
            err,
        )),
    }
}

pub fn exists_nofollow(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

pub fn ensure_not_child(src: &Path, dest: &Path) -> FileOpResult<()> {
    if dest.starts_with(src) {
        return Err(FileOpError::invalid_path(format!(
            "Cannot place {} inside itself ({})",
            src.display(),
            dest.display()
        )));
    }
    Ok(())
}

/// Rejects `path` unless it sits strictly below `base`. The last component of `path` is
/// not resolved.
pub fn ensure_within(path: &Path, base: &Path) -> FileOpResult<()> {
    let path = normalize_entry(path);
    let base = normalize(base);
    if path == base || !path.starts_with(&base) {
        return Err(FileOpError::invalid_path(format!(
            "Path is outside {}: {}",
            base.display(),
            path.display()
        )));
    }
    Ok(())
}

#[derive(Clone, Copy)]
enum Access {
    Read,
    ReadDir,
    Write,
}

#[cfg(unix)]
fn access(path: &Path, mode: Access) -> io::Result<()> {
    let c_path = c_path(path)?;
    let flags = match mode {
        Access::Read => libc::R_OK,
        Access::ReadDir => libc::R_OK | libc::X_OK,
        Access::Write => libc::W_OK | libc::X_OK,
    };
    // SAFETY: c_path is a valid NUL-terminated string for the duration of the call.
    let rc = unsafe { libc::access(c_path.as_ptr(), flags) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
fn access(path: &Path, mode: Access) -> io::Result<()> {
    let meta = fs::metadata(path)?;
    if matches!(mode, Access::Write) && meta.permissions().readonly() {
        return Err(io::Error::from(io::ErrorKind::PermissionDenied));
    }
    Ok(())
}

#[cfg(unix)]
fn is_read_only_filesystem(path: &Path) -> bool {
    let Ok(c_path) = c_path(path) else {
        return false;
    };
    let mut stat = std::mem::MaybeUninit::<libc::statvfs>::uninit();
    // SAFETY: statvfs fills the struct on success; it is only read when rc == 0.
    let rc = unsafe { libc::statvfs(c_path.as_ptr(), stat.as_mut_ptr()) };
    if rc != 0 {
        return false;
    }
    let stat = unsafe { stat.assume_init() };
    (stat.f_flag & libc::ST_RDONLY) != 0
}

#[cfg(not(unix))]
fn is_read_only_filesystem(_path: &Path) -> bool {
    false
}

#[cfg(unix)]
fn c_path(path: &Path) -> io::Result<std::ffi::CString> {
    use std::os::unix::ffi::OsStrExt;
    std::ffi::CString::new(path.as_os_str().as_bytes())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "path contains a NUL byte"))
}
