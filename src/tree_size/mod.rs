use crate::errors::{domain::DomainError, FileOpError, FileOpErrorCode, FileOpResult};
use std::{
    io,
    path::{Path, PathBuf},
    sync::atomic::{AtomicBool, Ordering},
};
use tracing::{debug, warn};
use walkdir::WalkDir;

#[cfg(test)]
mod tests;

/// Per-source sizes for one run. A source that could not be sized counts as 0 and leaves a
/// warning; it is still attempted by the transfer.
#[derive(Debug, Clone, Default)]
pub struct SizeReport {
    pub per_source: Vec<u64>,
    pub total: u64,
    pub warnings: Vec<FileOpError>,
}

pub fn total_bytes(path: &Path) -> FileOpResult<u64> {
    total_bytes_cancellable(path, None)
}

/// Byte size of `path`: regular files count their length, symlinks count 0 and are never
/// followed, directories sum their subtree. A missing path is 0.
pub fn total_bytes_cancellable(path: &Path, cancel: Option<&AtomicBool>) -> FileOpResult<u64> {
    let mut total: u64 = 0;
    let walker = WalkDir::new(path)
        .follow_links(false)
        .follow_root_links(false);
    for entry in walker {
        if cancel.map(|c| c.load(Ordering::Relaxed)).unwrap_or(false) {
            return Err(FileOpError::cancelled());
        }
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                let at = err
                    .path()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| path.to_path_buf());
                let io_err = err
                    .into_io_error()
                    .unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, "walk failed"));
                if io_err.kind() == io::ErrorKind::NotFound {
                    // vanished between listing and stat
                    debug!(path = %at.display(), "size walk: entry disappeared");
                    continue;
                }
                return Err(FileOpError::from_io_error(
                    &format!("Failed to scan {}", at.display()),
                    io_err,
                ));
            }
        };
        let file_type = entry.file_type();
        if file_type.is_symlink() || file_type.is_dir() {
            continue;
        }
        if !file_type.is_file() {
            return Err(FileOpError::new(
                FileOpErrorCode::UnsupportedType,
                format!("Unsupported file type: {}", entry.path().display()),
            ));
        }
        match entry.metadata() {
            Ok(meta) => total = total.saturating_add(meta.len()),
            Err(err) => {
                let io_err = err
                    .into_io_error()
                    .unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, "stat failed"));
                if io_err.kind() != io::ErrorKind::NotFound {
                    return Err(FileOpError::from_io_error(
                        &format!("Failed to read metadata for {}", entry.path().display()),
                        io_err,
                    ));
                }
            }
        }
    }
    Ok(total)
}

/// Sizes every source once. Only cancellation fails the whole report.
pub fn size_sources(sources: &[PathBuf], cancel: Option<&AtomicBool>) -> FileOpResult<SizeReport> {
    let mut report = SizeReport {
        per_source: Vec::with_capacity(sources.len()),
        ..SizeReport::default()
    };
    for src in sources {
        match total_bytes_cancellable(src, cancel) {
            Ok(bytes) => {
                report.per_source.push(bytes);
                report.total = report.total.saturating_add(bytes);
            }
            Err(err) if err.is_cancelled() => return Err(err),
            Err(err) => {
                warn!(
                    path = %src.display(),
                    error_code = err.code_str(),
                    error = %err,
                    "size scan failed; counting source as 0"
                );
                report.per_source.push(0);
                report.warnings.push(err);
            }
        }
    }
    Ok(report)
}
