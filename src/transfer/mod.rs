//! Recursive copy/move engine.
//!
//! Files land through a hidden temp sibling that is flushed and then renamed into place,
//! so the final name never shows a partial file. Directories are walked directories-first
//! in byte order of their names, which keeps KeepBoth numbering reproducible.

use crate::{
    config::{EngineConfig, DEFAULT_COPY_BUFFER_SIZE, DEFAULT_MAX_KEEP_BOTH_ATTEMPTS},
    conflict::{unique_keep_both_path_with, ConflictDecision, ConflictResolver},
    errors::{
        domain::{classify_io_error, ErrorCode, IoErrorHint},
        FileOpError, FileOpErrorCode, FileOpResult,
    },
    path_safety::{ensure_not_child, exists_nofollow, metadata_if_exists_nofollow},
    tree_size::total_bytes,
};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    io::{self, ErrorKind, Read, Write},
    path::{Path, PathBuf},
    sync::atomic::{AtomicBool, Ordering},
    time::{SystemTime, UNIX_EPOCH},
};
use tracing::{debug, warn};

mod ops;
mod progress;

pub use ops::{create_directory, delete_entry, rename_entry};
pub use progress::{NoProgress, ProgressSink, ProgressTracker};

/// Rename primitive used by moves; swapped out in tests to simulate other devices.
pub type RenameFn = fn(&Path, &Path) -> io::Result<()>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TransferKind {
    Copy,
    Move,
}

impl TransferKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Copy => "copy",
            Self::Move => "move",
        }
    }
}

pub struct TransferContext<'a> {
    cancel: &'a AtomicBool,
    resolver: &'a dyn ConflictResolver,
    progress: ProgressTracker<'a>,
    rename: RenameFn,
    buffer_size: usize,
    max_keep_both_attempts: u32,
}

impl<'a> TransferContext<'a> {
    pub fn new(
        cancel: &'a AtomicBool,
        resolver: &'a dyn ConflictResolver,
        progress: ProgressTracker<'a>,
    ) -> Self {
        Self {
            cancel,
            resolver,
            progress,
            rename: rename_nofollow,
            buffer_size: DEFAULT_COPY_BUFFER_SIZE,
            max_keep_both_attempts: DEFAULT_MAX_KEEP_BOTH_ATTEMPTS,
        }
    }

    pub fn with_config(mut self, config: &EngineConfig) -> Self {
        self.buffer_size = config.buffer_size();
        self.max_keep_both_attempts = config.max_keep_both_attempts;
        self
    }

    pub fn with_rename(mut self, rename: RenameFn) -> Self {
        self.rename = rename;
        self
    }

    pub fn progress(&self) -> &ProgressTracker<'a> {
        &self.progress
    }

    pub fn progress_mut(&mut self) -> &mut ProgressTracker<'a> {
        &mut self.progress
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    fn poll_cancel(&self) -> FileOpResult<()> {
        if self.is_cancelled() {
            return Err(FileOpError::cancelled());
        }
        Ok(())
    }

    fn keep_both(&self, dest: &Path) -> PathBuf {
        unique_keep_both_path_with(dest, self.max_keep_both_attempts, exists_nofollow)
    }
}

/// Transfers one top-level source to `dest` (the full target path, not its parent).
/// `sized` is the source's precomputed size, credited at once when a move renames in place.
pub fn transfer_source(
    ctx: &mut TransferContext<'_>,
    kind: TransferKind,
    src: &Path,
    dest: &Path,
    sized: u64,
) -> FileOpResult<()> {
    ctx.poll_cancel()?;
    ensure_not_child(src, dest)?;
    match kind {
        TransferKind::Copy => copy_node(ctx, src, dest, &mut Vec::new()),
        TransferKind::Move => move_source(ctx, src, dest, sized),
    }
}

fn move_source(
    ctx: &mut TransferContext<'_>,
    src: &Path,
    dest: &Path,
    sized: u64,
) -> FileOpResult<()> {
    if !exists_nofollow(dest) {
        match (ctx.rename)(src, dest) {
            Ok(()) => {
                ctx.progress.advance(sized);
                return Ok(());
            }
            Err(e) if classify_io_error(&e) == IoErrorHint::CrossDevice => {
                debug!(
                    src = %src.display(),
                    dest = %dest.display(),
                    error_code = FileOpErrorCode::CrossDeviceMove.as_code_str(),
                    "rename crossed devices; copying instead"
                );
            }
            Err(e) => {
                debug!(
                    src = %src.display(),
                    dest = %dest.display(),
                    error = %e,
                    "rename failed; copying instead"
                );
            }
        }
    }
    // The whole tree lands first; the source is only touched once nothing failed.
    let mut skipped = Vec::new();
    copy_node(ctx, src, dest, &mut skipped)?;
    remove_moved_source(src, dest, &skipped)
}

/// Copies one node, recording every source entry whose conflict was skipped.
fn copy_node(
    ctx: &mut TransferContext<'_>,
    src: &Path,
    dest: &Path,
    skipped: &mut Vec<PathBuf>,
) -> FileOpResult<()> {
    ctx.poll_cancel()?;
    let meta = match fs::symlink_metadata(src) {
        Ok(meta) => meta,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(FileOpError::new(
                FileOpErrorCode::PathNotFound,
                format!("Missing source: {}", src.display()),
            ))
        }
        Err(e) => {
            return Err(FileOpError::from_io_error(
                &format!("Failed to read metadata for {}", src.display()),
                e,
            ))
        }
    };
    let file_type = meta.file_type();
    if !(file_type.is_file() || file_type.is_dir() || file_type.is_symlink()) {
        return Err(FileOpError::new(
            FileOpErrorCode::UnsupportedType,
            format!("Unsupported file type: {}", src.display()),
        ));
    }
    let mut dest = dest.to_path_buf();
    let mut replace_existing = false;

    if metadata_if_exists_nofollow(&dest)?.is_some() {
        match ctx.resolver.resolve(src, &dest, file_type.is_dir()) {
            ConflictDecision::Cancel => return Err(FileOpError::cancelled()),
            ConflictDecision::Skip => {
                let credit = if file_type.is_dir() {
                    total_bytes(src).unwrap_or(0)
                } else if file_type.is_file() {
                    meta.len()
                } else {
                    0
                };
                debug!(src = %src.display(), dest = %dest.display(), credit, "conflict skipped");
                ctx.progress.advance(credit);
                skipped.push(src.to_path_buf());
                return Ok(());
            }
            ConflictDecision::KeepBoth => dest = ctx.keep_both(&dest),
            ConflictDecision::Replace => {
                if src.starts_with(&dest) {
                    return Err(FileOpError::invalid_path(format!(
                        "Cannot replace {} which contains the source {}",
                        dest.display(),
                        src.display()
                    )));
                }
                replace_existing = true;
            }
        }
        ctx.poll_cancel()?;
    }

    if file_type.is_file() {
        return copy_file(ctx, src, &dest, &meta);
    }

    // Files swap atomically at the end; everything else clears the slot first.
    if replace_existing {
        delete_entry(&dest)?;
    }

    if file_type.is_symlink() {
        copy_symlink(src, &dest)
    } else {
        copy_dir(ctx, src, &dest, &meta, skipped)
    }
}

fn copy_dir(
    ctx: &mut TransferContext<'_>,
    src: &Path,
    dest: &Path,
    meta: &fs::Metadata,
    skipped: &mut Vec<PathBuf>,
) -> FileOpResult<()> {
    match metadata_if_exists_nofollow(dest)? {
        None => fs::create_dir(dest).map_err(|e| {
            FileOpError::from_io_error(&format!("Failed to create directory {}", dest.display()), e)
        })?,
        Some(existing) if existing.is_dir() => {}
        Some(_) => {
            return Err(FileOpError::new(
                FileOpErrorCode::DestinationExists,
                format!("Destination exists and isn't a directory: {}", dest.display()),
            ))
        }
    }

    for (child, name) in sorted_children(src)? {
        ctx.poll_cancel()?;
        copy_node(ctx, &child, &dest.join(&name), skipped)?;
    }

    // Applied last so a read-only source directory does not block its own children.
    if let Err(e) = fs::set_permissions(dest, meta.permissions()) {
        debug!(path = %dest.display(), error = %e, "could not copy directory permissions");
    }
    Ok(())
}

/// Children of `dir`, directories first, then by name bytes.
fn sorted_children(dir: &Path) -> FileOpResult<Vec<(PathBuf, std::ffi::OsString)>> {
    let read = fs::read_dir(dir).map_err(|e| {
        FileOpError::from_io_error(&format!("Failed to read dir {}", dir.display()), e)
    })?;
    let mut children = Vec::new();
    for entry in read {
        let entry = entry.map_err(|e| {
            FileOpError::from_io_error(&format!("Failed to read entry in {}", dir.display()), e)
        })?;
        let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
        children.push((is_dir, entry.path(), entry.file_name()));
    }
    children.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.2.cmp(&b.2)));
    Ok(children
        .into_iter()
        .map(|(_, path, name)| (path, name))
        .collect())
}

fn copy_file(
    ctx: &mut TransferContext<'_>,
    src: &Path,
    dest: &Path,
    meta: &fs::Metadata,
) -> FileOpResult<()> {
    ctx.poll_cancel()?;
    let tmp = temp_sibling(dest)?;
    let result = write_temp_copy(ctx, src, &tmp).and_then(|_| {
        if let Err(e) = fs::set_permissions(&tmp, meta.permissions()) {
            debug!(path = %tmp.display(), error = %e, "could not copy file permissions");
        }
        ctx.poll_cancel()?;
        put_in_place(&tmp, dest)
    });
    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

fn write_temp_copy(ctx: &mut TransferContext<'_>, src: &Path, tmp: &Path) -> FileOpResult<()> {
    let mut reader = fs::File::open(src).map_err(|e| {
        FileOpError::from_io_error(&format!("Failed to open source {}", src.display()), e)
    })?;
    let mut writer = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(tmp)
        .map_err(|e| {
            FileOpError::from_io_error(&format!("Failed to create {}", tmp.display()), e)
        })?;

    let mut buf = vec![0u8; ctx.buffer_size];
    loop {
        ctx.poll_cancel()?;
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                return Err(FileOpError::from_io_error(
                    &format!("Read error: {}", src.display()),
                    e,
                ))
            }
        };
        writer.write_all(&buf[..n]).map_err(|e| {
            FileOpError::from_io_error(&format!("Write error: {}", tmp.display()), e)
        })?;
        ctx.progress.advance(n as u64);
    }
    writer
        .flush()
        .and_then(|_| writer.sync_all())
        .map_err(|e| FileOpError::from_io_error(&format!("Failed to flush {}", tmp.display()), e))
}

/// Moves a finished temp file onto its final name, clearing whatever sits there now.
fn put_in_place(tmp: &Path, dest: &Path) -> FileOpResult<()> {
    if exists_nofollow(dest) {
        delete_entry(dest)?;
    }
    fs::rename(tmp, dest).map_err(|e| {
        FileOpError::from_io_error(
            &format!("Failed to move {} into place", dest.display()),
            e,
        )
    })
}

fn temp_sibling(dest: &Path) -> FileOpResult<PathBuf> {
    let parent = dest
        .parent()
        .ok_or_else(|| FileOpError::invalid_path(format!("Invalid destination: {}", dest.display())))?;
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "item".to_string());
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    Ok(parent.join(format!(
        ".{name}.fileops-tmp-{}-{nanos}",
        std::process::id()
    )))
}

fn copy_symlink(src: &Path, dest: &Path) -> FileOpResult<()> {
    let target = fs::read_link(src).map_err(|e| {
        FileOpError::from_io_error(&format!("Failed to read link {}", src.display()), e)
    })?;
    create_symlink(src, &target, dest).map_err(|e| {
        FileOpError::from_io_error(&format!("Failed to create link {}", dest.display()), e)
    })
}

#[cfg(unix)]
fn create_symlink(_src: &Path, target: &Path, dest: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, dest)
}

#[cfg(windows)]
fn create_symlink(src: &Path, target: &Path, dest: &Path) -> io::Result<()> {
    if fs::metadata(src).map(|m| m.is_dir()).unwrap_or(false) {
        std::os::windows::fs::symlink_dir(target, dest)
    } else {
        std::os::windows::fs::symlink_file(target, dest)
    }
}

/// Deletes the source of a finished copy-and-delete move. Skipped entries stay, and so do
/// the directories holding them.
fn remove_moved_source(src: &Path, dest: &Path, skipped: &[PathBuf]) -> FileOpResult<()> {
    if skipped.iter().any(|s| s == src) {
        return Ok(());
    }
    if !skipped.iter().any(|s| s.starts_with(src)) {
        return delete_entry(src).map_err(|e| moved_but_not_deleted(src, dest, e));
    }
    for (child, name) in sorted_children(src)? {
        remove_moved_source(&child, &dest.join(&name), skipped)?;
    }
    Ok(())
}

fn moved_but_not_deleted(src: &Path, dest: &Path, error: FileOpError) -> FileOpError {
    warn!(
        src = %src.display(),
        dest = %dest.display(),
        error = %error,
        "copied during move but source could not be removed"
    );
    let code = match error.code() {
        FileOpErrorCode::PermissionDenied | FileOpErrorCode::ReadOnlyFilesystem => error.code(),
        _ => FileOpErrorCode::OperationFailed,
    };
    FileOpError::new(
        code,
        format!(
            "Copied {} -> {} but failed to delete source: {error}",
            src.display(),
            dest.display()
        ),
    )
}

/// Plain rename; on its own it never follows a final symlink.
pub fn rename_nofollow(src: &Path, dest: &Path) -> io::Result<()> {
    fs::rename(src, dest)
}
