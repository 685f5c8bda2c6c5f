//! Engine-owned trash: items live under `files/`, their sidecars under `info/`.

use crate::{
    config::{EngineConfig, DEFAULT_MAX_KEEP_BOTH_ATTEMPTS},
    conflict::{unique_keep_both_path_with, ConflictDecision, FixedResolver},
    errors::{domain::DomainError, FileOpError, FileOpErrorCode, FileOpResult},
    path_safety::{
        ensure_readable_source, ensure_within, ensure_writable_target, exists_nofollow,
        normalize, normalize_entry,
    },
    transfer::{
        delete_entry, rename_nofollow, transfer_source, NoProgress, ProgressTracker,
        RenameFn, TransferContext, TransferKind,
    },
    tree_size::total_bytes,
};
use serde::Serialize;
use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::atomic::AtomicBool,
    time::Duration,
};
use tracing::{debug, info, warn};

mod info;

pub use info::{
    decode_trash_info_path, encode_trash_info_path, info_path_for, read_trash_info,
    write_trash_info, TrashInfo, TRASH_INFO_EXT,
};

#[derive(Debug, Clone)]
pub struct TrashReport {
    pub original_path: PathBuf,
    pub trashed_path: PathBuf,
    /// Set when the item moved but its sidecar could not be written.
    pub warning: Option<FileOpError>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrashEntry {
    pub name: String,
    pub trashed_path: PathBuf,
    pub original_path: Option<PathBuf>,
    pub deletion_date: Option<String>,
    pub size: u64,
}

pub struct TrashManager {
    root: PathBuf,
    files: PathBuf,
    info: PathBuf,
    rename: RenameFn,
    max_keep_both_attempts: u32,
}

impl TrashManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            files: root.join("files"),
            info: root.join("info"),
            root,
            rename: rename_nofollow,
            max_keep_both_attempts: DEFAULT_MAX_KEEP_BOTH_ATTEMPTS,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        let mut manager = Self::new(config.trash_dir.clone());
        manager.max_keep_both_attempts = config.max_keep_both_attempts;
        manager
    }

    pub fn with_rename(mut self, rename: RenameFn) -> Self {
        self.rename = rename;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn files_dir(&self) -> &Path {
        &self.files
    }

    pub fn info_dir(&self) -> &Path {
        &self.info
    }

    pub fn move_to_trash(&self, path: &Path) -> FileOpResult<TrashReport> {
        let src = normalize_entry(path);
        ensure_readable_source(&src)?;
        let name = src
            .file_name()
            .ok_or_else(|| FileOpError::invalid_path(format!("Cannot trash {}", src.display())))?
            .to_os_string();
        if src.starts_with(normalize(&self.root)) {
            return Err(FileOpError::invalid_path(format!(
                "Already in trash: {}",
                src.display()
            )));
        }
        if let Some(parent) = src.parent() {
            ensure_writable_target(parent)?;
        }
        self.ensure_roots()?;

        let wanted = self.files.join(&name);
        let taken = |candidate: &Path| {
            exists_nofollow(candidate)
                || candidate
                    .file_name()
                    .map(|n| exists_nofollow(&info_path_for(&self.info, n)))
                    .unwrap_or(true)
        };
        let trashed = if taken(wanted.as_path()) {
            unique_keep_both_path_with(&wanted, self.max_keep_both_attempts, taken)
        } else {
            wanted
        };

        if let Err(err) = self.relocate(&src, &trashed) {
            // copied in full but the source stayed behind; keep the trashed copy restorable
            if exists_nofollow(&trashed) {
                let _ = self.record(&src, &trashed);
            }
            return Err(err);
        }

        let report = TrashReport {
            original_path: src.clone(),
            trashed_path: trashed.clone(),
            warning: self.record(&src, &trashed),
        };
        info!(
            from = %src.display(),
            to = %trashed.display(),
            "moved to trash"
        );
        Ok(report)
    }

    /// Moves a trashed item back where it came from, or beside it when that spot is taken.
    /// Returns the path it landed on.
    pub fn restore_from_trash(&self, trashed: &Path) -> FileOpResult<PathBuf> {
        let trashed = self.item_in_files(trashed)?;
        if !exists_nofollow(&trashed) {
            return Err(FileOpError::new(
                FileOpErrorCode::PathNotFound,
                format!("Trashed item does not exist: {}", trashed.display()),
            ));
        }
        let sidecar = self.sidecar_for(&trashed)?;
        if !exists_nofollow(&sidecar) {
            return Err(FileOpError::new(
                FileOpErrorCode::PathNotFound,
                format!("Trash info does not exist for {}", trashed.display()),
            ));
        }
        let original = read_trash_info(&sidecar)?.original_path;
        let target = if exists_nofollow(&original) {
            unique_keep_both_path_with(&original, self.max_keep_both_attempts, exists_nofollow)
        } else {
            original.clone()
        };

        if let Some(parent) = target.parent() {
            ensure_writable_target(parent)?;
            fs::create_dir_all(parent).map_err(|e| {
                FileOpError::from_io_error(
                    &format!("Failed to recreate {}", parent.display()),
                    e,
                )
            })?;
        }
        self.relocate(&trashed, &target)?;

        if let Err(e) = fs::remove_file(&sidecar) {
            warn!(
                path = %sidecar.display(),
                error = %e,
                "restored item but could not remove its info file"
            );
        }
        info!(
            from = %trashed.display(),
            to = %target.display(),
            renamed = target != original,
            "restored from trash"
        );
        Ok(target)
    }

    pub fn empty_trash(&self) -> FileOpResult<()> {
        for dir in [&self.files, &self.info] {
            match fs::remove_dir_all(dir) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(FileOpError::from_io_error(
                        &format!("Failed to empty trash at {}", dir.display()),
                        e,
                    ))
                }
            }
        }
        self.ensure_roots()?;
        info!(root = %self.root.display(), "emptied trash");
        Ok(())
    }

    /// Items under `files/`, sorted by name. Orphans have no original path.
    pub fn list_trash(&self) -> FileOpResult<Vec<TrashEntry>> {
        let read = match fs::read_dir(&self.files) {
            Ok(read) => read,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(FileOpError::from_io_error(
                    &format!("Failed to read trash {}", self.files.display()),
                    e,
                ))
            }
        };
        let mut entries = Vec::new();
        for entry in read {
            let entry = entry.map_err(|e| {
                FileOpError::from_io_error(
                    &format!("Failed to read trash {}", self.files.display()),
                    e,
                )
            })?;
            let trashed_path = entry.path();
            let info = read_trash_info(&info_path_for(&self.info, &entry.file_name())).ok();
            entries.push(TrashEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                size: total_bytes(&trashed_path).unwrap_or(0),
                original_path: info.as_ref().map(|i| i.original_path.clone()),
                deletion_date: info.and_then(|i| i.deletion_date),
                trashed_path,
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    /// Permanently deletes a trashed item and its sidecar.
    pub fn purge(&self, trashed: &Path) -> FileOpResult<()> {
        let trashed = self.item_in_files(trashed)?;
        delete_entry(&trashed)?;
        let sidecar = self.sidecar_for(&trashed)?;
        match fs::remove_file(&sidecar) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(FileOpError::from_io_error(
                    &format!("Failed to delete trash info {}", sidecar.display()),
                    e,
                ))
            }
        }
        info!(path = %trashed.display(), "purged from trash");
        Ok(())
    }

    fn ensure_roots(&self) -> FileOpResult<()> {
        for dir in [&self.files, &self.info] {
            fs::create_dir_all(dir).map_err(|e| {
                FileOpError::from_io_error(
                    &format!("Failed to create trash directory {}", dir.display()),
                    e,
                )
            })?;
        }
        Ok(())
    }

    fn item_in_files(&self, trashed: &Path) -> FileOpResult<PathBuf> {
        let trashed = normalize_entry(trashed);
        ensure_within(&trashed, &self.files)?;
        if trashed.parent() != Some(normalize(&self.files).as_path()) {
            return Err(FileOpError::invalid_path(format!(
                "Not a top-level trash item: {}",
                trashed.display()
            )));
        }
        Ok(trashed)
    }

    /// Writes the sidecar for a trashed item. A failure is returned as a warning.
    fn record(&self, original: &Path, trashed: &Path) -> Option<FileOpError> {
        let result = self
            .sidecar_for(trashed)
            .and_then(|sidecar| write_trash_info(&sidecar, &TrashInfo::now(original)));
        let err = result.err()?;
        warn!(
            path = %trashed.display(),
            error_code = err.code_str(),
            error = %err,
            "item trashed without info file"
        );
        Some(err)
    }

    fn sidecar_for(&self, trashed: &Path) -> FileOpResult<PathBuf> {
        let name = trashed.file_name().ok_or_else(|| {
            FileOpError::invalid_path(format!("Invalid trash item: {}", trashed.display()))
        })?;
        Ok(info_path_for(&self.info, name))
    }

    /// Renames `src` onto the free path `dest`, or copies it there and then deletes it when
    /// the rename cannot be done in place. A failed copy leaves `src` untouched and nothing
    /// at `dest`.
    fn relocate(&self, src: &Path, dest: &Path) -> FileOpResult<()> {
        match (self.rename)(src, dest) {
            Ok(()) => return Ok(()),
            Err(e) => debug!(
                src = %src.display(),
                dest = %dest.display(),
                error = %e,
                "rename failed; copying instead"
            ),
        }
        let cancel = AtomicBool::new(false);
        let resolver = FixedResolver(ConflictDecision::Cancel);
        let tracker = ProgressTracker::new(0, &NoProgress, Duration::ZERO);
        let mut ctx = TransferContext::new(&cancel, &resolver, tracker);
        if let Err(err) = transfer_source(&mut ctx, TransferKind::Copy, src, dest, 0) {
            if exists_nofollow(dest) {
                if let Err(cleanup) = delete_entry(dest) {
                    warn!(path = %dest.display(), error = %cleanup, "could not remove partial copy");
                }
            }
            return Err(err);
        }
        delete_entry(src).map_err(|err| {
            warn!(
                src = %src.display(),
                dest = %dest.display(),
                error = %err,
                "copied but the source could not be removed"
            );
            err
        })
    }
}
