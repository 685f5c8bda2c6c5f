use super::error::{CoordinatorError, CoordinatorErrorCode, CoordinatorResult};
use crate::{
    path_safety::{ensure_readable_source, normalize, normalize_entry},
    transfer::TransferKind,
};
use serde::{Deserialize, Serialize};
use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ClipboardMode {
    Copy,
    Cut,
}

impl ClipboardMode {
    pub fn transfer_kind(self) -> TransferKind {
        match self {
            Self::Copy => TransferKind::Copy,
            Self::Cut => TransferKind::Move,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClipboardContents {
    pub entries: Vec<PathBuf>,
    pub mode: ClipboardMode,
}

/// One entry a paste would collide with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictInfo {
    pub src: PathBuf,
    pub target: PathBuf,
    pub is_dir: bool,
    /// The entry would land on itself and will be skipped.
    pub same_path: bool,
}

#[derive(Clone, Default)]
pub(crate) struct Clipboard {
    inner: Arc<Mutex<Option<ClipboardContents>>>,
}

impl Clipboard {
    pub(crate) fn set(&self, paths: &[PathBuf], mode: ClipboardMode) -> CoordinatorResult<()> {
        if paths.is_empty() {
            *self.lock()? = None;
            return Ok(());
        }
        let mut entries = Vec::with_capacity(paths.len());
        for path in paths {
            let clean = normalize_entry(path);
            ensure_readable_source(&clean).map_err(|e| {
                CoordinatorError::invalid_request(format!("Invalid clipboard entry: {e}"))
            })?;
            entries.push(clean);
        }
        *self.lock()? = Some(ClipboardContents { entries, mode });
        Ok(())
    }

    pub(crate) fn snapshot(&self) -> CoordinatorResult<Option<ClipboardContents>> {
        Ok(self.lock()?.clone())
    }

    /// Clears the clipboard if it still holds `entries`; a newer cut is left alone.
    pub(crate) fn clear_if_holding(&self, entries: &[PathBuf]) -> CoordinatorResult<bool> {
        let mut guard = self.lock()?;
        let holds = guard
            .as_ref()
            .map(|c| c.entries.as_slice() == entries)
            .unwrap_or(false);
        if holds {
            *guard = None;
        }
        Ok(holds)
    }

    pub(crate) fn preview(&self, dest: &Path) -> CoordinatorResult<Vec<ConflictInfo>> {
        let Some(contents) = self.snapshot()? else {
            return Err(CoordinatorError::invalid_request("Clipboard is empty"));
        };
        let dest = normalize(dest);
        let mut conflicts = Vec::new();
        for src in &contents.entries {
            let name = src.file_name().ok_or_else(|| {
                CoordinatorError::invalid_request(format!("Invalid source path: {}", src.display()))
            })?;
            let target = dest.join(name);
            let Ok(meta) = std::fs::symlink_metadata(&target) else {
                continue;
            };
            conflicts.push(ConflictInfo {
                same_path: &target == src,
                src: src.clone(),
                target,
                is_dir: meta.is_dir(),
            });
        }
        Ok(conflicts)
    }

    fn lock(&self) -> CoordinatorResult<MutexGuard<'_, Option<ClipboardContents>>> {
        self.inner.lock().map_err(|_| {
            CoordinatorError::new(CoordinatorErrorCode::TaskFailed, "Failed to lock clipboard")
        })
    }
}
