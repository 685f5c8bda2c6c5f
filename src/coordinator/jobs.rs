use super::{events::EngineEvent, events::TransferOutcome, TransferRequest};
use crate::{
    config::EngineConfig,
    conflict::{ChannelResolver, ConflictSlot},
    errors::{domain::DomainError, FileOpError, FileOpResult, ReportedError},
    path_safety::{
        ensure_readable_source, ensure_writable_target, normalize, normalize_entry,
    },
    transfer::{
        delete_entry, transfer_source, ProgressTracker, RenameFn, TransferContext, TransferKind,
    },
    trash::TrashManager,
    tree_size::size_sources,
};
use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

pub(super) enum Job {
    Transfer(TransferRequest),
    Trash(Vec<PathBuf>),
    Restore(Vec<PathBuf>),
    Delete(Vec<PathBuf>),
}

impl Job {
    pub(super) fn op(&self) -> &'static str {
        match self {
            Self::Transfer(request) => request.kind.as_str(),
            Self::Trash(_) => "trash",
            Self::Restore(_) => "restore",
            Self::Delete(_) => "delete",
        }
    }
}

/// Everything a job needs on its thread.
pub(super) struct Worker {
    pub(super) events: UnboundedSender<EngineEvent>,
    pub(super) cancel: Arc<AtomicBool>,
    pub(super) conflicts: ConflictSlot,
    pub(super) config: EngineConfig,
    pub(super) rename: RenameFn,
    pub(super) trash: Arc<TrashManager>,
}

#[derive(Default)]
struct Tally {
    errors: Vec<ReportedError>,
    warnings: Vec<ReportedError>,
    cancelled: bool,
}

impl Tally {
    fn fail(&mut self, op: &str, path: &Path, err: FileOpError) {
        if err.is_cancelled() {
            self.cancelled = true;
            return;
        }
        warn!(
            op,
            path = %path.display(),
            error_code = err.code_str(),
            error = %err,
            "source failed"
        );
        self.errors.push(err.to_reported());
    }

    fn into_outcome(mut self, clear_on_success: bool) -> TransferOutcome {
        if self.cancelled {
            self.errors.push(FileOpError::cancelled().to_reported());
        }
        let success = self.errors.is_empty() && !self.cancelled;
        TransferOutcome {
            success,
            errors: self.errors,
            warnings: self.warnings,
            cancelled: self.cancelled,
            clear_clipboard: success && clear_on_success,
        }
    }
}

impl Worker {
    pub(super) fn run(&self, job: &Job) -> TransferOutcome {
        match job {
            Job::Transfer(request) => self.run_transfer(request),
            Job::Trash(paths) => self.run_batch("trash", paths, |path| {
                self.trash.move_to_trash(path).map(|report| report.warning)
            }),
            Job::Restore(paths) => self.run_batch("restore", paths, |path| {
                self.trash.restore_from_trash(path).map(|_| None)
            }),
            Job::Delete(paths) => self.run_batch("delete", paths, |path| {
                delete_permanently(path).map(|_| None)
            }),
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    fn emit_progress(&self, done: u64, total: u64) {
        // a dropped receiver just means nobody is watching
        let _ = self.events.send(EngineEvent::Progress { done, total });
    }

    fn run_transfer(&self, request: &TransferRequest) -> TransferOutcome {
        let op = request.kind.as_str();
        let mut tally = Tally::default();
        let sized = match size_sources(&request.sources, Some(self.cancel.as_ref())) {
            Ok(report) => report,
            Err(err) => {
                tally.fail(op, &request.destination, err);
                return tally.into_outcome(false);
            }
        };
        // unsizable sources count as 0 and are still attempted
        tally
            .warnings
            .extend(sized.warnings.iter().map(|w| w.to_reported()));
        info!(
            op,
            sources = request.sources.len(),
            total_bytes = sized.total,
            dest = %request.destination.display(),
            "transfer started"
        );

        let sink = |done: u64, total: u64| self.emit_progress(done, total);
        let resolver = ChannelResolver::new(&self.events, &self.cancel, &self.conflicts);
        let mut tracker = ProgressTracker::new(sized.total, &sink, self.config.progress_interval());
        tracker.start();
        let mut ctx = TransferContext::new(&self.cancel, &resolver, tracker)
            .with_config(&self.config)
            .with_rename(self.rename);

        let dest_dir = normalize(&request.destination);
        for (src, bytes) in request.sources.iter().zip(sized.per_source.iter().copied()) {
            if ctx.is_cancelled() {
                tally.cancelled = true;
                break;
            }
            if let Err(err) = transfer_one(&mut ctx, request.kind, src, &dest_dir, bytes) {
                tally.fail(op, src, err);
                if tally.cancelled {
                    break;
                }
            }
        }
        ctx.progress_mut().flush();
        tally.into_outcome(request.kind == TransferKind::Move)
    }

    /// Item-count progress over a list of paths; each path fails on its own.
    fn run_batch<F>(&self, op: &str, paths: &[PathBuf], apply: F) -> TransferOutcome
    where
        F: Fn(&Path) -> FileOpResult<Option<FileOpError>>,
    {
        let mut tally = Tally::default();
        let sink = |done: u64, total: u64| self.emit_progress(done, total);
        let mut tracker = ProgressTracker::new(
            paths.len() as u64,
            &sink,
            self.config.progress_interval(),
        );
        tracker.start();
        info!(op, items = paths.len(), "batch started");
        for path in paths {
            if self.is_cancelled() {
                tally.cancelled = true;
                break;
            }
            match apply(path) {
                Ok(None) => {}
                Ok(Some(warning)) => tally.warnings.push(warning.to_reported()),
                Err(err) => tally.fail(op, path, err),
            }
            tracker.advance(1);
        }
        tracker.flush();
        tally.into_outcome(false)
    }
}

fn transfer_one(
    ctx: &mut TransferContext<'_>,
    kind: TransferKind,
    src: &Path,
    dest_dir: &Path,
    sized: u64,
) -> FileOpResult<()> {
    let src = normalize_entry(src);
    ensure_readable_source(&src)?;
    let name = src
        .file_name()
        .ok_or_else(|| FileOpError::invalid_path(format!("Invalid source path: {}", src.display())))?;
    let dest = dest_dir.join(name);
    if dest == src {
        debug!(path = %src.display(), "source already at destination; skipping");
        ctx.progress_mut().advance(sized);
        return Ok(());
    }
    ensure_writable_target(dest_dir)?;
    if kind == TransferKind::Move {
        if let Some(parent) = src.parent() {
            ensure_writable_target(parent)?;
        }
    }
    transfer_source(ctx, kind, &src, &dest, sized)
}

fn delete_permanently(path: &Path) -> FileOpResult<()> {
    let path = normalize_entry(path);
    ensure_readable_source(&path)?;
    if let Some(parent) = path.parent() {
        ensure_writable_target(parent)?;
    }
    delete_entry(&path)?;
    info!(path = %path.display(), "deleted permanently");
    Ok(())
}
