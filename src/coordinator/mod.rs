//! Runs one mutation at a time on a named worker thread and hands progress, conflicts and
//! the final outcome back to the controlling context as events.

use crate::{
    config::EngineConfig,
    conflict::{ConflictDecision, ConflictResolver, ConflictSlot, FixedResolver},
    path_safety::validate_path,
    tasks::CancelState,
    transfer::{rename_nofollow, NoProgress, ProgressSink, RenameFn, TransferKind},
    trash::TrashManager,
};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::Instant,
};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::{debug, info, warn};

mod clipboard;
mod error;
mod events;
mod jobs;
pub mod logging;
#[cfg(test)]
mod tests;

use clipboard::Clipboard;
use jobs::{Job, Worker};

pub use clipboard::{ClipboardContents, ClipboardMode, ConflictInfo};
pub use error::{CoordinatorError, CoordinatorErrorCode, CoordinatorResult};
pub use events::{EngineEvent, TransferOutcome};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    pub sources: Vec<PathBuf>,
    /// Directory the sources land in.
    pub destination: PathBuf,
    pub kind: TransferKind,
}

impl TransferRequest {
    pub fn new(sources: Vec<PathBuf>, destination: impl Into<PathBuf>, kind: TransferKind) -> Self {
        Self {
            sources,
            destination: destination.into(),
            kind,
        }
    }

    pub fn validate(&self) -> CoordinatorResult<()> {
        validate_sources(&self.sources)?;
        validate_absolute(&self.destination)?;
        match fs::metadata(&self.destination) {
            Ok(meta) if meta.is_dir() => Ok(()),
            _ => Err(CoordinatorError::invalid_request(format!(
                "Destination is not a directory: {}",
                self.destination.display()
            ))),
        }
    }
}

fn validate_sources(sources: &[PathBuf]) -> CoordinatorResult<()> {
    if sources.is_empty() {
        return Err(CoordinatorError::invalid_request(
            "Invalid request: no sources given",
        ));
    }
    sources.iter().try_for_each(|p| validate_absolute(p))
}

fn validate_absolute(path: &Path) -> CoordinatorResult<()> {
    if !path.is_absolute() {
        return Err(CoordinatorError::invalid_request(format!(
            "Invalid request: path is not absolute: {}",
            path.display()
        )));
    }
    validate_path(&path.to_string_lossy())
        .map(|_| ())
        .map_err(|e| CoordinatorError::invalid_request(format!("Invalid request: {e}")))
}

/// Holds the single "job in flight" slot until dropped.
struct BusyGuard(Arc<AtomicBool>);

impl BusyGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> CoordinatorResult<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| CoordinatorError::busy())?;
        Ok(Self(flag.clone()))
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct OperationCoordinator {
    config: EngineConfig,
    trash: Arc<TrashManager>,
    cancel_state: CancelState,
    busy: Arc<AtomicBool>,
    clipboard: Clipboard,
    rename: RenameFn,
    next_id: AtomicU64,
}

impl OperationCoordinator {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            trash: Arc::new(TrashManager::from_config(&config)),
            config,
            cancel_state: CancelState::default(),
            busy: Arc::new(AtomicBool::new(false)),
            clipboard: Clipboard::default(),
            rename: rename_nofollow,
            next_id: AtomicU64::new(1),
        }
    }

    /// Swaps the rename primitive used by moves, trashing and restoring.
    pub fn with_rename(mut self, rename: RenameFn) -> Self {
        self.rename = rename;
        self.trash = Arc::new(TrashManager::from_config(&self.config).with_rename(rename));
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn trash(&self) -> &TrashManager {
        &self.trash
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    pub fn start_transfer(&self, request: TransferRequest) -> CoordinatorResult<TransferHandle> {
        request.validate()?;
        self.spawn(Job::Transfer(request), None)
    }

    pub fn start_trash(&self, paths: Vec<PathBuf>) -> CoordinatorResult<TransferHandle> {
        validate_sources(&paths)?;
        self.spawn(Job::Trash(paths), None)
    }

    pub fn start_restore(&self, trashed: Vec<PathBuf>) -> CoordinatorResult<TransferHandle> {
        validate_sources(&trashed)?;
        self.spawn(Job::Restore(trashed), None)
    }

    /// Permanent delete; nothing goes to the trash.
    pub fn start_delete(&self, paths: Vec<PathBuf>) -> CoordinatorResult<TransferHandle> {
        validate_sources(&paths)?;
        self.spawn(Job::Delete(paths), None)
    }

    pub fn cancel(&self, id: &str) -> CoordinatorResult<()> {
        self.cancel_state.cancel_task(id)?;
        info!(task_id = id, "cancel requested");
        Ok(())
    }

    /// Cancels every running job. Returns how many were signalled.
    pub fn shutdown(&self) -> CoordinatorResult<usize> {
        let count = self.cancel_state.cancel_all()?;
        info!(jobs = count, "coordinator shutting down");
        Ok(count)
    }

    pub fn set_clipboard(&self, paths: Vec<PathBuf>, mode: ClipboardMode) -> CoordinatorResult<()> {
        self.clipboard.set(&paths, mode)
    }

    pub fn clipboard(&self) -> CoordinatorResult<Option<ClipboardContents>> {
        self.clipboard.snapshot()
    }

    /// Entries of the clipboard that already exist under `dest`.
    pub fn paste_preview(&self, dest: &Path) -> CoordinatorResult<Vec<ConflictInfo>> {
        self.clipboard.preview(dest)
    }

    /// Starts a transfer of the clipboard into `dest`. A cut that finishes cleanly empties
    /// the clipboard.
    pub fn paste(&self, dest: &Path) -> CoordinatorResult<TransferHandle> {
        let Some(contents) = self.clipboard.snapshot()? else {
            return Err(CoordinatorError::invalid_request("Clipboard is empty"));
        };
        let request = TransferRequest::new(
            contents.entries.clone(),
            dest,
            contents.mode.transfer_kind(),
        );
        request.validate()?;
        self.spawn(Job::Transfer(request), Some(contents.entries))
    }

    fn spawn(
        &self,
        job: Job,
        clear_on_finish: Option<Vec<PathBuf>>,
    ) -> CoordinatorResult<TransferHandle> {
        let busy = BusyGuard::acquire(&self.busy)?;
        let op = job.op();
        let id = format!("{op}-{}", self.next_id.fetch_add(1, Ordering::Relaxed));
        let conflicts = ConflictSlot::default();
        let registration = self.cancel_state.register_with_waker(id.clone(), {
            let conflicts = conflicts.clone();
            move || {
                conflicts.cancel_pending();
            }
        })?;
        let token = registration.token();
        let (events, receiver) = mpsc::unbounded_channel();
        let worker = Worker {
            events,
            cancel: token.clone(),
            conflicts: conflicts.clone(),
            config: self.config.clone(),
            rename: self.rename,
            trash: self.trash.clone(),
        };
        let clipboard = self.clipboard.clone();
        let task_id = id.clone();

        let thread = thread::Builder::new()
            .name(format!("fileops-{op}"))
            .spawn(move || {
                let started = Instant::now();
                let outcome = worker.run(&job);
                logging::log_outcome(op, &outcome, started);
                if outcome.clear_clipboard {
                    if let Some(entries) = clear_on_finish {
                        match clipboard.clear_if_holding(&entries) {
                            Ok(cleared) => debug!(task_id = %task_id, cleared, "clipboard after cut"),
                            Err(err) => warn!(task_id = %task_id, error = %err, "clipboard not cleared"),
                        }
                    }
                }
                // Free the slot before announcing the outcome, so the next job can start.
                drop(registration);
                drop(busy);
                let _ = worker.events.send(EngineEvent::Finished(outcome));
            })
            .map_err(|e| {
                CoordinatorError::new(
                    CoordinatorErrorCode::SpawnFailed,
                    format!("Failed to spawn worker thread: {e}"),
                )
            })?;

        debug!(task_id = %id, op, "job spawned");
        Ok(TransferHandle {
            id,
            events: receiver,
            cancel: token,
            conflicts,
            thread: Some(thread),
        })
    }
}

/// Controlling side of one job.
pub struct TransferHandle {
    id: String,
    events: UnboundedReceiver<EngineEvent>,
    cancel: Arc<AtomicBool>,
    conflicts: ConflictSlot,
    thread: Option<JoinHandle<()>>,
}

impl TransferHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Stops the job, ending any conflict wait with Cancel.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
        self.conflicts.cancel_pending();
    }

    /// Blocks the calling thread; must not be called from inside an async runtime.
    pub fn next_event_blocking(&mut self) -> Option<EngineEvent> {
        self.events.blocking_recv()
    }

    pub async fn next_event(&mut self) -> Option<EngineEvent> {
        self.events.recv().await
    }

    /// Pumps events on the calling thread until the job finishes, answering conflicts with
    /// `resolver`.
    pub fn drive(
        mut self,
        progress: &dyn ProgressSink,
        resolver: &dyn ConflictResolver,
    ) -> CoordinatorResult<TransferOutcome> {
        while let Some(event) = self.next_event_blocking() {
            match event {
                EngineEvent::Progress { done, total } => progress.on_progress(done, total),
                EngineEvent::Conflict(request) => {
                    let decision =
                        resolver.resolve(&request.source, &request.destination, request.is_dir);
                    request.respond(decision);
                }
                EngineEvent::Finished(outcome) => {
                    self.join()?;
                    return Ok(outcome);
                }
            }
        }
        self.join()?;
        Err(CoordinatorError::new(
            CoordinatorErrorCode::TaskFailed,
            format!("Job {} ended without an outcome", self.id),
        ))
    }

    /// Waits for the outcome, cancelling at the first conflict.
    pub fn wait(self) -> CoordinatorResult<TransferOutcome> {
        self.drive(&NoProgress, &FixedResolver(ConflictDecision::Cancel))
    }

    fn join(&mut self) -> CoordinatorResult<()> {
        match self.thread.take() {
            Some(handle) => handle.join().map_err(|_| {
                CoordinatorError::new(
                    CoordinatorErrorCode::TaskFailed,
                    format!("Worker for job {} panicked", self.id),
                )
            }),
            None => Ok(()),
        }
    }
}
