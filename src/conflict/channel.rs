use super::{ConflictDecision, ConflictResolver};
use crate::coordinator::EngineEvent;
use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard,
    },
};
use tokio::sync::{mpsc::UnboundedSender, oneshot};
use tracing::debug;

type Pending = (u64, Option<oneshot::Sender<ConflictDecision>>);

/// Reply side of the conflict a job is currently waiting on. Shared between the worker, the
/// request it sent out and whoever may cancel the job, so a cancel can end the wait at once.
#[derive(Debug, Clone, Default)]
pub struct ConflictSlot {
    inner: Arc<Mutex<Pending>>,
}

impl ConflictSlot {
    /// Answers the waiting conflict with Cancel. Returns false when nothing was waiting.
    pub fn cancel_pending(&self) -> bool {
        match self.lock().1.take() {
            Some(reply) => {
                let _ = reply.send(ConflictDecision::Cancel);
                true
            }
            None => false,
        }
    }

    fn arm(&self, reply: oneshot::Sender<ConflictDecision>) -> u64 {
        let mut pending = self.lock();
        pending.0 += 1;
        pending.1 = Some(reply);
        pending.0
    }

    fn take(&self, ticket: u64) -> Option<oneshot::Sender<ConflictDecision>> {
        let mut pending = self.lock();
        if pending.0 == ticket {
            pending.1.take()
        } else {
            None
        }
    }

    fn lock(&self) -> MutexGuard<'_, Pending> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// A collision waiting on the controlling context. Dropping it unanswered cancels the run.
#[derive(Debug)]
pub struct ConflictRequest {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub is_dir: bool,
    slot: ConflictSlot,
    ticket: u64,
}

impl ConflictRequest {
    pub fn respond(self, decision: ConflictDecision) {
        let delivered = self
            .slot
            .take(self.ticket)
            .is_some_and(|reply| reply.send(decision).is_ok());
        if !delivered {
            debug!(destination = %self.destination.display(), "conflict answer arrived after the run stopped");
        }
    }
}

impl Drop for ConflictRequest {
    fn drop(&mut self) {
        // closes the reply channel when nobody answered
        drop(self.slot.take(self.ticket));
    }
}

/// Resolver used on the worker: forwards each collision as an event and blocks until the
/// reply arrives, the request is dropped or the job is cancelled.
pub struct ChannelResolver<'a> {
    events: &'a UnboundedSender<EngineEvent>,
    cancel: &'a AtomicBool,
    slot: &'a ConflictSlot,
}

impl<'a> ChannelResolver<'a> {
    pub fn new(
        events: &'a UnboundedSender<EngineEvent>,
        cancel: &'a AtomicBool,
        slot: &'a ConflictSlot,
    ) -> Self {
        Self {
            events,
            cancel,
            slot,
        }
    }
}

impl ConflictResolver for ChannelResolver<'_> {
    fn resolve(&self, source: &Path, destination: &Path, is_dir: bool) -> ConflictDecision {
        if self.cancel.load(Ordering::Relaxed) {
            return ConflictDecision::Cancel;
        }
        let (reply, answer) = oneshot::channel();
        let ticket = self.slot.arm(reply);
        // A cancel that landed before arming found the slot empty.
        if self.cancel.load(Ordering::Relaxed) {
            self.slot.cancel_pending();
        }
        let request = ConflictRequest {
            source: source.to_path_buf(),
            destination: destination.to_path_buf(),
            is_dir,
            slot: self.slot.clone(),
            ticket,
        };
        if self.events.send(EngineEvent::Conflict(request)).is_err() {
            debug!(destination = %destination.display(), "no one is listening for conflicts");
            return ConflictDecision::Cancel;
        }
        answer.blocking_recv().unwrap_or(ConflictDecision::Cancel)
    }
}
