//! Registry of cancel flags for running jobs, keyed by job id.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard,
    },
};
use tracing::{debug, warn};

mod error;

pub use error::{TaskError, TaskErrorCode, TaskResult};

/// Called after a job's flag is set, for jobs that may be blocked waiting on something.
type Waker = Box<dyn Fn() + Send + Sync>;

struct Entry {
    flag: Arc<AtomicBool>,
    wake: Option<Waker>,
}

impl Entry {
    fn trip(&self) {
        self.flag.store(true, Ordering::Relaxed);
        if let Some(wake) = &self.wake {
            wake();
        }
    }
}

type Registry = HashMap<String, Entry>;

#[derive(Clone, Default)]
pub struct CancelState {
    inner: Arc<Mutex<Registry>>,
}

/// Keeps a job's flag registered; dropping it unregisters the id.
pub struct CancelGuard {
    id: String,
    flag: Arc<AtomicBool>,
    state: CancelState,
}

impl CancelState {
    pub fn register(&self, id: impl Into<String>) -> TaskResult<CancelGuard> {
        self.insert(id.into(), None)
    }

    /// Registers `id` with a hook that runs each time the job is cancelled.
    pub fn register_with_waker<F>(&self, id: impl Into<String>, wake: F) -> TaskResult<CancelGuard>
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.insert(id.into(), Some(Box::new(wake)))
    }

    fn insert(&self, id: String, wake: Option<Waker>) -> TaskResult<CancelGuard> {
        let flag = Arc::new(AtomicBool::new(false));
        let mut map = self.lock()?;
        if map.contains_key(&id) {
            return Err(TaskError::new(
                TaskErrorCode::DuplicateTask,
                format!("Task id already in use: {id}"),
            ));
        }
        map.insert(
            id.clone(),
            Entry {
                flag: flag.clone(),
                wake,
            },
        );
        debug!(task_id = %id, "registered task");
        Ok(CancelGuard {
            id,
            flag,
            state: self.clone(),
        })
    }

    /// Sets the flag for `id`. Ok(false) when no such job is running.
    pub fn cancel(&self, id: &str) -> TaskResult<bool> {
        let map = self.lock()?;
        match map.get(id) {
            Some(entry) => {
                entry.trip();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Like `cancel`, but an unknown id is an error.
    pub fn cancel_task(&self, id: &str) -> TaskResult<()> {
        if self.cancel(id)? {
            Ok(())
        } else {
            Err(TaskError::new(
                TaskErrorCode::TaskNotFound,
                "Task not found or already finished",
            ))
        }
    }

    pub fn cancel_all(&self) -> TaskResult<usize> {
        let map = self.lock()?;
        for entry in map.values() {
            entry.trip();
        }
        Ok(map.len())
    }

    pub fn active_ids(&self) -> TaskResult<Vec<String>> {
        let mut ids: Vec<String> = self.lock()?.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    fn lock(&self) -> TaskResult<MutexGuard<'_, Registry>> {
        self.inner.lock().map_err(|_| {
            TaskError::new(
                TaskErrorCode::RegistryLockFailed,
                "Failed to lock cancel registry",
            )
        })
    }

    fn remove(&self, id: &str) {
        match self.inner.lock() {
            Ok(mut map) => {
                map.remove(id);
            }
            Err(_) => {
                warn!(task_id = id, "failed to remove task from cancel registry");
            }
        }
    }
}

impl CancelGuard {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn token(&self) -> Arc<AtomicBool> {
        self.flag.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        self.state.remove(&self.id);
    }
}
