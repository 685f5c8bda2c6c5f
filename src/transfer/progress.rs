use std::time::{Duration, Instant};

/// Receives `(done, total)` byte counts. `total == 0` means the size is unknown.
pub trait ProgressSink {
    fn on_progress(&self, done: u64, total: u64);
}

impl<F> ProgressSink for F
where
    F: Fn(u64, u64),
{
    fn on_progress(&self, done: u64, total: u64) {
        self(done, total)
    }
}

/// Sink for callers that do not care about progress.
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn on_progress(&self, _done: u64, _total: u64) {}
}

/// Running byte counter for one run. `done` only grows; what reaches the sink is clamped to
/// a non-zero total and coalesced when the rounded percentage repeats inside `interval`.
pub struct ProgressTracker<'a> {
    done: u64,
    total: u64,
    sink: &'a dyn ProgressSink,
    interval: Duration,
    last_percent: Option<u64>,
    last_emit: Option<Instant>,
    last_reported: Option<u64>,
}

impl<'a> ProgressTracker<'a> {
    pub fn new(total: u64, sink: &'a dyn ProgressSink, interval: Duration) -> Self {
        Self {
            done: 0,
            total,
            sink,
            interval,
            last_percent: None,
            last_emit: None,
            last_reported: None,
        }
    }

    pub fn done(&self) -> u64 {
        self.done
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    /// Initial zero notification; also tells the sink the denominator.
    pub fn start(&mut self) {
        self.emit(0);
    }

    pub fn advance(&mut self, delta: u64) {
        if delta == 0 {
            return;
        }
        self.done = self.done.saturating_add(delta);
        if self.total == 0 {
            return;
        }
        let reported = self.reported();
        if self.last_reported == Some(reported) {
            return;
        }
        let percent = percent_of(reported, self.total);
        let recent = self
            .last_emit
            .map(|t| t.elapsed() < self.interval)
            .unwrap_or(false);
        if self.last_percent == Some(percent) && recent {
            return;
        }
        self.emit(reported);
    }

    /// Pushes the latest value if coalescing held it back.
    pub fn flush(&mut self) {
        if self.total == 0 {
            return;
        }
        let reported = self.reported();
        if self.last_reported != Some(reported) {
            self.emit(reported);
        }
    }

    fn reported(&self) -> u64 {
        self.done.min(self.total)
    }

    fn emit(&mut self, reported: u64) {
        self.last_percent = Some(percent_of(reported, self.total));
        self.last_emit = Some(Instant::now());
        self.last_reported = Some(reported);
        self.sink.on_progress(reported, self.total);
    }
}

fn percent_of(done: u64, total: u64) -> u64 {
    if total == 0 {
        return 0;
    }
    ((done as u128 * 100) / total as u128) as u64
}
