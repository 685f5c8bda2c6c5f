use super::events::TransferOutcome;
use std::time::Instant;
use tracing::{info, warn};

pub fn log_outcome(op: &str, outcome: &TransferOutcome, started: Instant) {
    let elapsed_ms = started.elapsed().as_millis() as u64;
    let error_code = outcome.first_error_code().unwrap_or("");
    if outcome.success {
        info!(
            op,
            success = true,
            error_count = 0usize,
            cancelled = false,
            elapsed_ms,
            "file operation finished"
        );
    } else {
        warn!(
            op,
            success = false,
            error_count = outcome.errors.len(),
            cancelled = outcome.cancelled,
            elapsed_ms,
            error_code,
            "file operation finished with errors"
        );
    }
}
