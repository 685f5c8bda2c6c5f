use crate::{conflict::ConflictRequest, errors::ReportedError};
use serde::{Deserialize, Serialize};

/// What the worker tells the controlling context, in walk order.
#[derive(Debug)]
pub enum EngineEvent {
    Progress { done: u64, total: u64 },
    Conflict(ConflictRequest),
    Finished(TransferOutcome),
}

/// Result of one job, delivered exactly once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferOutcome {
    pub success: bool,
    pub errors: Vec<ReportedError>,
    /// Non-fatal problems, e.g. an item trashed without its info file.
    pub warnings: Vec<ReportedError>,
    pub cancelled: bool,
    pub clear_clipboard: bool,
}

impl TransferOutcome {
    pub fn first_error_code(&self) -> Option<&str> {
        self.errors.first().map(|e| e.code.as_str())
    }
}
