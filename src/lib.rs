//! Filesystem mutation engine: copy, move, trash, restore and delete off the calling
//! thread, with byte progress, interactive conflict answers and cancellation.

pub mod config;
pub mod conflict;
pub mod coordinator;
pub mod errors;
pub mod logging;
pub mod path_safety;
pub mod tasks;
pub mod transfer;
pub mod trash;
pub mod tree_size;

#[cfg(test)]
mod test_support;

pub use config::EngineConfig;
pub use conflict::{ConflictDecision, ConflictResolver, ConflictRequest, FixedResolver};
pub use coordinator::{
    ClipboardMode, CoordinatorError, EngineEvent, OperationCoordinator, TransferHandle,
    TransferOutcome, TransferRequest,
};
pub use errors::{FileOpError, FileOpErrorCode, FileOpResult, ReportedError};
pub use transfer::{ProgressSink, TransferKind};
pub use trash::{TrashEntry, TrashManager};
