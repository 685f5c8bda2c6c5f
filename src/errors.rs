pub mod domain;
mod file_op;
pub mod reported;

pub use file_op::{FileOpError, FileOpErrorCode, FileOpResult};
pub use reported::ReportedError;
