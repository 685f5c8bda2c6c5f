use crate::errors::domain::{classify_io_error, DomainError, ErrorCode, IoErrorHint};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOpErrorCode {
    InvalidPath,
    PathNotFound,
    PermissionDenied,
    DestinationExists,
    ReadOnlyFilesystem,
    CrossDeviceMove,
    UnsupportedType,
    OperationCancelled,
    OperationFailed,
    NoWritableParent,
}

impl ErrorCode for FileOpErrorCode {
    fn as_code_str(self) -> &'static str {
        match self {
            Self::InvalidPath => "invalid_path",
            Self::PathNotFound => "path_not_found",
            Self::PermissionDenied => "permission_denied",
            Self::DestinationExists => "destination_exists",
            Self::ReadOnlyFilesystem => "read_only_filesystem",
            Self::CrossDeviceMove => "cross_device_move",
            Self::UnsupportedType => "unsupported_type",
            Self::OperationCancelled => "operation_cancelled",
            Self::OperationFailed => "operation_failed",
            Self::NoWritableParent => "no_writable_parent",
        }
    }
}

#[derive(Debug, Clone)]
pub struct FileOpError {
    code: FileOpErrorCode,
    message: String,
}

impl FileOpError {
    pub fn new(code: FileOpErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn cancelled() -> Self {
        Self::new(FileOpErrorCode::OperationCancelled, "Operation cancelled.")
    }

    pub fn invalid_path(message: impl Into<String>) -> Self {
        Self::new(FileOpErrorCode::InvalidPath, message)
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::new(FileOpErrorCode::OperationFailed, message)
    }

    pub fn code(&self) -> FileOpErrorCode {
        self.code
    }

    pub fn is_cancelled(&self) -> bool {
        self.code == FileOpErrorCode::OperationCancelled
    }

    pub fn from_io_error(context: &str, error: std::io::Error) -> Self {
        let code = code_for_hint(classify_io_error(&error)).unwrap_or(FileOpErrorCode::OperationFailed);
        Self::new(code, format!("{context}: {error}"))
    }
}

fn code_for_hint(hint: IoErrorHint) -> Option<FileOpErrorCode> {
    match hint {
        IoErrorHint::NotFound => Some(FileOpErrorCode::PathNotFound),
        IoErrorHint::PermissionDenied => Some(FileOpErrorCode::PermissionDenied),
        IoErrorHint::AlreadyExists => Some(FileOpErrorCode::DestinationExists),
        IoErrorHint::InvalidInput => Some(FileOpErrorCode::InvalidPath),
        IoErrorHint::ReadOnlyFilesystem => Some(FileOpErrorCode::ReadOnlyFilesystem),
        IoErrorHint::CrossDevice => Some(FileOpErrorCode::CrossDeviceMove),
        IoErrorHint::DirectoryNotEmpty | IoErrorHint::Other => None,
    }
}

impl fmt::Display for FileOpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for FileOpError {}

impl DomainError for FileOpError {
    fn code_str(&self) -> &'static str {
        self.code.as_code_str()
    }

    fn message(&self) -> &str {
        &self.message
    }
}

pub type FileOpResult<T> = Result<T, FileOpError>;
