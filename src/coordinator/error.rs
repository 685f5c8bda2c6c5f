use crate::errors::domain::{DomainError, ErrorCode};
use crate::tasks::{TaskError, TaskErrorCode};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorErrorCode {
    Busy,
    InvalidRequest,
    SpawnFailed,
    TaskNotFound,
    TaskFailed,
}

impl ErrorCode for CoordinatorErrorCode {
    fn as_code_str(self) -> &'static str {
        match self {
            Self::Busy => "busy",
            Self::InvalidRequest => "invalid_request",
            Self::SpawnFailed => "spawn_failed",
            Self::TaskNotFound => "task_not_found",
            Self::TaskFailed => "task_failed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CoordinatorError {
    code: CoordinatorErrorCode,
    message: String,
}

impl CoordinatorError {
    pub fn new(code: CoordinatorErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn busy() -> Self {
        Self::new(
            CoordinatorErrorCode::Busy,
            "Another file operation is already running",
        )
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(CoordinatorErrorCode::InvalidRequest, message)
    }

    pub fn code(&self) -> CoordinatorErrorCode {
        self.code
    }
}

impl From<TaskError> for CoordinatorError {
    fn from(error: TaskError) -> Self {
        let code = match error.code() {
            TaskErrorCode::TaskNotFound => CoordinatorErrorCode::TaskNotFound,
            _ => CoordinatorErrorCode::TaskFailed,
        };
        Self::new(code, error.to_string())
    }
}

impl fmt::Display for CoordinatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CoordinatorError {}

impl DomainError for CoordinatorError {
    fn code_str(&self) -> &'static str {
        self.code.as_code_str()
    }

    fn message(&self) -> &str {
        &self.message
    }
}

pub type CoordinatorResult<T> = Result<T, CoordinatorError>;
