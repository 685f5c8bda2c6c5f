use crate::errors::reported::ReportedError;
use std::io::ErrorKind;

pub trait ErrorCode {
    #[allow(clippy::wrong_self_convention)]
    fn as_code_str(self) -> &'static str;
}

pub trait DomainError: std::error::Error {
    fn code_str(&self) -> &'static str;
    fn message(&self) -> &str;

    fn to_reported(&self) -> ReportedError {
        ReportedError::new(self.code_str(), self.message())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoErrorHint {
    NotFound,
    PermissionDenied,
    AlreadyExists,
    InvalidInput,
    ReadOnlyFilesystem,
    CrossDevice,
    DirectoryNotEmpty,
    Other,
}

pub fn classify_io_error(error: &std::io::Error) -> IoErrorHint {
    let from_kind = match error.kind() {
        ErrorKind::NotFound => IoErrorHint::NotFound,
        ErrorKind::PermissionDenied => IoErrorHint::PermissionDenied,
        ErrorKind::AlreadyExists => IoErrorHint::AlreadyExists,
        ErrorKind::InvalidInput => IoErrorHint::InvalidInput,
        _ => IoErrorHint::Other,
    };
    if from_kind != IoErrorHint::Other {
        return from_kind;
    }
    error
        .raw_os_error()
        .map(classify_raw_os_error)
        .unwrap_or(IoErrorHint::Other)
}

pub fn classify_raw_os_error(raw: i32) -> IoErrorHint {
    #[cfg(windows)]
    {
        return match raw {
            5 => IoErrorHint::PermissionDenied,     // ERROR_ACCESS_DENIED
            2 | 3 => IoErrorHint::NotFound,         // ERROR_FILE_NOT_FOUND | ERROR_PATH_NOT_FOUND
            80 | 183 => IoErrorHint::AlreadyExists, // ERROR_FILE_EXISTS | ERROR_ALREADY_EXISTS
            17 => IoErrorHint::CrossDevice,         // ERROR_NOT_SAME_DEVICE
            19 => IoErrorHint::ReadOnlyFilesystem,  // ERROR_WRITE_PROTECT
            145 => IoErrorHint::DirectoryNotEmpty,  // ERROR_DIR_NOT_EMPTY
            87 => IoErrorHint::InvalidInput,        // ERROR_INVALID_PARAMETER
            _ => IoErrorHint::Other,
        };
    }

    #[cfg(unix)]
    {
        return match raw {
            libc::EPERM | libc::EACCES => IoErrorHint::PermissionDenied,
            libc::ENOENT => IoErrorHint::NotFound,
            libc::EEXIST => IoErrorHint::AlreadyExists,
            libc::EXDEV => IoErrorHint::CrossDevice,
            libc::EINVAL => IoErrorHint::InvalidInput,
            libc::EROFS => IoErrorHint::ReadOnlyFilesystem,
            libc::ENOTEMPTY => IoErrorHint::DirectoryNotEmpty,
            _ => IoErrorHint::Other,
        };
    }

    #[allow(unreachable_code)]
    IoErrorHint::Other
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn raw_codes_map_to_hints() {
        assert_eq!(classify_raw_os_error(libc::EROFS), IoErrorHint::ReadOnlyFilesystem);
        assert_eq!(classify_raw_os_error(libc::EXDEV), IoErrorHint::CrossDevice);
        assert_eq!(classify_raw_os_error(libc::EACCES), IoErrorHint::PermissionDenied);
        let err = std::io::Error::from_raw_os_error(libc::EXDEV);
        assert_eq!(classify_io_error(&err), IoErrorHint::CrossDevice);
    }

    #[test]
    fn io_kinds_win_over_raw_codes() {
        let err = std::io::Error::from(ErrorKind::NotFound);
        assert_eq!(classify_io_error(&err), IoErrorHint::NotFound);
        let err = std::io::Error::new(ErrorKind::Other, "boom");
        assert_eq!(classify_io_error(&err), IoErrorHint::Other);
    }
}
