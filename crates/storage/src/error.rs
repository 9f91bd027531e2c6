//! Storage Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::io::{Error as IoError, ErrorKind as IoErrorKind};
use std::path::{Path, PathBuf};

/// A storage error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for storage operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// File does not exist (or vanished between listing and acting on it).
    #[display("file not found: {}", _0.display())]
    NotFound(#[error(not(source))] PathBuf),
    /// Access denied.
    #[display("permission denied: {}", _0.display())]
    PermissionDenied(#[error(not(source))] PathBuf),
    /// Destination already exists; renames never overwrite.
    #[display("file already exists: {}", _0.display())]
    AlreadyExists(#[error(not(source))] PathBuf),
    /// Resource temporarily unavailable. Worth another attempt.
    #[display("resource busy: {}", _0.display())]
    Busy(#[error(not(source))] PathBuf),
    /// Source and destination live on different filesystems, so the move
    /// cannot be atomic.
    #[display("cross-device move refused: {}", _0.display())]
    CrossDevice(#[error(not(source))] PathBuf),
    /// Directory still has entries.
    #[display("directory not empty: {}", _0.display())]
    NotEmpty(#[error(not(source))] PathBuf),
    /// Path contains invalid characters or escapes root
    #[display("invalid path: {}", _0.display())]
    InvalidPath(#[error(not(source))] PathBuf),
    /// Any other I/O failure.
    #[display("I/O error at {}: {source}", path.display())]
    Io { path: PathBuf, source: IoError },
    /// Volume usage could not be determined.
    #[display("disk usage unavailable for {}", _0.display())]
    Probe(#[error(not(source))] PathBuf),
}

impl ErrorKind {
    /// Classify an [`IoError`] raised while operating on `path`.
    pub fn from_io(err: IoError, path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        match err.kind() {
            IoErrorKind::NotFound => Self::NotFound(path),
            IoErrorKind::PermissionDenied => Self::PermissionDenied(path),
            IoErrorKind::AlreadyExists => Self::AlreadyExists(path),
            IoErrorKind::WouldBlock | IoErrorKind::Interrupted | IoErrorKind::TimedOut | IoErrorKind::ResourceBusy => {
                Self::Busy(path)
            },
            IoErrorKind::CrossesDevices => Self::CrossDevice(path),
            IoErrorKind::DirectoryNotEmpty => Self::NotEmpty(path),
            _ => Self::Io { path, source: err },
        }
    }

    /// The path the error refers to.
    pub fn path(&self) -> &Path {
        match self {
            Self::NotFound(path)
            | Self::PermissionDenied(path)
            | Self::AlreadyExists(path)
            | Self::Busy(path)
            | Self::CrossDevice(path)
            | Self::NotEmpty(path)
            | Self::InvalidPath(path)
            | Self::Probe(path)
            | Self::Io { path, .. } => path,
        }
    }

    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Busy(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_are_classified() {
        let kind = ErrorKind::from_io(IoError::from(IoErrorKind::NotFound), "a.mp4");
        assert!(matches!(kind, ErrorKind::NotFound(ref p) if p == Path::new("a.mp4")));
        let kind = ErrorKind::from_io(IoError::from(IoErrorKind::WouldBlock), "a.mp4");
        assert!(kind.is_retryable());
        let kind = ErrorKind::from_io(IoError::from(IoErrorKind::CrossesDevices), "a.mp4");
        assert!(matches!(kind, ErrorKind::CrossDevice(_)));
        assert!(!kind.is_retryable());
    }

    #[test]
    fn only_busy_is_retryable() {
        assert!(ErrorKind::Busy(PathBuf::from("x")).is_retryable());
        assert!(!ErrorKind::PermissionDenied(PathBuf::from("x")).is_retryable());
        let io = ErrorKind::from_io(IoError::other("boom"), "x");
        assert!(!io.is_retryable());
    }
}
