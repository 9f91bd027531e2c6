//! Library Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.
//!
//! Only failures that stop a whole run surface as an [`Error`]. Anything that
//! goes wrong with an individual file is isolated and recorded in the
//! [`RunReport`](crate::RunReport) instead.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A library error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The upload root is missing, inaccessible or not a directory.
    #[display("upload root is unusable: {}", _0.display())]
    Root(#[error(not(source))] PathBuf),
    /// The filename pattern failed validation.
    #[display("invalid filename pattern: {_0}")]
    Pattern(#[error(not(source))] String),
    /// The layout template could not be compiled or rendered.
    #[display("issue with path generation from layout template")]
    Template,
    /// Retention thresholds are contradictory or out of range.
    #[display("invalid retention policy: {_0}")]
    Policy(#[error(not(source))] String),
    /// Disk usage could not be probed and no configured retention rule can
    /// run without it.
    #[display("disk usage unavailable and no retention rule remains usable")]
    Probe,
    /// A storage operation outside of per-file processing failed.
    #[display("storage operation failed")]
    Storage,
    /// The run lock file could not be opened or locked.
    #[display("unable to take run lock: {}", _0.display())]
    Lock(#[error(not(source))] PathBuf),
}

impl ErrorKind {
    /// Returns `true` for invalid configuration detected before any
    /// filesystem mutation.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Root(_) | Self::Pattern(_) | Self::Template | Self::Policy(_))
    }
}
