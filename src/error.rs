//! Binary Error Types
//!
//! The kind of a fatal error decides the process exit code.

use derive_more::{Display, Error};
use exn::ResultExt;
use std::ops::Deref;

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Configuration is missing, unreadable or invalid. Nothing was touched.
    #[display("{_0}")]
    Config(#[error(not(source))] String),
    /// The run lock could not be taken.
    #[display("{_0}")]
    Lock(#[error(not(source))] String),
    /// A run precondition failed after configuration was accepted.
    #[display("{_0}")]
    Run(#[error(not(source))] String),
    /// The report could not be written.
    #[display("unable to render report")]
    Output,
}

impl ErrorKind {
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Config(_) => 2,
            Self::Lock(_) | Self::Run(_) | Self::Output => 1,
        }
    }
}

/// Raises an error from a library crate as `kind`, keeping its message.
pub(crate) trait Classify<T> {
    fn classify(self, kind: fn(String) -> ErrorKind) -> Result<T>;
}
impl<T, E> Classify<T> for std::result::Result<T, exn::Exn<E>>
where
    E: std::error::Error + Send + Sync + 'static,
{
    #[track_caller]
    fn classify(self, kind: fn(String) -> ErrorKind) -> Result<T> {
        match self {
            Ok(value) => Ok(value),
            Err(e) => {
                let message = e.deref().to_string();
                Err(e).or_raise(|| kind(message))
            },
        }
    }
}
