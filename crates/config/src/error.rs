//! Config Error Types
//!
//! Every configuration error is fatal: nothing has been touched yet, and
//! nothing will be.

use derive_more::{Display, Error};

/// A config error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for config operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// A configuration source could not be read or deserialized.
    #[display("unable to load configuration: {_0}")]
    Load(#[error(not(source))] String),
    /// Configuration was read but its values are unusable.
    #[display("invalid configuration: {_0}")]
    Invalid(#[error(not(source))] String),
}
