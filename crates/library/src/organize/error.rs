//! Error types for the [`organize`](super) module.
//!
//! Uses [`exn`] for automatic location tracking and error tree construction.
//! Organize errors are always scoped to a single record; the run carries on
//! with the next one.

use derive_more::{Display, Error};
use exn::ResultExt;
use std::ops::Deref;

/// An organize error with automatic location tracking via [`exn::Exn`].
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for organize operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Classifies the origin of an organize failure.
///
/// ### Operational Errors
/// - [`ErrorKind::Template`]
/// - [`ErrorKind::Identity`]
/// - [`ErrorKind::Conflict`]
///
/// ### Dependency Errors
/// - [`ErrorKind::Storage`]
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The [`CanonicalLayout`](crate::CanonicalLayout) could not render a path.
    #[display("layout template failed to render a destination")]
    Template,
    /// The rendered file name would no longer parse back to the same camera
    /// and capture time, so the file would become unrecognizable.
    #[display("destination file name loses the recording's identity")]
    Identity,
    /// No free disambiguated name was left for the destination.
    #[display("no free destination name")]
    Conflict,
    /// A storage backend operation (existence check, rename) failed.
    #[display("{_0}")]
    Storage(#[error(not(source))] String),
}

/// Raises a storage failure as [`ErrorKind::Storage`], keeping its message.
pub(crate) trait StorageResultExt<T> {
    fn or_storage(self) -> Result<T>;
}
impl<T> StorageResultExt<T> for camkeep_storage::error::Result<T> {
    #[track_caller]
    fn or_storage(self) -> Result<T> {
        match self {
            Ok(value) => Ok(value),
            Err(e) => {
                let message = e.deref().to_string();
                Err(e).or_raise(|| ErrorKind::Storage(message))
            },
        }
    }
}
