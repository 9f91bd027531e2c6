//! Relative path validation.
//!
//! Every path handed to a backend is relative to the upload root. Layout
//! templates are user-supplied, so their output has to be checked before it
//! is ever joined onto the root.

use std::path::{Component, Path, PathBuf};

use crate::error::{ErrorKind, Result};

/// Validates and normalizes a path relative to the storage root.
///
/// `.` components and repeated separators are dropped and `..` is resolved
/// lexically; a path that would climb above the root, that is empty after
/// normalization, that carries a Windows prefix, or that contains a null
/// byte is rejected with [`InvalidPath`](crate::error::ErrorKind::InvalidPath).
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use camkeep_storage::validate_path;
/// assert!(validate_path("front-door/2024/01/31/Front Door_00_20240131120000.mp4").is_ok());
/// assert!(validate_path("cam/../other-cam/clip.mp4").is_ok());
/// assert!(validate_path("../etc/passwd").is_err());
/// assert!(validate_path("cam/../../clip.mp4").is_err());
/// assert_eq!(
///     validate_path("./cam//2024/./01/").unwrap(),
///     Path::new("cam/2024/01")
/// );
/// ```
pub fn validate(path: impl AsRef<Path>) -> Result<PathBuf> {
    let original = path.as_ref();
    let mut components = Vec::new();
    for component in original.components() {
        match component {
            Component::Normal(s) => {
                // Path::components() lets null bytes through on Unix, but the
                // syscalls would truncate at them.
                if s.as_encoded_bytes().contains(&0) {
                    exn::bail!(ErrorKind::InvalidPath(original.to_path_buf()));
                }
                components.push(s);
            },
            Component::CurDir | Component::RootDir => {},
            Component::Prefix(_) => exn::bail!(ErrorKind::InvalidPath(original.to_path_buf())),
            Component::ParentDir => {
                if components.pop().is_none() {
                    exn::bail!(ErrorKind::InvalidPath(original.to_path_buf()));
                }
            },
        }
    }
    if components.is_empty() {
        exn::bail!(ErrorKind::InvalidPath(original.to_path_buf()));
    }
    Ok(components.into_iter().collect())
}
