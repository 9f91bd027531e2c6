//! Storage backend trait and implementations.
//!
//! This module defines the `StorageBackend` trait, the single seam through
//! which the retention engine touches the upload directory. Keeping every
//! mutation behind it is what lets a dry run swap in [`ReadOnlyBackend`] and
//! tests swap in `MockBackend` without the engine noticing.

mod local;
#[cfg(feature = "mock")]
mod mock;
mod ro;

pub use self::local::LocalBackend;
#[cfg(feature = "mock")]
pub use self::mock::MockBackend;
pub use self::ro::ReadOnlyBackend;
use crate::error::Result;
use crate::file::{DirInfo, DiskUsage, FileInfo};
use async_trait::async_trait;
use futures::{Stream, TryStreamExt};
use std::path::Path;
use std::pin::Pin;

pub(crate) type FileInfoStream<'a> = Pin<Box<dyn Stream<Item = Result<FileInfo>> + Send + 'a>>;

/// Unified interface over the upload directory.
///
/// # Path Handling
/// All paths are relative to the storage root and must be validated using
/// [`validate_path`](crate::validate_path) before use. Implementations
/// enforce this validation.
///
/// # Atomicity
/// Mutations are limited to single rename, unlink and rmdir syscalls. None of
/// them can leave a recording half-written: either the entry moved or it
/// didn't.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use camkeep_storage::{backend::StorageBackend, error::Result};
///
/// async fn tree_bytes(backend: &dyn StorageBackend) -> Result<u64> {
///     Ok(backend.list().await?.iter().map(|f| f.size).sum())
/// }
/// ```
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Name of the configured backend, used for logging only.
    fn name(&self) -> &str;

    /// List every regular file below the root.
    ///
    /// Collects [`list_stream()`](Self::list_stream) and fails on the first
    /// per-entry error; use the stream directly to tolerate them.
    async fn list(&self) -> Result<Vec<FileInfo>> {
        self.list_stream().try_collect().await
    }

    /// Stream metadata for every regular file below the root.
    ///
    /// Directories are descended into, symbolic links and other special
    /// entries are skipped. Errors on individual entries are yielded as
    /// `Err` items and the walk carries on with the next entry, so one
    /// unreadable file never hides the rest of the tree.
    ///
    /// ```
    /// use futures::StreamExt;
    /// # use camkeep_storage::backend::StorageBackend;
    /// # async fn example(backend: &dyn StorageBackend) {
    /// let mut stream = backend.list_stream();
    /// while let Some(item) = stream.next().await {
    ///     match item {
    ///         Ok(info) => println!("{}: {} bytes", info.path.display(), info.size),
    ///         Err(e) => eprintln!("skipping entry: {}", *e),
    ///     }
    /// }
    /// # }
    /// ```
    fn list_stream<'a>(&'a self) -> FileInfoStream<'a>;

    /// Check if a file (or directory) exists.
    async fn exists(&self, path: &Path) -> Result<bool>;

    /// Move a file within the backend.
    ///
    /// # Notes
    /// - Parent directories of the destination are created as needed.
    /// - An existing destination is **never** overwritten, not even one that
    ///   appears while the call is in progress; the call fails with
    ///   [`AlreadyExists`](crate::error::ErrorKind::AlreadyExists).
    /// - Moves across filesystems fail with
    ///   [`CrossDevice`](crate::error::ErrorKind::CrossDevice) rather than
    ///   falling back to a non-atomic copy.
    async fn rename(&self, from: &Path, to: &Path) -> Result<()>;

    /// Delete a file.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the file
    /// does not exist.
    async fn delete(&self, path: &Path) -> Result<()>;

    /// List every directory below the root (excluding the root itself),
    /// deepest first so that children come before their parents.
    async fn list_dirs(&self) -> Result<Vec<DirInfo>>;

    /// Remove an empty directory.
    ///
    /// Fails with [`NotEmpty`](crate::error::ErrorKind::NotEmpty) if anything
    /// was written into it in the meantime.
    async fn remove_dir(&self, path: &Path) -> Result<()>;

    /// Report space accounting for the volume holding the root.
    ///
    /// Fails with [`Probe`](crate::error::ErrorKind::Probe) when the volume
    /// cannot be queried.
    async fn usage(&self) -> Result<DiskUsage>;
}
