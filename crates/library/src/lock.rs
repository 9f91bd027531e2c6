//! Guarding against overlapping runs.
//!
//! A scheduler is expected to start one run at a time, but a slow run on a
//! full volume can still be going when the next timer fires. The second run
//! finds the lock held and skips.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};

/// Name of the lock file created in the upload root when none is configured.
pub const DEFAULT_LOCK_FILE: &str = ".camkeep.lock";

/// An exclusive advisory lock, released when dropped.
#[derive(Debug)]
pub struct RunLock {
    _file: File,
    path: PathBuf,
}
impl RunLock {
    /// Takes the lock at `path` without waiting, creating the file if needed.
    ///
    /// Returns `Ok(None)` when another process holds it.
    pub fn acquire(path: impl AsRef<Path>) -> Result<Option<Self>> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .or_raise(|| ErrorKind::Lock(path.clone()))?;
        // Fully qualified: std::fs::File has an inherent method of the same name.
        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => {
                tracing::debug!(path = %path.display(), "Acquired run lock");
                Ok(Some(Self { _file: file, path }))
            },
            Err(e) if e.kind() == IoErrorKind::WouldBlock => {
                tracing::debug!(path = %path.display(), "Run lock is held by another process");
                Ok(None)
            },
            Err(e) => Err(e).or_raise(|| ErrorKind::Lock(path)),
        }
    }
}
impl Drop for RunLock {
    fn drop(&mut self) {
        tracing::debug!(path = %self.path.display(), "Releasing run lock");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_LOCK_FILE);
        let first = RunLock::acquire(&path).unwrap();
        assert!(first.is_some());
        assert!(RunLock::acquire(&path).unwrap().is_none());
        drop(first);
        assert!(RunLock::acquire(&path).unwrap().is_some());
    }

    #[test]
    fn test_unwritable_location_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = RunLock::acquire(dir.path().join("missing").join(DEFAULT_LOCK_FILE)).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Lock(_)));
    }
}
