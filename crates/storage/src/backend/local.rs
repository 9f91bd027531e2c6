//! Local filesystem storage backend.
//!
//! This module provides a storage backend implementation for the local filesystem.
//! All paths are relative to the configured upload root and accessed using
//! `tokio::fs`.

use crate::backend::FileInfoStream;
use crate::error::ErrorKind;
use crate::file::{DirInfo, DiskUsage};
use crate::{FileInfo, StorageBackend, error::Result, path::validate as validate_path};
use async_stream::stream;
use async_trait::async_trait;
use exn::ResultExt;
use std::fs::Metadata;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::{self, DirEntry};

enum WalkEntry {
    File(FileInfo),
    Descend(PathBuf),
    Skip,
}

/// Local filesystem storage backend.
///
/// # Examples
///
/// ```no_run
/// use camkeep_storage::backend::LocalBackend;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = LocalBackend::new("uploads", "/srv/ftp/cameras").map_err(|e| e.to_string())?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct LocalBackend {
    name: String,
    /// Root of the upload tree
    root: PathBuf,
}
impl LocalBackend {
    /// Create a new local filesystem backend.
    ///
    /// # Errors
    ///
    /// Unlike a library directory, the upload root is owned by the camera's
    /// upload service, so it is never created here. Returns
    /// [`InvalidPath`](ErrorKind::InvalidPath) if the path is relative or not
    /// a directory, and [`NotFound`](ErrorKind::NotFound) if it is missing.
    pub fn new(name: impl Into<String>, root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_absolute() {
            exn::bail!(ErrorKind::InvalidPath(root));
        }
        // Non-async: this only happens once at startup.
        let metadata = std::fs::metadata(&root).map_err(|e| ErrorKind::from_io(e, &root))?;
        if !metadata.is_dir() {
            exn::bail!(ErrorKind::InvalidPath(root));
        }
        Ok(Self { name: name.into(), root })
    }

    /// Validates a relative path and joins it onto the root.
    fn absolute_path(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let validated = validate_path(path.as_ref())?;
        Ok(self.root.join(validated))
    }

    /// Converts an absolute path found while walking back into a relative one.
    fn relative_path(&self, absolute: impl AsRef<Path>) -> Result<PathBuf> {
        let absolute = absolute.as_ref();
        let relative = absolute
            .strip_prefix(&self.root)
            .or_raise(|| ErrorKind::InvalidPath(absolute.to_path_buf()))?;
        validate_path(relative)
    }

    fn file_info(path: &Path, metadata: &Metadata) -> Result<FileInfo> {
        let modified = metadata.modified().map_err(|e| ErrorKind::from_io(e, path))?;
        Ok(FileInfo::new(path, metadata.len(), modified))
    }

    /// Classifies one directory entry. `DirEntry::metadata` does not follow
    /// symbolic links, so links show up as neither file nor directory and are
    /// skipped along with sockets, fifos and device nodes.
    async fn process_entry(&self, entry: DirEntry) -> Result<WalkEntry> {
        let path = entry.path();
        let relative = self.relative_path(&path)?;
        let metadata = entry.metadata().await.map_err(|e| ErrorKind::from_io(e, &relative))?;
        if metadata.is_dir() {
            return Ok(WalkEntry::Descend(path));
        }
        if metadata.is_file() {
            return Ok(WalkEntry::File(Self::file_info(&relative, &metadata)?));
        }
        tracing::trace!(path = %relative.display(), "Skipping non-regular entry");
        Ok(WalkEntry::Skip)
    }
}

#[async_trait]
impl StorageBackend for LocalBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_stream<'a>(&'a self) -> FileInfoStream<'a> {
        let mut stack = vec![self.root.clone()];

        Box::pin(stream! {
            'dirs: while let Some(current) = stack.pop() {
                let mut entries = match fs::read_dir(&current).await {
                    Ok(entries) => entries,
                    // Removed between being listed and being read.
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound && current != self.root => continue 'dirs,
                    Err(err) => {
                        yield Err(exn::Exn::from(ErrorKind::from_io(err, &current)));
                        continue 'dirs;
                    },
                };

                'entries: loop {
                    let entry = match entries.next_entry().await {
                        Ok(Some(entry)) => entry,
                        Ok(None) => break 'entries,
                        Err(e) => {
                            yield Err(exn::Exn::from(ErrorKind::from_io(e, &current)));
                            // A failing directory handle tends to keep failing.
                            continue 'dirs;
                        },
                    };
                    match self.process_entry(entry).await {
                        Ok(WalkEntry::File(f)) => yield Ok(f),
                        Ok(WalkEntry::Descend(d)) => stack.push(d),
                        Ok(WalkEntry::Skip) => {},
                        Err(e) => yield Err(e),
                    };
                }
            }
        })
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        let abs_path = self.absolute_path(path)?;
        Ok(fs::try_exists(&abs_path).await.map_err(|e| ErrorKind::from_io(e, path))?)
    }

    async fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        let from_path = self.absolute_path(from)?;
        let to_path = self.absolute_path(to)?;
        if let Some(parent) = to_path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| ErrorKind::from_io(e, to))?;
        }
        // link(2) refuses an existing target, where rename(2) would replace it.
        fs::hard_link(&from_path, &to_path).await.map_err(|e| match e.kind() {
            IoErrorKind::AlreadyExists => ErrorKind::AlreadyExists(to.to_path_buf()),
            _ => ErrorKind::from_io(e, from),
        })?;
        match fs::remove_file(&from_path).await {
            Ok(()) => Ok(()),
            // Only the new name is left, which is the intended outcome.
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(()),
            Err(e) => {
                if let Err(undo) = fs::remove_file(&to_path).await {
                    tracing::warn!(path = %to.display(), error = %undo, "Unable to remove second link after failed move");
                }
                exn::bail!(ErrorKind::from_io(e, from))
            },
        }
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        let abs_path = self.absolute_path(path)?;
        Ok(fs::remove_file(&abs_path).await.map_err(|e| ErrorKind::from_io(e, path))?)
    }

    async fn list_dirs(&self) -> Result<Vec<DirInfo>> {
        let mut dirs = Vec::new();
        let mut stack = vec![self.root.clone()];
        while let Some(current) = stack.pop() {
            let mut entries = match fs::read_dir(&current).await {
                Ok(entries) => entries,
                Err(e) if current == self.root => exn::bail!(ErrorKind::from_io(e, &current)),
                Err(e) => {
                    tracing::debug!(path = %current.display(), error = %e, "Unable to read directory");
                    continue;
                },
            };
            while let Some(entry) = entries.next_entry().await.map_err(|e| ErrorKind::from_io(e, &current))? {
                let Ok(metadata) = entry.metadata().await else { continue };
                if !metadata.is_dir() {
                    continue;
                }
                let path = entry.path();
                let relative = self.relative_path(&path)?;
                let modified = metadata.modified().map_err(|e| ErrorKind::from_io(e, &relative))?;
                dirs.push(DirInfo { path: relative, modified: modified.into() });
                stack.push(path);
            }
        }
        dirs.sort_by(|a, b| {
            b.path.components().count().cmp(&a.path.components().count()).then_with(|| a.path.cmp(&b.path))
        });
        Ok(dirs)
    }

    async fn remove_dir(&self, path: &Path) -> Result<()> {
        let abs_path = self.absolute_path(path)?;
        Ok(fs::remove_dir(&abs_path).await.map_err(|e| ErrorKind::from_io(e, path))?)
    }

    async fn usage(&self) -> Result<DiskUsage> {
        // statvfs is a single cheap syscall; not worth a blocking task.
        let total = fs2::total_space(&self.root).or_raise(|| ErrorKind::Probe(self.root.clone()))?;
        let free = fs2::free_space(&self.root).or_raise(|| ErrorKind::Probe(self.root.clone()))?;
        let available = fs2::available_space(&self.root).or_raise(|| ErrorKind::Probe(self.root.clone()))?;
        Ok(DiskUsage {
            total_bytes: total,
            used_bytes: total.saturating_sub(free),
            free_bytes: available,
        })
    }
}
