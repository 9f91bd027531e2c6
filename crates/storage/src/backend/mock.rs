//! In-memory storage backend for testing.

use super::FileInfoStream;
use crate::StorageBackend;
use crate::error::{ErrorKind, Result};
use crate::file::{DirInfo, DiskUsage, FileInfo};
use crate::path::validate as validate_path;
use async_stream::stream;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use tokio::sync::RwLock;

#[derive(Default)]
struct State {
    files: BTreeMap<PathBuf, (OffsetDateTime, u64)>,
    dirs: BTreeMap<PathBuf, OffsetDateTime>,
    usage: Option<DiskUsage>,
    /// Remaining number of times a mutation on the path reports busy.
    busy: HashMap<PathBuf, u32>,
}
impl State {
    fn add_parents(&mut self, path: &Path) {
        for ancestor in path.ancestors().skip(1) {
            if ancestor.as_os_str().is_empty() {
                break;
            }
            self.dirs.entry(ancestor.to_path_buf()).or_insert(OffsetDateTime::UNIX_EPOCH);
        }
    }

    fn take_busy(&mut self, path: &Path) -> Result<()> {
        if let Some(remaining) = self.busy.get_mut(path)
            && *remaining > 0
        {
            *remaining -= 1;
            exn::bail!(ErrorKind::Busy(path.to_path_buf()));
        }
        Ok(())
    }
}

/// In-memory storage backend for testing.
///
/// Only metadata is kept: a size and a modification time per file, and a
/// modification time per directory. Files added without an explicit time
/// are dated at the Unix epoch, far outside any grace period. Volume usage is
/// whatever [`with_usage()`](Self::with_usage) configured and shrinks as
/// files are deleted; without it, [`usage()`](StorageBackend::usage) fails.
///
/// # Examples
///
/// ```
/// use camkeep_storage::backend::{MockBackend, StorageBackend};
/// use std::path::Path;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = MockBackend::with_files([("Porch_00_20240101000000.mp4", 1024)]);
/// assert!(backend.exists(Path::new("Porch_00_20240101000000.mp4")).await.map_err(|e| e.to_string())?);
/// # Ok(())
/// # }
/// ```
pub struct MockBackend {
    name: String,
    state: RwLock<State>,
}

impl MockBackend {
    /// Create a mock backend pre-populated with files of the given sizes.
    ///
    /// Panics if any path fails validation (e.g. path traversal). If test
    /// setup is wrong, then test should not pass.
    pub fn with_files(files: impl IntoIterator<Item = (impl Into<PathBuf>, u64)>) -> Self {
        files.into_iter().fold(Self::default(), |backend, (path, size)| {
            backend.with_file_at(path, size, OffsetDateTime::UNIX_EPOCH)
        })
    }

    /// Add a single file with an explicit modification time.
    pub fn with_file_at(mut self, path: impl Into<PathBuf>, size: u64, modified: OffsetDateTime) -> Self {
        let path = Self::validated(path.into());
        let state = self.state.get_mut();
        state.add_parents(&path);
        state.files.insert(path, (modified, size));
        self
    }

    /// Add a (possibly empty) directory with an explicit modification time.
    pub fn with_dir_at(mut self, path: impl Into<PathBuf>, modified: OffsetDateTime) -> Self {
        let path = Self::validated(path.into());
        let state = self.state.get_mut();
        state.add_parents(&path);
        state.dirs.insert(path, modified);
        self
    }

    /// Set (or clear) the volume usage reported by the backend.
    pub fn with_usage(mut self, usage: Option<DiskUsage>) -> Self {
        self.state.get_mut().usage = usage;
        self
    }

    /// Make the next `times` mutations of `path` fail with
    /// [`Busy`](ErrorKind::Busy).
    pub fn with_busy(mut self, path: impl Into<PathBuf>, times: u32) -> Self {
        let path = Self::validated(path.into());
        self.state.get_mut().busy.insert(path, times);
        self
    }

    /// Sorted snapshot of every file path currently stored.
    pub async fn paths(&self) -> Vec<PathBuf> {
        self.state.read().await.files.keys().cloned().collect()
    }

    /// Size of the file at `path`, if there is one.
    pub async fn size_of(&self, path: impl AsRef<Path>) -> Option<u64> {
        self.state.read().await.files.get(path.as_ref()).map(|(_, size)| *size)
    }

    /// Sorted snapshot of every directory currently stored.
    pub async fn dir_paths(&self) -> Vec<PathBuf> {
        self.state.read().await.dirs.keys().cloned().collect()
    }

    fn validated(path: PathBuf) -> PathBuf {
        let Ok(validated) = validate_path(&path) else {
            // The panic here is DELIBERATE. MockBackend is intended to be
            // used in tests; panics are expected. There is no error result.
            panic!("MockBackend: invalid path {}", path.display());
        };
        validated
    }
}
impl Default for MockBackend {
    fn default() -> Self {
        Self {
            name: "mock".to_string(),
            state: RwLock::new(State::default()),
        }
    }
}

#[async_trait]
impl StorageBackend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_stream<'a>(&'a self) -> FileInfoStream<'a> {
        Box::pin(stream! {
            // Snapshot under the read lock, then drop it before yielding to
            // avoid holding the lock across yield points.
            let entries: Vec<FileInfo> = {
                let guard = self.state.read().await;
                guard.files.iter().map(|(path, (modified, size))| FileInfo::new(path, *size, *modified)).collect()
            };
            for entry in entries {
                yield Ok(entry);
            }
        })
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        let path = validate_path(path)?;
        let guard = self.state.read().await;
        Ok(guard.files.contains_key(&path) || guard.dirs.contains_key(&path))
    }

    async fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        let from = validate_path(from)?;
        let to = validate_path(to)?;
        let mut guard = self.state.write().await;
        guard.take_busy(&from)?;
        if guard.files.contains_key(&to) || guard.dirs.contains_key(&to) {
            exn::bail!(ErrorKind::AlreadyExists(to));
        }
        let entry = guard.files.remove(&from).ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(from)))?;
        guard.add_parents(&to);
        guard.files.insert(to, entry);
        Ok(())
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        let path = validate_path(path)?;
        let mut guard = self.state.write().await;
        guard.take_busy(&path)?;
        let (_, size) = guard.files.remove(&path).ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(path)))?;
        if let Some(usage) = guard.usage.as_mut() {
            let released = size.min(usage.used_bytes);
            usage.used_bytes -= released;
            usage.free_bytes += released;
        }
        Ok(())
    }

    async fn list_dirs(&self) -> Result<Vec<DirInfo>> {
        let guard = self.state.read().await;
        let mut dirs: Vec<DirInfo> = guard
            .dirs
            .iter()
            .map(|(path, modified)| DirInfo { path: path.clone(), modified: *modified })
            .collect();
        dirs.sort_by(|a, b| {
            b.path.components().count().cmp(&a.path.components().count()).then_with(|| a.path.cmp(&b.path))
        });
        Ok(dirs)
    }

    async fn remove_dir(&self, path: &Path) -> Result<()> {
        let path = validate_path(path)?;
        let mut guard = self.state.write().await;
        if !guard.dirs.contains_key(&path) {
            exn::bail!(ErrorKind::NotFound(path));
        }
        let occupied = guard.files.keys().any(|f| f.starts_with(&path))
            || guard.dirs.keys().any(|d| d != &path && d.starts_with(&path));
        if occupied {
            exn::bail!(ErrorKind::NotEmpty(path));
        }
        guard.dirs.remove(&path);
        Ok(())
    }

    async fn usage(&self) -> Result<DiskUsage> {
        let guard = self.state.read().await;
        guard.usage.ok_or_else(|| exn::Exn::from(ErrorKind::Probe(PathBuf::from("."))))
    }
}
