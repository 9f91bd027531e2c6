//! Read-only storage backend.
//!
//! This module provides a storage backend implementation that wraps other
//! implementations and prevents mutating operations from executing, while
//! indicating success on return. It is what makes a dry run safe: the engine
//! runs unchanged and only the syscalls are skipped.

use async_trait::async_trait;
use std::path::Path;

use crate::{
    BackendHandle, StorageBackend,
    backend::FileInfoStream,
    error::Result,
    file::{DirInfo, DiskUsage},
};

/// Read-only storage backend.
///
/// Wraps another backend and silently drops all mutating operations, logging
/// an [`info event`](tracing::Event) for each one.
#[derive(Clone)]
pub struct ReadOnlyBackend {
    inner: BackendHandle,
}
impl ReadOnlyBackend {
    pub fn new(inner: BackendHandle) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl StorageBackend for ReadOnlyBackend {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn list_stream<'a>(&'a self) -> FileInfoStream<'a> {
        self.inner.list_stream()
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        self.inner.exists(path).await
    }

    async fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        tracing::info!(from = %from.display(), to = %to.display(), "Skipping move during dry run");
        Ok(())
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        tracing::info!(path = %path.display(), "Skipping delete during dry run");
        Ok(())
    }

    async fn list_dirs(&self) -> Result<Vec<DirInfo>> {
        self.inner.list_dirs().await
    }

    async fn remove_dir(&self, path: &Path) -> Result<()> {
        tracing::info!(path = %path.display(), "Skipping directory removal during dry run");
        Ok(())
    }

    async fn usage(&self) -> Result<DiskUsage> {
        self.inner.usage().await
    }
}
