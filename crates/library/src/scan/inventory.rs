use crate::Context;
use crate::pattern::Unrecognized;
use crate::record::RecordedFile;
use crate::report::FileFailure;
use crate::scan::{ScanEvent, scan};
use camkeep_storage::StorageBackend;
use futures::StreamExt;
use serde::Serialize;
use std::path::PathBuf;
use tracing::instrument;

/// A listed file that did not parse as a recording.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnrecognizedFile {
    pub path: PathBuf,
    pub size: u64,
    pub reason: Unrecognized,
}

/// The working set of one run: every scanned entry, bucketed.
#[derive(Debug, Default)]
pub struct Inventory {
    /// Recordings eligible for any action, in listing order.
    pub records: Vec<RecordedFile>,
    /// Recordings within the grace period.
    pub protected: Vec<RecordedFile>,
    pub unrecognized: Vec<UnrecognizedFile>,
    pub failures: Vec<FileFailure>,
    /// Regular files listed, ignored paths excluded.
    pub scanned: u64,
}
impl Inventory {
    /// Runs a [`scan`] to completion and buckets every event.
    #[instrument(skip_all, fields(backend = backend.name()))]
    pub async fn collect(backend: &dyn StorageBackend, ctx: &Context) -> Self {
        let mut inventory = Self::default();
        let mut events = std::pin::pin!(scan(backend, ctx));
        while let Some(event) = events.next().await {
            inventory.push(event);
        }
        tracing::info!(
            scanned = inventory.scanned,
            recognized = inventory.records.len() + inventory.protected.len(),
            protected = inventory.protected.len(),
            unrecognized = inventory.unrecognized.len(),
            failures = inventory.failures.len(),
            "Scan complete"
        );
        inventory
    }

    pub fn push(&mut self, event: ScanEvent) {
        match event {
            ScanEvent::Recognized(record) => self.records.push(record),
            ScanEvent::Protected(record) => self.protected.push(record),
            ScanEvent::Unrecognized(file) => self.unrecognized.push(file),
            ScanEvent::Failed(failure) => self.failures.push(failure),
            ScanEvent::Complete(scanned) => self.scanned = scanned,
            ScanEvent::Started | ScanEvent::Ignored(_) => {},
        }
    }

    /// Bytes occupied by unrecognized files.
    pub fn unrecognized_bytes(&self) -> u64 {
        self.unrecognized.iter().map(|f| f.size).sum()
    }

    /// Bytes occupied by the scanned tree, as measured against a total size
    /// limit.
    pub fn tree_bytes(&self, count_unrecognized: bool) -> u64 {
        let recordings: u64 = self.records.iter().chain(&self.protected).map(|r| r.size).sum();
        if count_unrecognized { recordings + self.unrecognized_bytes() } else { recordings }
    }
}
