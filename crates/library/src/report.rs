//! The structured outcome of one run.
//!
//! The engine never writes prose about what it did. Everything a presentation
//! layer needs ends up in a [`RunReport`], which serializes with serde.

use crate::retention::Violation;
use crate::scan::UnrecognizedFile;
use camkeep_storage::DiskUsage;
use derive_more::Display;
use serde::Serialize;
use std::path::PathBuf;

/// The operation a per-file failure happened in.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    #[display("scan")]
    Scan,
    #[display("move")]
    Move,
    #[display("delete")]
    Delete,
    #[display("prune")]
    Prune,
}

/// A single file (or directory) that could not be processed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileFailure {
    pub path: PathBuf,
    pub operation: Operation,
    pub reason: String,
}
impl FileFailure {
    pub fn new(path: impl Into<PathBuf>, operation: Operation, reason: impl ToString) -> Self {
        Self {
            path: path.into(),
            operation,
            reason: reason.to_string(),
        }
    }
}

/// A recording that disappeared between the scan and the moment it was to be
/// moved or deleted. The run skips it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VanishedFile {
    pub path: PathBuf,
    pub operation: Operation,
}

/// Counts and details of everything a run did, or in a dry run, would have
/// done.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunReport {
    pub dry_run: bool,
    /// Regular files listed below the root.
    pub scanned: u64,
    /// Files parsed into recordings, including grace-protected ones.
    pub recognized: u64,
    pub organized: u64,
    pub already_placed: u64,
    /// Recordings left alone because they were modified too recently.
    pub skipped_grace: u64,
    pub deleted: u64,
    pub bytes_freed: u64,
    pub dirs_pruned: u64,
    /// Number of entries in `failures`.
    pub errors: u64,
    pub unrecognized: Vec<UnrecognizedFile>,
    pub failures: Vec<FileFailure>,
    pub vanished: Vec<VanishedFile>,
    pub violations: Vec<Violation>,
    /// Conditions that degraded the run without failing it, such as an
    /// unavailable disk usage probe.
    pub warnings: Vec<String>,
    /// Volume figures used for quota evaluation, when probed.
    pub usage: Option<DiskUsage>,
}
impl RunReport {
    pub(crate) fn fail(&mut self, failure: FileFailure) {
        tracing::warn!(
            path = %failure.path.display(),
            operation = %failure.operation,
            reason = %failure.reason,
            "File operation failed"
        );
        self.failures.push(failure);
        self.errors = self.failures.len() as u64;
    }

    pub(crate) fn vanish(&mut self, path: impl Into<PathBuf>, operation: Operation) {
        let path = path.into();
        tracing::info!(path = %path.display(), %operation, "Recording vanished before it could be processed");
        self.vanished.push(VanishedFile { path, operation });
    }

    pub(crate) fn warn(&mut self, warning: impl Into<String>) {
        let warning = warning.into();
        tracing::warn!("{warning}");
        self.warnings.push(warning);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failures_are_counted() {
        let mut report = RunReport::default();
        report.fail(FileFailure::new("a.mp4", Operation::Delete, "permission denied: a.mp4"));
        report.fail(FileFailure::new("b.mp4", Operation::Move, "cross-device move refused: b.mp4"));
        assert_eq!(report.errors, 2);
        assert_eq!(report.failures[1].operation, Operation::Move);
    }

    #[test]
    fn test_vanished_files_are_not_errors() {
        let mut report = RunReport::default();
        report.vanish("a.mp4", Operation::Delete);
        assert_eq!(report.errors, 0);
        assert_eq!(report.vanished, vec![VanishedFile { path: PathBuf::from("a.mp4"), operation: Operation::Delete }]);
    }
}
