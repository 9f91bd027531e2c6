//! Presenting a [`RunReport`].

use crate::error::{ErrorKind, Result};
use camkeep_library::RunReport;
use exn::ResultExt;
use std::io::Write;

/// Writes the report as pretty-printed JSON.
pub fn write_json(report: &RunReport, mut out: impl Write) -> Result<()> {
    serde_json::to_writer_pretty(&mut out, report).or_raise(|| ErrorKind::Output)?;
    writeln!(out).or_raise(|| ErrorKind::Output)
}

/// Logs the report: a summary line, then one line per notable entry.
pub fn log_summary(report: &RunReport) {
    for file in &report.unrecognized {
        tracing::debug!(path = %file.path.display(), reason = %file.reason, "Unrecognized file left untouched");
    }
    for failure in &report.failures {
        tracing::warn!(
            path = %failure.path.display(),
            operation = %failure.operation,
            reason = %failure.reason,
            "Failed"
        );
    }
    if let Some(usage) = report.usage {
        tracing::info!(
            used_bytes = usage.used_bytes,
            free_bytes = usage.free_bytes,
            used_percent = %format!("{:.1}", usage.used_percent_after(report.bytes_freed)),
            "Volume usage after run"
        );
    }
    tracing::info!(
        dry_run = report.dry_run,
        scanned = report.scanned,
        recognized = report.recognized,
        unrecognized = report.unrecognized.len(),
        organized = report.organized,
        already_placed = report.already_placed,
        skipped_grace = report.skipped_grace,
        deleted = report.deleted,
        bytes_freed = report.bytes_freed,
        dirs_pruned = report.dirs_pruned,
        errors = report.errors,
        violations = report.violations.len(),
        "Run summary"
    );
}
