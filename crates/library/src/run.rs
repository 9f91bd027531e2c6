//! One complete pass over the upload directory.

use crate::Context;
use crate::error::{ErrorKind, Result};
use crate::organize::{Action, OrganizeEvent, organize};
use crate::prune::prune_empty_dirs;
use crate::report::{FileFailure, Operation, RunReport};
use crate::retention::{Violation, evaluate};
use crate::scan::Inventory;
use camkeep_storage::backend::ReadOnlyBackend;
use camkeep_storage::error::ErrorKind as StorageErrorKind;
use camkeep_storage::{BackendHandle, DiskUsage, StorageBackend};
use exn::ResultExt;
use futures::StreamExt;
use std::collections::HashSet;
use std::ops::Deref;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::instrument;

/// Scans, organizes, applies retention and prunes, in that order, and
/// reports what happened.
///
/// Each phase works on the result of the previous one: retention only ever
/// sees a record at the path the organizer left it at, and records that
/// vanished during the run are dropped rather than acted upon and listed in
/// [`RunReport::vanished`].
///
/// With [`Context::dry_run`] set, `backend` is wrapped in a
/// [`ReadOnlyBackend`]: every decision is made and reported exactly as it
/// would be, but no move, delete or directory removal reaches the disk.
///
/// # Errors
/// Only conditions that make the whole run meaningless fail it, and always
/// before anything is mutated: an invalid [`RetentionPolicy`](crate::RetentionPolicy),
/// or a disk usage probe failure when every configured retention rule needs
/// volume figures. Problems with individual files end up in the report.
#[instrument(skip_all, fields(backend = handle.name(), dry_run = ctx.dry_run))]
pub async fn run(handle: &BackendHandle, ctx: &Context) -> Result<RunReport> {
    ctx.policy.validate()?;
    let read_only;
    let backend: &dyn StorageBackend = if ctx.dry_run {
        read_only = ReadOnlyBackend::new(Arc::clone(handle));
        &read_only
    } else {
        handle.as_ref()
    };
    let mut report = RunReport { dry_run: ctx.dry_run, ..Default::default() };

    let mut usage = None;
    if ctx.policy.needs_probe() {
        match backend.usage().await {
            Ok(probed) => usage = Some(probed),
            Err(e) if ctx.delete && !ctx.policy.usable_without_probe() => {
                return Err(e).or_raise(|| ErrorKind::Probe);
            },
            Err(e) => report.warn(format!("{}; quota rules disabled for this run", e.deref())),
        }
    }

    let mut inventory = Inventory::collect(backend, ctx).await;
    report.scanned = inventory.scanned;
    report.recognized = (inventory.records.len() + inventory.protected.len()) as u64;
    report.skipped_grace = inventory.protected.len() as u64;
    for failure in std::mem::take(&mut inventory.failures) {
        report.fail(failure);
    }

    // Files this run moved away or deleted.
    let mut vacated = Vec::new();
    if ctx.organize {
        let records = std::mem::take(&mut inventory.records);
        let mut events = std::pin::pin!(organize(backend, ctx, records));
        while let Some(event) = events.next().await {
            match event {
                OrganizeEvent::Organized { record, action } => {
                    match action {
                        Action::Moved { from, .. } => {
                            report.organized += 1;
                            vacated.push(from);
                        },
                        Action::AlreadyPlaced(_) => report.already_placed += 1,
                        Action::Vanished(path) => {
                            report.vanish(&path, Operation::Move);
                            vacated.push(path);
                            continue;
                        },
                    }
                    inventory.records.push(record);
                },
                OrganizeEvent::Failed { record, failure } => {
                    report.fail(failure);
                    inventory.records.push(record);
                },
                OrganizeEvent::Started(_) | OrganizeEvent::Complete => {},
            }
        }
        tracing::info!(organized = report.organized, already_placed = report.already_placed, "Organize complete");
        usage = reprobe(backend, usage).await;
    }
    report.usage = usage;

    if ctx.delete {
        vacated.extend(apply_retention(backend, ctx, &mut inventory, usage.as_ref(), &mut report).await);
    }

    if ctx.prune_empty_dirs {
        let occupied = inventory
            .records
            .iter()
            .chain(&inventory.protected)
            .map(|r| r.path.as_path())
            .chain(inventory.unrecognized.iter().map(|f| f.path.as_path()))
            .chain(ctx.ignored.iter().map(PathBuf::as_path))
            .collect::<Vec<_>>();
        let failed = report.failures.iter().map(|f| f.path.clone()).collect::<Vec<_>>();
        let occupied = occupied.into_iter().chain(failed.iter().map(PathBuf::as_path));
        prune_empty_dirs(backend, ctx, occupied, vacated.iter().map(PathBuf::as_path), &mut report).await;
    }

    report.unrecognized = inventory.unrecognized;
    tracing::info!(
        scanned = report.scanned,
        organized = report.organized,
        deleted = report.deleted,
        bytes_freed = report.bytes_freed,
        errors = report.errors,
        "Run complete"
    );
    Ok(report)
}

/// Moves change paths, not sizes, so a failed second probe keeps the
/// figures from the first.
async fn reprobe(backend: &dyn StorageBackend, previous: Option<DiskUsage>) -> Option<DiskUsage> {
    previous?;
    match backend.usage().await {
        Ok(usage) => Some(usage),
        Err(e) => {
            tracing::debug!(error = %e.deref(), "Disk usage probe failed after organizing; reusing earlier figures");
            previous
        },
    }
}

/// Evaluates the retention plan against the organized inventory and deletes
/// what it marks. Deleted and vanished records leave the inventory and their
/// paths are returned.
async fn apply_retention(
    backend: &dyn StorageBackend,
    ctx: &Context,
    inventory: &mut Inventory,
    usage: Option<&DiskUsage>,
    report: &mut RunReport,
) -> HashSet<PathBuf> {
    let plan = evaluate(inventory, &ctx.policy, usage, ctx.now);
    for violation in &plan.violations {
        match violation {
            Violation::GraceProtected { path, reason } => {
                tracing::warn!(path = %path.display(), %reason, "Recording qualifies for deletion but is within grace period");
            },
            Violation::QuotaUnsatisfied { shortfall } => {
                tracing::warn!(shortfall, "Quota cannot be met without touching protected recordings");
            },
        }
    }
    report.violations = plan.violations;

    let mut gone = HashSet::new();
    for deletion in plan.deletions {
        let record = &deletion.record;
        match ctx.retry.run(|| backend.delete(&record.path)).await {
            Ok(()) => {
                tracing::info!(
                    path = %record.path.display(),
                    bytes = record.size,
                    reason = %deletion.reason,
                    "Deleted recording"
                );
                report.deleted += 1;
                report.bytes_freed += record.size;
                gone.insert(record.path.clone());
            },
            Err(e) if matches!(e.deref(), StorageErrorKind::NotFound(_)) => {
                report.vanish(&record.path, Operation::Delete);
                gone.insert(record.path.clone());
            },
            Err(e) => report.fail(FileFailure::new(&record.path, Operation::Delete, e.deref())),
        }
    }
    inventory.records.retain(|r| !gone.contains(&r.path));
    gone
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DEFAULT_EXTENSIONS, DEFAULT_LAYOUT, DEFAULT_PATTERN, FilenamePattern, RetentionPolicy};
    use camkeep_storage::backend::{LocalBackend, MockBackend};
    use std::path::PathBuf;
    use time::macros::datetime;
    use time::{Duration, OffsetDateTime};

    const NOW: OffsetDateTime = datetime!(2024-06-01 12:00 UTC);

    fn context(policy: RetentionPolicy) -> Context {
        let pattern = FilenamePattern::new(DEFAULT_PATTERN, DEFAULT_EXTENSIONS).unwrap();
        let mut ctx = Context::new(pattern, DEFAULT_LAYOUT.parse().unwrap(), policy);
        ctx.now = NOW;
        ctx.retry.backoff = std::time::Duration::ZERO;
        ctx
    }

    /// A recording named after its capture time, last written at that time.
    fn recording(backend: MockBackend, dir: &str, days_old: i64, size: u64) -> MockBackend {
        let at = NOW - Duration::days(days_old);
        let name = format!(
            "{dir}Porch_00_{:04}{:02}{:02}{:02}{:02}{:02}.mp4",
            at.year(),
            u8::from(at.month()),
            at.day(),
            at.hour(),
            at.minute(),
            at.second()
        );
        backend.with_file_at(name, size, at)
    }

    fn handle(backend: &Arc<MockBackend>) -> BackendHandle {
        backend.clone()
    }

    #[tokio::test]
    async fn test_age_scenario() {
        let mut backend = MockBackend::default();
        for days in [10, 40, 70] {
            backend = recording(backend, "", days, 100);
        }
        let backend = Arc::new(backend);
        let ctx = context(RetentionPolicy { max_age: Some(Duration::days(30)), ..Default::default() });

        let report = run(&handle(&backend), &ctx).await.unwrap();
        assert_eq!(report.scanned, 3);
        assert_eq!(report.organized, 3);
        assert_eq!(report.deleted, 2);
        assert_eq!(report.bytes_freed, 200);
        assert_eq!(report.errors, 0);
        assert_eq!(backend.paths().await, vec![PathBuf::from("porch/2024/05/22/Porch_00_20240522120000.mp4")]);
    }

    #[tokio::test]
    async fn test_usage_scenario_stops_at_threshold() {
        let mut backend = MockBackend::default().with_usage(Some(DiskUsage {
            total_bytes: 1000,
            used_bytes: 950,
            free_bytes: 50,
        }));
        for days in [5, 4, 3, 2, 1] {
            backend = recording(backend, "porch/", days, 50);
        }
        let backend = Arc::new(backend);
        let ctx = context(RetentionPolicy { max_usage_percent: Some(80.0), ..Default::default() });

        let report = run(&handle(&backend), &ctx).await.unwrap();
        assert_eq!(report.deleted, 3);
        assert_eq!(report.bytes_freed, 150);
        assert!(report.violations.is_empty());
        assert_eq!(
            backend.paths().await,
            vec![
                PathBuf::from("porch/2024/05/30/Porch_00_20240530120000.mp4"),
                PathBuf::from("porch/2024/05/31/Porch_00_20240531120000.mp4"),
            ]
        );
        let usage = backend.usage().await.unwrap();
        assert!(usage.used_percent() <= 80.0);
    }

    #[tokio::test]
    async fn test_grace_scenario() {
        let backend = MockBackend::default()
            .with_file_at("Porch_00_20240101000000.mp4", 10, NOW - Duration::seconds(5));
        let backend = Arc::new(backend);
        let ctx = context(RetentionPolicy {
            max_age: Some(Duration::days(30)),
            grace_period: Duration::seconds(300),
            ..Default::default()
        });

        let report = run(&handle(&backend), &ctx).await.unwrap();
        assert_eq!(report.skipped_grace, 1);
        assert_eq!(report.deleted, 0);
        assert_eq!(report.organized, 0);
        assert!(matches!(&report.violations[..], [Violation::GraceProtected { .. }]));
        assert_eq!(backend.paths().await, vec![PathBuf::from("Porch_00_20240101000000.mp4")]);
    }

    #[tokio::test]
    async fn test_second_run_is_a_no_op() {
        let mut backend = MockBackend::default();
        for (dir, days) in [("", 10), ("a/", 10), ("", 40)] {
            backend = recording(backend, dir, days, 10);
        }
        let backend = Arc::new(backend);
        let ctx = context(RetentionPolicy { max_age: Some(Duration::days(30)), ..Default::default() });

        let first = run(&handle(&backend), &ctx).await.unwrap();
        assert_eq!((first.organized, first.deleted, first.dirs_pruned), (3, 1, 3));
        assert_eq!(
            backend.paths().await,
            vec![
                PathBuf::from("porch/2024/05/22/Porch_00_20240522120000.mp4"),
                PathBuf::from("porch/2024/05/22/Porch_00_20240522120000~1.mp4"),
            ]
        );

        let second = run(&handle(&backend), &ctx).await.unwrap();
        assert_eq!((second.organized, second.deleted, second.dirs_pruned), (0, 0, 0));
        assert_eq!(second.already_placed, 2);
    }

    #[tokio::test]
    async fn test_dry_run_reports_without_mutating() {
        let mut backend = MockBackend::default();
        for (dir, days) in [("old/", 40), ("", 10)] {
            backend = recording(backend, dir, days, 10);
        }
        let backend = Arc::new(backend);
        let before = backend.paths().await;
        let mut ctx = context(RetentionPolicy { max_age: Some(Duration::days(30)), ..Default::default() });
        ctx.dry_run = true;

        let report = run(&handle(&backend), &ctx).await.unwrap();
        assert!(report.dry_run);
        assert_eq!(report.organized, 2);
        assert_eq!(report.deleted, 1);
        assert_eq!(report.dirs_pruned, 1);
        assert_eq!(backend.paths().await, before);
        assert_eq!(backend.dir_paths().await, vec![PathBuf::from("old")]);
    }

    #[tokio::test]
    async fn test_probe_failure_keeps_age_rule() {
        let mut backend = MockBackend::default();
        for days in [10, 40] {
            backend = recording(backend, "", days, 10);
        }
        let backend = Arc::new(backend);
        let ctx = context(RetentionPolicy {
            max_age: Some(Duration::days(30)),
            min_free_space: Some(1 << 30),
            ..Default::default()
        });

        let report = run(&handle(&backend), &ctx).await.unwrap();
        assert_eq!(report.deleted, 1);
        assert_eq!(report.warnings.len(), 1);
        assert!(report.usage.is_none());
    }

    #[tokio::test]
    async fn test_probe_failure_without_usable_rule_is_fatal() {
        let backend = Arc::new(recording(MockBackend::default(), "", 10, 10));
        let ctx = context(RetentionPolicy { max_usage_percent: Some(80.0), ..Default::default() });

        let err = run(&handle(&backend), &ctx).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Probe));
        // Nothing was organized either.
        assert_eq!(backend.paths().await, vec![PathBuf::from("Porch_00_20240522120000.mp4")]);
    }

    #[tokio::test]
    async fn test_invalid_policy_is_fatal() {
        let backend = Arc::new(MockBackend::default());
        let ctx = context(RetentionPolicy { max_usage_percent: Some(120.0), ..Default::default() });
        let err = run(&handle(&backend), &ctx).await.unwrap_err();
        assert!(err.is_config());
    }

    #[tokio::test]
    async fn test_persistent_failures_are_reported_and_run_continues() {
        let mut backend = MockBackend::default();
        for days in [40, 50] {
            backend = recording(backend, "porch/2024/", days, 10);
        }
        // Busy for longer than the retry budget.
        let stuck = "porch/2024/Porch_00_20240412120000.mp4";
        let backend = Arc::new(backend.with_busy(stuck, 10));
        let mut ctx = context(RetentionPolicy { max_age: Some(Duration::days(30)), ..Default::default() });
        ctx.organize = false;

        let report = run(&handle(&backend), &ctx).await.unwrap();
        assert_eq!(report.deleted, 1);
        assert_eq!(report.errors, 1);
        assert_eq!(report.failures[0].operation, Operation::Delete);
        assert_eq!(report.failures[0].path, PathBuf::from(stuck));
        assert_eq!(backend.paths().await, vec![PathBuf::from(stuck)]);
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let at = NOW - Duration::days(40);
        let path = "Porch_00_20240422120000.mp4";
        let backend = Arc::new(MockBackend::default().with_file_at(path, 10, at).with_busy(path, 2));
        let mut ctx = context(RetentionPolicy { max_age: Some(Duration::days(30)), ..Default::default() });
        ctx.organize = false;

        let report = run(&handle(&backend), &ctx).await.unwrap();
        assert_eq!(report.deleted, 1);
        assert_eq!(report.errors, 0);
    }

    #[tokio::test]
    async fn test_unrecognized_files_are_never_touched() {
        let backend = Arc::new(
            MockBackend::default()
                .with_file_at("notes.txt", 500, NOW - Duration::days(400))
                .with_file_at("Porch_00_20240101000000.mp4", 100, NOW - Duration::days(150)),
        );
        let ctx = context(RetentionPolicy { max_total_size: Some(50), ..Default::default() });

        let report = run(&handle(&backend), &ctx).await.unwrap();
        assert_eq!(report.deleted, 1);
        assert_eq!(report.unrecognized.len(), 1);
        assert!(matches!(&report.violations[..], [Violation::QuotaUnsatisfied { shortfall: 450 }]));
        assert_eq!(backend.paths().await, vec![PathBuf::from("notes.txt")]);
    }

    #[tokio::test]
    async fn test_empty_directories_outside_the_run_are_left_alone() {
        let backend = Arc::new(
            MockBackend::default()
                .with_dir_at("Driveway", OffsetDateTime::UNIX_EPOCH)
                .with_dir_at("Backyard/upload", OffsetDateTime::UNIX_EPOCH),
        );
        let mut ctx = context(RetentionPolicy::default());
        ctx.organize = false;
        ctx.delete = false;

        let report = run(&handle(&backend), &ctx).await.unwrap();
        assert_eq!(report.dirs_pruned, 0);
        assert_eq!(
            backend.dir_paths().await,
            vec![PathBuf::from("Backyard"), PathBuf::from("Backyard/upload"), PathBuf::from("Driveway")]
        );
    }

    #[tokio::test]
    async fn test_vanished_recordings_are_reported() {
        let ctx = context(RetentionPolicy { max_age: Some(Duration::days(30)), ..Default::default() });
        let gone = ctx
            .pattern
            .parse(&camkeep_storage::FileInfo::new("porch/Porch_00_20240101000000.mp4", 10, NOW - Duration::days(150)))
            .unwrap();
        let backend = MockBackend::default();
        let mut inventory = Inventory { records: vec![gone.clone()], ..Default::default() };
        let mut report = RunReport::default();

        let removed = apply_retention(&backend, &ctx, &mut inventory, None, &mut report).await;
        assert_eq!(removed, HashSet::from([gone.path.clone()]));
        assert!(inventory.records.is_empty());
        assert_eq!((report.deleted, report.errors), (0, 0));
        assert_eq!(report.vanished.len(), 1);
        assert_eq!(report.vanished[0].path, gone.path);
        assert_eq!(report.vanished[0].operation, Operation::Delete);
    }

    #[tokio::test]
    async fn test_local_filesystem_end_to_end() {
        let temp_dir = tempfile::tempdir().unwrap();
        let upload = temp_dir.path().join("upload");
        std::fs::create_dir(&upload).unwrap();
        std::fs::write(upload.join("Front Door_00_20240131120000.mp4"), b"video").unwrap();
        std::fs::write(upload.join("Front Door_00_20240131120000.jpg"), b"jpg").unwrap();
        std::fs::write(temp_dir.path().join("Front Door_00_20240131120000.mp4"), b"other upload").unwrap();
        std::fs::write(temp_dir.path().join("readme.txt"), b"hi").unwrap();

        let handle: BackendHandle = Arc::new(LocalBackend::new("local", temp_dir.path()).unwrap());
        let mut ctx = context(RetentionPolicy::default());
        ctx.now = OffsetDateTime::now_utc();

        let report = run(&handle, &ctx).await.unwrap();
        assert_eq!(report.organized, 3);
        assert_eq!(report.errors, 0);
        assert_eq!(report.dirs_pruned, 1);
        let day = temp_dir.path().join("front-door/2024/01/31");
        assert_eq!(std::fs::read(day.join("Front Door_00_20240131120000.mp4")).unwrap(), b"other upload");
        assert_eq!(std::fs::read(day.join("Front Door_00_20240131120000~1.mp4")).unwrap(), b"video");
        assert!(day.join("Front Door_00_20240131120000.jpg").exists());
        assert!(temp_dir.path().join("readme.txt").exists());
        assert!(!upload.exists());
    }
}
