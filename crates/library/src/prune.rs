//! Removing directories left empty by a run.

use crate::Context;
use crate::report::{FileFailure, Operation, RunReport};
use camkeep_storage::StorageBackend;
use camkeep_storage::error::ErrorKind as StorageErrorKind;
use std::collections::HashSet;
use std::ops::Deref;
use std::path::{Path, PathBuf};

/// Removes the directories this run emptied, deepest first, so a chain of
/// directories collapses up to the first one that still has content.
///
/// Only ancestors of the `vacated` files (moved away or deleted by this run)
/// are candidates. Any directory holding one of the `occupied` file paths or
/// a directory that is not a candidate is kept, and so is everything above
/// it. Directories that turn out to be non-empty are kept without complaint.
///
/// The decision only depends on the listing and the two path sets, so a dry
/// run reports the same count without removing anything.
pub(crate) async fn prune_empty_dirs<'a>(
    backend: &dyn StorageBackend,
    ctx: &Context,
    occupied: impl IntoIterator<Item = &'a Path>,
    vacated: impl IntoIterator<Item = &'a Path>,
    report: &mut RunReport,
) {
    let mut candidates = HashSet::new();
    for path in vacated {
        mark_ancestors(&mut candidates, path);
    }
    if candidates.is_empty() {
        return;
    }
    let mut dirs = match backend.list_dirs().await {
        Ok(dirs) => dirs,
        Err(e) => {
            report.warn(format!("{}; empty directories were not pruned", e.deref()));
            return;
        },
    };
    let mut busy = HashSet::new();
    for path in occupied {
        mark_ancestors(&mut busy, path);
    }
    for dir in dirs.iter().filter(|d| !candidates.contains(&d.path)) {
        mark_ancestors(&mut busy, &dir.path);
    }
    dirs.retain(|d| candidates.contains(&d.path));
    dirs.sort_by(|a, b| {
        b.path.components().count().cmp(&a.path.components().count()).then_with(|| a.path.cmp(&b.path))
    });

    for dir in dirs {
        if busy.contains(&dir.path) {
            continue;
        }
        match ctx.retry.run(|| backend.remove_dir(&dir.path)).await {
            Ok(()) => {
                tracing::info!(path = %dir.path.display(), "Removed empty directory");
                report.dirs_pruned += 1;
            },
            Err(e) => {
                if !matches!(e.deref(), StorageErrorKind::NotEmpty(_) | StorageErrorKind::NotFound(_)) {
                    report.fail(FileFailure::new(&dir.path, Operation::Prune, e.deref()));
                }
                mark_ancestors(&mut busy, &dir.path);
            },
        }
    }
}

/// Marks every proper ancestor of `path` (the root excluded).
fn mark_ancestors(set: &mut HashSet<PathBuf>, path: &Path) {
    for ancestor in path.ancestors().skip(1) {
        if ancestor.as_os_str().is_empty() || !set.insert(ancestor.to_path_buf()) {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DEFAULT_EXTENSIONS, DEFAULT_LAYOUT, DEFAULT_PATTERN, FilenamePattern, RetentionPolicy};
    use camkeep_storage::backend::MockBackend;
    use time::OffsetDateTime;

    fn context() -> Context {
        let pattern = FilenamePattern::new(DEFAULT_PATTERN, DEFAULT_EXTENSIONS).unwrap();
        Context::new(pattern, DEFAULT_LAYOUT.parse().unwrap(), RetentionPolicy::default())
    }

    #[test]
    fn test_mark_ancestors() {
        let mut busy = HashSet::new();
        mark_ancestors(&mut busy, Path::new("a/b/c.mp4"));
        assert_eq!(busy, HashSet::from([PathBuf::from("a/b"), PathBuf::from("a")]));
        mark_ancestors(&mut busy, Path::new("top.mp4"));
        assert_eq!(busy.len(), 2);
    }

    #[tokio::test]
    async fn test_prunes_vacated_chains_only() {
        let ctx = context();
        let old = OffsetDateTime::UNIX_EPOCH;
        let backend = MockBackend::with_files([("cam/2024/01/02/keep.mp4", 1)])
            .with_dir_at("cam/2024/01/01", old)
            .with_dir_at("old/2023/12/31", old)
            .with_dir_at("other/2023/12", old);
        let mut report = RunReport::default();
        prune_empty_dirs(
            &backend,
            &ctx,
            [Path::new("cam/2024/01/02/keep.mp4")],
            [Path::new("cam/2024/01/01/moved.mp4"), Path::new("old/2023/12/31/deleted.mp4")],
            &mut report,
        )
        .await;

        assert_eq!(report.dirs_pruned, 5);
        assert_eq!(
            backend.dir_paths().await,
            vec![
                PathBuf::from("cam"),
                PathBuf::from("cam/2024"),
                PathBuf::from("cam/2024/01"),
                PathBuf::from("cam/2024/01/02"),
                PathBuf::from("other"),
                PathBuf::from("other/2023"),
                PathBuf::from("other/2023/12"),
            ]
        );
    }

    #[tokio::test]
    async fn test_untouched_empty_directories_are_kept() {
        let ctx = context();
        let old = OffsetDateTime::UNIX_EPOCH;
        let backend = MockBackend::default().with_dir_at("Driveway", old).with_dir_at("Backyard/upload", old);
        let mut report = RunReport::default();
        prune_empty_dirs(&backend, &ctx, [], [], &mut report).await;
        assert_eq!(report.dirs_pruned, 0);
        assert_eq!(backend.dir_paths().await.len(), 3);

        // An untouched empty sibling keeps a vacated parent in place.
        prune_empty_dirs(&backend, &ctx, [], [Path::new("Backyard/clip.mp4")], &mut report).await;
        assert_eq!(report.dirs_pruned, 0);
        assert_eq!(backend.dir_paths().await.len(), 3);
    }

    #[tokio::test]
    async fn test_unexpected_content_is_kept_silently() {
        let ctx = context();
        // A file that arrived after the scan.
        let backend = MockBackend::with_files([("cam/new.mp4", 1)]);
        let mut report = RunReport::default();
        prune_empty_dirs(&backend, &ctx, [], [Path::new("cam/old.mp4")], &mut report).await;

        assert_eq!(report.dirs_pruned, 0);
        assert!(report.failures.is_empty());
        assert_eq!(backend.dir_paths().await, vec![PathBuf::from("cam")]);
    }
}
