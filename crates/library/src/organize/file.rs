use crate::Context;
use crate::organize::conflict::next_free;
use crate::organize::error::{ErrorKind as OrganizeErrorKind, Result as OrganizeResult, StorageResultExt};
use crate::record::RecordedFile;
use crate::template::CanonicalLayout;
use camkeep_storage::error::ErrorKind as StorageErrorKind;
use camkeep_storage::{FileInfo, StorageBackend};
use exn::ResultExt;
use std::collections::HashSet;
use std::ops::Deref;
use std::path::{Path, PathBuf};

/// The outcome of (successfully) organizing a single record.
///
/// Each variant carries the relevant path. Consumers can pattern-match to
/// decide whether to log, count, or update the record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Record was moved to its canonical location (or a disambiguated
    /// variant of it).
    Moved { from: PathBuf, to: PathBuf },
    /// Record was already at its canonical location; no work performed.
    AlreadyPlaced(PathBuf),
    /// Record disappeared between the scan and the move.
    Vanished(PathBuf),
}

/// Moves a single record to its layout-derived location.
///
/// Renders the destination via the [`Context`]'s
/// [`CanonicalLayout`], and takes one of three actions:
///
/// - **[`Action::AlreadyPlaced`]**: the file is already where it belongs.
/// - **[`Action::Moved`]**: the file was renamed into place.
/// - **[`Action::Vanished`]**: the file was gone by the time it was moved.
///
/// When the destination is occupied (on disk, or promised to an earlier
/// record of this run via `claimed`), a `~N` marker is added to the name.
/// Existing files are never overwritten and moves are single renames: on
/// failure the record stays where it was.
///
/// # Errors
/// Fails with [`OrganizeErrorKind`] for this record only.
pub async fn organize_file(
    backend: &dyn StorageBackend,
    ctx: &Context,
    claimed: &mut HashSet<PathBuf>,
    record: &RecordedFile,
) -> OrganizeResult<Action> {
    let dest = ctx.layout.generate(record).or_raise(|| OrganizeErrorKind::Template)?;
    if CanonicalLayout::is_placed(&record.path, &dest) {
        claimed.insert(record.path.clone());
        return Ok(Action::AlreadyPlaced(record.path.clone()));
    }
    verify_identity(ctx, record, &dest)?;

    let mut sequence = 0;
    while let Some((candidate, taken)) = next_free(backend, claimed, &dest, sequence).await? {
        match ctx.retry.run(|| backend.rename(&record.path, &candidate)).await {
            Ok(()) => {
                tracing::info!(from = %record.path.display(), to = %candidate.display(), "Moved recording");
                claimed.insert(candidate.clone());
                return Ok(Action::Moved { from: record.path.clone(), to: candidate });
            },
            // Something was written to the destination since it was checked.
            Err(e) if matches!(e.deref(), StorageErrorKind::AlreadyExists(_)) => sequence = taken + 1,
            Err(e) if matches!(e.deref(), StorageErrorKind::NotFound(p) if p == &record.path) => {
                tracing::debug!(path = %record.path.display(), "Source is gone");
                return Ok(Action::Vanished(record.path.clone()));
            },
            Err(e) => return Err(e).or_storage(),
        }
    }
    exn::bail!(OrganizeErrorKind::Conflict)
}

/// The destination's file name must still parse to the same recording, or
/// the next run would no longer recognize the file.
fn verify_identity(ctx: &Context, record: &RecordedFile, dest: &Path) -> OrganizeResult<()> {
    let probe = FileInfo::new(dest, record.size, record.modified);
    match ctx.pattern.parse(&probe) {
        Ok(parsed)
            if parsed.camera == record.camera
                && parsed.channel == record.channel
                && parsed.captured == record.captured
                && parsed.kind == record.kind =>
        {
            Ok(())
        },
        _ => exn::bail!(OrganizeErrorKind::Identity),
    }
}
