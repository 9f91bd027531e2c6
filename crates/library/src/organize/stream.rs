use crate::Context;
use crate::organize::file::{Action, organize_file};
use crate::record::RecordedFile;
use crate::report::{FileFailure, Operation};
use async_stream::stream;
use camkeep_storage::StorageBackend;
use futures::Stream;
use std::collections::HashSet;
use std::ops::Deref;

/// Progress events emitted by [`organize`] as it works through the
/// recognized recordings of a scan.
///
/// Events follow a strict ordering:
/// 1. [`Started`](Self::Started), exactly once, with the number of records.
/// 2. [`Organized`](Self::Organized) or [`Failed`](Self::Failed), once per
///    record.
/// 3. [`Complete`](Self::Complete), exactly once.
pub enum OrganizeEvent {
    Started(u64),
    /// A record was handled. For [`Action::Moved`] the record's path already
    /// points at its new location.
    Organized { record: RecordedFile, action: Action },
    /// The record could not be organized and was left where it is.
    Failed { record: RecordedFile, failure: FileFailure },
    Complete,
}

/// Streams [`OrganizeEvent`]s while moving each of `records` to its
/// layout-derived location according to `ctx`.
///
/// Records are handled one at a time in path order, so destination names
/// claimed by earlier records are visible to later ones and the outcome of a
/// run does not depend on listing order. A failure never ends the stream.
pub fn organize<'a>(
    backend: &'a dyn StorageBackend,
    ctx: &'a Context,
    mut records: Vec<RecordedFile>,
) -> impl Stream<Item = OrganizeEvent> + 'a {
    // `rustfmt` does not format macros that use braces. Wrap in parentheses!
    stream!({
        records.sort_by(|a, b| a.path.cmp(&b.path));
        yield OrganizeEvent::Started(records.len() as u64);

        // Every path already spoken for by this run: files left in place and
        // destinations of completed moves.
        let mut claimed = HashSet::new();
        for record in records {
            match organize_file(backend, ctx, &mut claimed, &record).await {
                Ok(action) => {
                    let mut record = record;
                    if let Action::Moved { to, .. } = &action {
                        record.path = to.clone();
                    }
                    yield OrganizeEvent::Organized { record, action };
                },
                Err(e) => {
                    let failure = FileFailure::new(&record.path, Operation::Move, e.deref());
                    yield OrganizeEvent::Failed { record, failure };
                },
            }
        }

        yield OrganizeEvent::Complete;
    })
}
