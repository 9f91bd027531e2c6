use crate::Context;
use crate::record::RecordedFile;
use crate::report::{FileFailure, Operation};
use crate::scan::UnrecognizedFile;
use async_stream::stream;
use camkeep_storage::StorageBackend;
use futures::{Stream, StreamExt};
use std::ops::Deref;
use std::path::PathBuf;

/// Progress events emitted by [`scan`] as it walks the upload tree.
///
/// Events follow a strict ordering:
/// 1. [`Started`](Self::Started), exactly once.
/// 2. One classification event per listed entry.
/// 3. [`Complete`](Self::Complete), exactly once, with the number of regular
///    files listed (ignored paths excluded).
pub enum ScanEvent {
    Started,
    /// A recording eligible for organization and retention.
    Recognized(RecordedFile),
    /// A recording modified within the grace period. It still occupies
    /// space, but nothing may be done to it this run.
    Protected(RecordedFile),
    Unrecognized(UnrecognizedFile),
    /// An entry on the ignore list, such as the run lock.
    Ignored(PathBuf),
    /// The entry could not be listed or inspected.
    Failed(FileFailure),
    Complete(u64),
}

/// Streams a [`ScanEvent`] for every regular file below the root of
/// `backend`, classified according to `ctx`.
///
/// Listing errors are reported as [`ScanEvent::Failed`] and never end the
/// stream early.
pub fn scan<'a>(backend: &'a dyn StorageBackend, ctx: &'a Context) -> impl Stream<Item = ScanEvent> + 'a {
    stream! {
        yield ScanEvent::Started;
        let mut listed = 0u64;
        let mut files = backend.list_stream();
        while let Some(item) = files.next().await {
            let file = match item {
                Ok(file) => file,
                Err(e) => {
                    let error = e.deref();
                    yield ScanEvent::Failed(FileFailure::new(error.path(), Operation::Scan, error));
                    continue;
                },
            };
            if ctx.ignored.contains(&file.path) {
                yield ScanEvent::Ignored(file.path);
                continue;
            }
            listed += 1;
            match ctx.pattern.parse(&file) {
                Ok(record) if record.within_grace(ctx.now, ctx.policy.grace_period) => {
                    tracing::debug!(path = %record.path.display(), "Recording is within grace period");
                    yield ScanEvent::Protected(record);
                },
                Ok(record) => {
                    tracing::trace!(path = %record.path.display(), camera = %record.camera, "Recognized recording");
                    yield ScanEvent::Recognized(record);
                },
                Err(reason) => {
                    tracing::debug!(path = %file.path.display(), %reason, "Unrecognized file");
                    yield ScanEvent::Unrecognized(UnrecognizedFile { path: file.path, size: file.size, reason });
                },
            }
        }
        yield ScanEvent::Complete(listed);
    }
}
