use crate::organize::error::{Result as OrganizeResult, StorageResultExt};
use camkeep_storage::StorageBackend;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Highest `~N` marker tried before giving up on a destination.
pub(crate) const MAX_SEQUENCE: u32 = 999;

/// `dir/name.ext` becomes `dir/name~N.ext`.
pub(crate) fn with_sequence(dest: &Path, sequence: u32) -> PathBuf {
    let name = dest.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
    let renamed = match name.rsplit_once('.') {
        Some((stem, ext)) => format!("{stem}~{sequence}.{ext}"),
        None => format!("{name}~{sequence}"),
    };
    dest.with_file_name(renamed)
}

/// Finds the first destination at or after `sequence` that is neither taken
/// on disk nor already promised to another record this run.
///
/// Returns `None` once [`MAX_SEQUENCE`] is exhausted.
pub(crate) async fn next_free(
    backend: &dyn StorageBackend,
    claimed: &HashSet<PathBuf>,
    dest: &Path,
    sequence: u32,
) -> OrganizeResult<Option<(PathBuf, u32)>> {
    for sequence in sequence..=MAX_SEQUENCE {
        let candidate = if sequence == 0 { dest.to_path_buf() } else { with_sequence(dest, sequence) };
        if claimed.contains(&candidate) {
            continue;
        }
        if backend.exists(&candidate).await.or_storage()? {
            tracing::debug!(path = %candidate.display(), "Destination taken; trying next name");
            continue;
        }
        return Ok(Some((candidate, sequence)));
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use camkeep_storage::backend::MockBackend;
    use rstest::rstest;

    #[rstest]
    #[case("cam/2024/a.mp4", 1, "cam/2024/a~1.mp4")]
    #[case("a.tar.mp4", 12, "a.tar~12.mp4")]
    #[case("cam/noext", 3, "cam/noext~3")]
    fn test_with_sequence(#[case] dest: &str, #[case] sequence: u32, #[case] expected: &str) {
        assert_eq!(with_sequence(Path::new(dest), sequence), Path::new(expected));
    }

    #[tokio::test]
    async fn test_skips_existing_and_claimed() {
        let backend = MockBackend::with_files([("cam/a.mp4", 1), ("cam/a~2.mp4", 1)]);
        let claimed = HashSet::from([PathBuf::from("cam/a~1.mp4")]);
        let found = next_free(&backend, &claimed, Path::new("cam/a.mp4"), 0).await.unwrap();
        assert_eq!(found, Some((PathBuf::from("cam/a~3.mp4"), 3)));
        let found = next_free(&backend, &HashSet::new(), Path::new("cam/b.mp4"), 0).await.unwrap();
        assert_eq!(found, Some((PathBuf::from("cam/b.mp4"), 0)));
    }

    #[tokio::test]
    async fn test_exhaustion() {
        let backend = MockBackend::with_files([("a.mp4", 1)]);
        let found = next_free(&backend, &HashSet::new(), Path::new("a.mp4"), MAX_SEQUENCE + 1).await.unwrap();
        assert_eq!(found, None);
    }
}
