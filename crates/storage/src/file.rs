//! These types describe what a storage backend knows about the entries under
//! its root, without interpreting them.

use serde::Serialize;
use std::path::PathBuf;
use time::OffsetDateTime;

/// File metadata returned by storage backends.
///
/// Only regular files are ever described by a `FileInfo`; directories and
/// symbolic links are filtered out during listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// Relative path from storage root
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
    /// Last modified timestamp
    pub modified: OffsetDateTime,
}
impl FileInfo {
    pub fn new(path: impl Into<PathBuf>, size: u64, modified: impl Into<OffsetDateTime>) -> Self {
        Self {
            path: path.into(),
            size,
            modified: modified.into(),
        }
    }

    /// The final path component as UTF-8, if it is valid UTF-8.
    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name().and_then(|n| n.to_str())
    }
}

/// A directory below the storage root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirInfo {
    /// Relative path from storage root
    pub path: PathBuf,
    /// Last modified timestamp (changes whenever an entry is added or removed)
    pub modified: OffsetDateTime,
}

/// Space accounting for the volume holding the storage root.
///
/// Mirrors what `df` reports: `used` excludes blocks reserved for the
/// superuser, while `free` is the space available to unprivileged writers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DiskUsage {
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub free_bytes: u64,
}
impl DiskUsage {
    /// Percentage of usable space currently in use, `used / (used + free)`.
    ///
    /// An empty volume (no used and no free space) reports zero.
    pub fn used_percent(&self) -> f64 {
        Self::percent(self.used_bytes, self.free_bytes)
    }

    /// Usage percentage after `removed` bytes have been released.
    pub fn used_percent_after(&self, removed: u64) -> f64 {
        let removed = removed.min(self.used_bytes);
        Self::percent(self.used_bytes - removed, self.free_bytes.saturating_add(removed))
    }

    #[allow(clippy::cast_precision_loss)]
    fn percent(used: u64, free: u64) -> f64 {
        let usable = used.saturating_add(free);
        if usable == 0 {
            return 0.0;
        }
        used as f64 / usable as f64 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentage_follows_df() {
        let usage = DiskUsage { total_bytes: 1100, used_bytes: 950, free_bytes: 50 };
        assert!((usage.used_percent() - 95.0).abs() < f64::EPSILON);
        assert!((usage.used_percent_after(150) - 80.0).abs() < 1e-9);
    }

    #[test]
    fn empty_volume_is_zero_percent() {
        let usage = DiskUsage { total_bytes: 0, used_bytes: 0, free_bytes: 0 };
        assert_eq!(usage.used_percent(), 0.0);
        assert_eq!(usage.used_percent_after(10), 0.0);
    }
}
