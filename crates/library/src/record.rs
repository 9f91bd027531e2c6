//! The in-memory model of a recognized recording.

use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use time::{Duration, OffsetDateTime};

/// What a recording contains, decided by its file extension.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    #[display("video")]
    Video,
    #[display("snapshot")]
    Snapshot,
    #[display("other")]
    Other,
}
impl FromStr for Kind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "video" => Ok(Self::Video),
            "snapshot" => Ok(Self::Snapshot),
            "other" => Ok(Self::Other),
            other => Err(format!("unknown recording kind \"{other}\"")),
        }
    }
}

/// One recognized recording or snapshot.
///
/// Built fresh from a directory listing on every run; nothing about a record
/// is persisted between runs. Identity fields (`camera`, `channel`,
/// `captured`, `kind`) never change after parsing. Only `path` is updated
/// when the organizer moves the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedFile {
    /// Current location, relative to the upload root.
    pub path: PathBuf,
    pub camera: String,
    /// Channel number after the configured offset has been applied.
    pub channel: Option<u32>,
    /// The moment the recording represents, taken from the filename.
    pub captured: OffsetDateTime,
    pub size: u64,
    pub kind: Kind,
    /// Filesystem modification time, used for the grace period.
    pub modified: OffsetDateTime,
    /// File stem without any `~N` disambiguation marker.
    pub stem: String,
    /// Extension as found on disk, without the leading dot.
    pub extension: String,
    /// Disambiguation marker found in the filename, if any.
    pub sequence: Option<u32>,
}
impl RecordedFile {
    /// Canonical file name: the stem and extension without any marker.
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.stem, self.extension)
    }

    /// Whether the file was modified too recently to be touched.
    pub fn within_grace(&self, now: OffsetDateTime, grace: Duration) -> bool {
        within_grace(self.modified, now, grace)
    }
}

/// Timestamps in the future (clock skew between camera and server) are
/// treated as just written.
fn within_grace(modified: OffsetDateTime, now: OffsetDateTime, grace: Duration) -> bool {
    now - modified < grace
}
