//! Declarative filename patterns and the recording parser built on them.
//!
//! A [`FilenamePattern`] is validated once at startup and then applied to
//! every listed file. Only the final path component is inspected, so files
//! that already sit inside organized subdirectories parse exactly like fresh
//! uploads in the root.
//!
//! The pattern is a regular expression matched against the file *stem* (the
//! name without its extension and without any `~N` disambiguation marker)
//! using these named groups:
//!
//! | Group     | Required | Meaning                                       |
//! |-----------|----------|-----------------------------------------------|
//! | `camera`  | yes      | Camera identity                               |
//! | `channel` | no       | Numeric channel / lens                        |
//! | `year`    | yes      | Four digit year                               |
//! | `month`   | yes      | Month, `01`-`12`                              |
//! | `day`     | yes      | Day of month                                  |
//! | `hour`    | no       | Hour, defaults to `00`                        |
//! | `minute`  | no       | Minute, defaults to `00`                      |
//! | `second`  | no       | Second, defaults to `00`                      |

use crate::error::{ErrorKind, Result};
use crate::record::{Kind, RecordedFile};
use camkeep_storage::FileInfo;
use derive_more::Display;
use exn::ResultExt;
use regex::{Captures, Regex};
use serde::Serialize;
use std::collections::HashMap;
use time::{Date, Month, OffsetDateTime, PrimitiveDateTime, Time, UtcOffset};

/// Reolink FTP upload naming: `<device>_<channel>_<YYYYMMDDhhmmss>`, where the
/// channel segment is optional and device names are limited to the characters
/// the camera firmware accepts.
pub const DEFAULT_PATTERN: &str = r"^(?P<camera>[a-zA-Z\d \-=+\[\]{}]+)_(?:(?P<channel>\d+)_?)?(?P<year>[1-3]\d{3})(?P<month>[0-1]\d)(?P<day>[0-3]\d)(?P<hour>[0-2]\d)(?P<minute>[0-5]\d)(?P<second>[0-5]\d)$";

/// Extensions recognized by [`DEFAULT_PATTERN`] uploads.
pub const DEFAULT_EXTENSIONS: [(&str, Kind); 2] = [("mp4", Kind::Video), ("jpg", Kind::Snapshot)];

const REQUIRED_GROUPS: [&str; 4] = ["camera", "year", "month", "day"];

/// Why a listed file was not turned into a [`RecordedFile`].
///
/// Unrecognized files are reported and otherwise left alone: they are never
/// moved and never deleted.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Unrecognized {
    #[display("unsupported extension")]
    UnsupportedExtension,
    #[display("name does not match the filename pattern")]
    NoMatch,
    #[display("no camera identity in name")]
    MissingCamera,
    #[display("timestamp in name is missing or invalid")]
    InvalidTimestamp,
    #[display("channel in name is out of range")]
    InvalidChannel,
}

/// A validated filename pattern.
///
/// # Examples
///
/// ```
/// use camkeep_library::{DEFAULT_EXTENSIONS, DEFAULT_PATTERN, FilenamePattern, Kind};
/// use camkeep_storage::FileInfo;
/// use time::OffsetDateTime;
///
/// let pattern = FilenamePattern::new(DEFAULT_PATTERN, DEFAULT_EXTENSIONS).unwrap();
/// let file = FileInfo::new("Front Door_00_20240131235959.mp4", 1024, OffsetDateTime::UNIX_EPOCH);
/// let record = pattern.parse(&file).unwrap();
/// assert_eq!(record.camera, "Front Door");
/// assert_eq!(record.channel, Some(1));
/// assert_eq!(record.kind, Kind::Video);
/// ```
#[derive(Debug, Clone)]
pub struct FilenamePattern {
    regex: Regex,
    /// Lowercased extension, without the dot.
    extensions: HashMap<String, Kind>,
    channel_offset: u32,
    utc_offset: UtcOffset,
    mtime_fallback: bool,
}

impl FilenamePattern {
    /// Compiles and validates a pattern.
    ///
    /// Fails with [`ErrorKind::Pattern`] if the regex does not compile, lacks
    /// one of the required named groups, or no extensions are mapped.
    pub fn new<E: Into<String>>(regex: &str, extensions: impl IntoIterator<Item = (E, Kind)>) -> Result<Self> {
        let compiled = Regex::new(regex).or_raise(|| ErrorKind::Pattern("regex does not compile".to_string()))?;
        let names: Vec<&str> = compiled.capture_names().flatten().collect();
        if let Some(missing) = REQUIRED_GROUPS.iter().find(|group| !names.contains(group)) {
            exn::bail!(ErrorKind::Pattern(format!("regex has no named group \"{missing}\"")));
        }
        let extensions: HashMap<String, Kind> = extensions
            .into_iter()
            .map(|(ext, kind)| (ext.into().trim().trim_start_matches('.').to_ascii_lowercase(), kind))
            .collect();
        if extensions.is_empty() || extensions.contains_key("") {
            exn::bail!(ErrorKind::Pattern("at least one non-empty extension must be mapped".to_string()));
        }
        Ok(Self {
            regex: compiled,
            extensions,
            channel_offset: 1,
            utc_offset: UtcOffset::UTC,
            mtime_fallback: false,
        })
    }

    /// Value added to parsed channel numbers. Reolink numbers channels from
    /// `00` on disk but from 1 in its client, hence the default of 1.
    pub fn with_channel_offset(mut self, offset: u32) -> Self {
        self.channel_offset = offset;
        self
    }

    /// Offset of the wall-clock time written into filenames.
    pub fn with_utc_offset_minutes(mut self, minutes: i16) -> Result<Self> {
        self.utc_offset = UtcOffset::from_whole_seconds(i32::from(minutes) * 60)
            .or_raise(|| ErrorKind::Pattern(format!("UTC offset of {minutes} minutes is out of range")))?;
        Ok(self)
    }

    /// Use the modification time when the timestamp groups did not take part
    /// in the match.
    pub fn with_mtime_fallback(mut self, enabled: bool) -> Self {
        self.mtime_fallback = enabled;
        self
    }

    /// Turns a listed file into a [`RecordedFile`], or explains why it is not
    /// one.
    pub fn parse(&self, file: &FileInfo) -> std::result::Result<RecordedFile, Unrecognized> {
        let name = file.file_name().ok_or(Unrecognized::NoMatch)?;
        let (stem, extension) = name.rsplit_once('.').ok_or(Unrecognized::UnsupportedExtension)?;
        let kind = *self.extensions.get(&extension.to_ascii_lowercase()).ok_or(Unrecognized::UnsupportedExtension)?;
        let (stem, sequence) = split_sequence(stem);
        let caps = self.regex.captures(stem).ok_or(Unrecognized::NoMatch)?;

        let camera = caps
            .name("camera")
            .map(|m| m.as_str().trim())
            .filter(|camera| !camera.is_empty())
            .ok_or(Unrecognized::MissingCamera)?;
        let channel = match caps.name("channel").map(|m| m.as_str()).filter(|c| !c.is_empty()) {
            Some(raw) => Some(
                raw.parse::<u32>()
                    .ok()
                    .and_then(|n| n.checked_add(self.channel_offset))
                    .ok_or(Unrecognized::InvalidChannel)?,
            ),
            None => None,
        };
        let captured = match self.timestamp(&caps)? {
            Some(captured) => captured,
            None if self.mtime_fallback => file.modified,
            None => return Err(Unrecognized::InvalidTimestamp),
        };

        Ok(RecordedFile {
            path: file.path.clone(),
            camera: camera.to_string(),
            channel,
            captured,
            size: file.size,
            kind,
            modified: file.modified,
            stem: stem.to_string(),
            extension: extension.to_string(),
            sequence,
        })
    }

    /// `Ok(None)` when the date groups did not participate in the match.
    fn timestamp(&self, caps: &Captures<'_>) -> std::result::Result<Option<OffsetDateTime>, Unrecognized> {
        let (Some(year), Some(month), Some(day)) = (caps.name("year"), caps.name("month"), caps.name("day")) else {
            return Ok(None);
        };
        let field = |name: &str| -> std::result::Result<u8, Unrecognized> {
            caps.name(name).map_or(Ok(0), |m| m.as_str().parse::<u8>().map_err(|_| Unrecognized::InvalidTimestamp))
        };
        let year = year.as_str().parse::<i32>().map_err(|_| Unrecognized::InvalidTimestamp)?;
        let month = month
            .as_str()
            .parse::<u8>()
            .ok()
            .and_then(|m| Month::try_from(m).ok())
            .ok_or(Unrecognized::InvalidTimestamp)?;
        let day = day.as_str().parse::<u8>().map_err(|_| Unrecognized::InvalidTimestamp)?;
        let date = Date::from_calendar_date(year, month, day).map_err(|_| Unrecognized::InvalidTimestamp)?;
        let time = Time::from_hms(field("hour")?, field("minute")?, field("second")?)
            .map_err(|_| Unrecognized::InvalidTimestamp)?;
        Ok(Some(PrimitiveDateTime::new(date, time).assume_offset(self.utc_offset)))
    }
}

/// Splits a trailing `~N` disambiguation marker off a stem.
pub(crate) fn split_sequence(stem: &str) -> (&str, Option<u32>) {
    if let Some((base, marker)) = stem.rsplit_once('~')
        && !base.is_empty()
        && !marker.is_empty()
        && marker.bytes().all(|b| b.is_ascii_digit())
        && let Ok(sequence) = marker.parse::<u32>()
    {
        return (base, Some(sequence));
    }
    (stem, None)
}
