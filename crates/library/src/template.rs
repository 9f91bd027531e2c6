//! Canonical layout templating.
//!
//! Converts [`RecordedFile`] identity into deterministic relative paths using
//! user-configured [upon] templates. The template syntax follows upon's
//! Mustache-like conventions (`{{ variable }}`, `{{ value|formatter }}`),
//! extended with path-safe formatters and functions:
//!
//! - **`slug`**: Converts strings to URL-safe slugs, stripping quotation marks
//!   first to avoid artifacts like leading/trailing hyphens.
//! - **`truncate`**: Truncates strings to a maximum byte length at a character
//!   boundary, usable as either `truncate(value, n)` or `{{ value|truncate: n }}`.
//!
//! # Template Variables
//!
//! | Variable   | Type             | Description                                  |
//! |------------|------------------|----------------------------------------------|
//! | `camera`   | `String`         | Camera identity as written in the filename   |
//! | `channel`  | `Option<String>` | Two digit channel number (offset applied)    |
//! | `kind`     | `String`         | `video`, `snapshot` or `other`               |
//! | `year`     | `String`         | Four digit capture year                      |
//! | `month`    | `String`         | Two digit capture month                      |
//! | `day`      | `String`         | Two digit capture day                        |
//! | `hour`     | `String`         | Two digit capture hour                       |
//! | `minute`   | `String`         | Two digit capture minute                     |
//! | `second`   | `String`         | Two digit capture second                     |
//! | `date`     | `String`         | `YYYY-MM-DD`                                 |
//! | `filename` | `String`         | File name without any `~N` marker            |
//! | `stem`     | `String`         | `filename` without its extension             |
//! | `ext`      | `String`         | Extension as uploaded, without the dot       |
//!
//! Dates are rendered in the wall-clock time of the filename, not UTC.
//!
//! # Example
//!
//! ```
//! use camkeep_library::{CanonicalLayout, DEFAULT_EXTENSIONS, DEFAULT_PATTERN, FilenamePattern};
//! use camkeep_storage::FileInfo;
//! use std::path::Path;
//! use time::OffsetDateTime;
//!
//! let pattern = FilenamePattern::new(DEFAULT_PATTERN, DEFAULT_EXTENSIONS).unwrap();
//! let file = FileInfo::new("Front Door_00_20240131120000.mp4", 1, OffsetDateTime::UNIX_EPOCH);
//! let record = pattern.parse(&file).unwrap();
//!
//! let layout: CanonicalLayout = "{{ camera|slug }}/{{ date }}/{{ filename }}".parse().unwrap();
//! let path = layout.generate(&record).unwrap();
//! assert_eq!(path, Path::new("front-door/2024-01-31/Front Door_00_20240131120000.mp4"));
//! ```

use crate::error::{Error, ErrorKind, Result};
use crate::pattern::split_sequence;
use crate::record::RecordedFile;
use camkeep_storage::validate_path;
use exn::ResultExt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::instrument;
use upon::{Engine, Template};

/// Camera, then date, then the original filename.
pub const DEFAULT_LAYOUT: &str = "{{ camera|slug }}/{{ year }}/{{ month }}/{{ day }}/{{ filename }}";

/// Maps a record's identity to its destination path relative to the upload
/// root.
///
/// Constructed via [`FromStr`], which compiles the template eagerly so that
/// syntax errors surface at startup rather than halfway through a run. The
/// compiled template is reusable across many [`generate`](Self::generate) calls.
///
/// Generated paths are normalized (trimmed, deduplicated separators) and
/// validated by [`camkeep_storage::validate_path`] to prevent directory
/// traversal.
pub struct CanonicalLayout {
    engine: Engine<'static>,
    template: Template<'static>,
}
impl FromStr for CanonicalLayout {
    type Err = Error;

    /// Registers the `slug` formatter and `truncate` function before compiling.
    /// Returns [`ErrorKind::Template`] if the template syntax is invalid.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let mut engine = Engine::new();
        addons::configure(&mut engine);
        let template = engine.compile(s.to_string()).or_raise(|| ErrorKind::Template)?;
        Ok(Self { engine, template })
    }
}
impl CanonicalLayout {
    /// Renders the destination for a record.
    ///
    /// Depends only on identity fields, never on the record's current path,
    /// so a record that is already in place renders to where it is.
    #[instrument(skip_all, fields(path = %record.path.display()))]
    pub fn generate(&self, record: &RecordedFile) -> Result<PathBuf> {
        let path = self
            .template
            .render(&self.engine, Self::parameters(record))
            .to_string()
            .or_raise(|| ErrorKind::Template)?;
        Self::normalize(path)
    }

    /// Whether a file at `current` already satisfies the destination `dest`:
    /// either it is exactly there, or it is the same name with a `~N`
    /// disambiguation marker in the same directory.
    pub fn is_placed(current: &Path, dest: &Path) -> bool {
        if current == dest {
            return true;
        }
        if current.parent() != dest.parent() {
            return false;
        }
        let names = (current.file_name().and_then(|n| n.to_str()), dest.file_name().and_then(|n| n.to_str()));
        let (Some(current), Some(dest)) = names else {
            return false;
        };
        match (current.rsplit_once('.'), dest.rsplit_once('.')) {
            (Some((stem, ext)), Some((dest_stem, dest_ext))) if ext == dest_ext => {
                matches!(split_sequence(stem), (base, Some(_)) if base == dest_stem)
            },
            _ => false,
        }
    }

    /// Trims each path segment, joins them with `/`, then validates via
    /// [`camkeep_storage::validate_path`].
    fn normalize(s: impl Into<String>) -> Result<PathBuf> {
        let path = s.into().trim().split('/').map(str::trim).collect::<Vec<_>>().join("/");
        validate_path(&path).or_raise(|| ErrorKind::Template)
    }

    /// Builds the [`upon::Value`] map exposed to the template engine.
    fn parameters(record: &RecordedFile) -> upon::Value {
        let at = record.captured;
        upon::value! {
            camera: record.camera.as_str(),
            channel: record.channel.map(|c| format!("{c:02}")),
            kind: record.kind.to_string(),
            year: format!("{:04}", at.year()),
            month: format!("{:02}", u8::from(at.month())),
            day: format!("{:02}", at.day()),
            hour: format!("{:02}", at.hour()),
            minute: format!("{:02}", at.minute()),
            second: format!("{:02}", at.second()),
            date: format!("{:04}-{:02}-{:02}", at.year(), u8::from(at.month()), at.day()),
            filename: record.file_name(),
            stem: record.stem.as_str(),
            ext: record.extension.as_str(),
        }
    }
}

/// Custom [`upon`] extensions for path-safe string manipulation.
mod addons {
    use rslug::slugify;
    use std::fmt::Write;
    use upon::{Engine, Value, fmt as upon_fmt};

    /// Custom formatter that converts strings to URL-safe slugs.
    ///
    /// Strips quotation marks before slugifying to avoid awkward slug output
    /// like `"porch"` becoming `-porch-`.
    fn slug_formatter(f: &mut upon_fmt::Formatter<'_>, value: &Value) -> upon_fmt::Result {
        match value {
            Value::String(s) => {
                // Various quotation marks: '"''""„"`«»
                let marks = [
                    '\u{0027}', '\u{0022}', '\u{2018}', '\u{2019}', '\u{201C}', '\u{201D}', '\u{201E}', '\u{201B}',
                    '\u{0060}', '\u{00AB}', '\u{00BB}', '\u{2039}', '\u{203A}',
                ];
                let stripped: String = s.chars().filter(|c| !marks.contains(c)).collect();
                write!(f, "{}", slugify!(&stripped))?
            },
            v => upon_fmt::default(f, v)?,
        };
        Ok(())
    }

    /// Truncates a string to a maximum byte length at a character boundary.
    fn truncate_to_char_boundary(s: &str, max_bytes: usize) -> String {
        s[..s.floor_char_boundary(max_bytes)].to_string()
    }

    /// Registers the `slug` formatter and `truncate` function on the given engine.
    pub(crate) fn configure(engine: &mut Engine<'_>) {
        engine.add_formatter("slug", slug_formatter);
        engine.add_function("truncate", truncate_to_char_boundary);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Kind;
    use rstest::rstest;
    use time::macros::datetime;

    fn make_test_record(camera: &str, channel: Option<u32>) -> RecordedFile {
        RecordedFile {
            path: PathBuf::from("Front Door_00_20240131093005.mp4"),
            camera: camera.to_string(),
            channel,
            captured: datetime!(2024-01-31 09:30:05 UTC),
            size: 1000,
            kind: Kind::Video,
            modified: datetime!(2024-01-31 09:31:00 UTC),
            stem: "Front Door_00_20240131093005".to_string(),
            extension: "mp4".to_string(),
            sequence: None,
        }
    }

    #[test]
    fn test_default_layout() {
        let layout: CanonicalLayout = DEFAULT_LAYOUT.parse().unwrap();
        let path = layout.generate(&make_test_record("Front Door", Some(1))).unwrap();
        assert_eq!(path, Path::new("front-door/2024/01/31/Front Door_00_20240131093005.mp4"));
    }

    #[test]
    fn test_all_variables() {
        let template = "{{ camera }}/{{ channel }}/{{ kind }}/{{ date }}T{{ hour }}{{ minute }}{{ second }}/{{ stem }}.{{ ext }}";
        let layout: CanonicalLayout = template.parse().unwrap();
        let path = layout.generate(&make_test_record("Porch", Some(3))).unwrap();
        assert_eq!(path, Path::new("Porch/03/video/2024-01-31T093005/Front Door_00_20240131093005.mp4"));
    }

    #[test]
    fn test_renders_wall_clock_date() {
        let mut record = make_test_record("Porch", None);
        record.captured = datetime!(2024-01-31 23:30 -5);
        let layout: CanonicalLayout = "{{ date }}/{{ filename }}".parse().unwrap();
        assert_eq!(layout.generate(&record).unwrap(), Path::new("2024-01-31/Front Door_00_20240131093005.mp4"));
    }

    #[test]
    fn test_sequence_marker_is_not_rendered() {
        let mut record = make_test_record("Porch", None);
        record.path = PathBuf::from("Front Door_00_20240131093005~4.mp4");
        record.sequence = Some(4);
        let layout: CanonicalLayout = "{{ filename }}".parse().unwrap();
        assert_eq!(layout.generate(&record).unwrap(), Path::new("Front Door_00_20240131093005.mp4"));
    }

    #[test]
    fn test_slug_strips_quotes() {
        let layout: CanonicalLayout = "{{ camera|slug }}/{{ filename }}".parse().unwrap();
        let path = layout.generate(&make_test_record("\"Bob's\" [Garage]", None)).unwrap();
        assert_eq!(path.parent().unwrap(), Path::new("bobs-garage"));
    }

    #[rstest]
    #[case("{{ truncate(camera, 5)|slug }}/{{ filename }}")]
    #[case("{{ camera|truncate: 5|slug }}/{{ filename }}")]
    fn test_truncate(#[case] template: &str) {
        let layout: CanonicalLayout = template.parse().unwrap();
        let path = layout.generate(&make_test_record("Front Door", None)).unwrap();
        assert_eq!(path.parent().unwrap(), Path::new("front"));
    }

    #[test]
    fn test_segments_are_trimmed() {
        let layout: CanonicalLayout = " {{ camera }} / {{ year }} //{{ filename }} ".parse().unwrap();
        let path = layout.generate(&make_test_record("Porch", None)).unwrap();
        assert_eq!(path, Path::new("Porch/2024/Front Door_00_20240131093005.mp4"));
    }

    #[rstest]
    #[case("../{{ filename }}")]
    #[case("{{ camera }}/../../{{ filename }}")]
    #[case("   ")]
    fn test_rejects_paths_outside_root(#[case] template: &str) {
        let layout: CanonicalLayout = template.parse().unwrap();
        let err = layout.generate(&make_test_record("Porch", None)).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Template));
    }

    #[test]
    fn test_invalid_syntax() {
        assert!("{{ camera".parse::<CanonicalLayout>().is_err());
        let layout: CanonicalLayout = "{{ nonexistent }}".parse().unwrap();
        assert!(layout.generate(&make_test_record("Porch", None)).is_err());
    }

    #[rstest]
    #[case("cam/2024/a.mp4", "cam/2024/a.mp4", true)]
    #[case("cam/2024/a~1.mp4", "cam/2024/a.mp4", true)]
    #[case("cam/2024/a~12.mp4", "cam/2024/a.mp4", true)]
    #[case("a~1.mp4", "cam/2024/a.mp4", false)]
    #[case("cam/2024/a~1.jpg", "cam/2024/a.mp4", false)]
    #[case("cam/2024/b~1.mp4", "cam/2024/a.mp4", false)]
    #[case("cam/2024/a~x.mp4", "cam/2024/a.mp4", false)]
    #[case("a.mp4", "cam/2024/a.mp4", false)]
    fn test_is_placed(#[case] current: &str, #[case] dest: &str, #[case] expected: bool) {
        assert_eq!(CanonicalLayout::is_placed(Path::new(current), Path::new(dest)), expected);
    }
}
