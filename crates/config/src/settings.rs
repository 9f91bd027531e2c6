use crate::error::{ErrorKind, Result};
use camkeep_library::{
    CanonicalLayout, Context, DEFAULT_EXTENSIONS, DEFAULT_LAYOUT, DEFAULT_LOCK_FILE, DEFAULT_PATTERN, FilenamePattern,
    Kind, RetentionPolicy, RetryPolicy,
};
use exn::ResultExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::Deref;
use std::path::PathBuf;

/// Fully merged configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Directory the cameras upload into.
    pub root: Option<PathBuf>,
    pub organize: bool,
    pub delete: bool,
    pub dry_run: bool,
    pub prune_empty_dirs: bool,
    /// Template for the canonical layout.
    pub layout: String,
    /// Run lock location; relative paths are taken from `root`.
    pub lock_file: Option<PathBuf>,
    pub retention: RetentionSettings,
    pub pattern: PatternSettings,
    pub retry: RetrySettings,
}
impl Default for Settings {
    fn default() -> Self {
        Self {
            root: None,
            organize: true,
            delete: true,
            dry_run: false,
            prune_empty_dirs: true,
            layout: DEFAULT_LAYOUT.to_string(),
            lock_file: None,
            retention: RetentionSettings::default(),
            pattern: PatternSettings::default(),
            retry: RetrySettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetentionSettings {
    pub max_age_days: Option<u32>,
    /// Bytes.
    pub max_total_size: Option<u64>,
    pub max_usage_percent: Option<f64>,
    /// Bytes.
    pub min_free_space: Option<u64>,
    /// Bytes freed beyond `min_free_space` once it has been breached.
    pub free_space_headroom: u64,
    pub grace_period_secs: u64,
    pub count_unrecognized: bool,
}
impl Default for RetentionSettings {
    fn default() -> Self {
        Self {
            max_age_days: None,
            max_total_size: None,
            max_usage_percent: None,
            min_free_space: None,
            free_space_headroom: 0,
            grace_period_secs: 300,
            count_unrecognized: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PatternSettings {
    /// Applied to the file stem; see [`FilenamePattern`] for the named groups.
    pub regex: String,
    /// Lowercase extension (without the dot) to recording kind.
    pub extensions: BTreeMap<String, Kind>,
    pub channel_offset: u32,
    /// Offset of the wall-clock timestamps in file names from UTC.
    pub utc_offset_minutes: i16,
    pub mtime_fallback: bool,
}
impl Default for PatternSettings {
    fn default() -> Self {
        Self {
            regex: DEFAULT_PATTERN.to_string(),
            extensions: DEFAULT_EXTENSIONS.iter().map(|(ext, kind)| ((*ext).to_string(), *kind)).collect(),
            channel_offset: 1,
            utc_offset_minutes: 0,
            mtime_fallback: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySettings {
    /// Total attempts per file operation, including the first.
    pub attempts: u32,
    pub backoff_ms: u64,
}
impl Default for RetrySettings {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        Self {
            attempts: retry.attempts,
            backoff_ms: u64::try_from(retry.backoff.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

/// Values given on the command line. Unset fields leave lower layers alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Overrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organize: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delete: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dry_run: Option<bool>,
}

impl Settings {
    /// Checks everything that can be checked without touching a file other
    /// than the root directory itself, including compiling the pattern and
    /// the layout.
    pub fn validate(&self) -> Result<()> {
        let Some(root) = &self.root else {
            exn::bail!(ErrorKind::Invalid("no upload root configured".to_string()));
        };
        if !root.is_dir() {
            exn::bail!(ErrorKind::Invalid(format!("upload root {} is not a directory", root.display())));
        }
        if self.retention.max_age_days == Some(0) {
            exn::bail!(ErrorKind::Invalid("retention.max_age_days must be at least 1".to_string()));
        }
        if self.retry.attempts == 0 {
            exn::bail!(ErrorKind::Invalid("retry.attempts must be at least 1".to_string()));
        }
        if self.pattern.extensions.is_empty() {
            exn::bail!(ErrorKind::Invalid("pattern.extensions must not be empty".to_string()));
        }
        invalid(self.policy().validate())?;
        self.filename_pattern()?;
        self.canonical_layout()?;
        Ok(())
    }

    /// The upload root. Only `None` before [`validate`](Self::validate) has
    /// passed.
    pub fn root(&self) -> Result<&PathBuf> {
        self.root.as_ref().ok_or_else(|| exn::Exn::from(ErrorKind::Invalid("no upload root configured".to_string())))
    }

    pub fn policy(&self) -> RetentionPolicy {
        let retention = &self.retention;
        RetentionPolicy {
            max_age: retention.max_age_days.map(|days| time::Duration::days(i64::from(days))),
            max_total_size: retention.max_total_size,
            max_usage_percent: retention.max_usage_percent,
            min_free_space: retention.min_free_space,
            free_space_headroom: retention.free_space_headroom,
            grace_period: time::Duration::seconds(i64::try_from(retention.grace_period_secs).unwrap_or(i64::MAX)),
            count_unrecognized: retention.count_unrecognized,
        }
    }

    pub fn filename_pattern(&self) -> Result<FilenamePattern> {
        let pattern = &self.pattern;
        let extensions = pattern.extensions.iter().map(|(ext, kind)| (ext.clone(), *kind));
        let parsed = invalid(FilenamePattern::new(&pattern.regex, extensions))?
            .with_channel_offset(pattern.channel_offset)
            .with_mtime_fallback(pattern.mtime_fallback);
        invalid(parsed.with_utc_offset_minutes(pattern.utc_offset_minutes))
    }

    pub fn canonical_layout(&self) -> Result<CanonicalLayout> {
        invalid(self.layout.parse())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.retry.attempts,
            backoff: std::time::Duration::from_millis(self.retry.backoff_ms),
        }
    }

    /// Where the run lock lives: `lock_file` resolved against the root, or
    /// [`DEFAULT_LOCK_FILE`] in the root.
    pub fn lock_path(&self) -> Result<PathBuf> {
        let root = self.root()?;
        Ok(match &self.lock_file {
            Some(path) => root.join(path),
            None => root.join(DEFAULT_LOCK_FILE),
        })
    }

    /// Everything the library needs for one run, timestamped now.
    pub fn context(&self) -> Result<Context> {
        let mut ctx = Context::new(self.filename_pattern()?, self.canonical_layout()?, self.policy());
        ctx.retry = self.retry_policy();
        ctx.organize = self.organize;
        ctx.delete = self.delete;
        ctx.prune_empty_dirs = self.prune_empty_dirs;
        ctx.dry_run = self.dry_run;
        Ok(ctx)
    }
}

/// Library validation failures become [`ErrorKind::Invalid`], keeping their
/// message.
#[track_caller]
fn invalid<T>(result: camkeep_library::error::Result<T>) -> Result<T> {
    match result {
        Ok(value) => Ok(value),
        Err(e) => {
            let message = e.deref().to_string();
            Err(e).or_raise(|| ErrorKind::Invalid(message))
        },
    }
}
