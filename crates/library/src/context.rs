use crate::pattern::FilenamePattern;
use crate::retention::RetentionPolicy;
use crate::retry::RetryPolicy;
use crate::template::CanonicalLayout;
use std::path::PathBuf;
use time::OffsetDateTime;

/// Everything a run needs to know, resolved once and passed by reference.
///
/// Nothing in the library reads configuration files, the environment or the
/// clock on its own: the current time is captured here so every component of
/// a run agrees on what "now" is.
pub struct Context {
    pub pattern: FilenamePattern,
    pub layout: CanonicalLayout,
    pub policy: RetentionPolicy,
    pub retry: RetryPolicy,
    pub now: OffsetDateTime,
    pub organize: bool,
    pub delete: bool,
    pub prune_empty_dirs: bool,
    /// Compute every decision but leave the filesystem untouched.
    pub dry_run: bool,
    /// Paths relative to the root that are never reported by a scan (the
    /// run lock, for one).
    pub ignored: Vec<PathBuf>,
}
impl Context {
    /// A context that organizes, deletes and prunes, timestamped now.
    pub fn new(pattern: FilenamePattern, layout: CanonicalLayout, policy: RetentionPolicy) -> Self {
        Self {
            pattern,
            layout,
            policy,
            retry: RetryPolicy::default(),
            now: OffsetDateTime::now_utc(),
            organize: true,
            delete: true,
            prune_empty_dirs: true,
            dry_run: false,
            ignored: Vec::new(),
        }
    }
}
