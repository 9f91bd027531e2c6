mod context;
pub mod error;
mod lock;
pub mod organize;
mod pattern;
mod prune;
mod record;
pub mod report;
pub mod retention;
mod retry;
mod run;
pub mod scan;
mod template;

pub use crate::context::Context;
pub use crate::lock::{DEFAULT_LOCK_FILE, RunLock};
pub use crate::pattern::{DEFAULT_EXTENSIONS, DEFAULT_PATTERN, FilenamePattern, Unrecognized};
pub use crate::record::{Kind, RecordedFile};
pub use crate::report::RunReport;
pub use crate::retention::RetentionPolicy;
pub use crate::retry::RetryPolicy;
pub use crate::run::run;
pub use crate::template::{CanonicalLayout, DEFAULT_LAYOUT};
