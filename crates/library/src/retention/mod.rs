//! Deciding which recordings to delete.
//!
//! Evaluation is pure: it reads an [`Inventory`](crate::scan::Inventory), a
//! [`RetentionPolicy`] and optionally a disk usage snapshot, and returns a
//! [`RetentionPlan`]. Nothing here touches the filesystem.

mod engine;
mod policy;

pub use self::engine::{Deletion, Reason, RetentionPlan, Violation, evaluate};
pub use self::policy::RetentionPolicy;
