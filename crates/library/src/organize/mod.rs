//! Moving recordings into the canonical layout.
//!
//! Relocates recognized recordings from wherever the camera uploaded them to
//! the location rendered by the [`CanonicalLayout`](crate::CanonicalLayout).
//! Moves are single renames that never overwrite: when a destination is
//! already occupied the new file gets a `~N` marker instead.
//!
//! The primary entry point is [`organize`], which streams the outcome of
//! passing each record to [`organize_file`].

mod conflict;
pub mod error;
mod file;
mod stream;

pub use self::file::{Action, organize_file};
pub use self::stream::{OrganizeEvent, organize};
