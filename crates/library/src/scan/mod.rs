//! Walking the upload tree and classifying what is in it.
//!
//! The scan is the only place files are discovered. Each listed file ends up
//! in exactly one bucket: an eligible record, a grace-protected record, an
//! unrecognized file, or a per-file failure. A failure on one entry never
//! stops the walk.

mod inventory;
mod stream;

pub use self::inventory::{Inventory, UnrecognizedFile};
pub use self::stream::{ScanEvent, scan};
