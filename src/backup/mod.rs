//! Rotated backup files
//!
//! This module maps rotation timestamps to on-disk backup names and back, and
//! reconstructs the set of backups belonging to a sink by listing its
//! directory. There is no separate index: the file names are the index.

mod precision;
mod record;
mod naming;
mod util;

pub use precision::WindowPrecision;
pub use record::BackupRecord;
pub use naming::BackupNaming;
pub use util::{list_backups, remove_backup};

/// Suffix appended to compressed backups
pub const COMPRESS_SUFFIX: &str = ".gz";

/// Timestamp layout for threshold-mode backups (millisecond precision, no colons)
pub(crate) const THRESHOLD_LAYOUT: &str = "%Y-%m-%dT%H-%M-%S%.3f";
