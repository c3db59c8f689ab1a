//! Backup record data structure

use std::path::{Path, PathBuf};
use chrono::{DateTime, Utc};

use crate::backup::COMPRESS_SUFFIX;

/// A rotated backup found in the sink's directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupRecord {
    /// Rotation instant (threshold mode) or window end boundary (time mode)
    pub timestamp: DateTime<Utc>,
    /// Whether the file carries the compression suffix
    pub compressed: bool,
    /// File name within the sink's directory
    pub file_name: String,
}

impl BackupRecord {
    /// Create a new backup record
    pub fn new(timestamp: DateTime<Utc>, compressed: bool, file_name: impl Into<String>) -> Self {
        Self {
            timestamp,
            compressed,
            file_name: file_name.into(),
        }
    }

    /// Name shared by the compressed and uncompressed variants of this backup
    pub fn logical_name(&self) -> &str {
        self.file_name
            .strip_suffix(COMPRESS_SUFFIX)
            .filter(|_| self.compressed)
            .unwrap_or(&self.file_name)
    }

    /// Full path of the backup inside `dir`
    pub fn path(&self, dir: &Path) -> PathBuf {
        dir.join(&self.file_name)
    }

    /// Check if the backup is older than `cutoff`
    pub fn is_before(&self, cutoff: &DateTime<Utc>) -> bool {
        self.timestamp < *cutoff
    }
}
