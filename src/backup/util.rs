//! Utility functions for backup files

use std::fs;
use std::io;
use std::path::Path;

use crate::backup::{BackupNaming, BackupRecord};
use crate::error::{Error, Result};

/// List the backups of a sink, oldest first.
///
/// Directories and files that do not decode under `naming` are skipped.
pub fn list_backups(dir: &Path, naming: &BackupNaming) -> Result<Vec<BackupRecord>> {
    let entries = fs::read_dir(dir).map_err(|e| Error::file("read directory", dir, e))?;

    let mut backups = Vec::new();

    for entry in entries {
        let entry = entry.map_err(|e| Error::file("read directory", dir, e))?;

        match entry.file_type() {
            Ok(file_type) if file_type.is_dir() => continue,
            Ok(_) => {}
            // Entry vanished between listing and stat
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => return Err(Error::file("stat", entry.path(), e)),
        }

        let file_name = entry.file_name();
        let Some(file_name) = file_name.to_str() else {
            continue;
        };

        if let Some(record) = naming.decode(file_name) {
            backups.push(record);
        }
    }

    backups.sort_by(|a, b| {
        a.timestamp
            .cmp(&b.timestamp)
            .then_with(|| a.file_name.cmp(&b.file_name))
    });

    Ok(backups)
}

/// Delete a backup file. A backup that is already gone counts as removed.
pub fn remove_backup(dir: &Path, record: &BackupRecord) -> Result<()> {
    let path = record.path(dir);
    match fs::remove_file(&path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::file("remove backup", path, e)),
    }
}
