//! The live file
//!
//! [`LiveFile`] owns the open handle of the target path together with its
//! remaining quota (threshold mode) or its current window (time mode), and
//! performs the rotate-and-reopen transition. It does no locking of its own;
//! the sink keeps it behind a mutex.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::backup::BackupNaming;
use crate::config::{RotationTrigger, SinkConfig};
use crate::error::{Error, Result};
use crate::window::Window;

/// Buffer size used when counting the lines of an existing file
const LINE_COUNT_BUFFER: usize = 32 * 1024;

/// What is left before the next rotation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quota {
    /// Threshold mode; `None` means unlimited
    Threshold {
        remaining_bytes: Option<u64>,
        remaining_lines: Option<u64>,
    },
    /// Time mode
    Window(Window),
}

/// Result of a successful write
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteOutcome {
    /// Bytes written
    pub written: usize,
    /// Name of the backup produced if the write rotated the file first
    pub rotated: Option<String>,
}

/// The currently open generation of the target file
#[derive(Debug)]
pub struct LiveFile {
    path: PathBuf,
    dir: PathBuf,
    naming: BackupNaming,
    trigger: RotationTrigger,
    file_mode: u32,
    file: Option<File>,
    quota: Quota,
    /// Bytes in the current generation
    size: u64,
    /// Timestamp of the last backup this sink produced
    last_backup: Option<DateTime<Utc>>,
    closed: bool,
}

impl LiveFile {
    /// Open the target path, resuming an existing file where possible.
    ///
    /// Returns the live file and the name of a backup if the existing file
    /// had to be rotated straight away.
    pub fn open(path: &Path, config: &SinkConfig, now: DateTime<Utc>) -> Result<(Self, Option<String>)> {
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| Error::config(format!("Target path {:?} has no usable file name", path)))?;

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(|e| Error::file("create directory", &dir, e))?;

        let mut live = Self {
            path: path.to_path_buf(),
            naming: BackupNaming::for_target(file_name, &config.trigger),
            dir,
            trigger: config.trigger,
            file_mode: config.file_mode,
            file: None,
            quota: Self::full_quota(&config.trigger, now),
            size: 0,
            last_backup: None,
            closed: false,
        };

        let metadata = match fs::metadata(path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                live.open_fresh(None)?;
                return Ok((live, None));
            }
            Err(e) => return Err(Error::file("stat", path, e)),
        };

        match config.trigger {
            RotationTrigger::Threshold { max_bytes, max_lines } => {
                let size = metadata.len();
                let lines = if max_lines > 0 { count_lines(path)? } else { 0 };

                let full = (max_bytes > 0 && size >= max_bytes) || (max_lines > 0 && lines >= max_lines);
                if full {
                    let backup = live.rotate_to(now, now)?;
                    return Ok((live, backup));
                }

                live.open_append(size)?;
                live.quota = Quota::Threshold {
                    remaining_bytes: (max_bytes > 0).then(|| max_bytes - size),
                    remaining_lines: (max_lines > 0).then(|| max_lines - lines),
                };
            }
            RotationTrigger::TimeWindow { interval_secs } => {
                let modified: DateTime<Utc> = metadata
                    .modified()
                    .map_err(|e| Error::file("read modification time of", path, e))?
                    .into();
                let window = Window::containing(&modified.min(now), interval_secs);

                if window.has_ended(&now) {
                    let backup = live.rotate_to(window.end, now)?;
                    return Ok((live, backup));
                }

                live.open_append(metadata.len())?;
                live.quota = Quota::Window(window);
            }
        }

        Ok((live, None))
    }

    /// Path of the live file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory holding the live file and its backups
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Backup naming scheme
    pub fn naming(&self) -> &BackupNaming {
        &self.naming
    }

    /// Remaining quota or current window
    pub fn quota(&self) -> Quota {
        self.quota
    }

    /// Remaining byte quota (threshold mode, limited)
    pub fn remaining_bytes(&self) -> Option<u64> {
        match self.quota {
            Quota::Threshold { remaining_bytes, .. } => remaining_bytes,
            Quota::Window(_) => None,
        }
    }

    /// Remaining line quota (threshold mode, limited)
    pub fn remaining_lines(&self) -> Option<u64> {
        match self.quota {
            Quota::Threshold { remaining_lines, .. } => remaining_lines,
            Quota::Window(_) => None,
        }
    }

    /// Current window (time mode)
    pub fn window(&self) -> Option<Window> {
        match self.quota {
            Quota::Window(window) => Some(window),
            Quota::Threshold { .. } => None,
        }
    }

    /// Bytes in the current generation
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Check if the live file has been closed
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Write one record, rotating first if it would not fit.
    pub fn write(&mut self, record: &[u8], now: DateTime<Utc>) -> Result<WriteOutcome> {
        if self.closed {
            return Err(Error::Closed);
        }

        // A missing handle means an earlier rotation failed halfway
        let rotated = if self.file.is_none() || self.needs_rotation(record.len()) {
            self.rotate(now)?
        } else {
            None
        };

        let file = match self.file.as_mut() {
            Some(file) => file,
            None => return Err(Error::other("live file is not open after rotation")),
        };
        file.write_all(record)
            .map_err(|e| Error::file("write", &self.path, e))?;

        self.consume(record.len());

        Ok(WriteOutcome {
            written: record.len(),
            rotated,
        })
    }

    /// Rotate now.
    ///
    /// Threshold mode names the backup after `now`. Time mode names it after
    /// the end of the live window and moves on to the window containing the
    /// later of `now` and that end.
    pub fn rotate(&mut self, now: DateTime<Utc>) -> Result<Option<String>> {
        if self.closed {
            return Err(Error::Closed);
        }

        match self.quota {
            Quota::Threshold { .. } => self.rotate_to(now, now),
            Quota::Window(window) => self.rotate_to(window.end, now.max(window.end)),
        }
    }

    /// Sync and release the handle. Later writes fail with [`Error::Closed`].
    pub fn close(&mut self) -> Result<()> {
        self.closed = true;
        if let Some(file) = self.file.take() {
            file.sync_all().map_err(|e| Error::file("sync", &self.path, e))?;
        }
        Ok(())
    }

    /// Flush the live file to stable storage
    pub fn sync(&mut self) -> Result<()> {
        if let Some(file) = self.file.as_mut() {
            file.flush().map_err(|e| Error::file("flush", &self.path, e))?;
            file.sync_data().map_err(|e| Error::file("sync", &self.path, e))?;
        }
        Ok(())
    }

    fn needs_rotation(&self, len: usize) -> bool {
        // An untouched generation takes any record, however large
        if self.size == 0 {
            return false;
        }

        match self.quota {
            Quota::Threshold { remaining_bytes, remaining_lines } => {
                remaining_bytes.map_or(false, |remaining| len as u64 > remaining)
                    || remaining_lines.map_or(false, |remaining| remaining == 0)
            }
            Quota::Window(_) => false,
        }
    }

    fn consume(&mut self, len: usize) {
        self.size += len as u64;
        if let Quota::Threshold { remaining_bytes, remaining_lines } = &mut self.quota {
            if let Some(remaining) = remaining_bytes {
                *remaining = remaining.saturating_sub(len as u64);
            }
            if let Some(remaining) = remaining_lines {
                *remaining = remaining.saturating_sub(1);
            }
        }
    }

    fn full_quota(trigger: &RotationTrigger, now: DateTime<Utc>) -> Quota {
        match *trigger {
            RotationTrigger::Threshold { max_bytes, max_lines } => Quota::Threshold {
                remaining_bytes: (max_bytes > 0).then_some(max_bytes),
                remaining_lines: (max_lines > 0).then_some(max_lines),
            },
            RotationTrigger::TimeWindow { interval_secs } => {
                Quota::Window(Window::containing(&now, interval_secs))
            }
        }
    }

    /// Move the target aside as a backup stamped `backup_at`, then open a
    /// fresh generation whose window contains `window_at`.
    fn rotate_to(&mut self, backup_at: DateTime<Utc>, window_at: DateTime<Utc>) -> Result<Option<String>> {
        self.file = None;

        let previous_mode = match fs::metadata(&self.path) {
            Ok(metadata) => Some(file_mode(&metadata)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => return Err(Error::file("stat", &self.path, e)),
        };

        let backup = match previous_mode {
            Some(_) => {
                let timestamp = self.next_backup_timestamp(backup_at);
                let name = self.naming.encode(&timestamp, false);
                let target = self.dir.join(&name);
                fs::rename(&self.path, &target).map_err(|e| Error::file("rename", &self.path, e))?;
                self.last_backup = Some(timestamp);
                tracing::debug!(from = %self.path.display(), to = %name, "rotated live file");
                Some(name)
            }
            None => None,
        };

        self.open_fresh(previous_mode)?;
        self.quota = Self::full_quota(&self.trigger, window_at);

        Ok(backup)
    }

    /// Pick a backup timestamp that is later than any this sink produced and
    /// whose name is not taken in either form.
    fn next_backup_timestamp(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        let step = self.naming.resolution();
        let mut timestamp = self.naming.normalize(&at);

        if let Some(last) = self.last_backup {
            if timestamp <= last {
                timestamp = last + step;
            }
        }

        while self.dir.join(self.naming.encode(&timestamp, false)).exists()
            || self.dir.join(self.naming.encode(&timestamp, true)).exists()
        {
            timestamp += step;
        }

        timestamp
    }

    fn open_fresh(&mut self, inherited_mode: Option<u32>) -> Result<()> {
        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(inherited_mode.unwrap_or(self.file_mode));
        }
        #[cfg(not(unix))]
        let _ = inherited_mode;

        let file = options
            .open(&self.path)
            .map_err(|e| Error::file("open", &self.path, e))?;

        self.file = Some(file);
        self.size = 0;
        Ok(())
    }

    fn open_append(&mut self, size: u64) -> Result<()> {
        let file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(|e| Error::file("open", &self.path, e))?;

        self.file = Some(file);
        self.size = size;
        Ok(())
    }
}

#[cfg(unix)]
fn file_mode(metadata: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn file_mode(_metadata: &fs::Metadata) -> u32 {
    crate::config::DEFAULT_FILE_MODE
}

/// Count `\n` bytes in the file at `path`
pub fn count_lines(path: &Path) -> Result<u64> {
    let file = File::open(path).map_err(|e| Error::file("open", path, e))?;
    let mut reader = BufReader::with_capacity(LINE_COUNT_BUFFER, file);
    let mut lines = 0u64;

    loop {
        let buf = match reader.fill_buf() {
            Ok([]) => break,
            Ok(buf) => buf,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::file("read", path, e)),
        };
        lines += buf.iter().filter(|&&b| b == b'\n').count() as u64;
        let consumed = buf.len();
        reader.consume(consumed);
    }

    Ok(lines)
}
