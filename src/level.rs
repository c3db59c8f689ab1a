//! Leveled write contract
//!
//! Record builders hand finished records to a [`LevelWriter`] together with
//! the record's level. The rotating sink ignores the level; other writers may
//! route on it.

use std::fmt;
use std::io;
use std::str::FromStr;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Severity of a log record
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
    Panic,
    /// The record carries no level
    #[serde(rename = "")]
    None,
}

impl Level {
    /// Name written into records
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Fatal => "fatal",
            Level::Panic => "panic",
            Level::None => "",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "trace" => Ok(Level::Trace),
            "debug" => Ok(Level::Debug),
            "info" => Ok(Level::Info),
            "warn" | "warning" => Ok(Level::Warn),
            "error" => Ok(Level::Error),
            "fatal" => Ok(Level::Fatal),
            "panic" => Ok(Level::Panic),
            "" => Ok(Level::None),
            other => Err(Error::other(format!("Unknown level: {}", other))),
        }
    }
}

/// Destination for finished records
pub trait LevelWriter: Send + Sync {
    /// Write one record; returns the number of bytes written
    fn write(&self, record: &[u8]) -> Result<usize>;

    /// Write one record carrying `level`
    fn write_level(&self, level: Level, record: &[u8]) -> Result<usize> {
        let _ = level;
        self.write(record)
    }
}

impl<T: LevelWriter + ?Sized> LevelWriter for Arc<T> {
    fn write(&self, record: &[u8]) -> Result<usize> {
        (**self).write(record)
    }

    fn write_level(&self, level: Level, record: &[u8]) -> Result<usize> {
        (**self).write_level(level, record)
    }
}

impl<T: LevelWriter + ?Sized> LevelWriter for Box<T> {
    fn write(&self, record: &[u8]) -> Result<usize> {
        (**self).write(record)
    }

    fn write_level(&self, level: Level, record: &[u8]) -> Result<usize> {
        (**self).write_level(level, record)
    }
}

/// Makes any [`io::Write`] usable as a [`LevelWriter`] by serializing
/// writes through a mutex.
#[derive(Debug)]
pub struct SyncWriter<W> {
    inner: Mutex<W>,
}

impl<W: io::Write + Send> SyncWriter<W> {
    /// Wrap `inner`
    pub fn new(inner: W) -> Self {
        Self {
            inner: Mutex::new(inner),
        }
    }

    /// Unwrap the inner writer
    pub fn into_inner(self) -> W {
        self.inner.into_inner()
    }
}

impl<W: io::Write + Send> LevelWriter for SyncWriter<W> {
    fn write(&self, record: &[u8]) -> Result<usize> {
        let mut inner = self.inner.lock();
        Ok(io::Write::write(&mut *inner, record)?)
    }
}

/// Tee: every record goes to each writer in turn
pub struct MultiLevelWriter {
    writers: Vec<Box<dyn LevelWriter>>,
}

impl MultiLevelWriter {
    /// Create a tee over `writers`
    pub fn new(writers: Vec<Box<dyn LevelWriter>>) -> Self {
        Self { writers }
    }

    /// Add another destination
    pub fn push(&mut self, writer: Box<dyn LevelWriter>) {
        self.writers.push(writer);
    }

    /// Number of destinations
    pub fn len(&self) -> usize {
        self.writers.len()
    }

    /// Check if there are no destinations
    pub fn is_empty(&self) -> bool {
        self.writers.is_empty()
    }

    fn forward<F>(&self, record: &[u8], mut write: F) -> Result<usize>
    where
        F: FnMut(&dyn LevelWriter) -> Result<usize>,
    {
        for writer in &self.writers {
            let written = write(writer.as_ref())?;
            if written != record.len() {
                return Err(Error::Io(io::Error::new(
                    io::ErrorKind::WriteZero,
                    format!("short write: {} of {} bytes", written, record.len()),
                )));
            }
        }
        Ok(record.len())
    }
}

impl fmt::Debug for MultiLevelWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultiLevelWriter")
            .field("writers", &self.writers.len())
            .finish()
    }
}

impl LevelWriter for MultiLevelWriter {
    fn write(&self, record: &[u8]) -> Result<usize> {
        self.forward(record, |writer| writer.write(record))
    }

    fn write_level(&self, level: Level, record: &[u8]) -> Result<usize> {
        self.forward(record, |writer| writer.write_level(level, record))
    }
}
