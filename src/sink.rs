//! The rotating sink
//!
//! [`RotatingSink`] is the entry point: it serializes writers on the live
//! file, starts the window timer in time mode and the maintenance worker when
//! a retention policy is set, and stops both on [`close`](RotatingSink::close).

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::backup::{list_backups, BackupRecord};
use crate::clock::{Clock, SystemClock};
use crate::config::SinkConfig;
use crate::error::{default_error_handler, Error, ErrorHandler, Result};
use crate::level::{Level, LevelWriter};
use crate::live::{LiveFile, Quota};
use crate::maintenance::{MaintenanceSignal, MaintenanceWorker, Maintainer};
use crate::metrics::SinkMetrics;
use crate::retention::{MaintenanceReport, RetentionPolicy};
use crate::window::WindowTimer;

/// Builder for [`RotatingSink`]
pub struct SinkBuilder {
    path: PathBuf,
    config: SinkConfig,
    error_handler: Option<ErrorHandler>,
    clock: Option<Arc<dyn Clock>>,
}

impl SinkBuilder {
    /// Start building a sink writing to `path`
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            config: SinkConfig::default(),
            error_handler: None,
            clock: None,
        }
    }

    /// Set the rotation and retention policy
    pub fn config(mut self, config: SinkConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the callback for background failures
    pub fn error_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Error) + Send + Sync + 'static,
    {
        self.error_handler = Some(Arc::new(handler));
        self
    }

    /// Use `clock` instead of the system clock
    pub fn clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Some(Arc::new(clock));
        self
    }

    /// Open the sink
    pub fn build(self) -> Result<RotatingSink> {
        self.config.validate()?;

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let on_error = self.error_handler.unwrap_or_else(default_error_handler);
        let metrics = Arc::new(SinkMetrics::new());

        let (live, rotated) = LiveFile::open(&self.path, &self.config, clock.now())?;
        if let Some(backup) = rotated {
            metrics.increment_rotations();
            tracing::debug!(path = %self.path.display(), backup = %backup, "rotated existing file at open");
        }

        let maintainer = Arc::new(Maintainer::new(
            live.dir().to_path_buf(),
            live.naming().clone(),
            RetentionPolicy::from(&self.config),
            clock.clone(),
            on_error.clone(),
            metrics.clone(),
        ));

        let worker = if self.config.retention_enabled() {
            let worker = MaintenanceWorker::spawn(maintainer.clone())?;
            // Clean up after earlier runs
            worker.notify();
            Some(worker)
        } else {
            None
        };

        let inner = Arc::new(SinkInner {
            path: self.path,
            config: self.config,
            live: Mutex::new(live),
            clock,
            on_error,
            metrics,
            maintainer,
        });

        let timer = if inner.config.is_time_window() {
            Some(spawn_timer(&inner, worker.as_ref().and_then(MaintenanceWorker::signal))?)
        } else {
            None
        };

        tracing::debug!(
            path = %inner.path.display(),
            trigger = %inner.config.trigger,
            "opened rotating sink"
        );

        Ok(RotatingSink {
            inner,
            worker: Mutex::new(worker),
            timer: Mutex::new(timer),
        })
    }
}

impl fmt::Debug for SinkBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SinkBuilder")
            .field("path", &self.path)
            .field("config", &self.config)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

/// State shared with the timer thread
struct SinkInner {
    path: PathBuf,
    config: SinkConfig,
    live: Mutex<LiveFile>,
    clock: Arc<dyn Clock>,
    on_error: ErrorHandler,
    metrics: Arc<SinkMetrics>,
    maintainer: Arc<Maintainer>,
}

impl SinkInner {
    fn rotate(&self, signal: Option<&MaintenanceSignal>) -> Result<Option<String>> {
        let result = self.live.lock().rotate(self.clock.now());
        match &result {
            Ok(_) => {
                self.metrics.increment_rotations();
                if let Some(signal) = signal {
                    signal.notify();
                }
            }
            Err(err) if err.is_closed() => {}
            Err(_) => self.metrics.increment_rotation_failures(),
        }
        result
    }
}

fn spawn_timer(inner: &Arc<SinkInner>, signal: Option<MaintenanceSignal>) -> Result<WindowTimer> {
    let deadline_inner = inner.clone();
    let fire_inner = inner.clone();

    WindowTimer::spawn(
        inner.clock.clone(),
        move || {
            let live = deadline_inner.live.lock();
            if live.is_closed() {
                None
            } else {
                live.window().map(|window| window.end)
            }
        },
        move || match fire_inner.rotate(signal.as_ref()) {
            Ok(backup) => {
                tracing::debug!(path = %fire_inner.path.display(), backup = ?backup, "window rotation");
            }
            Err(err) if err.is_closed() => {}
            Err(err) => (fire_inner.on_error)(&err),
        },
    )
}

/// A file sink that rotates, prunes and compresses its own output
pub struct RotatingSink {
    inner: Arc<SinkInner>,
    worker: Mutex<Option<MaintenanceWorker>>,
    timer: Mutex<Option<WindowTimer>>,
}

impl RotatingSink {
    /// Open a sink at `path` with `config`
    pub fn new<P: AsRef<Path>>(path: P, config: SinkConfig) -> Result<Self> {
        SinkBuilder::new(path).config(config).build()
    }

    /// Start building a sink at `path`
    pub fn builder<P: AsRef<Path>>(path: P) -> SinkBuilder {
        SinkBuilder::new(path)
    }

    /// Write one record to the live file, rotating first if it would not fit.
    ///
    /// The record lands whole in exactly one file. Nothing is retried.
    pub fn write(&self, record: &[u8]) -> Result<usize> {
        let outcome = self.inner.live.lock().write(record, self.inner.clock.now());

        match outcome {
            Ok(outcome) => {
                self.inner.metrics.record_write(outcome.written);
                if let Some(backup) = outcome.rotated {
                    self.inner.metrics.increment_rotations();
                    tracing::debug!(path = %self.inner.path.display(), backup = %backup, "threshold rotation");
                    self.signal_maintenance();
                }
                Ok(outcome.written)
            }
            Err(err) => {
                if !err.is_closed() {
                    self.inner.metrics.increment_write_failures();
                }
                Err(err)
            }
        }
    }

    /// Write a record carrying a level. The level does not affect routing.
    pub fn write_level(&self, level: Level, record: &[u8]) -> Result<usize> {
        let _ = level;
        self.write(record)
    }

    /// Rotate the live file now and return the name of the new backup, if
    /// there was anything to move aside.
    ///
    /// In time mode the live file moves on to the following window.
    pub fn rotate(&self) -> Result<Option<String>> {
        let worker = self.worker.lock();
        let signal = worker.as_ref().and_then(MaintenanceWorker::signal);
        drop(worker);

        self.inner.rotate(signal.as_ref())
    }

    /// Run a maintenance pass on the calling thread.
    ///
    /// Never overlaps with a background pass.
    pub fn run_maintenance(&self) -> Result<MaintenanceReport> {
        self.inner.maintainer.run_pass()
    }

    /// Flush the live file to stable storage
    pub fn sync(&self) -> Result<()> {
        self.inner.live.lock().sync()
    }

    /// Close the live file and stop the background threads.
    ///
    /// A pending maintenance pass still runs before this returns. Later
    /// writes fail with [`Error::Closed`]. Calling it again is a no-op.
    pub fn close(&self) -> Result<()> {
        let result = self.inner.live.lock().close();

        let timer = self.timer.lock().take();
        if let Some(mut timer) = timer {
            timer.stop();
        }
        let worker = self.worker.lock().take();
        if let Some(mut worker) = worker {
            worker.shutdown();
        }

        tracing::debug!(path = %self.inner.path.display(), "closed rotating sink");
        result
    }

    /// Check if the sink has been closed
    pub fn is_closed(&self) -> bool {
        self.inner.live.lock().is_closed()
    }

    /// Path of the live file
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// The policy the sink was built with
    pub fn config(&self) -> &SinkConfig {
        &self.inner.config
    }

    /// Remaining quota or current window of the live file
    pub fn quota(&self) -> Quota {
        self.inner.live.lock().quota()
    }

    /// Backups currently on disk, oldest first
    pub fn backups(&self) -> Result<Vec<BackupRecord>> {
        let live = self.inner.live.lock();
        let (dir, naming) = (live.dir().to_path_buf(), live.naming().clone());
        drop(live);

        list_backups(&dir, &naming)
    }

    /// Activity counters
    pub fn metrics(&self) -> &SinkMetrics {
        &self.inner.metrics
    }

    fn signal_maintenance(&self) {
        if let Some(worker) = self.worker.lock().as_ref() {
            worker.notify();
        }
    }
}

impl fmt::Debug for RotatingSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RotatingSink")
            .field("path", &self.inner.path)
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl Drop for RotatingSink {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            (self.inner.on_error)(&e);
        }
    }
}

impl LevelWriter for RotatingSink {
    fn write(&self, record: &[u8]) -> Result<usize> {
        RotatingSink::write(self, record)
    }

    fn write_level(&self, level: Level, record: &[u8]) -> Result<usize> {
        RotatingSink::write_level(self, level, record)
    }
}

impl io::Write for RotatingSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(RotatingSink::write(self, buf)?)
    }

    // Records go straight to the file; nothing is buffered here
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl io::Write for &RotatingSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(RotatingSink::write(self, buf)?)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
