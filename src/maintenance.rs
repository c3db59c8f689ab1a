//! Background maintenance
//!
//! Rotations post a signal into a single-slot channel; one worker thread
//! drains it and runs a retention pass per signal. Signals posted while one
//! is already pending are dropped, so there is never more than one pass
//! running and one queued.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam::channel::{self, Sender, TrySendError};
use parking_lot::Mutex;

use crate::backup::{list_backups, BackupNaming};
use crate::clock::Clock;
use crate::error::{Error, ErrorHandler, Result};
use crate::metrics::SinkMetrics;
use crate::retention::{self, MaintenanceReport, RetentionPolicy};

/// Runs retention passes over one sink's backups
pub(crate) struct Maintainer {
    dir: PathBuf,
    naming: BackupNaming,
    policy: RetentionPolicy,
    clock: Arc<dyn Clock>,
    on_error: ErrorHandler,
    metrics: Arc<SinkMetrics>,
    /// Held for the whole of a pass
    pass_lock: Mutex<()>,
}

impl Maintainer {
    pub(crate) fn new(
        dir: PathBuf,
        naming: BackupNaming,
        policy: RetentionPolicy,
        clock: Arc<dyn Clock>,
        on_error: ErrorHandler,
        metrics: Arc<SinkMetrics>,
    ) -> Self {
        Self {
            dir,
            naming,
            policy,
            clock,
            on_error,
            metrics,
            pass_lock: Mutex::new(()),
        }
    }

    /// Run one full pass. Failures on individual files go to the error
    /// handler; only a failure to list the directory is returned.
    pub(crate) fn run_pass(&self) -> Result<MaintenanceReport> {
        let _pass = self.pass_lock.lock();
        let start = Instant::now();

        let backups = list_backups(&self.dir, &self.naming)?;
        let plan = retention::plan(backups, self.clock.now(), &self.policy);

        let report = if plan.is_empty() {
            MaintenanceReport::default()
        } else {
            retention::execute(&self.dir, &plan, &|err: &Error| (self.on_error)(err))
        };

        self.metrics.add_removed(report.removed.len());
        self.metrics.add_removal_failures(report.removal_failures);
        self.metrics.add_compressed(report.compressed.len());
        self.metrics.add_compression_failures(report.compression_failures);
        self.metrics.record_maintenance_pass(start.elapsed());

        tracing::debug!(
            dir = %self.dir.display(),
            removed = report.removed.len(),
            compressed = report.compressed.len(),
            failures = report.failures(),
            elapsed = ?start.elapsed(),
            "maintenance pass finished"
        );

        Ok(report)
    }
}

/// Sending half of the single-slot signal
#[derive(Clone)]
pub(crate) struct MaintenanceSignal {
    tx: Sender<()>,
    metrics: Arc<SinkMetrics>,
}

impl MaintenanceSignal {
    /// Ask for a pass without blocking. Returns `false` if the request was
    /// folded into one already pending.
    pub(crate) fn notify(&self) -> bool {
        match self.tx.try_send(()) {
            Ok(()) => true,
            Err(TrySendError::Full(())) => {
                self.metrics.increment_coalesced_signals();
                tracing::trace!("maintenance already pending, signal coalesced");
                false
            }
            Err(TrySendError::Disconnected(())) => false,
        }
    }
}

/// The worker thread and its signal slot
pub(crate) struct MaintenanceWorker {
    signal: Option<MaintenanceSignal>,
    handle: Option<JoinHandle<()>>,
}

impl MaintenanceWorker {
    /// Start the worker for `maintainer`
    pub(crate) fn spawn(maintainer: Arc<Maintainer>) -> Result<Self> {
        let (signal_tx, signal_rx) = channel::bounded::<()>(1);
        let signal = MaintenanceSignal {
            tx: signal_tx,
            metrics: maintainer.metrics.clone(),
        };

        let handle = thread::Builder::new()
            .name("cocoon-rotate-maintenance".to_string())
            .spawn(move || {
                for () in signal_rx.iter() {
                    if let Err(err) = maintainer.run_pass() {
                        (maintainer.on_error)(&err);
                    }
                }
            })
            .map_err(|e| Error::other(format!("failed to spawn maintenance worker: {}", e)))?;

        Ok(Self {
            signal: Some(signal),
            handle: Some(handle),
        })
    }

    /// Another handle on the signal slot. The worker only exits once every
    /// handle is dropped.
    pub(crate) fn signal(&self) -> Option<MaintenanceSignal> {
        self.signal.clone()
    }

    /// Ask for a pass without blocking
    pub(crate) fn notify(&self) -> bool {
        self.signal.as_ref().map_or(false, MaintenanceSignal::notify)
    }

    /// Close the signal slot and wait for the worker to finish any pass that
    /// is running or pending.
    pub(crate) fn shutdown(&mut self) {
        self.signal = None;
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::warn!("maintenance worker thread panicked");
            }
        }
    }
}

impl Drop for MaintenanceWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}
