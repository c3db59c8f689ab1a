//! Time windows
//!
//! Windows are half-open intervals `[start, end)` aligned to the Unix epoch,
//! so every sink with the same interval agrees on where they begin and end,
//! whenever it was started.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::{DateTime, Utc};
use crossbeam::channel::{self, RecvTimeoutError, Sender};

use crate::clock::Clock;
use crate::error::{Error, Result};

/// Delay before the timer retries a rotation that did not move the window
const RETRY_DELAY: Duration = Duration::from_secs(1);

/// One rotation window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Window {
    /// Inclusive start
    pub start: DateTime<Utc>,
    /// Exclusive end
    pub end: DateTime<Utc>,
}

impl Window {
    /// The window of length `interval_secs` that contains `timestamp`
    pub fn containing(timestamp: &DateTime<Utc>, interval_secs: u64) -> Self {
        let start = window_start(timestamp, interval_secs);
        let end = chrono::Duration::try_seconds(interval_length(interval_secs))
            .and_then(|length| start.checked_add_signed(length))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self { start, end }
    }

    /// Check if `timestamp` falls inside the window
    pub fn contains(&self, timestamp: &DateTime<Utc>) -> bool {
        self.start <= *timestamp && *timestamp < self.end
    }

    /// Check if the window is over at `now`
    pub fn has_ended(&self, now: &DateTime<Utc>) -> bool {
        self.end <= *now
    }
}

/// Start of the window containing `timestamp`
pub fn window_start(timestamp: &DateTime<Utc>, interval_secs: u64) -> DateTime<Utc> {
    let interval = interval_length(interval_secs);
    timestamp
        .timestamp()
        .div_euclid(interval)
        .checked_mul(interval)
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn interval_length(interval_secs: u64) -> i64 {
    i64::try_from(interval_secs).unwrap_or(i64::MAX).max(1)
}

/// Next boundary strictly after `timestamp`
pub fn window_end(timestamp: &DateTime<Utc>, interval_secs: u64) -> DateTime<Utc> {
    Window::containing(timestamp, interval_secs).end
}

/// Background thread that fires once at every window boundary
pub(crate) struct WindowTimer {
    shutdown: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl WindowTimer {
    /// Spawn the timer.
    ///
    /// `deadline` returns the end of the live window, or `None` once the
    /// sink is closed. `fire` performs the rotation.
    pub(crate) fn spawn<D, F>(clock: Arc<dyn Clock>, mut deadline: D, mut fire: F) -> Result<Self>
    where
        D: FnMut() -> Option<DateTime<Utc>> + Send + 'static,
        F: FnMut() + Send + 'static,
    {
        let (shutdown_tx, shutdown_rx) = channel::bounded::<()>(1);

        let handle = thread::Builder::new()
            .name("cocoon-rotate-timer".to_string())
            .spawn(move || {
                let mut last_fired: Option<DateTime<Utc>> = None;

                while let Some(end) = deadline() {
                    let wait = if last_fired == Some(end) {
                        // The previous rotation failed and left the window in place
                        RETRY_DELAY
                    } else {
                        (end - clock.now()).to_std().unwrap_or(Duration::ZERO)
                    };

                    match shutdown_rx.recv_timeout(wait) {
                        Err(RecvTimeoutError::Timeout) => {
                            tracing::trace!(boundary = %end, "window boundary reached");
                            last_fired = Some(end);
                            fire();
                        }
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
            })
            .map_err(|e| Error::other(format!("failed to spawn window timer: {}", e)))?;

        Ok(Self {
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    /// Stop the timer and wait for it to exit
    pub(crate) fn stop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.try_send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::warn!("window timer thread panicked");
            }
        }
    }
}

impl Drop for WindowTimer {
    fn drop(&mut self) {
        self.stop();
    }
}
