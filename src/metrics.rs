use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use parking_lot::Mutex;

/// Activity counters for a rotating sink
#[derive(Debug)]
pub struct SinkMetrics {
    // Write path
    /// Number of successful writes
    write_count: AtomicUsize,
    /// Number of failed writes
    write_failures: AtomicUsize,
    /// Total bytes written
    bytes_written: AtomicU64,

    // Rotation
    /// Number of completed rotations
    rotation_count: AtomicUsize,
    /// Number of failed rotations
    rotation_failures: AtomicUsize,

    // Maintenance
    /// Number of maintenance passes run
    maintenance_passes: AtomicUsize,
    /// Signals dropped because a pass was already pending
    coalesced_signals: AtomicUsize,
    /// Backups removed by retention
    backups_removed: AtomicUsize,
    /// Backups that could not be removed
    removal_failures: AtomicUsize,
    /// Backups compressed
    backups_compressed: AtomicUsize,
    /// Backups that failed to compress
    compression_failures: AtomicUsize,
    /// Total maintenance duration in nanoseconds
    maintenance_duration_ns: AtomicU64,
    /// Last maintenance duration
    last_maintenance_duration: Mutex<Duration>,

    /// Creation time of the collector
    start_time: Instant,
}

/// Point-in-time copy of [`SinkMetrics`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub writes: usize,
    pub write_failures: usize,
    pub bytes_written: u64,
    pub rotations: usize,
    pub rotation_failures: usize,
    pub maintenance_passes: usize,
    pub coalesced_signals: usize,
    pub backups_removed: usize,
    pub removal_failures: usize,
    pub backups_compressed: usize,
    pub compression_failures: usize,
}

impl Default for SinkMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl SinkMetrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            write_count: AtomicUsize::new(0),
            write_failures: AtomicUsize::new(0),
            bytes_written: AtomicU64::new(0),

            rotation_count: AtomicUsize::new(0),
            rotation_failures: AtomicUsize::new(0),

            maintenance_passes: AtomicUsize::new(0),
            coalesced_signals: AtomicUsize::new(0),
            backups_removed: AtomicUsize::new(0),
            removal_failures: AtomicUsize::new(0),
            backups_compressed: AtomicUsize::new(0),
            compression_failures: AtomicUsize::new(0),
            maintenance_duration_ns: AtomicU64::new(0),
            last_maintenance_duration: Mutex::new(Duration::from_secs(0)),

            start_time: Instant::now(),
        }
    }

    /// Record a successful write of `bytes` bytes
    pub fn record_write(&self, bytes: usize) {
        self.write_count.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn increment_write_failures(&self) {
        self.write_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_rotations(&self) {
        self.rotation_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_rotation_failures(&self) {
        self.rotation_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_coalesced_signals(&self) {
        self.coalesced_signals.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_removed(&self, count: usize) {
        self.backups_removed.fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_removal_failures(&self, count: usize) {
        self.removal_failures.fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_compressed(&self, count: usize) {
        self.backups_compressed.fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_compression_failures(&self, count: usize) {
        self.compression_failures.fetch_add(count, Ordering::Relaxed);
    }

    /// Record a finished maintenance pass
    pub fn record_maintenance_pass(&self, duration: Duration) {
        self.maintenance_passes.fetch_add(1, Ordering::Relaxed);
        self.maintenance_duration_ns
            .fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);
        *self.last_maintenance_duration.lock() = duration;
    }

    /// Get number of completed rotations
    pub fn get_rotation_count(&self) -> usize {
        self.rotation_count.load(Ordering::Relaxed)
    }

    /// Get number of maintenance passes
    pub fn get_maintenance_passes(&self) -> usize {
        self.maintenance_passes.load(Ordering::Relaxed)
    }

    /// Get the duration of the most recent maintenance pass
    pub fn get_last_maintenance_duration(&self) -> Duration {
        *self.last_maintenance_duration.lock()
    }

    /// Get the average maintenance pass duration
    pub fn get_avg_maintenance_duration(&self) -> Duration {
        let passes = self.get_maintenance_passes();
        if passes == 0 {
            return Duration::from_secs(0);
        }
        Duration::from_nanos(self.maintenance_duration_ns.load(Ordering::Relaxed) / passes as u64)
    }

    /// Get the uptime of the collector
    pub fn get_uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Copy all counters
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            writes: self.write_count.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            rotations: self.rotation_count.load(Ordering::Relaxed),
            rotation_failures: self.rotation_failures.load(Ordering::Relaxed),
            maintenance_passes: self.maintenance_passes.load(Ordering::Relaxed),
            coalesced_signals: self.coalesced_signals.load(Ordering::Relaxed),
            backups_removed: self.backups_removed.load(Ordering::Relaxed),
            removal_failures: self.removal_failures.load(Ordering::Relaxed),
            backups_compressed: self.backups_compressed.load(Ordering::Relaxed),
            compression_failures: self.compression_failures.load(Ordering::Relaxed),
        }
    }

    /// Create a human-readable report
    pub fn get_report(&self) -> String {
        let snapshot = self.snapshot();
        let mut report = String::new();

        report.push_str("=== Sink Metrics ===\n\n");

        report.push_str("Write Path:\n");
        report.push_str(&format!("  Writes: {}\n", snapshot.writes));
        report.push_str(&format!("  Write Failures: {}\n", snapshot.write_failures));
        report.push_str(&format!("  Bytes Written: {}\n", snapshot.bytes_written));

        report.push_str("\nRotation:\n");
        report.push_str(&format!("  Rotations: {}\n", snapshot.rotations));
        report.push_str(&format!("  Rotation Failures: {}\n", snapshot.rotation_failures));

        report.push_str("\nMaintenance:\n");
        report.push_str(&format!("  Passes: {}\n", snapshot.maintenance_passes));
        report.push_str(&format!("  Coalesced Signals: {}\n", snapshot.coalesced_signals));
        report.push_str(&format!("  Backups Removed: {}\n", snapshot.backups_removed));
        report.push_str(&format!("  Removal Failures: {}\n", snapshot.removal_failures));
        report.push_str(&format!("  Backups Compressed: {}\n", snapshot.backups_compressed));
        report.push_str(&format!("  Compression Failures: {}\n", snapshot.compression_failures));
        report.push_str(&format!(
            "  Avg Pass Duration: {:?}\n",
            self.get_avg_maintenance_duration()
        ));

        let uptime_secs = self.get_uptime().as_secs_f64();
        if uptime_secs > 0.0 {
            report.push_str("\nThroughput:\n");
            report.push_str(&format!(
                "  Writes/sec: {:.2}\n",
                snapshot.writes as f64 / uptime_secs
            ));
            report.push_str(&format!(
                "  Write Bytes/sec: {:.2}\n",
                snapshot.bytes_written as f64 / uptime_secs
            ));
        }

        report
    }
}
