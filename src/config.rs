//! Configuration for the rotating sink
//!
//! This module provides the rotation policy: when the live file is rotated and
//! how rotated backups are retained and compressed.

use std::fs;
use std::path::Path;
use std::time::Duration;
use serde::{Serialize, Deserialize};

use crate::error::{Result, Error};

/// One kibibyte
pub const KB: u64 = 1 << 10;
/// One mebibyte
pub const MB: u64 = 1 << 20;
/// One gibibyte
pub const GB: u64 = 1 << 30;

/// Shortest window interval accepted in time mode
pub const MIN_WINDOW_INTERVAL: Duration = Duration::from_secs(60);

/// Longest window interval accepted in time mode (100 years)
pub const MAX_WINDOW_INTERVAL: Duration = Duration::from_secs(100 * 365 * 86_400);

/// Largest accepted `max_age_days` and `compress_after_days` (100 years)
pub const MAX_RETENTION_DAYS: u32 = 100 * 365;

/// Default permission bits for a freshly created live file
pub const DEFAULT_FILE_MODE: u32 = 0o644;

/// What triggers a rotation of the live file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RotationTrigger {
    /// Rotate before a write that would exceed either quota (0 = unlimited)
    Threshold {
        max_bytes: u64,
        max_lines: u64,
    },
    /// Rotate at every multiple of the interval, aligned to the Unix epoch
    TimeWindow {
        interval_secs: u64,
    },
}

impl Default for RotationTrigger {
    fn default() -> Self {
        Self::Threshold {
            max_bytes: 100 * MB,
            max_lines: 0,
        }
    }
}

impl std::fmt::Display for RotationTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Threshold { max_bytes, max_lines } => {
                write!(f, "threshold(max_bytes={}, max_lines={})", max_bytes, max_lines)
            }
            Self::TimeWindow { interval_secs } => write!(f, "time_window({}s)", interval_secs),
        }
    }
}

impl RotationTrigger {
    /// Get the name of the trigger mode
    pub fn name(&self) -> &'static str {
        match self {
            Self::Threshold { .. } => "threshold",
            Self::TimeWindow { .. } => "time_window",
        }
    }
}

/// Rotation and retention policy for a sink
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
#[non_exhaustive]
pub struct SinkConfig {
    /// Rotation trigger
    pub trigger: RotationTrigger,

    // Retention policy
    /// Maximum number of logical backups to keep (0 = unlimited)
    pub max_backups: u32,
    /// Maximum backup age in days (0 = unlimited)
    pub max_age_days: u32,
    /// Whether backups are gzip-compressed
    pub compress: bool,
    /// Age in days after which a backup is compressed
    pub compress_after_days: u32,

    /// Permission bits for a new live file that has no predecessor (unix)
    pub file_mode: u32,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            trigger: RotationTrigger::default(),

            max_backups: 0,
            max_age_days: 0,
            compress: false,
            compress_after_days: 0,

            file_mode: DEFAULT_FILE_MODE,
        }
    }
}

impl SinkConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Rotate by size, keeping any line quota already configured
    pub fn with_max_bytes(mut self, bytes: u64) -> Self {
        let max_lines = match self.trigger {
            RotationTrigger::Threshold { max_lines, .. } => max_lines,
            RotationTrigger::TimeWindow { .. } => 0,
        };
        self.trigger = RotationTrigger::Threshold { max_bytes: bytes, max_lines };
        self
    }

    /// Rotate by line count, keeping any byte quota already configured
    pub fn with_max_lines(mut self, lines: u64) -> Self {
        let max_bytes = match self.trigger {
            RotationTrigger::Threshold { max_bytes, .. } => max_bytes,
            RotationTrigger::TimeWindow { .. } => 0,
        };
        self.trigger = RotationTrigger::Threshold { max_bytes, max_lines: lines };
        self
    }

    /// Rotate on aligned time windows of the given length.
    ///
    /// Windows are whole seconds; any sub-second part of `interval` is
    /// dropped.
    pub fn with_time_window(mut self, interval: Duration) -> Self {
        self.trigger = RotationTrigger::TimeWindow {
            interval_secs: interval.as_secs(),
        };
        self
    }

    /// Set the maximum number of backups to keep
    pub fn with_max_backups(mut self, count: u32) -> Self {
        self.max_backups = count;
        self
    }

    /// Set the maximum age of backups in days
    pub fn with_max_age_days(mut self, days: u32) -> Self {
        self.max_age_days = days;
        self
    }

    /// Compress backups older than `after_days` days
    pub fn with_compression(mut self, after_days: u32) -> Self {
        self.compress = true;
        self.compress_after_days = after_days;
        self
    }

    /// Disable compression
    pub fn without_compression(mut self) -> Self {
        self.compress = false;
        self
    }

    /// Set the permission bits for new live files
    pub fn with_file_mode(mut self, mode: u32) -> Self {
        self.file_mode = mode;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if let RotationTrigger::TimeWindow { interval_secs } = self.trigger {
            if interval_secs < MIN_WINDOW_INTERVAL.as_secs() {
                return Err(Error::config(format!(
                    "Window interval must be at least {} seconds, got {}",
                    MIN_WINDOW_INTERVAL.as_secs(),
                    interval_secs
                )));
            }
            if interval_secs > MAX_WINDOW_INTERVAL.as_secs() {
                return Err(Error::config(format!(
                    "Window interval must be at most {} seconds, got {}",
                    MAX_WINDOW_INTERVAL.as_secs(),
                    interval_secs
                )));
            }
        }

        for (field, days) in [
            ("max_age_days", self.max_age_days),
            ("compress_after_days", self.compress_after_days),
        ] {
            if days > MAX_RETENTION_DAYS {
                return Err(Error::config(format!(
                    "{} must be at most {}, got {}",
                    field, MAX_RETENTION_DAYS, days
                )));
            }
        }

        if self.file_mode > 0o7777 {
            return Err(Error::config(format!(
                "File mode {:o} is not a valid permission mask",
                self.file_mode
            )));
        }

        Ok(())
    }

    /// The window interval in time mode
    pub fn window_interval(&self) -> Option<Duration> {
        match self.trigger {
            RotationTrigger::TimeWindow { interval_secs } => Some(Duration::from_secs(interval_secs)),
            RotationTrigger::Threshold { .. } => None,
        }
    }

    /// Whether the sink rotates on time windows
    pub fn is_time_window(&self) -> bool {
        matches!(self.trigger, RotationTrigger::TimeWindow { .. })
    }

    /// Days after which backups get compressed, if compression can ever happen.
    ///
    /// A backup that would be deleted by age before it becomes eligible for
    /// compression is never compressed, so compression is disabled outright.
    pub fn effective_compress_after(&self) -> Option<u32> {
        if !self.compress {
            return None;
        }
        if self.max_age_days > 0 && self.compress_after_days > self.max_age_days {
            return None;
        }
        Some(self.compress_after_days)
    }

    /// Whether any maintenance work can result from a rotation
    pub fn retention_enabled(&self) -> bool {
        self.max_backups > 0 || self.max_age_days > 0 || self.effective_compress_after().is_some()
    }

    /// Create a human-readable string representation of the configuration
    pub fn to_string_pretty(&self) -> String {
        let mut result = String::new();

        result.push_str("=== Sink Configuration ===\n\n");

        result.push_str("Rotation:\n");
        result.push_str(&format!("  Mode: {}\n", self.trigger.name()));
        match self.trigger {
            RotationTrigger::Threshold { max_bytes, max_lines } => {
                result.push_str(&format!("  Max Bytes: {}\n", limit_str(max_bytes)));
                result.push_str(&format!("  Max Lines: {}\n", limit_str(max_lines)));
            }
            RotationTrigger::TimeWindow { interval_secs } => {
                result.push_str(&format!("  Window Interval: {} seconds\n", interval_secs));
            }
        }

        result.push_str("\nRetention Policy:\n");
        result.push_str(&format!("  Max Backups: {}\n", limit_str(self.max_backups as u64)));
        result.push_str(&format!("  Max Age: {} days\n", limit_str(self.max_age_days as u64)));
        match self.effective_compress_after() {
            Some(days) => result.push_str(&format!("  Compression: after {} days\n", days)),
            None => result.push_str("  Compression: Disabled\n"),
        }

        result.push_str(&format!("\nFile Mode: {:o}\n", self.file_mode));

        result
    }

    /// Parse a configuration from JSON
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| Error::file("read", path, e))?;
        Self::from_json_str(&content)
    }

    /// Save configuration to a JSON file
    pub fn to_json_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).map_err(|e| Error::file("write", path, e))?;
        Ok(())
    }
}

fn limit_str(value: u64) -> String {
    if value == 0 {
        "unlimited".to_string()
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SinkConfig::default();

        assert_eq!(
            config.trigger,
            RotationTrigger::Threshold { max_bytes: 100 * MB, max_lines: 0 }
        );
        assert_eq!(config.max_backups, 0);
        assert_eq!(config.max_age_days, 0);
        assert!(!config.compress);
        assert_eq!(config.file_mode, 0o644);
        assert!(!config.retention_enabled());

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = SinkConfig::new()
            .with_max_bytes(10 * MB)
            .with_max_lines(5000)
            .with_max_backups(7)
            .with_max_age_days(30)
            .with_compression(2);

        assert_eq!(
            config.trigger,
            RotationTrigger::Threshold { max_bytes: 10 * MB, max_lines: 5000 }
        );
        assert_eq!(config.max_backups, 7);
        assert_eq!(config.max_age_days, 30);
        assert_eq!(config.effective_compress_after(), Some(2));
        assert!(config.retention_enabled());
        assert!(config.validate().is_ok());

        let config = SinkConfig::new().with_time_window(Duration::from_secs(3600));
        assert!(config.is_time_window());
        assert_eq!(config.window_interval(), Some(Duration::from_secs(3600)));
    }

    #[test]
    fn test_config_validation() {
        let invalid_configs = vec![
            SinkConfig::new().with_time_window(Duration::from_secs(59)),
            SinkConfig::new().with_time_window(Duration::from_millis(500)),
            SinkConfig::new().with_file_mode(0o17777),
            SinkConfig::new().with_time_window(Duration::from_secs(1 << 62)),
            SinkConfig::new().with_time_window(MAX_WINDOW_INTERVAL + Duration::from_secs(1)),
            SinkConfig::new().with_max_age_days(u32::MAX),
            SinkConfig::new().with_compression(MAX_RETENTION_DAYS + 1),
        ];

        for config in invalid_configs {
            assert!(config.validate().is_err());
        }

        for config in [
            SinkConfig::new().with_time_window(Duration::from_secs(60)),
            SinkConfig::new().with_time_window(MAX_WINDOW_INTERVAL),
            SinkConfig::new().with_max_age_days(MAX_RETENTION_DAYS).with_compression(MAX_RETENTION_DAYS),
        ] {
            assert!(config.validate().is_ok());
        }
    }

    #[test]
    fn test_time_window_drops_subsecond_part() {
        let config = SinkConfig::new().with_time_window(Duration::from_millis(60_900));
        assert_eq!(config.trigger, RotationTrigger::TimeWindow { interval_secs: 60 });
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_compression_after_max_age_is_noop() {
        let config = SinkConfig::new().with_max_age_days(3).with_compression(5);
        assert_eq!(config.effective_compress_after(), None);

        let config = SinkConfig::new().with_max_age_days(5).with_compression(5);
        assert_eq!(config.effective_compress_after(), Some(5));

        let config = SinkConfig::new().with_compression(5).without_compression();
        assert_eq!(config.effective_compress_after(), None);
    }

    #[test]
    fn test_json_round_trip() -> Result<()> {
        let temp_dir = tempfile::tempdir().map_err(Error::Io)?;
        let path = temp_dir.path().join("sink.json");

        let config = SinkConfig::new()
            .with_time_window(Duration::from_secs(86400))
            .with_max_backups(3);
        config.to_json_file(&path)?;

        let loaded = SinkConfig::from_json_file(&path)?;
        assert_eq!(loaded, config);

        Ok(())
    }

    #[test]
    fn test_partial_json_uses_defaults() -> Result<()> {
        let config = SinkConfig::from_json_str(
            r#"{ "trigger": { "mode": "threshold", "max_bytes": 1024, "max_lines": 0 }, "max_backups": 2 }"#,
        )?;
        assert_eq!(config.max_backups, 2);
        assert_eq!(config.file_mode, DEFAULT_FILE_MODE);

        let err = SinkConfig::from_json_str(r#"{ "trigger": { "mode": "time_window", "interval_secs": 1 } }"#)
            .unwrap_err();
        assert!(err.is_config_error());

        Ok(())
    }

    #[test]
    fn test_config_pretty_string() {
        let pretty = SinkConfig::new().with_max_backups(4).to_string_pretty();

        assert!(pretty.contains("Rotation:"));
        assert!(pretty.contains("Retention Policy:"));
        assert!(pretty.contains("Max Backups: 4"));
        assert!(pretty.contains("Max Lines: unlimited"));
        assert!(pretty.contains("Compression: Disabled"));
    }
}
