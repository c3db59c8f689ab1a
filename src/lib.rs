//! Cocoon Rotate
//!
//! A file sink for already-serialized log records. Records are appended to a
//! live file that is rotated into timestamped backups either when a size or
//! line quota would be exceeded, or at every epoch-aligned time window.
//! Backups beyond a count or age limit are removed, and older ones can be
//! gzip-compressed, by a single background worker that never blocks writers.
//!
//! ```no_run
//! use cocoon_rotate::{RotatingSink, SinkConfig, MB};
//!
//! # fn main() -> cocoon_rotate::Result<()> {
//! let config = SinkConfig::new()
//!     .with_max_bytes(10 * MB)
//!     .with_max_backups(5)
//!     .with_compression(1);
//! let sink = RotatingSink::new("/var/log/app/app.log", config)?;
//!
//! sink.write(b"{\"level\":\"info\",\"message\":\"started\"}\n")?;
//! sink.close()?;
//! # Ok(())
//! # }
//! ```

pub mod backup;
pub mod clock;
pub mod compression;
pub mod config;
pub mod error;
pub mod level;
pub mod live;
mod maintenance;
pub mod metrics;
pub mod retention;
pub mod sink;
pub mod window;

pub use backup::{BackupNaming, BackupRecord, WindowPrecision};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{RotationTrigger, SinkConfig, GB, KB, MB};
pub use error::{Error, ErrorHandler, Result};
pub use level::{Level, LevelWriter, MultiLevelWriter, SyncWriter};
pub use live::Quota;
pub use metrics::{MetricsSnapshot, SinkMetrics};
pub use retention::{MaintenanceReport, RetentionPlan, RetentionPolicy};
pub use sink::{RotatingSink, SinkBuilder};
pub use window::Window;
