//! Time-window rotation
//!
//! Rotates on one-minute windows aligned to the epoch. Run it across a minute
//! boundary to watch the backup appear.

use std::env;
use std::fs;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use cocoon_rotate::{Quota, RotatingSink, SinkConfig};

fn main() -> Result<()> {
    let dir = env::temp_dir().join("cocoon_rotate_time_demo");
    fs::create_dir_all(&dir).context("creating demo directory")?;
    let path = dir.join("app.log");

    let config = SinkConfig::new()
        .with_time_window(Duration::from_secs(60))
        .with_max_backups(3);
    let sink = RotatingSink::new(&path, config)
        .with_context(|| format!("opening sink at {}", path.display()))?;

    if let Quota::Window(window) = sink.quota() {
        println!("Current window: {} .. {}", window.start, window.end);
    }

    let seconds: u64 = env::args()
        .nth(1)
        .map(|arg| arg.parse())
        .transpose()
        .context("duration must be a number of seconds")?
        .unwrap_or(90);

    for tick in 0..seconds {
        sink.write(format!("{{\"level\":\"info\",\"tick\":{}}}\n", tick).as_bytes())?;
        thread::sleep(Duration::from_secs(1));
    }

    sink.close()?;

    for backup in sink.backups()? {
        println!("{} (window ending {})", backup.file_name, backup.timestamp);
    }

    Ok(())
}
