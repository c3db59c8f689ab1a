//! Size-based rotation with retention and compression
//!
//! Writes a few thousand JSON records into a sink that rotates every 16 KiB,
//! keeps the five newest backups and compresses them straight away.

use std::env;
use std::fs;

use anyhow::{Context, Result};
use cocoon_rotate::{Level, RotatingSink, SinkConfig, KB};

fn main() -> Result<()> {
    let dir = env::temp_dir().join("cocoon_rotate_size_demo");
    fs::create_dir_all(&dir).context("creating demo directory")?;
    let path = dir.join("app.log");

    let config = SinkConfig::new()
        .with_max_bytes(16 * KB)
        .with_max_backups(5)
        .with_compression(0);
    println!("{}", config.to_string_pretty());

    let sink = RotatingSink::builder(&path)
        .config(config)
        .error_handler(|err| eprintln!("background failure: {}", err))
        .build()
        .with_context(|| format!("opening sink at {}", path.display()))?;

    for i in 0..5000 {
        let level = if i % 50 == 0 { Level::Warn } else { Level::Info };
        let record = format!(
            "{{\"level\":\"{}\",\"seq\":{},\"message\":\"request served\"}}\n",
            level, i
        );
        sink.write_level(level, record.as_bytes())?;
    }

    sink.close()?;

    println!("Backups in {}:", dir.display());
    for backup in sink.backups()? {
        let size = fs::metadata(backup.path(&dir))?.len();
        println!(
            "  {} ({} bytes{})",
            backup.file_name,
            size,
            if backup.compressed { ", gzip" } else { "" }
        );
    }

    println!("\n{}", sink.metrics().get_report());

    Ok(())
}
