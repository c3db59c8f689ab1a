//! Backup compression
//!
//! Compresses a rotated backup into a gzip sibling and removes the original.
//! A failed attempt never leaves a half-written archive behind, so the backup
//! is simply reconsidered on the next maintenance pass.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::error::{Error, Result};

/// Compression statistics for one backup
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompressionStats {
    /// Original size in bytes
    pub original_size: u64,
    /// Compressed size in bytes
    pub compressed_size: u64,
    /// Compression ratio (original / compressed)
    pub ratio: f64,
}

impl CompressionStats {
    /// Create new compression stats
    pub fn new(original_size: u64, compressed_size: u64) -> Self {
        let ratio = if compressed_size > 0 {
            original_size as f64 / compressed_size as f64
        } else {
            1.0
        };

        Self {
            original_size,
            compressed_size,
            ratio,
        }
    }

    /// Calculate space savings as a percentage
    pub fn space_savings(&self) -> f64 {
        (1.0 - (1.0 / self.ratio)) * 100.0
    }
}

/// Gzip `src` into `dst`, then delete `src`.
///
/// On any failure `dst` is removed and `src` is left untouched.
pub fn compress_file(src: &Path, dst: &Path) -> Result<CompressionStats> {
    match compress_into(src, dst) {
        Ok(stats) => Ok(stats),
        Err(err) => {
            if let Err(e) = fs::remove_file(dst) {
                if e.kind() != io::ErrorKind::NotFound {
                    tracing::warn!(path = %dst.display(), error = %e, "failed to remove partial archive");
                }
            }
            Err(err)
        }
    }
}

fn compress_into(src: &Path, dst: &Path) -> Result<CompressionStats> {
    let source = File::open(src).map_err(|e| Error::file("open backup", src, e))?;
    let metadata = source.metadata().map_err(|e| Error::file("stat backup", src, e))?;

    // An existing destination is presumed to be left over from an earlier
    // attempt and is overwritten.
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
        options.mode(metadata.permissions().mode() & 0o7777);
    }
    let target = options
        .open(dst)
        .map_err(|e| Error::file("create archive", dst, e))?;

    let mut encoder = GzEncoder::new(BufWriter::new(target), Compression::default());
    let copied = io::copy(&mut BufReader::new(source), &mut encoder)
        .map_err(|e| Error::compression(src, format!("failed to compress: {}", e)))?;

    let mut writer = encoder
        .finish()
        .map_err(|e| Error::compression(dst, format!("failed to finish archive: {}", e)))?;
    writer
        .flush()
        .map_err(|e| Error::file("flush archive", dst, e))?;
    let target = writer
        .into_inner()
        .map_err(|e| Error::file("flush archive", dst, e.into_error()))?;
    target
        .sync_all()
        .map_err(|e| Error::file("sync archive", dst, e))?;
    let compressed_size = target
        .metadata()
        .map_err(|e| Error::file("stat archive", dst, e))?
        .len();
    drop(target);

    if copied != metadata.len() {
        tracing::debug!(
            path = %src.display(),
            expected = metadata.len(),
            copied,
            "backup size changed while compressing"
        );
    }

    fs::remove_file(src).map_err(|e| Error::file("remove compressed backup", src, e))?;

    Ok(CompressionStats::new(copied, compressed_size))
}

/// Read the content of a backup, decompressing it if it is gzipped
pub fn read_backup(path: &Path) -> Result<Vec<u8>> {
    let file = File::open(path).map_err(|e| Error::file("open backup", path, e))?;
    let mut content = Vec::new();

    let is_gzip = path
        .extension()
        .map_or(false, |ext| ext == "gz");

    if is_gzip {
        GzDecoder::new(BufReader::new(file))
            .read_to_end(&mut content)
            .map_err(|e| Error::compression(path, format!("failed to decompress: {}", e)))?;
    } else {
        BufReader::new(file)
            .read_to_end(&mut content)
            .map_err(|e| Error::file("read backup", path, e))?;
    }

    Ok(content)
}
