//! Backup naming codec
//!
//! Threshold mode: `<stem>-<YYYY-MM-DDTHH-MM-SS.mmm><ext>[.gz]`
//! Time mode:      `<name>.<digits>[.gz]`, digit width from [`WindowPrecision`]
//!
//! Decoding never fails loudly: a name that does not belong to the sink is
//! simply not a backup.

use chrono::{DateTime, NaiveDateTime, SubsecRound, Utc};

use crate::backup::{BackupRecord, WindowPrecision, COMPRESS_SUFFIX, THRESHOLD_LAYOUT};
use crate::config::RotationTrigger;

/// Naming scheme for the backups of one live file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupNaming {
    /// Timestamp spliced between the file stem and its extension
    Threshold {
        /// `"<stem>-"`
        prefix: String,
        /// Extension including the dot, or empty
        ext: String,
    },
    /// Window boundary appended after the full file name
    Window {
        name: String,
        precision: WindowPrecision,
    },
}

impl BackupNaming {
    /// Naming for the live file `file_name` under the given trigger
    pub fn for_target(file_name: &str, trigger: &RotationTrigger) -> Self {
        match trigger {
            RotationTrigger::Threshold { .. } => {
                let (stem, ext) = split_extension(file_name);
                Self::Threshold {
                    prefix: format!("{}-", stem),
                    ext: ext.to_string(),
                }
            }
            RotationTrigger::TimeWindow { interval_secs } => Self::Window {
                name: file_name.to_string(),
                precision: WindowPrecision::for_interval(*interval_secs),
            },
        }
    }

    /// Drop whatever precision the encoding cannot represent
    pub fn normalize(&self, timestamp: &DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Self::Threshold { .. } => timestamp.trunc_subsecs(3),
            Self::Window { precision, .. } => precision.truncate(timestamp),
        }
    }

    /// Smallest step between two distinct encodable timestamps
    pub fn resolution(&self) -> chrono::Duration {
        match self {
            Self::Threshold { .. } => chrono::Duration::milliseconds(1),
            Self::Window { precision, .. } => chrono::Duration::seconds(precision.unit_secs()),
        }
    }

    /// File name for a backup taken at `timestamp`
    pub fn encode(&self, timestamp: &DateTime<Utc>, compressed: bool) -> String {
        let suffix = if compressed { COMPRESS_SUFFIX } else { "" };
        match self {
            Self::Threshold { prefix, ext } => format!(
                "{}{}{}{}",
                prefix,
                timestamp.format(THRESHOLD_LAYOUT),
                ext,
                suffix
            ),
            Self::Window { name, precision } => {
                format!("{}.{}{}", name, precision.format(timestamp), suffix)
            }
        }
    }

    /// Recognize one of this sink's backups by file name
    pub fn decode(&self, file_name: &str) -> Option<BackupRecord> {
        let (timestamp, compressed) = match self {
            // The live file's own extension may be `.gz`, so the bare form is
            // tried before the compression suffix is stripped
            Self::Threshold { prefix, ext } => match parse_threshold(file_name, prefix, ext) {
                Some(timestamp) => (timestamp, false),
                None => {
                    let base = file_name.strip_suffix(COMPRESS_SUFFIX)?;
                    (parse_threshold(base, prefix, ext)?, true)
                }
            },
            Self::Window { name, precision } => {
                let (base, compressed) = match file_name.strip_suffix(COMPRESS_SUFFIX) {
                    Some(base) => (base, true),
                    None => (file_name, false),
                };
                let stamp = base.strip_prefix(name.as_str())?.strip_prefix('.')?;
                (precision.parse(stamp)?, compressed)
            }
        };

        Some(BackupRecord::new(timestamp, compressed, file_name))
    }
}

fn parse_threshold(base: &str, prefix: &str, ext: &str) -> Option<DateTime<Utc>> {
    let stamp = base.strip_prefix(prefix)?.strip_suffix(ext)?;
    let parsed = NaiveDateTime::parse_from_str(stamp, THRESHOLD_LAYOUT).ok()?.and_utc();
    if parsed.format(THRESHOLD_LAYOUT).to_string() != stamp {
        return None;
    }
    Some(parsed)
}

/// Split `name` into stem and extension (with its dot). A leading dot does
/// not start an extension.
fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(idx) if idx > 0 => name.split_at(idx),
        _ => (name, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, TimeZone};
    use proptest::prelude::*;

    fn threshold() -> BackupNaming {
        BackupNaming::for_target("app.log", &RotationTrigger::Threshold { max_bytes: 100, max_lines: 0 })
    }

    fn window(interval_secs: u64) -> BackupNaming {
        BackupNaming::for_target("app.log", &RotationTrigger::TimeWindow { interval_secs })
    }

    #[test]
    fn test_threshold_encoding() {
        let timestamp = Utc.with_ymd_and_hms(2024, 3, 5, 10, 20, 30).unwrap()
            + ChronoDuration::milliseconds(123);

        assert_eq!(threshold().encode(&timestamp, false), "app-2024-03-05T10-20-30.123.log");
        assert_eq!(threshold().encode(&timestamp, true), "app-2024-03-05T10-20-30.123.log.gz");
    }

    #[test]
    fn test_window_encoding() {
        let timestamp = Utc.with_ymd_and_hms(2024, 3, 5, 10, 0, 0).unwrap();

        assert_eq!(window(60).encode(&timestamp, false), "app.log.202403051000");
        assert_eq!(window(3600).encode(&timestamp, true), "app.log.2024030510.gz");
        assert_eq!(window(86400).encode(&timestamp, false), "app.log.20240305");
    }

    #[test]
    fn test_split_extension() {
        assert_eq!(split_extension("app.log"), ("app", ".log"));
        assert_eq!(split_extension("app.tar.log"), ("app.tar", ".log"));
        assert_eq!(split_extension("app"), ("app", ""));
        assert_eq!(split_extension(".hidden"), (".hidden", ""));

        let naming = BackupNaming::for_target("server", &RotationTrigger::Threshold { max_bytes: 1, max_lines: 0 });
        let timestamp = Utc.with_ymd_and_hms(2024, 3, 5, 10, 20, 30).unwrap();
        let name = naming.encode(&timestamp, true);
        assert_eq!(name, "server-2024-03-05T10-20-30.000.gz");
        assert_eq!(naming.decode(&name).map(|r| r.timestamp), Some(timestamp));
    }

    #[test]
    fn test_foreign_names_are_not_recognized() {
        let foreign = [
            "app.log",
            "other-2024-03-05T10-20-30.123.log",
            "app-2024-03-05T10-20-30.123.txt",
            "app-2024-03-05T10-20-30.log",
            "app-2024-03-05 10:20:30.123.log",
            "app-2024-03-05T10-20-30.123.log.gz.tmp",
            "app-2024-03-05T10-20-30.123.log.zst",
            "app-garbage.log",
        ];
        for name in foreign {
            assert_eq!(threshold().decode(name), None, "{} should not decode", name);
        }

        let foreign = [
            "app.log",
            "app.log.",
            "app.log.2024030510",
            "app.log.20240305100",
            "app.log.202403051000.bak",
            "other.log.202403051000",
            "app.log202403051000",
        ];
        for name in foreign {
            assert_eq!(window(60).decode(name), None, "{} should not decode", name);
        }
    }

    #[test]
    fn test_threshold_live_file_is_not_a_backup() {
        // The live file itself must never be picked up by retention
        assert_eq!(threshold().decode("app.log"), None);
        assert_eq!(window(3600).decode("app.log"), None);
    }

    #[test]
    fn test_gz_target_extension() {
        let naming = BackupNaming::for_target("trace.gz", &RotationTrigger::Threshold { max_bytes: 100, max_lines: 0 });
        let timestamp = Utc.with_ymd_and_hms(2024, 3, 5, 10, 20, 30).unwrap()
            + ChronoDuration::milliseconds(961);

        let plain = naming.decode("trace-2024-03-05T10-20-30.961.gz").unwrap();
        assert!(!plain.compressed);
        assert_eq!(plain.timestamp, timestamp);

        let packed = naming.decode("trace-2024-03-05T10-20-30.961.gz.gz").unwrap();
        assert!(packed.compressed);
        assert_eq!(packed.logical_name(), plain.file_name);

        assert_eq!(naming.decode("trace.gz"), None);
    }

    #[test]
    fn test_consecutive_windows_get_distinct_names() {
        for interval in [60u64, 90, 5400, 36 * 3600] {
            let naming = window(interval);
            let start = Utc.with_ymd_and_hms(2024, 3, 5, 0, 0, 0).unwrap();
            let names: std::collections::HashSet<String> = (1..200)
                .map(|i| {
                    let end = start + ChronoDuration::seconds(interval as i64 * i);
                    naming.encode(&naming.normalize(&end), false)
                })
                .collect();
            assert_eq!(names.len(), 199, "interval {}", interval);
        }
    }

    #[test]
    fn test_decode_flags_compression() {
        let record = window(3600).decode("app.log.2024030510.gz").unwrap();
        assert!(record.compressed);
        assert_eq!(record.logical_name(), "app.log.2024030510");
        assert_eq!(record.timestamp, Utc.with_ymd_and_hms(2024, 3, 5, 10, 0, 0).unwrap());
    }

    #[test]
    fn test_normalize() {
        let timestamp = Utc.with_ymd_and_hms(2024, 3, 5, 10, 20, 30).unwrap()
            + ChronoDuration::microseconds(123_456);

        assert_eq!(
            threshold().normalize(&timestamp),
            Utc.with_ymd_and_hms(2024, 3, 5, 10, 20, 30).unwrap() + ChronoDuration::milliseconds(123)
        );
        assert_eq!(
            window(3600).normalize(&timestamp),
            Utc.with_ymd_and_hms(2024, 3, 5, 10, 0, 0).unwrap()
        );
    }

    proptest! {
        #[test]
        fn threshold_round_trip(
            millis in 0i64..253_402_300_799_000,
            target in prop::sample::select(vec!["app.log", "trace.gz", "server"]),
            compressed in any::<bool>(),
        ) {
            let timestamp = DateTime::from_timestamp_millis(millis).unwrap();
            let naming = BackupNaming::for_target(target, &RotationTrigger::Threshold { max_bytes: 100, max_lines: 0 });
            let name = naming.encode(&timestamp, compressed);
            let record = naming.decode(&name).unwrap();
            prop_assert_eq!(record.timestamp, timestamp);
            prop_assert_eq!(record.compressed, compressed);
            prop_assert_eq!(record.file_name, name);
        }

        #[test]
        fn window_round_trip(
            secs in 0i64..253_402_300_799,
            interval in prop::sample::select(vec![60u64, 90, 300, 3600, 7200, 86400, 129600]),
            compressed in any::<bool>(),
        ) {
            let naming = window(interval);
            let timestamp = naming.normalize(&DateTime::from_timestamp(secs, 0).unwrap());
            let name = naming.encode(&timestamp, compressed);
            let record = naming.decode(&name).unwrap();
            prop_assert_eq!(record.timestamp, timestamp);
            prop_assert_eq!(record.compressed, compressed);
        }
    }
}
