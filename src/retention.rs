//! Retention planning
//!
//! Decides, from a directory listing alone, which backups are removed, which
//! are compressed and which are left alone, then carries that plan out.

use std::collections::HashSet;
use std::path::Path;
use std::time::Instant;

use chrono::{DateTime, Duration as ChronoDuration, Utc};

use crate::backup::{remove_backup, BackupRecord, COMPRESS_SUFFIX};
use crate::compression::compress_file;
use crate::config::SinkConfig;
use crate::error::Error;

/// The retention part of a sink configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetentionPolicy {
    /// Logical backups to keep (0 = unlimited)
    pub max_backups: u32,
    /// Maximum age in days (0 = unlimited)
    pub max_age_days: u32,
    /// Compress uncompressed backups older than this many days
    pub compress_after_days: Option<u32>,
}

impl From<&SinkConfig> for RetentionPolicy {
    fn from(config: &SinkConfig) -> Self {
        Self {
            max_backups: config.max_backups,
            max_age_days: config.max_age_days,
            compress_after_days: config.effective_compress_after(),
        }
    }
}

impl RetentionPolicy {
    /// Whether a pass can ever do anything
    pub fn is_active(&self) -> bool {
        self.max_backups > 0 || self.max_age_days > 0 || self.compress_after_days.is_some()
    }
}

/// What one maintenance pass will do
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetentionPlan {
    /// Backups to delete
    pub remove: Vec<BackupRecord>,
    /// Backups to gzip
    pub compress: Vec<BackupRecord>,
    /// Backups left as they are
    pub keep: Vec<BackupRecord>,
}

impl RetentionPlan {
    /// Check if the plan has no work in it
    pub fn is_empty(&self) -> bool {
        self.remove.is_empty() && self.compress.is_empty()
    }
}

/// Outcome of executing a plan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    /// File names removed
    pub removed: Vec<String>,
    /// File names compressed (names before compression)
    pub compressed: Vec<String>,
    /// Removals that failed
    pub removal_failures: usize,
    /// Compressions that failed
    pub compression_failures: usize,
}

impl MaintenanceReport {
    /// Total number of failures
    pub fn failures(&self) -> usize {
        self.removal_failures + self.compression_failures
    }
}

/// Build the retention plan for `backups` at time `now`.
pub fn plan(mut backups: Vec<BackupRecord>, now: DateTime<Utc>, policy: &RetentionPolicy) -> RetentionPlan {
    backups.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.file_name.cmp(&b.file_name)));

    let mut marked: HashSet<String> = HashSet::new();

    if policy.max_backups > 0 {
        // Walk newest first; the first `max_backups` logical backups survive,
        // together with both of their suffix variants.
        let mut survivors: HashSet<&str> = HashSet::new();
        let mut excess: Vec<&str> = Vec::new();
        for record in backups.iter().rev() {
            let logical = record.logical_name();
            if survivors.contains(logical) {
                continue;
            }
            if survivors.len() < policy.max_backups as usize {
                survivors.insert(logical);
            } else {
                excess.push(&record.file_name);
            }
        }
        marked.extend(excess.into_iter().map(str::to_string));
    }

    if policy.max_age_days > 0 {
        if let Some(cutoff) = days_before(now, policy.max_age_days) {
            for record in &backups {
                if record.is_before(&cutoff) {
                    marked.insert(record.file_name.clone());
                }
            }
        }
    }

    let compress_cutoff = policy.compress_after_days.and_then(|days| days_before(now, days));

    let mut result = RetentionPlan::default();
    for record in backups {
        if marked.contains(&record.file_name) {
            result.remove.push(record);
        } else if !record.compressed
            && compress_cutoff.map_or(false, |cutoff| record.is_before(&cutoff))
        {
            result.compress.push(record);
        } else {
            result.keep.push(record);
        }
    }

    result
}

/// `now` minus `days`, or `None` when that lies before the earliest
/// representable time and so nothing can be older.
fn days_before(now: DateTime<Utc>, days: u32) -> Option<DateTime<Utc>> {
    ChronoDuration::try_days(i64::from(days)).and_then(|age| now.checked_sub_signed(age))
}

/// Carry out a plan in `dir`: all removals first, then compressions one at a
/// time. Each failure goes to `on_error` and the rest of the plan continues.
pub fn execute(dir: &Path, plan: &RetentionPlan, on_error: &dyn Fn(&Error)) -> MaintenanceReport {
    let mut report = MaintenanceReport::default();

    for record in &plan.remove {
        match remove_backup(dir, record) {
            Ok(()) => {
                tracing::debug!(file = %record.file_name, "removed backup");
                report.removed.push(record.file_name.clone());
            }
            Err(err) => {
                report.removal_failures += 1;
                on_error(&err);
            }
        }
    }

    for record in &plan.compress {
        let src = record.path(dir);
        let dst = dir.join(format!("{}{}", record.file_name, COMPRESS_SUFFIX));
        let start = Instant::now();
        match compress_file(&src, &dst) {
            Ok(stats) => {
                tracing::debug!(
                    file = %record.file_name,
                    ratio = stats.ratio,
                    elapsed = ?start.elapsed(),
                    "compressed backup"
                );
                report.compressed.push(record.file_name.clone());
            }
            Err(err) => {
                report.compression_failures += 1;
                on_error(&err);
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::{list_backups, BackupNaming};
    use crate::compression::read_backup;
    use crate::config::RotationTrigger;
    use chrono::TimeZone;
    use parking_lot::Mutex;
    use std::fs;
    use tempfile::tempdir;

    fn naming() -> BackupNaming {
        BackupNaming::for_target("app.log", &RotationTrigger::TimeWindow { interval_secs: 86400 })
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 20, 12, 0, 0).unwrap()
    }

    /// Backups `days_ago` days before `now()`, optionally compressed
    fn backups(entries: &[(i64, bool)]) -> Vec<BackupRecord> {
        let naming = naming();
        entries.iter()
            .map(|&(days_ago, compressed)| {
                let timestamp = naming.normalize(&(now() - ChronoDuration::days(days_ago)));
                naming.decode(&naming.encode(&timestamp, compressed)).unwrap()
            })
            .collect()
    }

    fn names(records: &[BackupRecord]) -> Vec<String> {
        records.iter().map(|r| r.file_name.clone()).collect()
    }

    #[test]
    fn test_inactive_policy_keeps_everything() {
        let plan = plan(backups(&[(1, false), (2, false)]), now(), &RetentionPolicy::default());
        assert!(plan.is_empty());
        assert_eq!(plan.keep.len(), 2);
    }

    #[test]
    fn test_max_backups_keeps_newest() {
        let policy = RetentionPolicy { max_backups: 2, ..Default::default() };
        let plan = plan(backups(&[(5, false), (1, false), (3, false), (4, false), (2, false)]), now(), &policy);

        assert_eq!(names(&plan.keep), names(&backups(&[(2, false), (1, false)])));
        assert_eq!(
            names(&plan.remove),
            names(&backups(&[(5, false), (4, false), (3, false)]))
        );
    }

    #[test]
    fn test_max_backups_counts_suffix_pairs_once() {
        let policy = RetentionPolicy { max_backups: 2, ..Default::default() };
        // Day 2 exists in both forms (interrupted compression)
        let plan = plan(
            backups(&[(3, true), (2, false), (2, true), (1, false)]),
            now(),
            &policy,
        );

        assert_eq!(plan.keep.len(), 3);
        assert_eq!(names(&plan.remove), names(&backups(&[(3, true)])));

        let policy = RetentionPolicy { max_backups: 1, ..Default::default() };
        let plan = self::plan(
            backups(&[(2, false), (2, true), (1, false)]),
            now(),
            &policy,
        );
        // Both variants of the excess backup go
        assert_eq!(plan.remove.len(), 2);
        assert_eq!(names(&plan.keep), names(&backups(&[(1, false)])));
    }

    #[test]
    fn test_max_age() {
        let policy = RetentionPolicy { max_age_days: 7, ..Default::default() };
        let plan = plan(backups(&[(10, true), (8, false), (6, false), (1, false)]), now(), &policy);

        assert_eq!(names(&plan.remove), names(&backups(&[(10, true), (8, false)])));
        assert_eq!(plan.keep.len(), 2);
    }

    #[test]
    fn test_count_and_age_marks_are_merged() {
        let policy = RetentionPolicy { max_backups: 2, max_age_days: 7, ..Default::default() };
        let plan = plan(backups(&[(10, false), (3, false), (2, false), (1, false)]), now(), &policy);

        // Day 10 is both too old and in excess; it is listed once
        assert_eq!(names(&plan.remove), names(&backups(&[(10, false), (3, false)])));
    }

    #[test]
    fn test_cutoff_beyond_calendar_range() {
        let policy = RetentionPolicy {
            max_age_days: u32::MAX,
            compress_after_days: Some(u32::MAX),
            ..Default::default()
        };
        let plan = plan(backups(&[(3, false), (1, false)]), now(), &policy);

        assert!(plan.is_empty());
        assert_eq!(plan.keep.len(), 2);
    }

    #[test]
    fn test_compress_candidates() {
        let policy = RetentionPolicy { compress_after_days: Some(2), max_age_days: 9, ..Default::default() };
        let plan = plan(
            backups(&[(12, false), (5, false), (4, true), (3, false), (1, false)]),
            now(),
            &policy,
        );

        assert_eq!(names(&plan.remove), names(&backups(&[(12, false)])));
        assert_eq!(names(&plan.compress), names(&backups(&[(5, false), (3, false)])));
        assert_eq!(names(&plan.keep), names(&backups(&[(4, true), (1, false)])));
    }

    #[test]
    fn test_compression_disabled_when_it_would_follow_deletion() {
        let config = SinkConfig::new().with_max_age_days(3).with_compression(5);
        let policy = RetentionPolicy::from(&config);
        assert_eq!(policy.compress_after_days, None);

        let plan = plan(backups(&[(4, false), (2, false)]), now(), &policy);
        assert!(plan.compress.is_empty());
        assert_eq!(plan.remove.len(), 1);
    }

    #[test]
    fn test_execute_plan() -> crate::error::Result<()> {
        let temp_dir = tempdir()?;
        let dir = temp_dir.path();

        let all = backups(&[(9, false), (3, false), (1, false)]);
        for record in &all {
            fs::write(record.path(dir), record.file_name.as_bytes())?;
        }
        fs::write(dir.join("foreign.txt"), b"keep me")?;

        let policy = RetentionPolicy { max_age_days: 7, compress_after_days: Some(2), ..Default::default() };
        let listed = list_backups(dir, &naming())?;
        let plan = plan(listed, now(), &policy);

        let errors = Mutex::new(Vec::new());
        let report = execute(dir, &plan, &|err| errors.lock().push(err.to_string()));

        assert!(errors.lock().is_empty());
        assert_eq!(report.removed, vec![all[0].file_name.clone()]);
        assert_eq!(report.compressed, vec![all[1].file_name.clone()]);
        assert_eq!(report.failures(), 0);

        assert!(!all[0].path(dir).exists());
        assert!(!all[1].path(dir).exists());
        let packed = dir.join(format!("{}.gz", all[1].file_name));
        assert_eq!(read_backup(&packed)?, all[1].file_name.as_bytes());
        assert!(all[2].path(dir).exists());
        assert!(dir.join("foreign.txt").exists());

        Ok(())
    }

    #[test]
    fn test_failed_removal_does_not_stop_the_rest() -> crate::error::Result<()> {
        let temp_dir = tempdir()?;
        let dir = temp_dir.path();

        let all = backups(&[(9, false), (8, false), (7, false)]);
        // A directory squatting on the oldest name cannot be removed as a file
        fs::create_dir(all[0].path(dir))?;
        fs::write(all[1].path(dir), b"second")?;
        fs::write(all[2].path(dir), b"third")?;

        let plan = RetentionPlan {
            remove: all.clone(),
            ..Default::default()
        };

        let errors = Mutex::new(Vec::new());
        let report = execute(dir, &plan, &|err| errors.lock().push(err.to_string()));

        assert_eq!(report.removal_failures, 1);
        assert_eq!(errors.lock().len(), 1);
        assert!(errors.lock()[0].contains(&all[0].file_name));
        assert_eq!(report.removed, names(&all[1..]));
        assert!(all[0].path(dir).is_dir());
        assert!(!all[1].path(dir).exists());
        assert!(!all[2].path(dir).exists());

        Ok(())
    }

    #[test]
    fn test_execute_reports_and_continues() -> crate::error::Result<()> {
        let temp_dir = tempdir()?;
        let dir = temp_dir.path();

        let all = backups(&[(6, false), (5, false)]);
        // The first candidate is missing on disk, the second is present
        fs::write(all[1].path(dir), b"payload")?;

        let plan = RetentionPlan {
            compress: all.clone(),
            ..Default::default()
        };

        let errors = Mutex::new(Vec::new());
        let report = execute(dir, &plan, &|err| errors.lock().push(err.to_string()));

        assert_eq!(report.compression_failures, 1);
        assert_eq!(errors.lock().len(), 1);
        assert_eq!(report.compressed, vec![all[1].file_name.clone()]);
        assert!(!dir.join(format!("{}.gz", all[0].file_name)).exists());

        Ok(())
    }
}
