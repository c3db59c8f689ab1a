//! Window timestamp precision
//!
//! Time-mode backups embed the window boundary as a fixed-width digit string.
//! Longer intervals get coarser digits: date only from one day up, date and
//! hour from one hour up, date, hour and minute below that.

use std::fmt;
use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc};

const SECS_PER_MINUTE: u64 = 60;
const SECS_PER_HOUR: u64 = 60 * SECS_PER_MINUTE;
const SECS_PER_DAY: u64 = 24 * SECS_PER_HOUR;

/// Precision of a time-mode backup timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WindowPrecision {
    /// `YYYYMMDD`
    Day,
    /// `YYYYMMDDHH`
    Hour,
    /// `YYYYMMDDHHMM`
    Minute,
}

impl fmt::Display for WindowPrecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WindowPrecision::Day => write!(f, "day"),
            WindowPrecision::Hour => write!(f, "hour"),
            WindowPrecision::Minute => write!(f, "minute"),
        }
    }
}

impl WindowPrecision {
    /// Pick the precision for an interval by its magnitude
    pub fn for_interval(interval_secs: u64) -> Self {
        if interval_secs >= SECS_PER_DAY {
            Self::Day
        } else if interval_secs >= SECS_PER_HOUR {
            Self::Hour
        } else {
            Self::Minute
        }
    }

    /// Number of digits in the rendered timestamp
    pub fn width(&self) -> usize {
        match self {
            Self::Day => 8,
            Self::Hour => 10,
            Self::Minute => 12,
        }
    }

    /// Length of one unit of this precision in seconds
    pub fn unit_secs(&self) -> i64 {
        match self {
            Self::Day => SECS_PER_DAY as i64,
            Self::Hour => SECS_PER_HOUR as i64,
            Self::Minute => SECS_PER_MINUTE as i64,
        }
    }

    /// Round a timestamp down to this precision
    pub fn truncate(&self, timestamp: &DateTime<Utc>) -> DateTime<Utc> {
        let unit = self.unit_secs();
        let secs = timestamp.timestamp().div_euclid(unit) * unit;
        DateTime::from_timestamp(secs, 0).unwrap_or(*timestamp)
    }

    /// Render a timestamp as a digit string
    pub fn format(&self, timestamp: &DateTime<Utc>) -> String {
        let date = format!("{:04}{:02}{:02}", timestamp.year(), timestamp.month(), timestamp.day());
        match self {
            Self::Day => date,
            Self::Hour => format!("{}{:02}", date, timestamp.hour()),
            Self::Minute => format!("{}{:02}{:02}", date, timestamp.hour(), timestamp.minute()),
        }
    }

    /// Parse a digit string produced by [`format`](Self::format)
    pub fn parse(&self, digits: &str) -> Option<DateTime<Utc>> {
        if digits.len() != self.width() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }

        let field = |range: std::ops::Range<usize>| digits[range].parse::<u32>().ok();

        let year = digits[0..4].parse::<i32>().ok()?;
        let month = field(4..6)?;
        let day = field(6..8)?;
        let hour = if self.width() >= 10 { field(8..10)? } else { 0 };
        let minute = if self.width() >= 12 { field(10..12)? } else { 0 };

        let timestamp = Utc
            .with_ymd_and_hms(year, month, day, hour, minute, 0)
            .single()?;

        // Reject anything that would not render back to the same digits
        if self.format(&timestamp) != digits {
            return None;
        }

        Some(timestamp)
    }
}
