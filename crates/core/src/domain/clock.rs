//! Filename clock
//!
//! Camera files carry their capture time in the first 14 characters of the
//! file name (`YYYYMMDDhhmmss`, UTC). Everything the scheduler orders or
//! compares against a watermark goes through this module.

use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::path::Path;

/// Width of the timestamp prefix in a camera file name
const STAMP_WIDTH: usize = 14;

/// Observing nights roll over at local noon, approximated as UTC minus 12h
const NIGHT_OFFSET_SECS: i64 = 12 * 3600;

/// Logical instant in seconds since the Unix epoch
///
/// Fractional seconds are allowed: watermarks are nudged by sub-second
/// epsilons so that files sharing a timestamp are never skipped.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogicalTime(f64);

impl LogicalTime {
    pub const ZERO: LogicalTime = LogicalTime(0.0);

    pub fn from_secs(secs: f64) -> Self {
        Self(secs)
    }

    pub fn as_secs(&self) -> f64 {
        self.0
    }

    /// Shift by a (possibly negative) number of seconds
    pub fn offset(&self, secs: f64) -> Self {
        Self(self.0 + secs)
    }
}

impl PartialEq for LogicalTime {
    fn eq(&self, other: &Self) -> bool {
        self.0.total_cmp(&other.0) == Ordering::Equal
    }
}

impl Eq for LogicalTime {}

impl PartialOrd for LogicalTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LogicalTime {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl std::fmt::Display for LogicalTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.1}", self.0)
    }
}

/// Derive the logical instant encoded in a file name
///
/// Only the basename is inspected. Returns `None` when the prefix is too
/// short, not numeric, or not a valid calendar date/time.
pub fn instant_from_filename(name: &str) -> Option<LogicalTime> {
    let base = Path::new(name).file_name()?.to_str()?;
    let stamp = base.get(..STAMP_WIDTH)?;
    if !stamp.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let field = |range: std::ops::Range<usize>| stamp[range].parse::<u32>().ok();
    let year = i32::try_from(field(0..4)?).ok()?;
    let date = NaiveDate::from_ymd_opt(year, field(4..6)?, field(6..8)?)?;
    let datetime = date.and_hms_opt(field(8..10)?, field(10..12)?, field(12..14)?)?;

    Some(LogicalTime(datetime.and_utc().timestamp() as f64))
}

/// Night label (`YYYYMMDD`) for the file, used as the output subdirectory
///
/// A night is named after the date on which it started, so anything captured
/// before noon UTC belongs to the previous day.
pub fn day_name_from_filename(name: &str) -> Option<String> {
    let instant = instant_from_filename(name)?;
    let shifted = DateTime::from_timestamp(instant.as_secs() as i64 - NIGHT_OFFSET_SECS, 0)?;
    Some(shifted.format("%Y%m%d").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_prefix() {
        let t = instant_from_filename("20150309220000_cam1.rawvid").unwrap();
        assert_eq!(t.as_secs(), 1_425_938_400.0);
    }

    #[test]
    fn test_uses_basename_only() {
        let a = instant_from_filename("/data/2015/20150309220000.mp4").unwrap();
        let b = instant_from_filename("20150309220000.mp4").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_rejects_malformed_names() {
        assert!(instant_from_filename("notes.txt").is_none());
        assert!(instant_from_filename("2015030922").is_none());
        assert!(instant_from_filename("20151309220000.png").is_none()); // month 13
        assert!(instant_from_filename("20150230220000.png").is_none()); // Feb 30
        assert!(instant_from_filename("20150309226100.png").is_none()); // minute 61
    }

    #[test]
    fn test_night_label_rolls_over_at_noon() {
        assert_eq!(
            day_name_from_filename("20150310030000.png").as_deref(),
            Some("20150309")
        );
        assert_eq!(
            day_name_from_filename("20150310130000.png").as_deref(),
            Some("20150310")
        );
    }

    #[test]
    fn test_ordering_is_total() {
        let mut times = vec![
            LogicalTime::from_secs(3.0),
            LogicalTime::from_secs(1.0),
            LogicalTime::from_secs(2.5),
        ];
        times.sort();
        assert_eq!(times[0].as_secs(), 1.0);
        assert!(LogicalTime::from_secs(1.0).offset(0.1) > LogicalTime::from_secs(1.0));
    }
}
