//! Time bucketing of event timestamps.
//!
//! Buckets are decimal calendar stamps in UTC: `YYYYMMDDHHmm` for minutes,
//! `YYYYMMDDHH` for hours and `YYYYMMDD` for days.

use crate::core::{MeterflowError, Result};
use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// Bucket granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Minute,
    Hour,
    Day,
}

/// Truncate a millisecond timestamp to its bucket.
pub fn time_bucket(timestamp_millis: i64, granularity: Granularity) -> Result<i64> {
    let at: DateTime<Utc> = DateTime::from_timestamp_millis(timestamp_millis).ok_or_else(|| {
        MeterflowError::InvalidIdentity(format!("timestamp {} out of range", timestamp_millis))
    })?;

    let day = i64::from(at.year()) * 10_000 + i64::from(at.month()) * 100 + i64::from(at.day());
    let bucket = match granularity {
        Granularity::Day => day,
        Granularity::Hour => day * 100 + i64::from(at.hour()),
        Granularity::Minute => (day * 100 + i64::from(at.hour())) * 100 + i64::from(at.minute()),
    };
    Ok(bucket)
}

impl Granularity {
    /// Coarsen a minute bucket to this granularity.
    pub fn from_minute_bucket(self, minute_bucket: i64) -> i64 {
        match self {
            Granularity::Minute => minute_bucket,
            Granularity::Hour => minute_bucket / 100,
            Granularity::Day => minute_bucket / 10_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2024-03-05T07:42:19.500Z
    const TS: i64 = 1_709_624_539_500;

    #[test]
    fn test_minute_hour_day() {
        assert_eq!(time_bucket(TS, Granularity::Minute).unwrap(), 202403050742);
        assert_eq!(time_bucket(TS, Granularity::Hour).unwrap(), 2024030507);
        assert_eq!(time_bucket(TS, Granularity::Day).unwrap(), 20240305);
    }

    #[test]
    fn test_same_window_same_bucket() {
        let start_of_minute = 1_709_624_520_000;
        let end_of_minute = start_of_minute + 59_999;
        assert_eq!(
            time_bucket(start_of_minute, Granularity::Minute).unwrap(),
            time_bucket(end_of_minute, Granularity::Minute).unwrap()
        );
        assert!(
            time_bucket(end_of_minute + 1, Granularity::Minute).unwrap()
                > time_bucket(end_of_minute, Granularity::Minute).unwrap()
        );
    }

    #[test]
    fn test_epoch() {
        assert_eq!(time_bucket(0, Granularity::Minute).unwrap(), 197001010000);
    }

    #[test]
    fn test_coarsen_minute_bucket() {
        assert_eq!(Granularity::Hour.from_minute_bucket(202403050742), 2024030507);
        assert_eq!(Granularity::Day.from_minute_bucket(202403050742), 20240305);
    }

    #[test]
    fn test_out_of_range() {
        assert!(time_bucket(i64::MAX, Granularity::Day).is_err());
    }
}
