//! Timestamp helpers shared by every stage of the pipeline
//!
//! All tables exchanged between stages carry their timestamps as text in the
//! canonical form `YYYY-MM-DD HH:MM:SS+06:00` (Dhaka local time, fixed offset,
//! no daylight saving). Anything we read is normalised into that form before
//! it is compared or written.
//!
//! # Examples
//!
//! ```
//! use dpdc_load_pipeline::timestamp::{format_timestamp, parse_timestamp};
//!
//! let ts = parse_timestamp("2024-03-01 14:00").unwrap();
//! assert_eq!(format_timestamp(&ts), "2024-03-01 14:00:00+06:00");
//!
//! let utc = parse_timestamp("2024-03-01T08:00:00+00:00").unwrap();
//! assert_eq!(format_timestamp(&utc), "2024-03-01 14:00:00+06:00");
//! ```
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, Timelike};
use thiserror::Error;

/// Offset of Asia/Dhaka from UTC in seconds (UTC+06:00)
pub const DHAKA_OFFSET_SECONDS: i32 = 6 * 3600;

/// Output format of every `date_time` column
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%:z";

/// Naive layouts accepted when a value carries no offset; interpreted as Dhaka local time
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d-%b-%Y", "%d %B %Y", "%B %d, %Y", "%d/%m/%Y"];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimestampError {
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Invalid date: {0}")]
    InvalidDate(String),
}

pub fn dhaka_offset() -> FixedOffset {
    FixedOffset::east_opt(DHAKA_OFFSET_SECONDS).expect("UTC+06:00 is a valid offset")
}

/// Attach the Dhaka offset to a wall-clock time without shifting it
pub fn localize(naive: NaiveDateTime) -> DateTime<FixedOffset> {
    let offset = dhaka_offset();
    let utc = naive - Duration::seconds(i64::from(offset.local_minus_utc()));
    DateTime::from_naive_utc_and_offset(utc, offset)
}

pub fn format_timestamp(ts: &DateTime<FixedOffset>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a timestamp in any of the layouts seen in the source files
///
/// Values with an explicit offset are converted to the Dhaka offset, values
/// without one are taken to already be Dhaka local time.
pub fn parse_timestamp(value: &str) -> Result<DateTime<FixedOffset>, TimestampError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(TimestampError::InvalidTimestamp(value.to_string()));
    }

    let offset = dhaka_offset();

    if let Ok(dt) = DateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S%:z") {
        return Ok(dt.with_timezone(&offset));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.with_timezone(&offset));
    }

    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(localize(naive));
        }
    }

    // A bare date means midnight
    if let Ok(date) = parse_date(trimmed) {
        return Ok(localize(date.and_time(chrono::NaiveTime::MIN)));
    }

    Err(TimestampError::InvalidTimestamp(value.to_string()))
}

pub fn parse_date(value: &str) -> Result<NaiveDate, TimestampError> {
    let trimmed = value.trim();
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return Ok(date);
        }
    }

    // Datetime text in a date column: keep the calendar day
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(naive.date());
        }
    }

    Err(TimestampError::InvalidDate(value.to_string()))
}

/// Convert an Excel serial day number (1900 date system) to a datetime
///
/// The fractional part is the time of day; it is rounded to the nearest
/// second to absorb floating point noise (0.041666... is 01:00:00).
pub fn excel_serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() || serial < 0.0 {
        return None;
    }

    let base = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let seconds = (serial * 86_400.0).round() as i64;
    base.checked_add_signed(Duration::seconds(seconds))
}

/// True when the timestamp sits exactly on the hour
pub fn is_on_the_hour(ts: &DateTime<FixedOffset>) -> bool {
    ts.minute() == 0 && ts.second() == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_canonical_round_trip_text() {
        let ts = parse_timestamp("2023-01-01 05:00:00+06:00").unwrap();
        assert_eq!(format_timestamp(&ts), "2023-01-01 05:00:00+06:00");
    }

    #[test]
    fn test_parse_naive_is_dhaka_local() {
        let ts = parse_timestamp("2023-01-01 05:15").unwrap();
        assert_eq!(format_timestamp(&ts), "2023-01-01 05:15:00+06:00");
    }

    #[test]
    fn test_parse_other_offset_is_converted() {
        let ts = parse_timestamp("2023-01-01 00:00:00+00:00").unwrap();
        assert_eq!(format_timestamp(&ts), "2023-01-01 06:00:00+06:00");
    }

    #[test]
    fn test_parse_bare_date_is_midnight() {
        let ts = parse_timestamp("2023-02-21").unwrap();
        assert_eq!(format_timestamp(&ts), "2023-02-21 00:00:00+06:00");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_timestamp("Total").is_err());
        assert!(parse_timestamp("   ").is_err());
    }

    #[test]
    fn test_parse_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 2, 21).unwrap();
        assert_eq!(parse_date("2024-02-21").unwrap(), expected);
        assert_eq!(parse_date("21-Feb-2024").unwrap(), expected);
        assert_eq!(parse_date("2024-02-21 00:00:00").unwrap(), expected);
        assert!(parse_date("Shaheed Day").is_err());
    }

    #[test]
    fn test_excel_serial_with_time_of_day() {
        // 45292 = 2024-01-01, 0.25 = 06:00
        let dt = excel_serial_to_datetime(45292.25).unwrap();
        assert_eq!(dt.to_string(), "2024-01-01 06:00:00");

        // 1/96 of a day is 15 minutes; repeated addition drifts without rounding
        let quarter = excel_serial_to_datetime(45292.0 + 1.0 / 96.0).unwrap();
        assert_eq!(quarter.to_string(), "2024-01-01 00:15:00");
    }

    #[test]
    fn test_excel_serial_rejects_negative() {
        assert!(excel_serial_to_datetime(-1.0).is_none());
        assert!(excel_serial_to_datetime(f64::NAN).is_none());
    }

    #[test]
    fn test_is_on_the_hour() {
        assert!(is_on_the_hour(&parse_timestamp("2024-01-01 03:00").unwrap()));
        assert!(!is_on_the_hour(&parse_timestamp("2024-01-01 03:15").unwrap()));
    }
}
