//! Timestamp normalization
//!
//! Accepts `YYYY-MM-DD HH:MM:SS` with optional fractional seconds and rejects
//! values later than now (UTC) plus the tolerance window. Past timestamps are
//! always accepted: the window is one-sided.

use chrono::{NaiveDateTime, TimeDelta, Utc};
use thiserror::Error;

/// Default tolerance window in minutes
pub const DEFAULT_TOLERANCE_MINUTES: i64 = 60;

const FORMAT_FRACTIONAL: &str = "%Y-%m-%d %H:%M:%S%.f";
const FORMAT_SECONDS: &str = "%Y-%m-%d %H:%M:%S";
const FORMAT_OUTPUT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Timestamp value as it reaches the normalizer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampInput<'a> {
    Text(&'a str),
    Native(NaiveDateTime),
}

impl<'a> From<&'a str> for TimestampInput<'a> {
    fn from(text: &'a str) -> Self {
        TimestampInput::Text(text)
    }
}

impl From<NaiveDateTime> for TimestampInput<'_> {
    fn from(ts: NaiveDateTime) -> Self {
        TimestampInput::Native(ts)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimestampError {
    #[error("unparseable timestamp '{0}', expected YYYY-MM-DD HH:MM:SS[.ffffff]")]
    Parse(String),

    #[error("timestamp {timestamp} is more than {tolerance_minutes} minutes in the future")]
    OutOfTolerance {
        timestamp: NaiveDateTime,
        tolerance_minutes: i64,
    },
}

/// Parse timestamp text in one of the two accepted layouts
pub fn parse_timestamp(text: &str) -> Result<NaiveDateTime, TimestampError> {
    NaiveDateTime::parse_from_str(text, FORMAT_FRACTIONAL)
        .or_else(|_| NaiveDateTime::parse_from_str(text, FORMAT_SECONDS))
        .map_err(|_| TimestampError::Parse(text.to_string()))
}

/// Normalize against the current UTC clock
pub fn normalize<'a>(
    input: impl Into<TimestampInput<'a>>,
    tolerance_minutes: i64,
) -> Result<NaiveDateTime, TimestampError> {
    normalize_at(input, tolerance_minutes, Utc::now().naive_utc())
}

/// Normalize against an explicit `now`
pub fn normalize_at<'a>(
    input: impl Into<TimestampInput<'a>>,
    tolerance_minutes: i64,
    now: NaiveDateTime,
) -> Result<NaiveDateTime, TimestampError> {
    let timestamp = match input.into() {
        TimestampInput::Text(text) => parse_timestamp(text)?,
        TimestampInput::Native(ts) => ts,
    };

    let limit = TimeDelta::try_minutes(tolerance_minutes).and_then(|window| now.checked_add_signed(window));

    match limit {
        Some(limit) if timestamp > limit => Err(TimestampError::OutOfTolerance {
            timestamp,
            tolerance_minutes,
        }),
        _ => Ok(timestamp),
    }
}

/// Render in the fractional layout, which [`parse_timestamp`] reads back exactly
pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(FORMAT_OUTPUT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    #[test]
    fn test_parses_both_layouts() {
        assert_eq!(parse_timestamp("2024-01-01 10:00:00").unwrap(), at(10, 0, 0));

        let fractional = parse_timestamp("2024-01-01 10:00:00.250000").unwrap();
        assert_eq!(fractional.and_utc().timestamp_subsec_micros(), 250_000);
    }

    #[test]
    fn test_rejects_other_layouts() {
        for text in ["2024-01-01T10:00:00", "01/01/2024 10:00", "", "2024-13-01 10:00:00"] {
            assert!(
                matches!(parse_timestamp(text), Err(TimestampError::Parse(_))),
                "{} should not parse",
                text
            );
        }
    }

    #[test]
    fn test_future_beyond_tolerance_rejected() {
        let now = at(10, 0, 0);
        assert!(normalize_at("2024-01-01 10:59:59", 60, now).is_ok());
        assert!(normalize_at("2024-01-01 11:00:00", 60, now).is_ok());

        let err = normalize_at("2024-01-01 11:00:01", 60, now).unwrap_err();
        assert!(matches!(err, TimestampError::OutOfTolerance { tolerance_minutes: 60, .. }));
    }

    #[test]
    fn test_past_is_always_accepted() {
        let now = at(10, 0, 0);
        assert_eq!(normalize_at("2019-05-01 08:00:00", 60, now).unwrap().date().to_string(), "2019-05-01");
    }

    #[test]
    fn test_native_input_skips_parsing_but_not_tolerance() {
        let now = at(10, 0, 0);
        assert_eq!(normalize_at(at(9, 0, 0), 60, now).unwrap(), at(9, 0, 0));
        assert!(normalize_at(at(12, 0, 0), 60, now).is_err());
    }

    #[test]
    fn test_format_reads_back() {
        let ts = parse_timestamp("2024-01-01 10:00:00.123456").unwrap();
        assert_eq!(parse_timestamp(&format_timestamp(&ts)).unwrap(), ts);
        assert_eq!(format_timestamp(&at(10, 5, 0)), "2024-01-01 10:05:00.000000");
    }
}
