use std::convert::TryFrom;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};

pub fn to_i64(value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| anyhow!("value {value} exceeds SQLite INTEGER range"))
}

pub fn to_u64(value: i64, field: &str) -> Result<u64> {
    u64::try_from(value).map_err(|_| anyhow!("{field} contains negative value {value}"))
}

pub fn parse_datetime(value: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("failed to parse {field}"))
}

/// Fixed-width UTC form, so stored timestamps sort as text.
pub fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_date(value: &str, field: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").with_context(|| format!("failed to parse {field}"))
}

pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_conversions_reject_out_of_range() {
        assert_eq!(to_i64(42).unwrap(), 42);
        assert!(to_i64(u64::MAX).is_err());
        assert!(to_u64(-1, "tokens").is_err());
    }

    #[test]
    fn dates_round_trip_through_text() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        assert_eq!(format_date(date), "2024-03-09");
        assert_eq!(parse_date("2024-03-09", "date").unwrap(), date);
        assert!(parse_date("March 9", "date").is_err());
    }

    #[test]
    fn parses_rfc3339_timestamps() {
        let parsed = parse_datetime("2024-03-09T10:00:00+02:00", "timestamp").unwrap();
        assert_eq!(parsed.to_rfc3339(), "2024-03-09T08:00:00+00:00");
        assert!(parse_datetime("yesterday", "timestamp").is_err());
        assert_eq!(format_timestamp(parsed), "2024-03-09T08:00:00.000Z");
    }
}
