//! Database helper functions for safe type conversions.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Type;

pub(crate) const DAY_FORMAT: &str = "%Y-%m-%d";

/// Parse an RFC3339 datetime string from database, returning a rusqlite error on failure.
pub(crate) fn parse_datetime(s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e)))
}

/// Parse a `YYYY-MM-DD` day key from database, returning a rusqlite error on failure.
pub(crate) fn parse_day(s: &str) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(s, DAY_FORMAT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e)))
}

pub(crate) fn format_day(day: NaiveDate) -> String {
    day.format(DAY_FORMAT).to_string()
}

/// SQLite stores counters as i64; clamp into the u32 the models use.
pub(crate) fn to_u32(value: i64) -> u32 {
    u32::try_from(value.max(0)).unwrap_or(u32::MAX)
}
