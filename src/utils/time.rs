//! Time utility functions

use chrono::{DateTime, Utc};

/// Parse an RFC 3339 timestamp string to DateTime<Utc>, falling back to the epoch.
pub fn parse_iso_timestamp(ts: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(ts)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| {
            tracing::warn!(ts, "Invalid ISO timestamp, using epoch");
            DateTime::UNIX_EPOCH
        })
}

/// Format a DateTime<Utc> as an RFC 3339 string with millisecond precision.
pub fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Current time, formatted the same way as `format_timestamp`.
pub fn now_timestamp() -> String {
    format_timestamp(Utc::now())
}
