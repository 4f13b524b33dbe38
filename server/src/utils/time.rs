//! Time helpers for result materialization

use chrono::{DateTime, Utc};

/// Hour-truncated timestamp format used for `time` cells
pub const HOUR_FORMAT: &str = "%Y-%m-%d %H";

/// Epoch milliseconds to an hour-truncated UTC timestamp
pub fn epoch_millis_to_hour(millis: i64) -> Option<String> {
    DateTime::<Utc>::from_timestamp_millis(millis).map(|dt| dt.format(HOUR_FORMAT).to_string())
}

/// RFC 3339 / ISO-8601 timestamp to an hour-truncated UTC timestamp
pub fn iso_to_hour(ts: &str) -> Option<String> {
    DateTime::parse_from_rfc3339(ts)
        .ok()
        .map(|dt| dt.with_timezone(&Utc).format(HOUR_FORMAT).to_string())
}
