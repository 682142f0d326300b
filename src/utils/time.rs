use chrono::{DateTime, NaiveDateTime, Utc};

/// Timestamps are stored as UTC and rendered as RFC 3339.
pub fn to_iso(dt: NaiveDateTime) -> String {
    DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc).to_rfc3339()
}
