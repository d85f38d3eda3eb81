use chrono::{DateTime, NaiveDateTime, Utc};

/// Timestamp layout used in CSV files.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn to_rfc3339(value: NaiveDateTime) -> String {
    DateTime::<Utc>::from_naive_utc_and_offset(value, Utc).to_rfc3339()
}

pub fn format_datetime(value: NaiveDateTime) -> String {
    value.format(DATETIME_FORMAT).to_string()
}

/// Accepts [`DATETIME_FORMAT`] as well as RFC 3339. Blank means unset.
pub fn parse_datetime(value: &str) -> Result<Option<NaiveDateTime>, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    if let Ok(parsed) = NaiveDateTime::parse_from_str(trimmed, DATETIME_FORMAT) {
        return Ok(Some(parsed));
    }
    DateTime::parse_from_rfc3339(trimmed)
        .map(|parsed| Some(parsed.naive_utc()))
        .map_err(|_| format!("invalid timestamp '{trimmed}'"))
}
