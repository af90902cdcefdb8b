use chrono::{DateTime, Local, NaiveDate, TimeZone};

/// Returns the current time as milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Local calendar day containing the given epoch milliseconds.
pub fn local_date(ms: u64) -> NaiveDate {
    Local
        .timestamp_millis_opt(ms as i64)
        .single()
        .map(|dt| dt.date_naive())
        .unwrap_or_default()
}

/// Epoch milliseconds of `now` minus `days` whole days.
pub fn days_ago_ms(now: DateTime<Local>, days: i64) -> u64 {
    (now - chrono::Duration::days(days)).timestamp_millis().max(0) as u64
}
