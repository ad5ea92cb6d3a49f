use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{SecondsFormat, TimeZone, Utc};

use crate::error::{Error, Result};

/// Current wall clock in unix milliseconds.
pub fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("System clock before unix epoch")
        .as_millis() as u64
}

/// Format unix milliseconds as an ISO-8601 / RFC 3339 UTC timestamp.
pub fn to_rfc3339(millis: u64) -> Result<String> {
    let dt = Utc
        .timestamp_millis_opt(millis as i64)
        .single()
        .ok_or_else(|| Error::Internal(format!("Timestamp out of range: {}", millis)))?;
    Ok(dt.to_rfc3339_opts(SecondsFormat::Millis, true))
}
