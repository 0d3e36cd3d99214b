use chrono::{DateTime, Local};
use serde::Serialize;

/// Fixed `YYYY-MM-DD HH:MM:SS` pattern used for every timestamp in a record.
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub const COMPANY_ID_KEY: &str = "CompanyID";
pub const USER_ID_KEY: &str = "UserID";
pub const PERMISSION_KEY: &str = "Permission";
pub const EMPTY_STRING: &str = "";

pub fn format_time(time: DateTime<Local>) -> String {
    time.format(TIME_FORMAT).to_string()
}

pub fn now_formatted() -> String {
    format_time(Local::now())
}

/// Serializes `value` to JSON text. A serialization failure yields the
/// error message instead, so callers on the logging path never fail.
pub fn to_json_string<T: Serialize + ?Sized>(value: &T) -> String {
    match serde_json::to_string(value) {
        Ok(s) => s,
        Err(e) => e.to_string(),
    }
}
