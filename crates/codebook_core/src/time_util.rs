//! Shared timestamp helpers.

use chrono::Utc;

/// Current wall-clock time as Unix milliseconds.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}
