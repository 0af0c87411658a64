//! Time and timestamp helpers.

use chrono::{DateTime, NaiveTime, Utc};

/// UTC timestamp used for `started_at`, `resume_at`, event times, etc.
pub type Timestamp = DateTime<Utc>;

/// Return the current UTC time.
#[must_use]
pub fn now() -> Timestamp {
    Utc::now()
}

/// Parse a wall-clock time written as `HH:MM` (24-hour).
///
/// # Errors
///
/// Returns the underlying [`chrono::ParseError`] when the text is not `HH:MM`.
pub fn parse_time_of_day(text: &str) -> Result<NaiveTime, chrono::ParseError> {
    NaiveTime::parse_from_str(text.trim(), "%H:%M")
}

/// Whether `at` falls inside the half-open window `[start, end)`.
///
/// A window whose `end` is earlier than its `start` wraps past midnight
/// (e.g. `22:00..06:00`).
#[must_use]
pub fn is_within_window(start: NaiveTime, end: NaiveTime, at: NaiveTime) -> bool {
    if start <= end {
        start <= at && at < end
    } else {
        at >= start || at < end
    }
}
