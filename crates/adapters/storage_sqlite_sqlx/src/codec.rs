//! Column encodings shared by the repositories.
//!
//! Timestamps are stored as fixed-width RFC 3339 UTC text so that string
//! comparison in SQL orders them chronologically.

use std::str::FromStr;

use chrono::SecondsFormat;
use sqlx::error::BoxDynError;

use homerule_domain::time::Timestamp;

pub(crate) fn decode_error(err: impl Into<BoxDynError>) -> sqlx::Error {
    sqlx::Error::Decode(err.into())
}

pub(crate) fn encode_ts(ts: Timestamp) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn decode_ts(text: &str) -> Result<Timestamp, sqlx::Error> {
    chrono::DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.to_utc())
        .map_err(decode_error)
}

pub(crate) fn decode_opt_ts(text: Option<String>) -> Result<Option<Timestamp>, sqlx::Error> {
    text.as_deref().map(decode_ts).transpose()
}

/// Parse an id, enum, or anything else stored through its `Display` form.
pub(crate) fn decode_str<T>(text: &str) -> Result<T, sqlx::Error>
where
    T: FromStr,
    T::Err: Into<BoxDynError>,
{
    T::from_str(text).map_err(decode_error)
}

pub(crate) fn decode_json<T: serde::de::DeserializeOwned>(text: &str) -> Result<T, sqlx::Error> {
    serde_json::from_str(text).map_err(decode_error)
}
