//! Timestamp codec for the textual forms the remote accepts and returns.
//!
//! PostgreSQL `TIMESTAMPTZ` values come back from the remote in a handful of
//! textual shapes, with or without timezone qualifiers. Parsing is lenient
//! (five accepted forms, tried in priority order); output is canonical (UTC,
//! `YYYY-MM-DDTHH:MM:SSZ`, always). The asymmetry is deliberate: the remote
//! controls what it returns, the sender controls what it sends.
//!
//! Unparseable input resolves to the [`UNKNOWN`] sentinel rather than an
//! error type — callers treat `0` as "no usable timestamp", never as a
//! legitimate epoch value.

use chrono::{DateTime, NaiveDateTime, Utc};

/// Sentinel returned by [`parse`] when no accepted form matches.
pub const UNKNOWN: u32 = 0;

/// Accepted input forms, tried in priority order.
///
/// The first two carry an explicit UTC offset; the rest are taken as UTC.
const OFFSET_FORMATS: [&str; 2] = [
    // "2023-10-15 14:30:25+10:30"
    "%Y-%m-%d %H:%M:%S%:z",
    // "2023-10-15 14:30:25+10" (minutes optional)
    "%Y-%m-%d %H:%M:%S%#z",
];

const UTC_FORMATS: [&str; 3] = [
    // "2023-10-15T14:30:25Z"
    "%Y-%m-%dT%H:%M:%SZ",
    // "2023-10-15T14:30:25"
    "%Y-%m-%dT%H:%M:%S",
    // "2023-10-15 14:30:25"
    "%Y-%m-%d %H:%M:%S",
];

/// Parses a remote timestamp into epoch seconds.
///
/// Returns [`UNKNOWN`] (`0`) if the text matches none of the accepted forms
/// exactly, or if the instant does not fit the 32-bit epoch range the log
/// store keys on.
pub fn parse(text: &str) -> u32 {
    for format in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(text, format) {
            return clamp_epoch(dt.timestamp());
        }
    }

    for format in UTC_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return clamp_epoch(naive.and_utc().timestamp());
        }
    }

    UNKNOWN
}

/// Formats epoch seconds in the canonical outbound form.
///
/// Always emits UTC as `YYYY-MM-DDTHH:MM:SSZ`, regardless of which form was
/// accepted on input.
pub fn format(epoch: u32) -> String {
    let dt = DateTime::<Utc>::from_timestamp(i64::from(epoch), 0)
        .expect("u32 epoch seconds are always representable");
    dt.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Maps an instant to `u32` epoch seconds, or [`UNKNOWN`] if out of range.
fn clamp_epoch(seconds: i64) -> u32 {
    u32::try_from(seconds).unwrap_or(UNKNOWN)
}
