//! Time parsing for `since` / `until` bounds and event timestamps
//!
//! Two input forms resolve to an absolute epoch-millisecond value:
//!
//! - a relative duration `^\d+(ms|s|m|h|d)$` (case-insensitive), meaning
//!   "now minus that duration"
//! - any ISO-8601 timestamp
//!
//! Anything else resolves to `None` ("no bound"); it is not an error.

use std::sync::OnceLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use regex::Regex;

fn relative_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)^(\d+)(ms|s|m|h|d)$").expect("relative duration pattern is valid")
    })
}

/// Current time in epoch milliseconds
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// `2026-01-02T03:04:05.678Z`
pub fn format_iso(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// ISO string for an epoch-millisecond value
pub fn format_iso_ms(ms: i64) -> String {
    Utc.timestamp_millis_opt(ms)
        .single()
        .map(format_iso)
        .unwrap_or_default()
}

/// Parse a relative duration like `15m` into milliseconds
pub fn parse_duration_ms(input: &str) -> Option<i64> {
    let caps = relative_pattern().captures(input.trim())?;
    let amount: i64 = caps[1].parse().ok()?;
    let unit_ms = match caps[2].to_lowercase().as_str() {
        "ms" => 1,
        "s" => 1_000,
        "m" => 60_000,
        "h" => 3_600_000,
        "d" => 86_400_000,
        _ => return None,
    };
    amount.checked_mul(unit_ms)
}

/// Parse an absolute ISO-8601 timestamp into epoch milliseconds.
///
/// Accepts RFC 3339 with offset, a naive date-time (taken as UTC) and a bare
/// date (midnight UTC).
pub fn parse_timestamp_ms(input: &str) -> Option<i64> {
    let candidate = input.trim();
    if candidate.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(candidate) {
        return Some(parsed.timestamp_millis());
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(candidate, format) {
            return Some(naive.and_utc().timestamp_millis());
        }
    }
    NaiveDate::parse_from_str(candidate, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc().timestamp_millis())
}

/// Resolve a `since`/`until` string relative to `now_ms`.
pub fn parse_time_input_at(input: &str, now_ms: i64) -> Option<i64> {
    if let Some(duration) = parse_duration_ms(input) {
        return Some(now_ms - duration);
    }
    parse_timestamp_ms(input)
}

/// Resolve a `since`/`until` string against the current time.
pub fn parse_time_input(input: &str) -> Option<i64> {
    parse_time_input_at(input, now_ms())
}

/// UTC `YYYY-MM-DD` partition for an event timestamp, falling back to today
pub fn date_segment(ts: &str) -> String {
    let ms = parse_timestamp_ms(ts).unwrap_or_else(now_ms);
    Utc.timestamp_millis_opt(ms)
        .single()
        .unwrap_or_else(Utc::now)
        .format("%Y-%m-%d")
        .to_string()
}
