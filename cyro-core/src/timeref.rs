use std::sync::LazyLock;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use regex::Regex;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TimeRefError {
    #[error("time reference is empty")]
    Empty,
    #[error("invalid time reference: {0}")]
    InvalidTime(String),
    #[error("invalid relative duration: {0}")]
    InvalidDuration(String),
}

static DURATION_TOKEN_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)([dhms])").expect("duration token regex"));

/// Parses an absolute timestamp or a relative duration.
///
/// Absolute forms: RFC 3339, `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DD`.
/// Relative forms are runs of `{integer}{d|h|m|s}` tokens (e.g. `1h30m`,
/// `2d`) and mean "now minus this duration".
pub fn parse_time_ref(s: &str) -> Result<DateTime<Utc>, TimeRefError> {
    parse_time_ref_at(s, Utc::now())
}

/// Same as [`parse_time_ref`] with an explicit reference instant, so the
/// relative arithmetic is testable.
pub fn parse_time_ref_at(s: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>, TimeRefError> {
    let input = s.trim();
    if input.is_empty() {
        return Err(TimeRefError::Empty);
    }

    if let Some(t) = parse_absolute(input) {
        return Ok(t);
    }

    let d = parse_duration(input)?;
    Ok(now - d)
}

fn parse_absolute(input: &str) -> Option<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(input) {
        return Some(t.with_timezone(&Utc));
    }
    if let Ok(t) = NaiveDateTime::parse_from_str(input, "%Y-%m-%d %H:%M:%S") {
        return Some(Utc.from_utc_datetime(&t));
    }
    if let Ok(d) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        return Some(Utc.from_utc_datetime(&d.and_hms_opt(0, 0, 0)?));
    }
    None
}

/// Parses a duration composed of `{integer}{d|h|m|s}` tokens.
///
/// The entire input must be consumed by the tokens; trailing or interleaved
/// garbage is rejected.
pub fn parse_duration(s: &str) -> Result<Duration, TimeRefError> {
    let input = s.trim();
    if input.is_empty() {
        return Err(TimeRefError::Empty);
    }

    let mut total = Duration::zero();
    let mut matched_len = 0;

    for caps in DURATION_TOKEN_REGEX.captures_iter(input) {
        let whole = caps.get(0).expect("capture group 0");
        matched_len += whole.len();

        let value: i64 = caps[1]
            .parse()
            .map_err(|_| TimeRefError::InvalidDuration(input.to_string()))?;

        total += match &caps[2] {
            "d" => Duration::hours(24 * value),
            "h" => Duration::hours(value),
            "m" => Duration::minutes(value),
            "s" => Duration::seconds(value),
            _ => return Err(TimeRefError::InvalidDuration(input.to_string())),
        };
    }

    if matched_len == 0 || matched_len != input.len() {
        return Err(TimeRefError::InvalidDuration(input.to_string()));
    }

    Ok(total)
}
