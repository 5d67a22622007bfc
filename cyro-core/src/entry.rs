use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::{self, Deserializer, Visitor};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

/// Standard log severity levels, ordered from least to most severe.
///
/// `Unknown` sorts above `Fatal` so that entries whose level could not be
/// classified pass every minimum-level filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
    #[default]
    Unknown,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Fatal => "FATAL",
            LogLevel::Unknown => "UNKNOWN",
        }
    }

    /// All levels in severity order, excluding `Unknown`.
    pub fn known_levels() -> [LogLevel; 5] {
        [
            LogLevel::Debug,
            LogLevel::Info,
            LogLevel::Warn,
            LogLevel::Error,
            LogLevel::Fatal,
        ]
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Converts a string to a [`LogLevel`].
///
/// Matching is case-insensitive and accepts the common abbreviations
/// `dbg`, `inf`, `err`, `warning`, `crit`, and `critical`. Anything else
/// maps to [`LogLevel::Unknown`].
pub fn parse_level(s: &str) -> LogLevel {
    match s.trim().to_ascii_lowercase().as_str() {
        "debug" | "dbg" => LogLevel::Debug,
        "info" | "inf" => LogLevel::Info,
        "warn" | "warning" => LogLevel::Warn,
        "error" | "err" => LogLevel::Error,
        "fatal" | "critical" | "crit" => LogLevel::Fatal,
        _ => LogLevel::Unknown,
    }
}

impl Serialize for LogLevel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for LogLevel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct LevelVisitor;

        impl Visitor<'_> for LevelVisitor {
            type Value = LogLevel;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a log level string")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<LogLevel, E> {
                Ok(parse_level(v))
            }
        }

        deserializer.deserialize_str(LevelVisitor)
    }
}

/// A single parsed log line.
///
/// `raw` is never empty: blank input lines are skipped by the parser and
/// produce no entry. `line` is the 1-based physical line number within the
/// source stream, so blank lines still advance it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogEntry {
    pub raw: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    pub level: LogLevel,
    pub message: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub source: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, serde_json::Value>,
    pub line: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_string_round_trip() {
        for level in LogLevel::known_levels() {
            assert_eq!(parse_level(level.as_str()), level);
        }
        assert_eq!(parse_level(LogLevel::Unknown.as_str()), LogLevel::Unknown);
    }

    #[test]
    fn level_parsing_accepts_abbreviations() {
        assert_eq!(parse_level("dbg"), LogLevel::Debug);
        assert_eq!(parse_level("inf"), LogLevel::Info);
        assert_eq!(parse_level("warning"), LogLevel::Warn);
        assert_eq!(parse_level("err"), LogLevel::Error);
        assert_eq!(parse_level("crit"), LogLevel::Fatal);
        assert_eq!(parse_level("CRITICAL"), LogLevel::Fatal);
    }

    #[test]
    fn level_parsing_is_case_insensitive() {
        assert_eq!(parse_level("Error"), LogLevel::Error);
        assert_eq!(parse_level("WaRn"), LogLevel::Warn);
        assert_eq!(parse_level("nonsense"), LogLevel::Unknown);
    }

    #[test]
    fn level_ordering_places_unknown_last() {
        assert!(LogLevel::Debug < LogLevel::Info);
        assert!(LogLevel::Info < LogLevel::Warn);
        assert!(LogLevel::Warn < LogLevel::Error);
        assert!(LogLevel::Error < LogLevel::Fatal);
        assert!(LogLevel::Fatal < LogLevel::Unknown);
    }

    #[test]
    fn level_serializes_as_uppercase_string() {
        let json = serde_json::to_string(&LogLevel::Error).unwrap();
        assert_eq!(json, "\"ERROR\"");

        let back: LogLevel = serde_json::from_str("\"warning\"").unwrap();
        assert_eq!(back, LogLevel::Warn);
    }

    #[test]
    fn entry_serialization_skips_empty_optionals() {
        let entry = LogEntry {
            raw: "hello".to_string(),
            message: "hello".to_string(),
            line: 1,
            ..Default::default()
        };
        let json = serde_json::to_string(&entry).unwrap();
        assert!(!json.contains("timestamp"));
        assert!(!json.contains("source"));
        assert!(!json.contains("fields"));
        assert!(json.contains("\"level\":\"UNKNOWN\""));
    }
}
