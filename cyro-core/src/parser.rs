use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::sync::LazyLock;

use chrono::{DateTime, Datelike, NaiveDateTime, TimeZone, Utc};
use regex::Regex;
use thiserror::Error;

use crate::entry::{parse_level, LogEntry, LogLevel};

/// Hard ceiling on a single log line. Longer lines abort the parse.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// A detected log format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    Syslog,
    Apache,
    Generic,
}

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("line {line} exceeds the {MAX_LINE_BYTES}-byte line limit")]
    LineTooLong { line: u64 },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("entry callback failed: {0}")]
    Callback(anyhow::Error),
}

// BSD syslog: Jan 02 15:04:05 hostname process[pid]: message
// Optionally with an RFC 3164 priority prefix: <N>Jan 02 ...
static SYSLOG_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:<(\d+)>)?(\w{3}\s+\d{1,2}\s+\d{2}:\d{2}:\d{2})\s+(\S+)\s+(\S+?)(?:\[(\d+)\])?:\s+(.*)$")
        .expect("syslog regex")
});

// Apache/Nginx Combined Log Format:
// 127.0.0.1 - user [02/Jan/2006:15:04:05 -0700] "GET /path HTTP/1.1" 200 1234 "referer" "agent"
static APACHE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^(\S+) (\S+) (\S+) \[([^\]]+)\] "(\S+) (\S+)(?: (\S+))?" (\d{3}) (\d+|-) "([^"]*)" "([^"]*)""#)
        .expect("apache regex")
});

static LEVEL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(DEBUG|INFO|WARN(?:ING)?|ERROR|FATAL|CRITICAL)\b").expect("level regex")
});

static LEVEL_PREFIX_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*[\[\(]?(DEBUG|INFO|WARN(?:ING)?|ERROR|FATAL|CRITICAL)[\]\)]?\s*[-:]?\s*")
        .expect("level prefix regex")
});

static TIMESTAMP_PREFIX_REGEXES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"^\[?\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(?:\.\d+)?(?:Z|[+-]\d{2}:\d{2})?\]?\s*",
        r"^\[?\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}(?:\.\d+)?\]?\s*",
        r"^\[?\d{2}/\d{2}/\d{4} \d{2}:\d{2}:\d{2}\]?\s*",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("timestamp prefix regex"))
    .collect()
});

enum TimestampKind {
    Rfc3339,
    NaiveDateTime(&'static str),
}

static TIMESTAMP_PATTERNS: LazyLock<Vec<(Regex, TimestampKind)>> = LazyLock::new(|| {
    vec![
        (
            Regex::new(r"\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(?:\.\d+)?(?:Z|[+-]\d{2}:\d{2})")
                .expect("iso timestamp regex"),
            TimestampKind::Rfc3339,
        ),
        (
            Regex::new(r"\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}").expect("datetime regex"),
            TimestampKind::NaiveDateTime("%Y-%m-%d %H:%M:%S"),
        ),
        (
            Regex::new(r"\d{2}/\d{2}/\d{4} \d{2}:\d{2}:\d{2}").expect("us datetime regex"),
            TimestampKind::NaiveDateTime("%m/%d/%Y %H:%M:%S"),
        ),
    ]
});

/// Reads and parses log streams into structured [`LogEntry`] values.
///
/// Each non-blank line is classified as JSON, syslog, Apache combined, or
/// generic, tried in that order; classification never fails because the
/// generic format always applies.
pub struct Parser {
    timestamp_formats: Vec<String>,
}

impl Parser {
    /// Creates a parser with the given chrono timestamp format strings.
    /// An empty list selects the built-in defaults.
    pub fn new(timestamp_formats: Vec<String>) -> Self {
        let timestamp_formats = if timestamp_formats.is_empty() {
            vec![
                "%+".to_string(),
                "%Y-%m-%d %H:%M:%S".to_string(),
                "%b %d %H:%M:%S".to_string(),
                "%d/%b/%Y:%H:%M:%S %z".to_string(),
            ]
        } else {
            timestamp_formats
        };
        Self { timestamp_formats }
    }

    /// Opens a file and parses every log entry in it.
    pub fn parse_file(&self, path: impl AsRef<Path>) -> Result<Vec<LogEntry>, ParseError> {
        let file = std::fs::File::open(path)?;
        self.parse(file)
    }

    /// Reads log entries from the given reader into a vector.
    pub fn parse<R: Read>(&self, reader: R) -> Result<Vec<LogEntry>, ParseError> {
        let mut entries = Vec::new();
        self.parse_stream(reader, |entry| {
            entries.push(entry);
            Ok(())
        })?;
        Ok(entries)
    }

    /// Opens a file and calls `f` for each parsed log entry.
    pub fn parse_file_stream(
        &self,
        path: impl AsRef<Path>,
        f: impl FnMut(LogEntry) -> anyhow::Result<()>,
    ) -> Result<(), ParseError> {
        let file = std::fs::File::open(path)?;
        self.parse_stream(file, f)
    }

    /// Reads log entries from the given reader and calls `f` for each one,
    /// in source order. An error from the callback stops parsing early.
    ///
    /// Blank lines emit nothing but still advance the physical line number.
    pub fn parse_stream<R: Read>(
        &self,
        reader: R,
        mut f: impl FnMut(LogEntry) -> anyhow::Result<()>,
    ) -> Result<(), ParseError> {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        let mut line_num: u64 = 0;

        loop {
            line_num += 1;
            match read_line_capped(&mut reader, &mut buf)? {
                LineRead::Eof => return Ok(()),
                LineRead::TooLong => return Err(ParseError::LineTooLong { line: line_num }),
                LineRead::Line => {}
            }

            let text = String::from_utf8_lossy(&buf);
            let line = text.strip_suffix('\r').unwrap_or(&text);
            if line.trim().is_empty() {
                continue;
            }

            let entry = self.parse_line(line, line_num);
            f(entry).map_err(ParseError::Callback)?;
        }
    }

    /// Classifies a single line without extracting fields.
    pub fn detect_format(line: &str) -> Format {
        if line.starts_with('{')
            && serde_json::from_str::<serde_json::Value>(line)
                .map(|v| v.is_object())
                .unwrap_or(false)
        {
            return Format::Json;
        }
        if SYSLOG_REGEX.is_match(line) {
            return Format::Syslog;
        }
        if APACHE_REGEX.is_match(line) {
            return Format::Apache;
        }
        Format::Generic
    }

    /// Parses a single log line into a [`LogEntry`].
    pub fn parse_line(&self, line: &str, line_num: u64) -> LogEntry {
        let mut entry = LogEntry {
            raw: line.to_string(),
            line: line_num,
            level: LogLevel::Unknown,
            ..Default::default()
        };

        if self.try_parse_json(line, &mut entry) {
            return entry;
        }
        if self.try_parse_syslog(line, &mut entry) {
            return entry;
        }
        if self.try_parse_apache(line, &mut entry) {
            return entry;
        }

        self.parse_generic(line, &mut entry);
        entry
    }

    fn try_parse_json(&self, line: &str, entry: &mut LogEntry) -> bool {
        if !line.starts_with('{') {
            return false;
        }
        let Ok(serde_json::Value::Object(data)) = serde_json::from_str(line) else {
            return false;
        };

        for key in ["msg", "message", "text"] {
            if let Some(v) = data.get(key).and_then(|v| v.as_str()) {
                entry.message = v.to_string();
                break;
            }
        }

        for key in ["level", "severity", "lvl"] {
            if let Some(v) = data.get(key).and_then(|v| v.as_str()) {
                entry.level = parse_level(v);
                break;
            }
        }

        for key in ["time", "timestamp", "ts", "@timestamp"] {
            match data.get(key) {
                Some(serde_json::Value::String(s)) => {
                    entry.timestamp = self.parse_timestamp(s);
                    break;
                }
                Some(serde_json::Value::Number(n)) => {
                    if let Some(v) = n.as_f64() {
                        // Epoch seconds up to ~33658 AD stay below 1e12;
                        // larger values are taken as milliseconds.
                        entry.timestamp = if v > 1e12 {
                            Utc.timestamp_millis_opt(v as i64).single()
                        } else {
                            Utc.timestamp_opt(v as i64, 0).single()
                        };
                    }
                    break;
                }
                _ => {}
            }
        }

        if let Some(v) = data.get("source").and_then(|v| v.as_str()) {
            entry.source = v.to_string();
        }

        const CLAIMED: [&str; 11] = [
            "msg",
            "message",
            "text",
            "level",
            "severity",
            "lvl",
            "time",
            "timestamp",
            "ts",
            "@timestamp",
            "source",
        ];
        for (k, v) in data {
            if !CLAIMED.contains(&k.as_str()) {
                entry.fields.insert(k, v);
            }
        }

        true
    }

    fn try_parse_syslog(&self, line: &str, entry: &mut LogEntry) -> bool {
        let Some(caps) = SYSLOG_REGEX.captures(line) else {
            return false;
        };

        // BSD syslog timestamps carry no year; assume the current one.
        // Known limitation: wrong near year boundaries for older files.
        let with_year = format!("{} {}", &caps[2], Utc::now().year());
        for format in ["%b %d %H:%M:%S %Y", "%b %e %H:%M:%S %Y"] {
            if let Ok(t) = NaiveDateTime::parse_from_str(&with_year, format) {
                entry.timestamp = Some(Utc.from_utc_datetime(&t));
                break;
            }
        }

        entry.source = caps[3].to_string();

        if let Some(process) = caps.get(4) {
            entry.fields.insert(
                "process".to_string(),
                serde_json::Value::String(process.as_str().to_string()),
            );
        }
        if let Some(pid) = caps.get(5) {
            entry.fields.insert(
                "pid".to_string(),
                serde_json::Value::String(pid.as_str().to_string()),
            );
        }

        // Priority = facility * 8 + severity; the low three bits map onto
        // our level scale.
        if let Some(priority) = caps.get(1) {
            if let Ok(p) = priority.as_str().parse::<u32>() {
                entry.level = match p % 8 {
                    7 => LogLevel::Debug,
                    6 | 5 => LogLevel::Info,
                    4 => LogLevel::Warn,
                    3 => LogLevel::Error,
                    _ => LogLevel::Fatal,
                };
            }
        }

        entry.message = caps[6].to_string();

        if entry.level == LogLevel::Unknown {
            entry.level = extract_level(&caps[6]);
        }

        true
    }

    fn try_parse_apache(&self, line: &str, entry: &mut LogEntry) -> bool {
        let Some(caps) = APACHE_REGEX.captures(line) else {
            return false;
        };

        entry.source = caps[1].to_string();

        if let Ok(t) = DateTime::parse_from_str(&caps[4], "%d/%b/%Y:%H:%M:%S %z") {
            entry.timestamp = Some(t.with_timezone(&Utc));
        }

        let protocol = caps.get(7).map(|m| m.as_str()).unwrap_or("HTTP/1.0");
        entry.message = format!("{} {} {} -> {}", &caps[5], &caps[6], protocol, &caps[8]);

        let mut put = |key: &str, value: &str| {
            entry
                .fields
                .insert(key.to_string(), serde_json::Value::String(value.to_string()));
        };
        put("method", &caps[5]);
        put("path", &caps[6]);
        put("protocol", protocol);
        put("status_code", &caps[8]);
        if &caps[9] != "-" {
            put("size", &caps[9]);
        }
        if &caps[10] != "-" && !caps[10].is_empty() {
            put("referer", &caps[10]);
        }
        if !caps[11].is_empty() {
            put("user_agent", &caps[11]);
        }
        if &caps[3] != "-" {
            put("user", &caps[3]);
        }

        entry.level = match caps[8].as_bytes().first() {
            Some(b'2') | Some(b'3') => LogLevel::Info,
            Some(b'4') => LogLevel::Warn,
            Some(b'5') => LogLevel::Error,
            _ => LogLevel::Unknown,
        };

        true
    }

    fn parse_generic(&self, line: &str, entry: &mut LogEntry) {
        entry.timestamp = self.extract_timestamp(line);

        let mut cleaned = line.to_string();

        if let Some(m) = LEVEL_REGEX.find(line) {
            entry.level = parse_level(m.as_str());
            cleaned = cleaned.replacen(m.as_str(), "", 1);
        }

        for re in TIMESTAMP_PREFIX_REGEXES.iter() {
            cleaned = re.replace(&cleaned, "").into_owned();
        }
        cleaned = LEVEL_PREFIX_REGEX.replace(&cleaned, "").into_owned();

        entry.message = cleaned.trim().to_string();
        if entry.message.is_empty() {
            // Cleaned too aggressively; fall back to the raw line.
            entry.message = line.to_string();
        }
    }

    /// Scans a line for the first recognizable timestamp.
    fn extract_timestamp(&self, line: &str) -> Option<DateTime<Utc>> {
        for (re, kind) in TIMESTAMP_PATTERNS.iter() {
            let Some(m) = re.find(line) else { continue };
            let parsed = match kind {
                TimestampKind::Rfc3339 => DateTime::parse_from_rfc3339(m.as_str())
                    .ok()
                    .map(|t| t.with_timezone(&Utc)),
                TimestampKind::NaiveDateTime(format) => {
                    NaiveDateTime::parse_from_str(m.as_str(), format)
                        .ok()
                        .map(|t| Utc.from_utc_datetime(&t))
                }
            };
            if parsed.is_some() {
                return parsed;
            }
        }

        for format in &self.timestamp_formats {
            if let Some(t) = self.try_timestamp_format(line, format) {
                return Some(t);
            }
        }
        None
    }

    /// Parses a known timestamp string using the configured format list.
    fn parse_timestamp(&self, s: &str) -> Option<DateTime<Utc>> {
        for format in &self.timestamp_formats {
            if let Ok(t) = DateTime::parse_from_str(s, format) {
                return Some(t.with_timezone(&Utc));
            }
            if let Ok(t) = NaiveDateTime::parse_from_str(s, format) {
                return Some(Utc.from_utc_datetime(&t));
            }
        }
        None
    }

    /// Best-effort attempt to parse a timestamp from the start of the line,
    /// using the format string's own length as the prefix window.
    fn try_timestamp_format(&self, line: &str, format: &str) -> Option<DateTime<Utc>> {
        let fmt_len = format.len();
        if line.len() < fmt_len || !line.is_char_boundary(fmt_len) {
            return None;
        }
        let prefix = &line[..fmt_len];
        if let Ok(t) = DateTime::parse_from_str(prefix, format) {
            return Some(t.with_timezone(&Utc));
        }
        if let Ok(t) = NaiveDateTime::parse_from_str(prefix, format) {
            return Some(Utc.from_utc_datetime(&t));
        }
        None
    }
}

impl Default for Parser {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

/// Extracts a log level from free text.
fn extract_level(text: &str) -> LogLevel {
    match LEVEL_REGEX.find(text) {
        Some(m) => parse_level(m.as_str()),
        None => LogLevel::Unknown,
    }
}

enum LineRead {
    Line,
    Eof,
    TooLong,
}

/// Reads one line (without its newline) into `buf`, refusing to buffer more
/// than [`MAX_LINE_BYTES`].
fn read_line_capped<R: BufRead>(reader: &mut R, buf: &mut Vec<u8>) -> std::io::Result<LineRead> {
    buf.clear();
    loop {
        let available = reader.fill_buf()?;
        if available.is_empty() {
            return Ok(if buf.is_empty() {
                LineRead::Eof
            } else {
                LineRead::Line
            });
        }

        match available.iter().position(|&b| b == b'\n') {
            Some(pos) => {
                if buf.len() + pos > MAX_LINE_BYTES {
                    return Ok(LineRead::TooLong);
                }
                buf.extend_from_slice(&available[..pos]);
                reader.consume(pos + 1);
                return Ok(LineRead::Line);
            }
            None => {
                let n = available.len();
                if buf.len() + n > MAX_LINE_BYTES {
                    return Ok(LineRead::TooLong);
                }
                buf.extend_from_slice(available);
                reader.consume(n);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    fn parse_one(line: &str) -> LogEntry {
        Parser::default().parse_line(line, 1)
    }

    #[test]
    fn detects_each_format() {
        assert_eq!(Parser::detect_format(r#"{"msg":"hi"}"#), Format::Json);
        assert_eq!(
            Parser::detect_format("Jan 26 10:00:01 web-01 sshd[1234]: hello"),
            Format::Syslog
        );
        assert_eq!(
            Parser::detect_format(
                r#"10.0.0.1 - - [26/Jan/2025:10:00:02 +0000] "GET / HTTP/1.1" 200 512 "-" "curl""#
            ),
            Format::Apache
        );
        assert_eq!(Parser::detect_format("plain text"), Format::Generic);
        // Malformed JSON falls through to generic.
        assert_eq!(Parser::detect_format("{not json"), Format::Generic);
    }

    #[test]
    fn json_extracts_message_level_timestamp_and_fields() {
        let entry =
            parse_one(r#"{"timestamp":"2025-01-26T10:00:00Z","level":"error","message":"boom","source":"api","request_id":42,"ok":false}"#);
        assert_eq!(entry.level, LogLevel::Error);
        assert_eq!(entry.message, "boom");
        assert_eq!(entry.source, "api");
        let ts = entry.timestamp.unwrap();
        assert_eq!(ts.hour(), 10);
        assert_eq!(entry.fields["request_id"], serde_json::json!(42));
        assert_eq!(entry.fields["ok"], serde_json::json!(false));
        assert!(!entry.fields.contains_key("message"));
    }

    #[test]
    fn json_numeric_timestamps_handle_seconds_and_milliseconds() {
        let secs = parse_one(r#"{"msg":"a","ts":1737885600}"#);
        let millis = parse_one(r#"{"msg":"b","ts":1737885600123}"#);
        assert_eq!(
            secs.timestamp.unwrap().timestamp(),
            millis.timestamp.unwrap().timestamp()
        );
    }

    #[test]
    fn syslog_extracts_host_process_and_pid() {
        let entry = parse_one("Jan 26 10:00:01 web-01 sshd[1234]: Accepted password for admin");
        assert_eq!(entry.source, "web-01");
        assert_eq!(entry.fields["process"], serde_json::json!("sshd"));
        assert_eq!(entry.fields["pid"], serde_json::json!("1234"));
        assert_eq!(entry.message, "Accepted password for admin");
        assert_eq!(entry.level, LogLevel::Unknown);
        assert!(entry.timestamp.is_some());
    }

    #[test]
    fn syslog_priority_maps_to_severity() {
        // <11> = facility 1, severity 3 (error)
        let entry = parse_one("<11>Jan 26 10:00:01 web-01 app: something broke");
        assert_eq!(entry.level, LogLevel::Error);

        // <14> = severity 6 (info)
        let entry = parse_one("<14>Jan 26 10:00:01 web-01 app: all good");
        assert_eq!(entry.level, LogLevel::Info);

        // <8> = severity 0 (emergency)
        let entry = parse_one("<8>Jan 26 10:00:01 web-01 app: dead");
        assert_eq!(entry.level, LogLevel::Fatal);
    }

    #[test]
    fn syslog_falls_back_to_message_level() {
        let entry = parse_one("Jan 26 10:00:01 web-01 app: ERROR disk failure");
        assert_eq!(entry.level, LogLevel::Error);
    }

    #[test]
    fn apache_reconstructs_message_and_maps_status() {
        let line = r#"10.0.0.1 - alice [26/Jan/2025:10:00:02 +0000] "POST /login HTTP/1.1" 500 1024 "http://ref" "curl/8.0""#;
        let entry = parse_one(line);
        assert_eq!(entry.source, "10.0.0.1");
        assert_eq!(entry.message, "POST /login HTTP/1.1 -> 500");
        assert_eq!(entry.level, LogLevel::Error);
        assert_eq!(entry.fields["method"], serde_json::json!("POST"));
        assert_eq!(entry.fields["status_code"], serde_json::json!("500"));
        assert_eq!(entry.fields["size"], serde_json::json!("1024"));
        assert_eq!(entry.fields["referer"], serde_json::json!("http://ref"));
        assert_eq!(entry.fields["user"], serde_json::json!("alice"));
        assert!(entry.timestamp.is_some());
    }

    #[test]
    fn apache_missing_protocol_defaults_and_dash_fields_skipped() {
        let line = r#"10.0.0.1 - - [26/Jan/2025:10:00:02 +0000] "GET /health" 200 - "-" """#;
        let entry = parse_one(line);
        assert_eq!(entry.message, "GET /health HTTP/1.0 -> 200");
        assert_eq!(entry.level, LogLevel::Info);
        assert!(!entry.fields.contains_key("size"));
        assert!(!entry.fields.contains_key("referer"));
        assert!(!entry.fields.contains_key("user"));
    }

    #[test]
    fn generic_extracts_timestamp_and_level_and_cleans_message() {
        let entry = parse_one("2025-01-26 10:00:03 WARN Low disk");
        assert_eq!(entry.level, LogLevel::Warn);
        assert_eq!(entry.message, "Low disk");
        assert!(entry.timestamp.is_some());
    }

    #[test]
    fn generic_restores_raw_when_cleaning_empties_message() {
        let entry = parse_one("ERROR");
        assert_eq!(entry.level, LogLevel::Error);
        assert_eq!(entry.message, "ERROR");
    }

    #[test]
    fn generic_without_signals_is_unknown() {
        let entry = parse_one("just some text");
        assert_eq!(entry.level, LogLevel::Unknown);
        assert!(entry.timestamp.is_none());
        assert_eq!(entry.message, "just some text");
    }

    #[test]
    fn blank_lines_advance_physical_line_numbers() {
        let input = "first\n\n  \nfourth\n";
        let entries = Parser::default().parse(input.as_bytes()).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].line, 1);
        assert_eq!(entries[1].line, 4);
        assert_eq!(entries[0].raw, "first");
        assert_eq!(entries[1].raw, "fourth");
    }

    #[test]
    fn final_line_without_newline_is_parsed() {
        let entries = Parser::default().parse("one\ntwo".as_bytes()).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].raw, "two");
    }

    #[test]
    fn carriage_returns_are_stripped() {
        let entries = Parser::default().parse("hello\r\n".as_bytes()).unwrap();
        assert_eq!(entries[0].raw, "hello");
    }

    #[test]
    fn line_at_limit_parses_and_one_past_fails() {
        let ok = "a".repeat(MAX_LINE_BYTES);
        let entries = Parser::default().parse(ok.as_bytes()).unwrap();
        assert_eq!(entries.len(), 1);

        let too_long = "a".repeat(MAX_LINE_BYTES + 1);
        let err = Parser::default().parse(too_long.as_bytes()).unwrap_err();
        assert!(matches!(err, ParseError::LineTooLong { line: 1 }));
    }

    #[test]
    fn callback_error_aborts_the_stream() {
        let input = "one\ntwo\nthree\n";
        let mut seen = 0;
        let result = Parser::default().parse_stream(input.as_bytes(), |_| {
            seen += 1;
            if seen == 2 {
                anyhow::bail!("stop");
            }
            Ok(())
        });
        assert!(matches!(result, Err(ParseError::Callback(_))));
        assert_eq!(seen, 2);
    }

    #[test]
    fn raw_preserves_the_input_line() {
        let line = r#"{"msg":"x","level":"info"}"#;
        let entry = parse_one(line);
        assert_eq!(entry.raw, line);
    }
}
