use std::collections::HashMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use super::drain::{Template, WILDCARD};
use crate::entry::{LogEntry, LogLevel};

/// Default maximum tokens for LLM input.
pub const DEFAULT_TOKEN_LIMIT: usize = 8000;

/// Rough estimate: one token per 4 bytes of English text.
const CHARS_PER_TOKEN: usize = 4;

/// Tokens reserved for the header and footer.
const RESERVED_TOKENS: usize = 200;

/// The time span covered by a set of entries. Both ends are `None` when no
/// entry carried a timestamp.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

/// A template enriched for compression output with severity and timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateSummary {
    pub pattern: String,
    pub count: u64,
    /// Highest severity observed across entries matching this template.
    pub level: LogLevel,
    pub examples: Vec<String>,
    pub first_seen: Option<DateTime<Utc>>,
    pub last_seen: Option<DateTime<Utc>>,
}

/// The final compressed log summary, ready for LLM consumption.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressedOutput {
    pub summary: String,
    pub time_range: TimeRange,
    pub total_lines: usize,
    pub total_templates: usize,
    /// Templates actually written into the summary, in output order.
    pub templates: Vec<TemplateSummary>,
    pub redacted_count: usize,
    pub metadata: HashMap<String, serde_json::Value>,
    pub token_count: usize,
    pub token_limit: usize,
}

impl CompressedOutput {
    /// Lines per included template, a coarse reduction measure.
    pub fn compression_ratio(&self) -> f64 {
        self.total_lines as f64 / (self.templates.len() + 1) as f64
    }

    pub fn is_within_budget(&self) -> bool {
        self.token_count <= self.token_limit
    }

    pub fn templates_by_level(&self, level: LogLevel) -> Vec<&TemplateSummary> {
        self.templates.iter().filter(|t| t.level == level).collect()
    }
}

/// Formats preprocessed logs into a token-budgeted summary.
///
/// Errors always print first; warnings and info patterns are best-effort
/// within the remaining budget. Output is deterministic for the same input.
pub struct Compressor {
    token_limit: usize,
}

impl Compressor {
    /// Creates a compressor. Zero selects the default limit of 8000 tokens.
    pub fn new(token_limit: usize) -> Self {
        let token_limit = if token_limit == 0 {
            DEFAULT_TOKEN_LIMIT
        } else {
            token_limit
        };
        Self { token_limit }
    }

    /// Builds the compressed output from entries, their Drain templates,
    /// and the redaction count.
    pub fn compress(
        &self,
        entries: &[LogEntry],
        templates: &[Template],
        redacted_count: usize,
    ) -> CompressedOutput {
        if entries.is_empty() {
            return CompressedOutput {
                summary: "No log entries to analyze.".to_string(),
                time_range: TimeRange::default(),
                total_lines: 0,
                total_templates: 0,
                templates: Vec::new(),
                redacted_count: 0,
                metadata: HashMap::new(),
                token_count: 0,
                token_limit: self.token_limit,
            };
        }

        let time_range = calculate_time_range(entries);
        let mut summaries = create_template_summaries(entries, templates);
        prioritize_templates(&mut summaries);

        self.build_output(entries, summaries, time_range, redacted_count)
    }

    fn build_output(
        &self,
        entries: &[LogEntry],
        templates: Vec<TemplateSummary>,
        time_range: TimeRange,
        redacted_count: usize,
    ) -> CompressedOutput {
        let mut output = CompressedOutput {
            summary: String::new(),
            time_range,
            total_lines: entries.len(),
            total_templates: templates.len(),
            templates: Vec::new(),
            redacted_count,
            metadata: HashMap::new(),
            token_count: 0,
            token_limit: self.token_limit,
        };

        let mut text = String::new();
        write_header(&mut text, &output);
        output.templates = self.write_templates(&mut text, templates);
        write_footer(&mut text, &mut output);

        output.summary = text;
        output.token_count = estimate_tokens(&output.summary);
        output
    }

    /// Writes templates in three severity sections, stopping within a
    /// section once the next template would blow the budget.
    fn write_templates(
        &self,
        text: &mut String,
        templates: Vec<TemplateSummary>,
    ) -> Vec<TemplateSummary> {
        let mut included = Vec::new();
        let mut current_tokens = estimate_tokens(text);
        let available = self.token_limit.saturating_sub(RESERVED_TOKENS);

        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        let mut others = Vec::new();
        for t in templates {
            match t.level {
                LogLevel::Fatal | LogLevel::Error => errors.push(t),
                LogLevel::Warn => warnings.push(t),
                _ => others.push(t),
            }
        }

        let sections = [
            ("=== Error Summary ===\n", errors),
            ("=== Warning Summary ===\n", warnings),
            ("=== Top Info Patterns ===\n", others),
        ];

        for (header, section) in sections {
            if section.is_empty() || current_tokens >= available {
                continue;
            }
            text.push_str(header);
            for t in section {
                let rendered = format_template(&t);
                let template_tokens = estimate_tokens(&rendered);
                if current_tokens + template_tokens > available {
                    break;
                }
                text.push_str(&rendered);
                current_tokens += template_tokens;
                included.push(t);
            }
            text.push('\n');
        }

        included
    }
}

impl Default for Compressor {
    fn default() -> Self {
        Self::new(0)
    }
}

fn calculate_time_range(entries: &[LogEntry]) -> TimeRange {
    let mut range = TimeRange::default();
    for entry in entries {
        let Some(ts) = entry.timestamp else { continue };
        if range.start.is_none_or(|s| ts < s) {
            range.start = Some(ts);
        }
        if range.end.is_none_or(|e| ts > e) {
            range.end = Some(ts);
        }
    }
    range
}

/// Links each template to the entries whose tokenization it matches, and
/// records the highest severity and first/last timestamps across them.
/// Templates that matched no entry are dropped from the summary.
fn create_template_summaries(entries: &[LogEntry], templates: &[Template]) -> Vec<TemplateSummary> {
    let mut matched: HashMap<u64, Vec<&LogEntry>> = HashMap::new();

    for entry in entries {
        for template in templates {
            if matches_template(&entry.message, template) {
                matched.entry(template.id).or_default().push(entry);
                break;
            }
        }
    }

    let mut summaries = Vec::new();
    for template in templates {
        let Some(entries) = matched.get(&template.id) else {
            continue;
        };

        let mut level = LogLevel::Unknown;
        let mut first_seen: Option<DateTime<Utc>> = None;
        let mut last_seen: Option<DateTime<Utc>> = None;
        for entry in entries {
            // Unknown is not a severity; it only survives when no matching
            // entry carried a classifiable level.
            if entry.level != LogLevel::Unknown
                && (level == LogLevel::Unknown || entry.level > level)
            {
                level = entry.level;
            }
            if let Some(ts) = entry.timestamp {
                if first_seen.is_none_or(|f| ts < f) {
                    first_seen = Some(ts);
                }
                if last_seen.is_none_or(|l| ts > l) {
                    last_seen = Some(ts);
                }
            }
        }

        summaries.push(TemplateSummary {
            pattern: template.pattern.clone(),
            count: template.count,
            level,
            examples: template.examples.clone(),
            first_seen,
            last_seen,
        });
    }

    summaries
}

/// Position-by-position match of a message against a template's tokens,
/// with wildcards matching anything.
fn matches_template(message: &str, template: &Template) -> bool {
    let message_tokens: Vec<&str> = message.split_whitespace().collect();
    if message_tokens.len() != template.tokens.len() {
        return false;
    }
    message_tokens
        .iter()
        .zip(template.tokens.iter())
        .all(|(m, t)| t == WILDCARD || t == m)
}

/// Sorts by severity first, then frequency; higher score prints earlier.
fn prioritize_templates(templates: &mut [TemplateSummary]) {
    templates.sort_by(|a, b| {
        priority_score(b)
            .partial_cmp(&priority_score(a))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

fn priority_score(t: &TemplateSummary) -> f64 {
    t.level as u8 as f64 * 1000.0 + t.count as f64
}

fn write_header(text: &mut String, output: &CompressedOutput) {
    text.push_str("=== Log Analysis Summary ===\n\n");

    if let (Some(start), Some(end)) = (output.time_range.start, output.time_range.end) {
        text.push_str(&format!(
            "Time Range: {} to {}\n",
            start.to_rfc3339_opts(SecondsFormat::Secs, true),
            end.to_rfc3339_opts(SecondsFormat::Secs, true)
        ));
    }

    text.push_str(&format!("Total Lines: {}\n", output.total_lines));
    text.push_str(&format!("Unique Patterns: {}\n", output.total_templates));
    if output.redacted_count > 0 {
        text.push_str(&format!(
            "Sensitive Values Redacted: {}\n",
            output.redacted_count
        ));
    }
    text.push('\n');
}

fn format_template(t: &TemplateSummary) -> String {
    let mut out = format!("[{}] {} ({} occurrences)\n", t.level, t.pattern, t.count);

    if !t.examples.is_empty() {
        out.push_str("  Examples:\n");
        for example in &t.examples {
            let example = truncate_chars(example, 120);
            out.push_str(&format!("    - {}\n", example));
        }
    }

    out
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut truncated: String = s.chars().take(max.saturating_sub(3)).collect();
    truncated.push_str("...");
    truncated
}

fn write_footer(text: &mut String, output: &mut CompressedOutput) {
    output.metadata.insert(
        "included_templates".to_string(),
        serde_json::json!(output.templates.len()),
    );
    output.metadata.insert(
        "compression_ratio".to_string(),
        serde_json::json!(output.compression_ratio()),
    );

    // The final token count can only be measured once the text is complete;
    // report the running estimate including this footer line's reserve.
    let estimate = estimate_tokens(text);
    text.push_str(&format!(
        "Token Count: ~{} / {}\n",
        estimate, output.token_limit
    ));
}

/// Byte-length heuristic; deliberately independent of any real tokenizer.
fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(CHARS_PER_TOKEN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn entry(level: LogLevel, message: &str, minute: u32) -> LogEntry {
        LogEntry {
            raw: message.to_string(),
            level,
            message: message.to_string(),
            timestamp: Some(Utc.with_ymd_and_hms(2025, 1, 26, 10, minute, 0).unwrap()),
            line: 1,
            ..Default::default()
        }
    }

    fn template(id: u64, pattern: &str, count: u64) -> Template {
        Template {
            id,
            pattern: pattern.to_string(),
            tokens: pattern.split_whitespace().map(str::to_string).collect(),
            count,
            examples: vec![pattern.replace(WILDCARD, "x")],
        }
    }

    #[test]
    fn empty_input_returns_sentinel() {
        let output = Compressor::default().compress(&[], &[], 0);
        assert!(output.summary.contains("No log entries to analyze"));
        assert_eq!(output.total_lines, 0);
        assert_eq!(output.token_count, 0);
        assert_eq!(output.token_limit, DEFAULT_TOKEN_LIMIT);
        assert!(output.templates.is_empty());
    }

    #[test]
    fn header_lists_time_range_and_counts() {
        let entries = vec![
            entry(LogLevel::Error, "disk failed on node 3", 0),
            entry(LogLevel::Info, "disk ok on node 4", 5),
        ];
        let templates = vec![
            template(1, "disk failed on node <*>", 1),
            template(2, "disk ok on node <*>", 1),
        ];
        let output = Compressor::default().compress(&entries, &templates, 2);

        assert!(output.summary.starts_with("=== Log Analysis Summary ===\n"));
        assert!(output.summary.contains("Time Range: 2025-01-26T10:00:00Z to 2025-01-26T10:05:00Z"));
        assert!(output.summary.contains("Total Lines: 2"));
        assert!(output.summary.contains("Unique Patterns: 2"));
        assert!(output.summary.contains("Sensitive Values Redacted: 2"));
        assert!(output.summary.contains("Token Count: ~"));
    }

    #[test]
    fn sections_order_errors_before_warnings_before_info() {
        let entries = vec![
            entry(LogLevel::Info, "started worker 1", 0),
            entry(LogLevel::Warn, "slow request took 900", 1),
            entry(LogLevel::Error, "crashed worker 2", 2),
        ];
        let templates = vec![
            template(1, "started worker <*>", 1),
            template(2, "slow request took <*>", 1),
            template(3, "crashed worker <*>", 1),
        ];
        let output = Compressor::default().compress(&entries, &templates, 0);

        let err = output.summary.find("=== Error Summary ===").unwrap();
        let warn = output.summary.find("=== Warning Summary ===").unwrap();
        let info = output.summary.find("=== Top Info Patterns ===").unwrap();
        assert!(err < warn && warn < info);
    }

    #[test]
    fn template_severity_is_highest_across_matches() {
        let entries = vec![
            entry(LogLevel::Info, "retry attempt 1", 0),
            entry(LogLevel::Error, "retry attempt 2", 1),
        ];
        let templates = vec![template(1, "retry attempt <*>", 2)];
        let output = Compressor::default().compress(&entries, &templates, 0);

        assert_eq!(output.templates.len(), 1);
        assert_eq!(output.templates[0].level, LogLevel::Error);
        assert_eq!(
            output.templates[0].first_seen.unwrap(),
            Utc.with_ymd_and_hms(2025, 1, 26, 10, 0, 0).unwrap()
        );
        assert_eq!(
            output.templates[0].last_seen.unwrap(),
            Utc.with_ymd_and_hms(2025, 1, 26, 10, 1, 0).unwrap()
        );
    }

    #[test]
    fn unmatched_templates_are_excluded_but_lines_counted() {
        let entries = vec![entry(LogLevel::Info, "only this message here", 0)];
        let templates = vec![
            template(1, "only this message here", 1),
            template(2, "never matched by anything", 1),
        ];
        let output = Compressor::default().compress(&entries, &templates, 0);
        assert_eq!(output.templates.len(), 1);
        assert_eq!(output.total_lines, 1);
    }

    #[test]
    fn budget_law_holds_under_pressure() {
        let entries: Vec<LogEntry> = (0..100)
            .map(|i| {
                entry(
                    if i % 2 == 0 { LogLevel::Error } else { LogLevel::Info },
                    &format!("unique event kind {} with a reasonably long message body", i),
                    0,
                )
            })
            .collect();
        let templates: Vec<Template> = entries
            .iter()
            .enumerate()
            .map(|(i, e)| template(i as u64 + 1, &e.message, 1))
            .collect();

        let output = Compressor::new(500).compress(&entries, &templates, 0);

        assert!(output.token_count <= 500 + RESERVED_TOKENS);
        assert!(output.templates.len() < 100);
        assert!(output.summary.contains("=== Log Analysis Summary ==="));
        // Errors are present; they always print first.
        assert!(output.summary.contains("=== Error Summary ==="));
    }

    #[test]
    fn examples_truncate_at_120_chars() {
        let long = "x".repeat(200);
        let entries = vec![entry(LogLevel::Info, &long, 0)];
        let mut tpl = template(1, &long, 1);
        tpl.examples = vec![long.clone()];
        let output = Compressor::new(4000).compress(&entries, &[tpl], 0);

        let example_line = output
            .summary
            .lines()
            .find(|l| l.trim_start().starts_with("- "))
            .unwrap();
        assert!(example_line.trim_start().len() <= 123);
        assert!(example_line.ends_with("..."));
    }

    #[test]
    fn metadata_records_inclusion_and_ratio() {
        let entries = vec![entry(LogLevel::Info, "hello world again", 0)];
        let templates = vec![template(1, "hello world again", 1)];
        let output = Compressor::default().compress(&entries, &templates, 0);

        assert_eq!(output.metadata["included_templates"], serde_json::json!(1));
        assert!(output.metadata.contains_key("compression_ratio"));
        assert_eq!(output.compression_ratio(), 0.5);
    }

    #[test]
    fn entries_without_timestamps_leave_range_empty() {
        let mut e = entry(LogLevel::Info, "no clock here today", 0);
        e.timestamp = None;
        let templates = vec![template(1, "no clock here today", 1)];
        let output = Compressor::default().compress(&[e], &templates, 0);
        assert!(output.time_range.start.is_none());
        assert!(!output.summary.contains("Time Range:"));
    }
}
