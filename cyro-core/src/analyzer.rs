use std::collections::{BTreeMap, HashMap, VecDeque};

use chrono::{DateTime, Duration, DurationRound, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::entry::{LogEntry, LogLevel};

#[derive(Error, Debug)]
pub enum AnalyzeError {
    #[error("unsupported group-by field: {0} (must be 'level', 'message', or 'source')")]
    InvalidGroupField(String),
}

/// Aggregate statistics for a set of log entries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Stats {
    pub total_lines: usize,
    pub level_counts: BTreeMap<LogLevel, usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_entry: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_entry: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub top_messages: Vec<MessageCount>,
    pub error_rate: f64,
}

/// A message and how often it appears.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageCount {
    pub message: String,
    pub count: usize,
}

/// Entries grouped by a field value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupedResult {
    pub key: String,
    pub count: usize,
    pub percent: f64,
}

/// Statistics for one time window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeWindowStats {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub count: usize,
    pub level_counts: BTreeMap<LogLevel, usize>,
    pub error_count: usize,
    pub error_percent: f64,
    /// Change in entry count relative to the previous window, in percent.
    pub change_percent: f64,
}

/// The full output of an `analyze` run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub total_lines: usize,
    pub group_by: String,
    pub groups: Vec<GroupedResult>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub time_windows: Vec<TimeWindowStats>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub pattern: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub file_path: String,
}

/// Criteria for filtering log entries.
#[derive(Debug, Default)]
pub struct FilterOptions {
    pub pattern: Option<Regex>,
    /// Minimum level; `Unknown` disables the level test.
    pub min_level: LogLevel,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub invert: bool,
    /// Compare the level for equality instead of ordinal >=.
    pub exact_level: bool,
}

/// Performs analysis on parsed log entries.
#[derive(Debug, Default)]
pub struct Analyzer;

impl Analyzer {
    pub fn new() -> Self {
        Analyzer
    }

    /// Calculates aggregate statistics from a set of log entries.
    pub fn compute_stats(&self, entries: &[LogEntry], top_n: usize) -> Stats {
        let mut stats = Stats {
            total_lines: entries.len(),
            ..Default::default()
        };

        if entries.is_empty() {
            return stats;
        }

        let mut message_counts: HashMap<&str, usize> = HashMap::new();

        for e in entries {
            *stats.level_counts.entry(e.level).or_insert(0) += 1;

            if let Some(ts) = e.timestamp {
                if stats.first_entry.is_none_or(|first| ts < first) {
                    stats.first_entry = Some(ts);
                }
                if stats.last_entry.is_none_or(|last| ts > last) {
                    stats.last_entry = Some(ts);
                }
            }

            *message_counts.entry(e.message.as_str()).or_insert(0) += 1;
        }

        let error_count = stats.level_counts.get(&LogLevel::Error).copied().unwrap_or(0)
            + stats.level_counts.get(&LogLevel::Fatal).copied().unwrap_or(0);
        stats.error_rate = error_count as f64 / stats.total_lines as f64;

        stats.top_messages = top_messages(&message_counts, top_n);

        stats
    }

    /// Returns the entries matching the given criteria.
    ///
    /// Entries without a timestamp always pass the time bounds; entries at
    /// `Unknown` level always pass the minimum-level test.
    pub fn filter(&self, entries: &[LogEntry], opts: &FilterOptions) -> Vec<LogEntry> {
        entries
            .iter()
            .filter(|e| Self::matches(e, opts))
            .cloned()
            .collect()
    }

    /// Tests a single entry against the filter criteria.
    pub fn matches(e: &LogEntry, opts: &FilterOptions) -> bool {
        if opts.min_level != LogLevel::Unknown {
            if opts.exact_level {
                if e.level != opts.min_level {
                    return false;
                }
            } else if e.level < opts.min_level {
                return false;
            }
        }

        if let (Some(since), Some(ts)) = (opts.since, e.timestamp) {
            if ts < since {
                return false;
            }
        }
        if let (Some(until), Some(ts)) = (opts.until, e.timestamp) {
            if ts > until {
                return false;
            }
        }

        if let Some(re) = &opts.pattern {
            let mut matched = re.is_match(&e.raw);
            if opts.invert {
                matched = !matched;
            }
            if !matched {
                return false;
            }
        }

        true
    }

    /// Groups entries by `level`, `message`, or `source` and returns the
    /// top N groups by descending count.
    pub fn group_by(
        &self,
        entries: &[LogEntry],
        field: &str,
        top_n: usize,
    ) -> Result<Vec<GroupedResult>, AnalyzeError> {
        if !matches!(field, "level" | "message" | "source") {
            return Err(AnalyzeError::InvalidGroupField(field.to_string()));
        }
        if entries.is_empty() {
            return Ok(Vec::new());
        }

        let mut groups: HashMap<String, usize> = HashMap::new();
        for e in entries {
            let key = match field {
                "level" => e.level.to_string(),
                "message" => e.message.clone(),
                _ => {
                    if e.source.is_empty() {
                        "(unknown)".to_string()
                    } else {
                        e.source.clone()
                    }
                }
            };
            *groups.entry(key).or_insert(0) += 1;
        }

        let total = entries.len();
        let mut result: Vec<GroupedResult> = groups
            .into_iter()
            .map(|(key, count)| GroupedResult {
                key,
                count,
                percent: count as f64 * 100.0 / total as f64,
            })
            .collect();

        result.sort_by(|a, b| b.count.cmp(&a.count));
        result.truncate(top_n);
        Ok(result)
    }

    /// Splits entries into fixed-size time windows and computes per-window
    /// statistics, including the change from the previous window.
    ///
    /// Windows cover `[min.trunc(window), max]` contiguously. Entries without
    /// a timestamp are ignored; if none carry one, the result is empty.
    pub fn analyze_by_window(&self, entries: &[LogEntry], window: Duration) -> Vec<TimeWindowStats> {
        if entries.is_empty() || window <= Duration::zero() {
            return Vec::new();
        }

        let mut min_time: Option<DateTime<Utc>> = None;
        let mut max_time: Option<DateTime<Utc>> = None;
        for e in entries {
            if let Some(ts) = e.timestamp {
                if min_time.is_none_or(|t| ts < t) {
                    min_time = Some(ts);
                }
                if max_time.is_none_or(|t| ts > t) {
                    max_time = Some(ts);
                }
            }
        }
        let (Some(min_time), Some(max_time)) = (min_time, max_time) else {
            return Vec::new();
        };

        let Ok(window_start) = min_time.duration_trunc(window) else {
            return Vec::new();
        };

        let mut windows = Vec::new();
        let mut current = window_start;
        while current <= max_time {
            windows.push(TimeWindowStats {
                start: current,
                end: current + window,
                count: 0,
                level_counts: BTreeMap::new(),
                error_count: 0,
                error_percent: 0.0,
                change_percent: 0.0,
            });
            current += window;
        }

        let window_nanos = window.num_nanoseconds().unwrap_or(i64::MAX);
        for e in entries {
            let Some(ts) = e.timestamp else { continue };
            let offset = (ts - window_start).num_nanoseconds().unwrap_or(i64::MAX);
            let idx = (offset / window_nanos) as usize;
            if let Some(w) = windows.get_mut(idx) {
                w.count += 1;
                *w.level_counts.entry(e.level).or_insert(0) += 1;
                if e.level >= LogLevel::Error {
                    w.error_count += 1;
                }
            }
        }

        for i in 0..windows.len() {
            if windows[i].count > 0 {
                windows[i].error_percent =
                    windows[i].error_count as f64 * 100.0 / windows[i].count as f64;
            }
            if i > 0 && windows[i - 1].count > 0 {
                windows[i].change_percent = (windows[i].count as f64
                    - windows[i - 1].count as f64)
                    * 100.0
                    / windows[i - 1].count as f64;
            }
        }

        windows
    }
}

fn top_messages(counts: &HashMap<&str, usize>, n: usize) -> Vec<MessageCount> {
    let mut msgs: Vec<MessageCount> = counts
        .iter()
        .map(|(msg, count)| MessageCount {
            message: msg.to_string(),
            count: *count,
        })
        .collect();
    msgs.sort_by(|a, b| b.count.cmp(&a.count));
    msgs.truncate(n);
    msgs
}

/// An event produced by [`ContextEmitter`].
#[derive(Debug, Clone)]
pub enum ContextEvent {
    Entry(LogEntry),
    /// A separator between disjoint match groups.
    Separator,
}

/// Streams matching entries plus N lines of surrounding context, grep-style.
///
/// Adjacent match runs are merged, lines are never emitted twice, and a
/// separator event marks the gap between disjoint groups. With `context = 0`
/// the emitter degenerates to plain match output.
///
/// Entries must arrive with monotonically increasing line numbers; the
/// dedup bookkeeping depends on it.
pub struct ContextEmitter {
    context: usize,
    last_emitted_line: u64,
    last_seen_line: u64,
    after_remaining: usize,
    in_context: bool,
    has_output: bool,
    before: VecDeque<LogEntry>,
}

impl ContextEmitter {
    pub fn new(context: usize) -> Self {
        Self {
            context,
            last_emitted_line: 0,
            last_seen_line: 0,
            after_remaining: 0,
            in_context: false,
            has_output: false,
            before: VecDeque::new(),
        }
    }

    /// Feeds the next entry through the emitter. `matched` is the caller's
    /// match verdict for this entry.
    pub fn process(
        &mut self,
        entry: LogEntry,
        matched: bool,
        emit: &mut dyn FnMut(ContextEvent) -> anyhow::Result<()>,
    ) -> anyhow::Result<()> {
        debug_assert!(
            entry.line > self.last_seen_line,
            "context emitter requires monotonically increasing line numbers"
        );
        self.last_seen_line = entry.line;

        if self.context == 0 {
            if matched {
                self.last_emitted_line = entry.line;
                self.has_output = true;
                emit(ContextEvent::Entry(entry))?;
            }
            return Ok(());
        }

        if matched {
            if !self.in_context && self.has_output {
                emit(ContextEvent::Separator)?;
            }

            let pending: Vec<LogEntry> = self.before.drain(..).collect();
            for prev in pending {
                if prev.line <= self.last_emitted_line {
                    continue;
                }
                self.last_emitted_line = prev.line;
                self.has_output = true;
                emit(ContextEvent::Entry(prev))?;
            }

            if entry.line > self.last_emitted_line {
                self.last_emitted_line = entry.line;
                self.has_output = true;
                emit(ContextEvent::Entry(entry.clone()))?;
            }

            self.in_context = true;
            self.after_remaining = self.context;
        } else if self.in_context {
            if entry.line > self.last_emitted_line {
                self.last_emitted_line = entry.line;
                self.has_output = true;
                emit(ContextEvent::Entry(entry.clone()))?;
            }
            self.after_remaining -= 1;
            if self.after_remaining == 0 {
                self.in_context = false;
            }
        }

        self.before.push_back(entry);
        if self.before.len() > self.context {
            self.before.pop_front();
        }

        Ok(())
    }
}
