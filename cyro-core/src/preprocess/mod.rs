//! Log preprocessing for LLM consumption.
//!
//! The pipeline runs three stages over parsed entries:
//!
//! 1. Redaction: sensitive values become correlation-preserving placeholders
//! 2. Drain: similar messages collapse into templates
//! 3. Compression: templates are rendered into a token-budgeted summary
//!
//! ```no_run
//! use cyro_core::preprocess::Preprocessor;
//!
//! let entries = Vec::new();
//! let preprocessor = Preprocessor::new()
//!     .with_token_limit(4000)
//!     .with_redaction(true);
//! let output = preprocessor.process(&entries);
//! println!("{}", output.summary);
//! ```

pub mod compress;
pub mod drain;
pub mod patterns;
pub mod redact;

pub use compress::{CompressedOutput, Compressor, TemplateSummary, TimeRange, DEFAULT_TOKEN_LIMIT};
pub use drain::{DrainExtractor, Template, WILDCARD};
pub use patterns::{builtin_patterns, default_pattern_names, RedactionPattern};
pub use redact::Redactor;

use std::fmt;

use crate::entry::{LogEntry, LogLevel};

/// Orchestrates the redact, drain, and compress stages.
pub struct Preprocessor {
    redactor: Redactor,
    drain: DrainExtractor,
    compressor: Compressor,
    token_limit: usize,
    redaction_enabled: bool,
    pattern_names: Vec<String>,
    debug: bool,
}

impl Preprocessor {
    /// Creates a preprocessor with default settings: redaction on with the
    /// default pattern set, default Drain parameters, 8000-token budget.
    pub fn new() -> Self {
        Self {
            redactor: Redactor::new(true, default_pattern_names()),
            drain: DrainExtractor::default(),
            compressor: Compressor::default(),
            token_limit: DEFAULT_TOKEN_LIMIT,
            redaction_enabled: true,
            pattern_names: Vec::new(),
            debug: false,
        }
    }

    pub fn with_token_limit(mut self, limit: usize) -> Self {
        self.token_limit = if limit == 0 { DEFAULT_TOKEN_LIMIT } else { limit };
        self.compressor = Compressor::new(self.token_limit);
        self
    }

    pub fn with_redaction(mut self, enabled: bool) -> Self {
        self.redaction_enabled = enabled;
        self.redactor = Redactor::new(enabled, &self.pattern_names);
        self
    }

    pub fn with_redaction_patterns(mut self, names: &[String]) -> Self {
        self.pattern_names = names.to_vec();
        self.redactor = Redactor::new(self.redaction_enabled, &self.pattern_names);
        self
    }

    pub fn with_drain_config(mut self, depth: usize, sim_threshold: f64, max_children: usize) -> Self {
        self.drain = DrainExtractor::new(depth, sim_threshold, max_children);
        self
    }

    /// Debug mode adds template lineage and redaction stats to the output
    /// metadata.
    pub fn with_debug(mut self, enabled: bool) -> Self {
        self.debug = enabled;
        self
    }

    /// Runs the complete pipeline over the given entries.
    pub fn process(&self, entries: &[LogEntry]) -> CompressedOutput {
        if entries.is_empty() {
            return self.compressor.compress(entries, &[], 0);
        }

        let (redacted, redacted_count) = self.redact_entries(entries);

        for entry in &redacted {
            self.drain.extract(&entry.message);
        }
        let templates = self.drain.templates();

        let mut output = self
            .compressor
            .compress(&redacted, &templates, redacted_count);

        if self.debug {
            self.add_debug_info(&mut output, &templates);
        }

        output
    }

    /// Runs the pipeline and derives summary statistics alongside.
    pub fn process_with_stats(&self, entries: &[LogEntry]) -> (CompressedOutput, ProcessStats) {
        let output = self.process(entries);

        let mut stats = ProcessStats {
            input_lines: entries.len(),
            output_templates: output.templates.len(),
            redacted_count: output.redacted_count,
            token_count: output.token_count,
            token_limit: output.token_limit,
            compression_ratio: output.compression_ratio(),
            within_budget: output.is_within_budget(),
            ..Default::default()
        };

        for t in &output.templates {
            match t.level {
                LogLevel::Fatal => stats.fatal_count += 1,
                LogLevel::Error => stats.error_count += 1,
                LogLevel::Warn => stats.warn_count += 1,
                LogLevel::Info => stats.info_count += 1,
                LogLevel::Debug => stats.debug_count += 1,
                LogLevel::Unknown => {}
            }
        }

        (output, stats)
    }

    /// Clears all state: extracted templates and redaction mappings.
    /// Call when switching to an unrelated log file so correlations do not
    /// leak across contexts.
    pub fn reset(&self) {
        self.drain.reset();
        self.redactor.reset();
    }

    /// Redacted values and their placeholders, for diagnostics.
    pub fn redacted_values(&self) -> std::collections::HashMap<String, String> {
        self.redactor.unique_values()
    }

    pub fn template_count(&self) -> usize {
        self.drain.template_count()
    }

    fn redact_entries(&self, entries: &[LogEntry]) -> (Vec<LogEntry>, usize) {
        let mut redacted = Vec::with_capacity(entries.len());
        let mut total = 0;

        for entry in entries {
            let mut entry = entry.clone();

            let (message, count) = self.redactor.redact_and_count(&entry.message);
            let message = message.into_owned();
            total += count;

            if entry.raw != entry.message {
                let (raw, count) = self.redactor.redact_and_count(&entry.raw);
                entry.raw = raw.into_owned();
                total += count;
            } else {
                entry.raw = message.clone();
            }
            entry.message = message;

            redacted.push(entry);
        }

        (redacted, total)
    }

    fn add_debug_info(&self, output: &mut CompressedOutput, templates: &[Template]) {
        let lineage: Vec<serde_json::Value> = templates
            .iter()
            .map(|t| {
                serde_json::json!({
                    "id": t.id,
                    "pattern": t.pattern,
                    "count": t.count,
                })
            })
            .collect();
        output
            .metadata
            .insert("templates_debug".to_string(), serde_json::json!(lineage));

        let redacted_values = self.redactor.unique_values();
        output.metadata.insert(
            "unique_redacted_values".to_string(),
            serde_json::json!(redacted_values.len()),
        );
    }
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self::new()
    }
}

/// Detailed statistics about one preprocessing run.
#[derive(Debug, Clone, Default)]
pub struct ProcessStats {
    pub input_lines: usize,
    pub output_templates: usize,
    pub redacted_count: usize,
    pub token_count: usize,
    pub token_limit: usize,
    pub compression_ratio: f64,
    pub within_budget: bool,
    pub fatal_count: usize,
    pub error_count: usize,
    pub warn_count: usize,
    pub info_count: usize,
    pub debug_count: usize,
}

impl fmt::Display for ProcessStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Processed {} lines into {} templates ({:.1}x compression)",
            self.input_lines, self.output_templates, self.compression_ratio
        )?;
        writeln!(f, "Redacted {} sensitive values", self.redacted_count)?;
        writeln!(
            f,
            "Token usage: {}/{} ({:.1}%)",
            self.token_count,
            self.token_limit,
            self.token_count as f64 / self.token_limit as f64 * 100.0
        )?;
        write!(
            f,
            "Severity distribution: {} FATAL, {} ERROR, {} WARN, {} INFO, {} DEBUG",
            self.fatal_count, self.error_count, self.warn_count, self.info_count, self.debug_count
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(level: LogLevel, message: &str) -> LogEntry {
        LogEntry {
            raw: message.to_string(),
            level,
            message: message.to_string(),
            line: 1,
            ..Default::default()
        }
    }

    #[test]
    fn pipeline_redacts_then_templates_then_compresses() {
        let entries = vec![
            entry(LogLevel::Error, "Connected from 10.0.0.1"),
            entry(LogLevel::Error, "Disconnected from 10.0.0.1"),
        ];
        let preprocessor = Preprocessor::new();
        let output = preprocessor.process(&entries);

        assert_eq!(output.redacted_count, 2);
        assert!(output.summary.contains("[IPV4:"));
        assert!(!output.summary.contains("10.0.0.1"));
        assert!(output.summary.contains("=== Error Summary ==="));
    }

    #[test]
    fn redaction_correlates_across_entries() {
        let entries = vec![
            entry(LogLevel::Info, "login from 10.0.0.1"),
            entry(LogLevel::Info, "logout from 10.0.0.1"),
        ];
        let preprocessor = Preprocessor::new();
        preprocessor.process(&entries);

        let values = preprocessor.redacted_values();
        assert_eq!(values.len(), 1);
    }

    #[test]
    fn disabled_redaction_passes_values_through() {
        let entries = vec![entry(LogLevel::Info, "login from 10.0.0.1")];
        let preprocessor = Preprocessor::new().with_redaction(false);
        let output = preprocessor.process(&entries);

        assert_eq!(output.redacted_count, 0);
        assert!(output.summary.contains("10.0.0.1"));
    }

    #[test]
    fn empty_entries_short_circuit() {
        let output = Preprocessor::new().process(&[]);
        assert!(output.summary.contains("No log entries to analyze"));
    }

    #[test]
    fn stats_reflect_output() {
        let entries = vec![
            entry(LogLevel::Error, "boom in module alpha"),
            entry(LogLevel::Info, "ok in module alpha"),
        ];
        let (output, stats) = Preprocessor::new().process_with_stats(&entries);
        assert_eq!(stats.input_lines, 2);
        assert_eq!(stats.output_templates, output.templates.len());
        assert!(stats.within_budget);
    }

    #[test]
    fn reset_forgets_templates_and_correlations() {
        let preprocessor = Preprocessor::new();
        preprocessor.process(&[entry(LogLevel::Info, "hello from 10.0.0.1")]);
        assert!(preprocessor.template_count() > 0);

        preprocessor.reset();
        assert_eq!(preprocessor.template_count(), 0);
        assert!(preprocessor.redacted_values().is_empty());
    }

    #[test]
    fn debug_mode_adds_lineage_metadata() {
        let entries = vec![entry(LogLevel::Info, "hello world from tests")];
        let output = Preprocessor::new().with_debug(true).process(&entries);
        assert!(output.metadata.contains_key("templates_debug"));
        assert!(output.metadata.contains_key("unique_redacted_values"));
    }

    #[test]
    fn templates_accumulate_across_process_calls() {
        let preprocessor = Preprocessor::new();
        preprocessor.process(&[entry(LogLevel::Info, "request 1 served quickly")]);
        preprocessor.process(&[entry(LogLevel::Info, "request 2 served quickly")]);
        assert_eq!(preprocessor.template_count(), 1);
    }
}
