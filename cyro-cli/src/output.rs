//! Plain text and JSON rendering of core results.

use anyhow::Result;
use cyro_core::analyzer::{AnalysisResult, GroupedResult, Stats, TimeWindowStats};
use cyro_core::entry::LogEntry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Text,
    Json,
}

impl Format {
    pub fn parse(s: &str) -> Format {
        match s.to_ascii_lowercase().as_str() {
            "json" => Format::Json,
            _ => Format::Text,
        }
    }
}

pub fn write_entries(format: Format, entries: &[LogEntry]) -> Result<()> {
    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(entries)?),
        Format::Text => {
            for entry in entries {
                println!("{}", entry.raw);
            }
        }
    }
    Ok(())
}

pub fn write_stats(format: Format, path: &str, stats: &Stats) -> Result<()> {
    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(stats)?),
        Format::Text => {
            println!("File: {}", path);
            println!("Total lines: {}", stats.total_lines);
            if let (Some(first), Some(last)) = (stats.first_entry, stats.last_entry) {
                println!("Time range: {} to {}", first.to_rfc3339(), last.to_rfc3339());
            }
            println!("Error rate: {:.1}%", stats.error_rate * 100.0);
            println!("Levels:");
            for (level, count) in &stats.level_counts {
                println!("  {:<8} {}", level.to_string(), count);
            }
            if !stats.top_messages.is_empty() {
                println!("Top messages:");
                for mc in &stats.top_messages {
                    println!("  {:>6}  {}", mc.count, mc.message);
                }
            }
        }
    }
    Ok(())
}

pub fn write_analysis(format: Format, result: &AnalysisResult) -> Result<()> {
    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(result)?),
        Format::Text => {
            println!("Total lines: {}", result.total_lines);
            if !result.groups.is_empty() {
                println!("Grouped by {}:", result.group_by);
                write_groups_text(&result.groups);
            }
            if !result.time_windows.is_empty() {
                println!("Time windows:");
                write_windows_text(&result.time_windows);
            }
        }
    }
    Ok(())
}

fn write_groups_text(groups: &[GroupedResult]) {
    for g in groups {
        println!("  {:>6}  {:>5.1}%  {}", g.count, g.percent, g.key);
    }
}

fn write_windows_text(windows: &[TimeWindowStats]) {
    for w in windows {
        println!(
            "  {}  count={:<6} errors={:<5} ({:.1}%)  change={:+.1}%",
            w.start.to_rfc3339(),
            w.count,
            w.error_count,
            w.error_percent,
            w.change_percent
        );
    }
}
