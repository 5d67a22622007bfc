use anyhow::Result;
use chrono::SecondsFormat;
use clap::Args;
use cyro_core::analyzer::{Analyzer, FilterOptions};
use cyro_core::config::Config;
use cyro_core::entry::LogEntry;
use cyro_core::input::expand_globs;
use cyro_core::parser::Parser;
use cyro_core::preprocess::Preprocessor;
use cyro_core::prompt::{build, BuildOptions, PromptType};

use crate::output::Format;

#[derive(Args)]
pub struct AskArgs {
    /// The natural language question
    pub question: String,

    /// Log file(s) to analyze (repeatable)
    #[arg(short = 'F', long = "file", required = true)]
    pub files: Vec<String>,

    /// Pre-filter logs matching this regex
    #[arg(short, long)]
    pub pattern: Option<String>,

    /// Filter by exact log level (debug, info, warn, error, fatal)
    #[arg(short, long)]
    pub level: Option<String>,

    /// Filter logs after this time (relative like '1h' or absolute)
    #[arg(long)]
    pub since: Option<String>,

    /// Filter logs before this time (relative like '1h' or absolute)
    #[arg(long)]
    pub until: Option<String>,
}

pub async fn run(args: AskArgs, _format: Format) -> Result<()> {
    let config = Config::load();
    let files = expand_globs(&args.files)?;

    let filter = FilterOptions {
        pattern: super::compile_pattern(&args.pattern)?,
        min_level: super::parse_level_flag(&args.level)?,
        since: super::parse_time_flag(&args.since, "since")?,
        until: super::parse_time_flag(&args.until, "until")?,
        invert: false,
        exact_level: true,
    };

    let parser = Parser::default();
    let mut entries: Vec<LogEntry> = Vec::new();
    for file in &files {
        parser.parse_file_stream(file, |entry| {
            if Analyzer::matches(&entry, &filter) {
                entries.push(entry);
            }
            Ok(())
        })?;
    }

    if entries.is_empty() {
        println!("No matching log entries found to answer the question from.");
        return Ok(());
    }

    let preprocessor = Preprocessor::new();
    let output = preprocessor.process(&entries);

    let time_range = match (output.time_range.start, output.time_range.end) {
        (Some(start), Some(end)) => format!(
            "{} to {}",
            start.to_rfc3339_opts(SecondsFormat::Secs, true),
            end.to_rfc3339_opts(SecondsFormat::Secs, true)
        ),
        _ => String::new(),
    };

    let messages = build(
        PromptType::NaturalLanguageQuery,
        &BuildOptions {
            summary: output.summary,
            question: args.question,
            files: files.iter().map(|f| f.display().to_string()).collect(),
            pattern: args.pattern.unwrap_or_default(),
            level: args.level.unwrap_or_default(),
            time_range,
            ..Default::default()
        },
    )?;

    super::stream_llm_answer(&config, &messages).await?;
    Ok(())
}
