use anyhow::{bail, Context, Result};
use chrono::SecondsFormat;
use clap::Args;
use cyro_core::analyzer::{AnalysisResult, Analyzer};
use cyro_core::config::Config;
use cyro_core::entry::LogEntry;
use cyro_core::input::expand_globs;
use cyro_core::parser::Parser;
use cyro_core::preprocess::Preprocessor;
use cyro_core::prompt::{build, BuildOptions, PromptType};
use cyro_core::timeref::parse_duration;

use crate::output::{self, Format};

#[derive(Args)]
pub struct AnalyzeArgs {
    /// Log files or glob patterns
    #[arg(required = true)]
    pub files: Vec<String>,

    /// Enable AI-powered analysis using the configured LLM
    #[arg(long)]
    pub ai: bool,

    /// With --ai, run the two-pass structured analysis and print JSON
    #[arg(long, requires = "ai")]
    pub structured: bool,

    /// Number of top results to show
    #[arg(long, default_value_t = 10)]
    pub top: usize,

    /// Group results by field (level, message, source)
    #[arg(long, default_value = "message")]
    pub group_by: String,

    /// Focus analysis on entries matching this regex
    #[arg(short, long)]
    pub pattern: Option<String>,

    /// Time window for trend analysis (e.g. 5m, 1h)
    #[arg(long)]
    pub window: Option<String>,
}

pub async fn run(args: AnalyzeArgs, format: Format) -> Result<()> {
    if !matches!(args.group_by.as_str(), "level" | "message" | "source") {
        bail!(
            "invalid --group-by value: {} (must be 'level', 'message', or 'source')",
            args.group_by
        );
    }

    let files = expand_globs(&args.files)?;
    let pattern = super::compile_pattern(&args.pattern)?;

    let window = match &args.window {
        Some(w) => {
            let d = parse_duration(w).context("invalid --window value")?;
            Some(d)
        }
        None => None,
    };

    let parser = Parser::default();
    let mut entries: Vec<LogEntry> = Vec::new();
    for file in &files {
        parser.parse_file_stream(file, |entry| {
            if let Some(re) = &pattern {
                if !re.is_match(&entry.raw) {
                    return Ok(());
                }
            }
            entries.push(entry);
            Ok(())
        })?;
    }

    if entries.is_empty() {
        println!("No matching entries found.");
        return Ok(());
    }

    if args.ai {
        return run_ai(args, files, entries).await;
    }

    let analyzer = Analyzer::new();
    let mut result = AnalysisResult {
        total_lines: entries.len(),
        group_by: args.group_by.clone(),
        pattern: args.pattern.clone().unwrap_or_default(),
        ..Default::default()
    };
    result.groups = analyzer.group_by(&entries, &args.group_by, args.top)?;
    if let Some(window) = window {
        result.time_windows = analyzer.analyze_by_window(&entries, window);
    }

    output::write_analysis(format, &result)
}

async fn run_ai(
    args: AnalyzeArgs,
    files: Vec<std::path::PathBuf>,
    entries: Vec<LogEntry>,
) -> Result<()> {
    let config = Config::load();

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

    let build_opts = BuildOptions {
        summary: output.summary,
        files: files.iter().map(|f| f.display().to_string()).collect(),
        pattern: args.pattern.unwrap_or_default(),
        group_by: args.group_by,
        window: args.window.unwrap_or_default(),
        time_range,
        ..Default::default()
    };

    if args.structured {
        return run_structured(&config, build_opts).await;
    }

    let messages = build(PromptType::Summarize, &build_opts)?;
    super::stream_llm_answer(&config, &messages).await?;
    Ok(())
}

/// Two-pass structured analysis: a free-form first pass, then a second
/// call with the reply prefilled as the assistant turn to extract JSON.
async fn run_structured(config: &Config, mut build_opts: BuildOptions) -> Result<()> {
    use cyro_core::llm::{create_provider, ChatOptions};

    let provider = create_provider(config)?;
    provider.heartbeat().await.with_context(|| {
        format!(
            "LLM provider unreachable; is ollama running at {}?",
            config.llm.ollama.host
        )
    })?;

    let first_pass = build(PromptType::StructuredOutput, &build_opts)?;
    let first_reply = provider.chat(&first_pass, &ChatOptions::default()).await?;

    build_opts.first_pass_response = first_reply.content;
    let second_pass = build(PromptType::StructuredOutput, &build_opts)?;
    let second_reply = provider.chat(&second_pass, &ChatOptions::default()).await?;

    println!("{}", second_reply.content.trim());
    Ok(())
}
