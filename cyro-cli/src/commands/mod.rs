pub mod analyze;
pub mod ask;
pub mod search;
pub mod stats;
pub mod tail;

use std::io::Write;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use cyro_core::config::Config;
use cyro_core::entry::{parse_level, LogLevel};
use cyro_core::llm::{create_provider, ChatOptions, Message};
use cyro_core::timeref::parse_time_ref;
use regex::Regex;

/// Compiles an optional `--pattern` flag.
pub fn compile_pattern(pattern: &Option<String>) -> Result<Option<Regex>> {
    match pattern {
        Some(p) => Ok(Some(Regex::new(p).context("invalid pattern")?)),
        None => Ok(None),
    }
}

/// Parses an optional `--level` flag, rejecting unknown names.
pub fn parse_level_flag(level: &Option<String>) -> Result<LogLevel> {
    match level {
        Some(s) => {
            let parsed = parse_level(s);
            if parsed == LogLevel::Unknown && !s.eq_ignore_ascii_case("unknown") {
                bail!("invalid level: {} (must be one of: debug, info, warn, error, fatal)", s);
            }
            Ok(parsed)
        }
        None => Ok(LogLevel::Unknown),
    }
}

/// Parses an optional `--since`/`--until` flag.
pub fn parse_time_flag(value: &Option<String>, flag: &str) -> Result<Option<DateTime<Utc>>> {
    match value {
        Some(s) => Ok(Some(
            parse_time_ref(s).with_context(|| format!("invalid --{} value", flag))?,
        )),
        None => Ok(None),
    }
}

/// Streams an LLM answer to stdout, returning the full text. Checks the
/// provider and model health first so failures carry a usable hint.
pub async fn stream_llm_answer(config: &Config, messages: &[Message]) -> Result<String> {
    let provider = create_provider(config)?;

    provider.heartbeat().await.with_context(|| {
        format!(
            "LLM provider unreachable; is ollama running at {}?",
            config.llm.ollama.host
        )
    })?;

    let model = &config.llm.ollama.model;
    if !provider.model_available(model).await? {
        bail!("model {model} is not available; fetch it with `ollama pull {model}`");
    }

    let mut stream = provider
        .chat_stream(messages, &ChatOptions::default())
        .await?;

    let mut full = String::new();
    let mut stdout = std::io::stdout();
    while let Some(event) = stream.recv().await {
        if let Some(err) = event.error {
            return Err(err.into());
        }
        print!("{}", event.content);
        stdout.flush().ok();
        full.push_str(&event.content);
    }
    println!();

    Ok(full)
}
