use anyhow::{bail, Result};
use clap::Args;
use cyro_core::analyzer::{Analyzer, ContextEmitter, ContextEvent, FilterOptions};
use cyro_core::entry::LogEntry;
use cyro_core::input::expand_globs;
use cyro_core::parser::Parser;

use crate::output::{self, Format};

#[derive(Args)]
pub struct SearchArgs {
    /// Log files or glob patterns
    #[arg(required = true)]
    pub files: Vec<String>,

    /// Regex pattern to search for
    #[arg(short, long)]
    pub pattern: Option<String>,

    /// Filter by exact log level (debug, info, warn, error, fatal)
    #[arg(short, long)]
    pub level: Option<String>,

    /// Show logs since this time (RFC 3339 or relative like '1h')
    #[arg(long)]
    pub since: Option<String>,

    /// Show logs until this time (RFC 3339 or relative like '1h')
    #[arg(long)]
    pub until: Option<String>,

    /// Number of context lines around matches
    #[arg(short = 'C', long, default_value_t = 0)]
    pub context: usize,

    /// Only print the count of matching lines
    #[arg(short = 'c', long)]
    pub count: bool,

    /// Invert the match (show non-matching lines)
    #[arg(short = 'V', long)]
    pub invert: bool,
}

pub fn run(args: SearchArgs, format: Format) -> Result<()> {
    if args.invert && args.pattern.is_none() {
        bail!("--invert requires --pattern");
    }

    let files = expand_globs(&args.files)?;
    let multi_file = files.len() > 1;

    let filter = FilterOptions {
        pattern: super::compile_pattern(&args.pattern)?,
        min_level: super::parse_level_flag(&args.level)?,
        since: super::parse_time_flag(&args.since, "since")?,
        until: super::parse_time_flag(&args.until, "until")?,
        invert: args.invert,
        exact_level: true,
    };

    let parser = Parser::default();

    if args.count {
        for file in &files {
            let mut count = 0usize;
            parser.parse_file_stream(file, |entry| {
                if Analyzer::matches(&entry, &filter) {
                    count += 1;
                }
                Ok(())
            })?;
            if multi_file {
                println!("{}:{}", file.display(), count);
            } else {
                println!("{}", count);
            }
        }
        return Ok(());
    }

    if format == Format::Json {
        let mut all: Vec<LogEntry> = Vec::new();
        for file in &files {
            collect_with_context(&parser, file, &filter, args.context, &mut all)?;
        }
        return output::write_entries(Format::Json, &all);
    }

    for file in &files {
        let mut emitter = ContextEmitter::new(args.context);
        parser.parse_file_stream(file, |entry| {
            let matched = Analyzer::matches(&entry, &filter);
            emitter.process(entry, matched, &mut |event| {
                match event {
                    ContextEvent::Entry(e) => {
                        if multi_file {
                            println!("{}:{}", file.display(), e.raw);
                        } else {
                            println!("{}", e.raw);
                        }
                    }
                    ContextEvent::Separator => println!("--"),
                }
                Ok(())
            })
        })?;
    }

    Ok(())
}

fn collect_with_context(
    parser: &Parser,
    file: &std::path::Path,
    filter: &FilterOptions,
    context: usize,
    out: &mut Vec<LogEntry>,
) -> Result<()> {
    let mut emitter = ContextEmitter::new(context);
    parser.parse_file_stream(file, |entry| {
        let matched = Analyzer::matches(&entry, filter);
        emitter.process(entry, matched, &mut |event| {
            if let ContextEvent::Entry(e) = event {
                out.push(e);
            }
            Ok(())
        })
    })?;
    Ok(())
}
