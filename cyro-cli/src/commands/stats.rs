use anyhow::Result;
use clap::Args;
use cyro_core::analyzer::{Analyzer, FilterOptions};
use cyro_core::input::expand_globs;
use cyro_core::parser::Parser;

use crate::output::{self, Format};

#[derive(Args)]
pub struct StatsArgs {
    /// Log files or glob patterns
    #[arg(required = true)]
    pub files: Vec<String>,

    /// Only include logs since this time (RFC 3339 or relative like '1h')
    #[arg(long)]
    pub since: Option<String>,

    /// Only include logs until this time (RFC 3339 or relative like '1h')
    #[arg(long)]
    pub until: Option<String>,

    /// Number of top messages to show
    #[arg(long, default_value_t = 10)]
    pub top: usize,
}

pub fn run(args: StatsArgs, format: Format) -> Result<()> {
    let files = expand_globs(&args.files)?;

    let filter = FilterOptions {
        since: super::parse_time_flag(&args.since, "since")?,
        until: super::parse_time_flag(&args.until, "until")?,
        ..Default::default()
    };
    let time_bounded = filter.since.is_some() || filter.until.is_some();

    let parser = Parser::default();
    let analyzer = Analyzer::new();

    for file in &files {
        let mut entries = parser.parse_file(file)?;
        if time_bounded {
            entries = analyzer.filter(&entries, &filter);
        }
        let stats = analyzer.compute_stats(&entries, args.top);
        output::write_stats(format, &file.display().to_string(), &stats)?;
    }

    Ok(())
}
