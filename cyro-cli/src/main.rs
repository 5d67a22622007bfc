//! Cyro command line: search, stats, analyze, tail, and ask over log files.

mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use output::Format;

#[derive(Parser)]
#[command(name = "cyro")]
#[command(about = "Log analysis from the command line, with optional AI assistance", long_about = None)]
#[command(version)]
struct Cli {
    /// Output format: text or json
    #[arg(long, global = true, default_value = "text")]
    format: String,

    /// Enable debug logging
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search and filter log entries
    Search(commands::search::SearchArgs),
    /// Show aggregate statistics for log files
    Stats(commands::stats::StatsArgs),
    /// Analyze log files for patterns and trends
    Analyze(commands::analyze::AnalyzeArgs),
    /// Tail a log file with live filtering
    Tail(commands::tail::TailArgs),
    /// Ask natural language questions about log files using AI
    Ask(commands::ask::AskArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_directive = if cli.verbose { "cyro=debug" } else { "cyro=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_directive)),
        )
        .with_writer(std::io::stderr)
        .init();

    let format = Format::parse(&cli.format);

    match cli.command {
        Commands::Search(args) => commands::search::run(args, format),
        Commands::Stats(args) => commands::stats::run(args, format),
        Commands::Analyze(args) => commands::analyze::run(args, format).await,
        Commands::Tail(args) => commands::tail::run(args, format).await,
        Commands::Ask(args) => commands::ask::run(args, format).await,
    }
}
