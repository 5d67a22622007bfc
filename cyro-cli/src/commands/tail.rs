use anyhow::Result;
use clap::Args;
use cyro_core::tail::{TailOptions, Tailer};
use tokio::sync::mpsc;
use tracing::debug;

use crate::output::Format;

#[derive(Args)]
pub struct TailArgs {
    /// Log file to tail
    pub file: String,

    /// Number of initial lines to show
    #[arg(short = 'n', long, default_value_t = 10)]
    pub lines: usize,

    /// Keep following the file for new content
    #[arg(short, long)]
    pub follow: bool,

    /// Keep following through log rotations (implies --follow)
    #[arg(long)]
    pub follow_rotate: bool,

    /// Only show lines matching this regex
    #[arg(short, long)]
    pub pattern: Option<String>,

    /// Minimum log level to show
    #[arg(short, long)]
    pub level: Option<String>,
}

pub async fn run(args: TailArgs, format: Format) -> Result<()> {
    let opts = TailOptions {
        file_path: args.file.into(),
        lines: args.lines,
        follow: args.follow || args.follow_rotate,
        follow_rotate: args.follow_rotate,
        pattern: super::compile_pattern(&args.pattern)?,
        level_filter: super::parse_level_flag(&args.level)?,
    };

    // Ctrl-C cancels the follow loop cleanly.
    let (cancel_tx, cancel_rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("interrupt received, stopping tail");
            let _ = cancel_tx.send(());
        }
    });

    let mut tailer = Tailer::new(opts);
    tailer
        .run(cancel_rx, |entry| {
            match format {
                Format::Json => println!("{}", serde_json::to_string(&entry)?),
                Format::Text => println!("{}", entry.raw),
            }
            Ok(())
        })
        .await?;

    Ok(())
}
