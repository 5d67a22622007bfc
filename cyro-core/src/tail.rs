//! Live log tailing with filtering and rotation handling.
//!
//! [`Tailer`] emits the last N filtered entries of a file, then optionally
//! follows it for appends, surviving truncation and (when enabled)
//! rename-then-recreate rotation.

use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::PathBuf;
use std::time::Duration;

use notify::event::{EventKind, ModifyKind};
use notify::{RecursiveMode, Watcher};
use regex::Regex;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::entry::{LogEntry, LogLevel};
use crate::parser::{ParseError, Parser};

/// Bytes-per-line heuristic for the initial seek: generous for JSON logs,
/// with 2x overshoot so enough lines survive filtering.
const INITIAL_READ_BYTES_PER_LINE: u64 = 600;

const ROTATE_POLL_INTERVAL: Duration = Duration::from_millis(100);
const ROTATE_WAIT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Error, Debug)]
pub enum TailError {
    #[error("file rotated; enable follow-rotate to keep following")]
    Rotated,
    #[error("timed out waiting for rotated file to reappear")]
    RotationTimeout,
    #[error("file watcher closed unexpectedly")]
    WatcherClosed,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Watch(#[from] notify::Error),
    #[error(transparent)]
    Parse(ParseError),
    #[error("output sink failed: {0}")]
    Sink(anyhow::Error),
}

fn map_parse_err(e: ParseError) -> TailError {
    match e {
        ParseError::Callback(inner) => TailError::Sink(inner),
        other => TailError::Parse(other),
    }
}

/// Tailer behavior.
#[derive(Debug, Default)]
pub struct TailOptions {
    pub file_path: PathBuf,
    /// Number of initial lines to emit.
    pub lines: usize,
    /// Keep following the file for new content.
    pub follow: bool,
    /// Keep following through log rotations.
    pub follow_rotate: bool,
    /// Only emit entries whose raw line matches.
    pub pattern: Option<Regex>,
    /// Minimum level; entries whose level is `Unknown` always pass.
    pub level_filter: LogLevel,
}

/// Tails a log file with filtering.
pub struct Tailer {
    opts: TailOptions,
    parser: Parser,
    file: Option<std::fs::File>,
    offset: u64,
}

impl Tailer {
    pub fn new(opts: TailOptions) -> Self {
        Self {
            opts,
            parser: Parser::default(),
            file: None,
            offset: 0,
        }
    }

    /// Runs the tailer until the initial read completes (follow off), the
    /// caller cancels, or a rotation ends the session.
    ///
    /// Emissions are strictly in file order; after a rotation the new
    /// file's entries follow all old-file entries. Cancellation exits
    /// cleanly with `Ok(())`; appends arriving during shutdown may be
    /// dropped.
    pub async fn run<F>(
        &mut self,
        mut cancel: mpsc::UnboundedReceiver<()>,
        mut sink: F,
    ) -> Result<(), TailError>
    where
        F: FnMut(LogEntry) -> anyhow::Result<()>,
    {
        let file = std::fs::File::open(&self.opts.file_path)?;
        self.offset = file.metadata()?.len();
        self.file = Some(file);

        if self.opts.lines > 0 {
            self.read_initial_lines(&mut sink)?;
        }

        if !self.opts.follow {
            self.file = None;
            return Ok(());
        }

        // Bridge the notify callback thread into the async world.
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(
            move |res: Result<notify::Event, notify::Error>| {
                let _ = event_tx.send(res);
            },
        )?;
        watcher.watch(&self.opts.file_path, RecursiveMode::NonRecursive)?;

        loop {
            let event = tokio::select! {
                _ = cancel.recv() => {
                    debug!("tailer canceled");
                    self.file = None;
                    return Ok(());
                }
                event = event_rx.recv() => event,
            };

            let event = match event {
                None => return Err(TailError::WatcherClosed),
                Some(Err(e)) => return Err(e.into()),
                Some(Ok(event)) => event,
            };

            match event.kind {
                EventKind::Modify(ModifyKind::Metadata(_)) => {}
                EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(_)) => {
                    if !self.handle_rotation(&mut cancel, &mut watcher).await? {
                        // Canceled while waiting for the rotated file.
                        self.file = None;
                        return Ok(());
                    }
                }
                EventKind::Modify(_) | EventKind::Create(_) => {
                    self.read_new_content(&mut sink)?;
                }
                _ => {}
            }
        }
    }

    /// Emits the last N filtered entries, best-effort windowed by a byte
    /// heuristic rather than an exact line scan.
    fn read_initial_lines<F>(&mut self, sink: &mut F) -> Result<(), TailError>
    where
        F: FnMut(LogEntry) -> anyhow::Result<()>,
    {
        let file = self.file.as_mut().expect("file open");
        let size = file.metadata()?.len();
        if size == 0 {
            return Ok(());
        }

        let estimated = self.opts.lines as u64 * INITIAL_READ_BYTES_PER_LINE;
        let start = size.saturating_sub(estimated);
        file.seek(SeekFrom::Start(start))?;

        let mut reader = BufReader::new(file);
        if start > 0 {
            // Discard the partial line the seek landed in.
            let mut skipped = Vec::new();
            reader.read_until(b'\n', &mut skipped)?;
        }

        let mut matching: Vec<LogEntry> = Vec::new();
        let opts = &self.opts;
        self.parser
            .parse_stream(&mut reader, |entry| {
                if should_display(&entry, opts) {
                    matching.push(entry);
                }
                Ok(())
            })
            .map_err(map_parse_err)?;

        if matching.len() > self.opts.lines {
            matching.drain(..matching.len() - self.opts.lines);
        }
        for entry in matching {
            sink(entry).map_err(TailError::Sink)?;
        }

        let file = self.file.as_mut().expect("file open");
        self.offset = file.seek(SeekFrom::End(0))?;
        Ok(())
    }

    /// Reads everything appended past the recorded offset.
    fn read_new_content<F>(&mut self, sink: &mut F) -> Result<(), TailError>
    where
        F: FnMut(LogEntry) -> anyhow::Result<()>,
    {
        let file = self.file.as_mut().expect("file open");

        // A shrunken file means truncation; start over from the top rather
        // than reading garbage from a stale offset.
        let size = file.metadata()?.len();
        if size < self.offset {
            debug!(size, offset = self.offset, "file truncated, resetting offset");
            self.offset = 0;
        }

        file.seek(SeekFrom::Start(self.offset))?;

        let opts = &self.opts;
        self.parser
            .parse_stream(&mut *file, |entry| {
                if should_display(&entry, opts) {
                    sink(entry)?;
                }
                Ok(())
            })
            .map_err(map_parse_err)?;

        let file = self.file.as_mut().expect("file open");
        self.offset = file.seek(SeekFrom::End(0))?;
        Ok(())
    }

    /// Handles a rename or remove of the tailed path. Returns `Ok(true)`
    /// once the new file is being followed, `Ok(false)` when canceled
    /// while waiting for it.
    async fn handle_rotation(
        &mut self,
        cancel: &mut mpsc::UnboundedReceiver<()>,
        watcher: &mut impl Watcher,
    ) -> Result<bool, TailError> {
        if !self.opts.follow_rotate {
            self.file = None;
            return Err(TailError::Rotated);
        }

        self.file = None;
        let _ = watcher.unwatch(&self.opts.file_path);

        let deadline = tokio::time::Instant::now() + ROTATE_WAIT_TIMEOUT;
        let mut poll = tokio::time::interval(ROTATE_POLL_INTERVAL);

        loop {
            tokio::select! {
                _ = cancel.recv() => return Ok(false),
                _ = poll.tick() => {
                    if let Ok(file) = std::fs::File::open(&self.opts.file_path) {
                        self.file = Some(file);
                        self.offset = 0;
                        watcher.watch(&self.opts.file_path, RecursiveMode::NonRecursive)?;
                        info!(path = %self.opts.file_path.display(), "file rotated, following new file");
                        return Ok(true);
                    }
                    if tokio::time::Instant::now() >= deadline {
                        return Err(TailError::RotationTimeout);
                    }
                }
            }
        }
    }
}

/// Applies the level and pattern filters.
fn should_display(entry: &LogEntry, opts: &TailOptions) -> bool {
    if opts.level_filter != LogLevel::Unknown
        && entry.level != LogLevel::Unknown
        && entry.level < opts.level_filter
    {
        return false;
    }

    if let Some(pattern) = &opts.pattern {
        if !pattern.is_match(&entry.raw) {
            return false;
        }
    }

    true
}
