//! Cyro core library: the log understanding pipeline.
//!
//! This crate provides everything behind the `cyro` command line tool: a
//! multi-format streaming parser, a live tailer with rotation handling, a
//! statistical analyzer, and a preprocessing compressor that reduces raw
//! log volume into an LLM-consumable summary via Drain template extraction
//! and correlation-preserving secret redaction. The [`llm`] module hides
//! concrete model backends behind one provider interface.
//!
//! A pure statistical run flows `input -> parser -> analyzer`; an
//! AI-assisted run flows
//! `input -> parser -> analyzer (filter) -> preprocess -> prompt -> llm`.

pub mod analyzer;
pub mod config;
pub mod entry;
pub mod input;
pub mod llm;
pub mod parser;
pub mod preprocess;
pub mod prompt;
pub mod tail;
pub mod timeref;

pub use analyzer::{AnalysisResult, Analyzer, FilterOptions, GroupedResult, Stats, TimeWindowStats};
pub use config::Config;
pub use entry::{parse_level, LogEntry, LogLevel};
pub use input::expand_globs;
pub use llm::{create_provider, ChatOptions, ChatResponse, LlmError, Message, Provider, Role, StreamEvent};
pub use parser::{Format, ParseError, Parser};
pub use preprocess::{CompressedOutput, Preprocessor};
pub use prompt::{build as build_prompt, BuildOptions, PromptType};
pub use tail::{TailError, TailOptions, Tailer};
pub use timeref::{parse_duration, parse_time_ref};
