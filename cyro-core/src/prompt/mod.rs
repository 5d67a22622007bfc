//! Prompt construction for the AI-assisted commands.
//!
//! [`build`] turns a [`PromptType`] and a [`BuildOptions`] record into the
//! exact message sequence for an LLM chat call. The builder performs no
//! I/O; chaining the two passes of [`PromptType::StructuredOutput`] is the
//! caller's job.

mod system;

use thiserror::Error;

use crate::llm::{Message, Role};
use system::system_prompt;

/// The analysis task a prompt is designed to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptType {
    /// High-level narrative summary; the default for `analyze --ai`.
    Summarize,
    /// Evidence-based diagnosis of the root cause of failures.
    RootCause,
    /// Detection of patterns deviating from normal behaviour.
    AnomalyDetection,
    /// Answering a specific user question; used by `ask`.
    NaturalLanguageQuery,
    /// Two-pass pattern for reliable JSON extraction from small models.
    /// The first pass (empty `first_pass_response`) requests free-form
    /// analysis; the second prefills the assistant turn and asks for JSON.
    StructuredOutput,
}

impl PromptType {
    pub fn all() -> [PromptType; 5] {
        [
            PromptType::Summarize,
            PromptType::RootCause,
            PromptType::AnomalyDetection,
            PromptType::NaturalLanguageQuery,
            PromptType::StructuredOutput,
        ]
    }
}

/// Contextual information for building a prompt. Not every field is used
/// by every [`PromptType`].
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// The compressed log text from the preprocessor. Required for all
    /// prompt types.
    pub summary: String,
    /// The user's question. Required for
    /// [`PromptType::NaturalLanguageQuery`].
    pub question: String,
    /// Log files being analysed; included as context when non-empty.
    pub files: Vec<String>,
    /// Regex used to pre-filter entries; noted when non-empty.
    pub pattern: String,
    /// Level filter applied before compression; noted when non-empty.
    pub level: String,
    /// Grouping field for statistical analysis; noted when non-empty.
    pub group_by: String,
    /// Time window applied during trend analysis; noted when non-empty.
    pub window: String,
    /// Human-readable log time span; included in the header when non-empty.
    pub time_range: String,
    /// For [`PromptType::StructuredOutput`] only: the model's first-pass
    /// reply. Empty selects the first pass.
    pub first_pass_response: String,
}

#[derive(Error, Debug)]
pub enum PromptError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),
}

/// Constructs the message sequence for the given prompt type.
///
/// The list always begins with a type-specific system message, followed by
/// user (and, for the structured second pass, assistant) messages encoding
/// the log context and task instruction.
pub fn build(pt: PromptType, opts: &BuildOptions) -> Result<Vec<Message>, PromptError> {
    if opts.summary.is_empty() {
        return Err(PromptError::MissingField("summary"));
    }

    match pt {
        PromptType::NaturalLanguageQuery => build_natural_language_query(opts),
        PromptType::StructuredOutput => Ok(build_structured_output(opts)),
        _ => Ok(build_standard(pt, opts)),
    }
}

/// Summarize, RootCause, and AnomalyDetection share the `[system, user]`
/// shape, differing in the system persona and the task instruction.
fn build_standard(pt: PromptType, opts: &BuildOptions) -> Vec<Message> {
    let mut user = String::new();
    user.push_str(match pt {
        PromptType::RootCause => "Perform a root cause analysis on the following log summary:\n\n",
        PromptType::AnomalyDetection => "Identify anomalies in the following log summary:\n\n",
        _ => "Analyze the following log summary:\n\n",
    });
    append_log_context(&mut user, opts);
    append_filter_notes(&mut user, opts);

    vec![
        Message::new(Role::System, system_prompt(pt)),
        Message::new(Role::User, user),
    ]
}

fn build_natural_language_query(opts: &BuildOptions) -> Result<Vec<Message>, PromptError> {
    if opts.question.is_empty() {
        return Err(PromptError::MissingField("question"));
    }

    let mut user = String::new();
    user.push_str("Question: ");
    user.push_str(&opts.question);
    user.push_str("\n\n");
    user.push_str("Log Summary:\n");
    user.push_str(&opts.summary);
    append_filter_notes(&mut user, opts);

    Ok(vec![
        Message::new(Role::System, system_prompt(PromptType::NaturalLanguageQuery)),
        Message::new(Role::User, user),
    ])
}

/// First pass: `[system, user]`. Second pass (non-empty
/// `first_pass_response`): `[system, user, assistant(prefill), user]`.
fn build_structured_output(opts: &BuildOptions) -> Vec<Message> {
    let mut first_user = String::new();
    first_user.push_str("Analyze the following log summary:\n\n");
    append_log_context(&mut first_user, opts);
    append_filter_notes(&mut first_user, opts);

    let system = Message::new(Role::System, system_prompt(PromptType::StructuredOutput));
    let first_user = Message::new(Role::User, first_user);

    if opts.first_pass_response.is_empty() {
        return vec![system, first_user];
    }

    let extract_instruction = "Now extract your analysis into the JSON schema specified in the \
                               system prompt. Output ONLY the JSON object, with no markdown and \
                               no explanation.";

    vec![
        system,
        first_user,
        Message::new(Role::Assistant, opts.first_pass_response.clone()),
        Message::new(Role::User, extract_instruction),
    ]
}

/// Writes the compressed summary plus optional time range and file list.
fn append_log_context(out: &mut String, opts: &BuildOptions) {
    if !opts.time_range.is_empty() {
        out.push_str(&format!("Time range: {}\n\n", opts.time_range));
    }

    match opts.files.len() {
        0 => {}
        1 => out.push_str(&format!("Source file: {}\n\n", opts.files[0])),
        n => out.push_str(&format!(
            "Source files ({}): {}\n\n",
            n,
            opts.files.join(", ")
        )),
    }

    out.push_str(&opts.summary);
    out.push_str("\n\n");
}

/// Notes any pre-compression filters so the model knows the data was
/// already narrowed.
fn append_filter_notes(out: &mut String, opts: &BuildOptions) {
    let mut notes = Vec::new();

    if !opts.pattern.is_empty() {
        notes.push(format!("Filtered by pattern: {}", opts.pattern));
    }
    if !opts.level.is_empty() {
        notes.push(format!("Filtered by level: {}", opts.level));
    }
    if !opts.group_by.is_empty() {
        notes.push(format!("Analysis grouped by: {}", opts.group_by));
    }
    if !opts.window.is_empty() {
        notes.push(format!("Time window applied: {}", opts.window));
    }

    if !notes.is_empty() {
        out.push_str("Note: ");
        out.push_str(&notes.join("; "));
        out.push_str(".\n");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts() -> BuildOptions {
        BuildOptions {
            summary: "=== Log Analysis Summary ===\nTotal Lines: 3\n".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn standard_types_are_system_then_user() {
        for pt in [
            PromptType::Summarize,
            PromptType::RootCause,
            PromptType::AnomalyDetection,
        ] {
            let messages = build(pt, &opts()).unwrap();
            assert_eq!(messages.len(), 2);
            assert_eq!(messages[0].role, Role::System);
            assert_eq!(messages[1].role, Role::User);
            assert!(messages[1].content.contains("Total Lines: 3"));
        }
    }

    #[test]
    fn system_prompts_are_distinct_per_type() {
        let prompts: Vec<String> = PromptType::all()
            .iter()
            .map(|pt| {
                let mut o = opts();
                o.question = "why?".to_string();
                build(*pt, &o).unwrap()[0].content.clone()
            })
            .collect();

        for i in 0..prompts.len() {
            for j in (i + 1)..prompts.len() {
                assert_ne!(prompts[i], prompts[j], "types {} and {} share a system prompt", i, j);
            }
        }
    }

    #[test]
    fn build_is_deterministic() {
        let a = build(PromptType::Summarize, &opts()).unwrap();
        let b = build(PromptType::Summarize, &opts()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn missing_summary_is_rejected() {
        let result = build(PromptType::Summarize, &BuildOptions::default());
        assert!(matches!(result, Err(PromptError::MissingField("summary"))));
    }

    #[test]
    fn query_requires_a_question() {
        let result = build(PromptType::NaturalLanguageQuery, &opts());
        assert!(matches!(result, Err(PromptError::MissingField("question"))));
    }

    #[test]
    fn query_places_question_before_summary() {
        let mut o = opts();
        o.question = "what caused the errors?".to_string();
        let messages = build(PromptType::NaturalLanguageQuery, &o).unwrap();
        let user = &messages[1].content;

        let q = user.find("Question: what caused the errors?").unwrap();
        let s = user.find("Log Summary:").unwrap();
        assert!(q < s);
    }

    #[test]
    fn filter_notes_enumerate_active_filters() {
        let mut o = opts();
        o.pattern = "timeout".to_string();
        o.level = "error".to_string();
        o.group_by = "source".to_string();
        o.window = "5m".to_string();
        let messages = build(PromptType::Summarize, &o).unwrap();
        let user = &messages[1].content;

        assert!(user.contains("Filtered by pattern: timeout"));
        assert!(user.contains("Filtered by level: error"));
        assert!(user.contains("Analysis grouped by: source"));
        assert!(user.contains("Time window applied: 5m"));
    }

    #[test]
    fn file_context_renders_singular_and_plural() {
        let mut o = opts();
        o.files = vec!["app.log".to_string()];
        let messages = build(PromptType::Summarize, &o).unwrap();
        assert!(messages[1].content.contains("Source file: app.log"));

        o.files.push("api.log".to_string());
        let messages = build(PromptType::Summarize, &o).unwrap();
        assert!(messages[1]
            .content
            .contains("Source files (2): app.log, api.log"));
    }

    #[test]
    fn structured_first_pass_is_system_user() {
        let messages = build(PromptType::StructuredOutput, &opts()).unwrap();
        assert_eq!(messages.len(), 2);
        assert!(messages[0].content.contains("JSON"));
    }

    #[test]
    fn structured_second_pass_prefills_the_assistant_turn() {
        let mut o = opts();
        o.first_pass_response = "The database fell over at 10:02.".to_string();
        let messages = build(PromptType::StructuredOutput, &o).unwrap();

        assert_eq!(messages.len(), 4);
        assert_eq!(messages[2].role, Role::Assistant);
        assert_eq!(messages[2].content, "The database fell over at 10:02.");
        assert_eq!(messages[3].role, Role::User);
        assert!(messages[3].content.contains("JSON"));
    }
}
