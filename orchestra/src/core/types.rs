//! Shared deterministic types for the orchestra core.
//!
//! These types define the contracts between the loop, the toolkit and the
//! router. They carry no I/O handles and serialize deterministically.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Speaker of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One role-tagged conversation turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Append-only message history for one session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

/// Safety mode for mutating tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SafetyMode {
    /// Mutating tools compute their effect without applying it.
    Preview,
    /// Mutating tools apply immediately and are logged.
    Execute,
}

impl SafetyMode {
    pub fn as_str(self) -> &'static str {
        match self {
            SafetyMode::Preview => "preview",
            SafetyMode::Execute => "execute",
        }
    }

    pub fn is_preview(self) -> bool {
        self == SafetyMode::Preview
    }
}

impl fmt::Display for SafetyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A model-emitted request to invoke one primitive.
///
/// `tool` is kept as the raw name so unknown tools can be reported back
/// verbatim; [`crate::core::tool_call::ToolRequest`] is the typed form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub tool: String,
    pub args: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Success,
    Error,
    Preview,
}

impl ToolStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ToolStatus::Success => "success",
            ToolStatus::Error => "error",
            ToolStatus::Preview => "preview",
        }
    }
}

/// One matching line reported by `grep`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrepMatch {
    pub line: usize,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub context: Vec<String>,
}

/// Outcome of `write_file` (identical in preview and execute mode).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteOutcome {
    pub file: String,
    pub existed: bool,
    pub lines: usize,
    pub content: String,
}

/// Outcome of `edit_file` (identical in preview and execute mode).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditOutcome {
    pub file: String,
    pub occurrences: usize,
    pub replaced: usize,
    pub diff: String,
    pub updated_content: String,
}

/// Outcome of `bash`. `exit_code` is `None` for previews and timeouts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutcome {
    pub command: String,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

impl CommandOutcome {
    pub fn planned(command: &str) -> Self {
        Self {
            command: command.to_string(),
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
            timed_out: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum ToolPayload {
    None,
    Text(String),
    Files(Vec<String>),
    Matches(BTreeMap<String, Vec<GrepMatch>>),
    Write(WriteOutcome),
    Edit(EditOutcome),
    Command(CommandOutcome),
}

/// Result of one tool dispatch, fed back to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResult {
    pub status: ToolStatus,
    pub payload: ToolPayload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ToolResult {
    pub fn success(payload: ToolPayload) -> Self {
        Self {
            status: ToolStatus::Success,
            payload,
            message: None,
        }
    }

    pub fn preview(payload: ToolPayload, message: impl Into<String>) -> Self {
        Self {
            status: ToolStatus::Preview,
            payload,
            message: Some(message.into()),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ToolStatus::Error,
            payload: ToolPayload::None,
            message: Some(message.into()),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.status == ToolStatus::Error
    }
}

/// Log entry for an applied mutating action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ChangeRecord {
    Write { file: String, lines: usize },
    Edit { file: String, replaced: usize },
    Command { command: String, exit_code: Option<i32> },
}

impl fmt::Display for ChangeRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeRecord::Write { file, lines } => write!(f, "Wrote {file} ({lines} lines)"),
            ChangeRecord::Edit { file, replaced } => {
                write!(f, "Edited {file} ({replaced} replacements)")
            }
            ChangeRecord::Command { command, .. } => write!(f, "Ran: {command}"),
        }
    }
}

/// Human-readable summary of a change log.
pub fn summarize_changes(changes: &[ChangeRecord]) -> String {
    if changes.is_empty() {
        return "No changes made yet".to_string();
    }
    let mut lines = vec![format!("Changes made: {}", changes.len())];
    for (i, change) in changes.iter().enumerate() {
        lines.push(format!("{}. {change}", i + 1));
    }
    lines.join("\n")
}

/// One dispatched tool call together with its result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionRecord {
    pub action: ToolCall,
    pub result: ToolResult,
}

/// Terminal status of a tool-execution loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopStatus {
    /// The model answered without tool calls.
    Done,
    /// The iteration ceiling was reached while tool calls were still coming.
    IterationExhausted,
}

impl LoopStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            LoopStatus::Done => "done",
            LoopStatus::IterationExhausted => "iteration_exhausted",
        }
    }
}

/// Summary returned by a finished tool-execution loop.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionReport {
    pub agent: String,
    pub status: LoopStatus,
    pub iterations: u32,
    pub actions: Vec<ActionRecord>,
    pub final_response: Option<String>,
    pub changes_summary: String,
    pub mode: SafetyMode,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summarize_changes_reports_empty_log() {
        assert_eq!(summarize_changes(&[]), "No changes made yet");
    }

    #[test]
    fn summarize_changes_numbers_each_entry() {
        let changes = vec![
            ChangeRecord::Write {
                file: "a.txt".to_string(),
                lines: 3,
            },
            ChangeRecord::Edit {
                file: "b.rs".to_string(),
                replaced: 2,
            },
            ChangeRecord::Command {
                command: "ls".to_string(),
                exit_code: Some(0),
            },
        ];
        assert_eq!(
            summarize_changes(&changes),
            "Changes made: 3\n1. Wrote a.txt (3 lines)\n2. Edited b.rs (2 replacements)\n3. Ran: ls"
        );
    }

    #[test]
    fn conversation_clear_empties_history() {
        let mut conversation = Conversation::new();
        conversation.push(Message::user("hi"));
        conversation.push(Message::assistant("hello"));
        assert_eq!(conversation.len(), 2);
        conversation.clear();
        assert!(conversation.is_empty());
    }
}
