//! Tool-call extraction from model text and conversion to typed requests.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::debug;

use crate::core::types::ToolCall;

/// Fenced block holding a single JSON object (```` ```json ```` or bare fence).
static FENCED_OBJECT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:json|JSON)?[ \t]*\r?\n?\s*(\{.*?\})\s*```")
        .expect("tool block regex is valid")
});

/// Outcome of scanning one model response.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedResponse {
    /// One or more well-formed tool calls, in textual order.
    ToolCalls(Vec<ToolCall>),
    /// No well-formed tool calls; the text is a final answer.
    NoToolCalls,
}

/// Scan `response` for fenced tool-call blocks.
///
/// Each block is decoded on its own. Blocks that are not valid JSON or lack a
/// string `tool` and an object `args` are skipped.
pub fn parse_tool_calls(response: &str) -> ParsedResponse {
    let mut calls = Vec::new();
    for caps in FENCED_OBJECT_RE.captures_iter(response) {
        let raw = &caps[1];
        match decode_block(raw) {
            Some(call) => calls.push(call),
            None => debug!(bytes = raw.len(), "skipped malformed tool block"),
        }
    }
    if calls.is_empty() {
        ParsedResponse::NoToolCalls
    } else {
        ParsedResponse::ToolCalls(calls)
    }
}

fn decode_block(raw: &str) -> Option<ToolCall> {
    let value: Value = serde_json::from_str(raw).ok()?;
    let object = value.as_object()?;
    let tool = object.get("tool")?.as_str()?.trim();
    if tool.is_empty() {
        return None;
    }
    let args = object.get("args")?.as_object()?.clone();
    let reasoning = object
        .get("reasoning")
        .and_then(Value::as_str)
        .map(str::to_string);
    Some(ToolCall {
        tool: tool.to_string(),
        args,
        reasoning,
    })
}

/// The primitive operations the toolkit exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolName {
    ReadFile,
    WriteFile,
    EditFile,
    Glob,
    Grep,
    Bash,
}

impl ToolName {
    pub const ALL: [ToolName; 6] = [
        ToolName::ReadFile,
        ToolName::WriteFile,
        ToolName::EditFile,
        ToolName::Glob,
        ToolName::Grep,
        ToolName::Bash,
    ];

    /// Canonicalize a model-supplied tool name.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "read_file" | "read" => Some(ToolName::ReadFile),
            "write_file" | "write" => Some(ToolName::WriteFile),
            "edit_file" | "edit" => Some(ToolName::EditFile),
            "glob" => Some(ToolName::Glob),
            "grep" => Some(ToolName::Grep),
            "bash" | "run_command" => Some(ToolName::Bash),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ToolName::ReadFile => "read_file",
            ToolName::WriteFile => "write_file",
            ToolName::EditFile => "edit_file",
            ToolName::Glob => "glob",
            ToolName::Grep => "grep",
            ToolName::Bash => "bash",
        }
    }

    /// Whether the tool changes filesystem or process state.
    pub fn is_mutating(self) -> bool {
        matches!(
            self,
            ToolName::WriteFile | ToolName::EditFile | ToolName::Bash
        )
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReadFileArgs {
    pub file_path: String,
    #[serde(default)]
    pub offset: usize,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WriteFileArgs {
    pub file_path: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EditFileArgs {
    pub file_path: String,
    pub old_string: String,
    pub new_string: String,
    #[serde(default)]
    pub replace_all: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GlobArgs {
    pub pattern: String,
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GrepArgs {
    pub pattern: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub file_pattern: Option<String>,
    #[serde(default)]
    pub case_insensitive: bool,
    #[serde(default)]
    pub context: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BashArgs {
    pub command: String,
    #[serde(default, alias = "timeout")]
    pub timeout_secs: Option<u64>,
}

/// Typed form of a [`ToolCall`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolRequest {
    ReadFile(ReadFileArgs),
    WriteFile(WriteFileArgs),
    EditFile(EditFileArgs),
    Glob(GlobArgs),
    Grep(GrepArgs),
    Bash(BashArgs),
}

impl ToolRequest {
    /// Convert a raw call into a typed request.
    ///
    /// Errors are human-readable and meant to be fed back to the model.
    pub fn from_call(call: &ToolCall) -> Result<Self, String> {
        let name = ToolName::parse(&call.tool).ok_or_else(|| {
            let known: Vec<&str> = ToolName::ALL.iter().map(|t| t.as_str()).collect();
            format!(
                "Unknown tool: {} (available: {})",
                call.tool,
                known.join(", ")
            )
        })?;
        let request = match name {
            ToolName::ReadFile => ToolRequest::ReadFile(decode_args(name, &call.args)?),
            ToolName::WriteFile => ToolRequest::WriteFile(decode_args(name, &call.args)?),
            ToolName::EditFile => ToolRequest::EditFile(decode_args(name, &call.args)?),
            ToolName::Glob => ToolRequest::Glob(decode_args(name, &call.args)?),
            ToolName::Grep => ToolRequest::Grep(decode_args(name, &call.args)?),
            ToolName::Bash => ToolRequest::Bash(decode_args(name, &call.args)?),
        };
        Ok(request)
    }

    pub fn name(&self) -> ToolName {
        match self {
            ToolRequest::ReadFile(_) => ToolName::ReadFile,
            ToolRequest::WriteFile(_) => ToolName::WriteFile,
            ToolRequest::EditFile(_) => ToolName::EditFile,
            ToolRequest::Glob(_) => ToolName::Glob,
            ToolRequest::Grep(_) => ToolName::Grep,
            ToolRequest::Bash(_) => ToolName::Bash,
        }
    }
}

fn decode_args<T: DeserializeOwned>(name: ToolName, args: &Map<String, Value>) -> Result<T, String> {
    serde_json::from_value(Value::Object(args.clone()))
        .map_err(|err| format!("Invalid arguments for {name}: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calls(response: &str) -> Vec<ToolCall> {
        match parse_tool_calls(response) {
            ParsedResponse::ToolCalls(calls) => calls,
            ParsedResponse::NoToolCalls => Vec::new(),
        }
    }

    #[test]
    fn plain_prose_has_no_tool_calls() {
        assert_eq!(
            parse_tool_calls("The config has keys a and b. TASK_COMPLETE"),
            ParsedResponse::NoToolCalls
        );
    }

    #[test]
    fn mixed_prose_and_blocks_keep_textual_order() {
        let response = r#"First I will look at the file.

```json
{"tool": "read_file", "args": {"file_path": "a.txt"}, "reasoning": "inspect"}
```

Then search for usages:

```json
{
  "tool": "grep",
  "args": {"pattern": "TODO", "context": 1}
}
```
"#;
        let parsed = calls(response);
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].tool, "read_file");
        assert_eq!(parsed[0].reasoning.as_deref(), Some("inspect"));
        assert_eq!(parsed[1].tool, "grep");
        assert_eq!(parsed[1].args["pattern"], "TODO");
    }

    #[test]
    fn malformed_blocks_are_skipped() {
        let response = r#"
```json
{"tool": "read_file", "args": {"file_path": "a.txt"
```
```json
{"args": {"file_path": "b.txt"}}
```
```json
{"tool": "glob", "args": "not an object"}
```
```json
{"tool": "glob", "args": {"pattern": "**/*.rs"}}
```
"#;
        let parsed = calls(response);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].tool, "glob");
    }

    #[test]
    fn bare_fence_is_accepted() {
        let response = "```\n{\"tool\": \"bash\", \"args\": {\"command\": \"ls\"}}\n```";
        let parsed = calls(response);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].tool, "bash");
    }

    #[test]
    fn nested_objects_in_args_decode() {
        let response = "```json\n{\"tool\": \"write_file\", \"args\": {\"file_path\": \"x.json\", \"content\": \"{\\\"a\\\": {\\\"b\\\": 1}}\"}}\n```";
        let parsed = calls(response);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].args["content"], "{\"a\": {\"b\": 1}}");
    }

    #[test]
    fn tool_names_canonicalize_aliases() {
        assert_eq!(ToolName::parse("read"), Some(ToolName::ReadFile));
        assert_eq!(ToolName::parse("Run_Command"), Some(ToolName::Bash));
        assert_eq!(ToolName::parse("delete_everything"), None);
        assert!(ToolName::Bash.is_mutating());
        assert!(!ToolName::Grep.is_mutating());
    }

    #[test]
    fn unknown_tool_error_names_the_tool() {
        let call = ToolCall {
            tool: "teleport".to_string(),
            args: Map::new(),
            reasoning: None,
        };
        let err = ToolRequest::from_call(&call).unwrap_err();
        assert!(err.contains("Unknown tool: teleport"));
    }

    #[test]
    fn missing_required_argument_is_reported() {
        let call = ToolCall {
            tool: "edit_file".to_string(),
            args: serde_json::json!({"file_path": "a.txt"})
                .as_object()
                .cloned()
                .unwrap(),
            reasoning: None,
        };
        let err = ToolRequest::from_call(&call).unwrap_err();
        assert!(err.starts_with("Invalid arguments for edit_file"));
    }

    #[test]
    fn typed_request_applies_defaults() {
        let call = ToolCall {
            tool: "grep".to_string(),
            args: serde_json::json!({"pattern": "fn main"})
                .as_object()
                .cloned()
                .unwrap(),
            reasoning: None,
        };
        let request = ToolRequest::from_call(&call).expect("typed");
        assert_eq!(
            request,
            ToolRequest::Grep(GrepArgs {
                pattern: "fn main".to_string(),
                path: None,
                file_pattern: None,
                case_insensitive: false,
                context: 0,
            })
        );
        assert_eq!(request.name(), ToolName::Grep);
    }
}
