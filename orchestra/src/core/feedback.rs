//! Feedback message built from one batch of tool results.

use crate::core::types::{ActionRecord, ToolPayload, ToolStatus};

pub const COMPLETION_INVITATION: &str = "What should we do next? If the task is complete, reply with your final answer and no tool calls.";

/// Cap `text` at `limit` characters, appending a truncation marker.
pub fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((cut, _)) => format!("{}... (truncated)", &text[..cut]),
        None => text.to_string(),
    }
}

/// Render the user turn that reports a batch of actions back to the model.
pub fn format_feedback(batch: &[ActionRecord], output_limit: usize) -> String {
    let mut lines = vec!["Here are the results of your actions:".to_string(), String::new()];

    for (i, record) in batch.iter().enumerate() {
        let result = &record.result;
        lines.push(format!("Action {} ({}):", i + 1, record.action.tool));
        lines.push(format!("  Status: {}", result.status.as_str()));

        match result.status {
            ToolStatus::Success => {
                lines.extend(describe_payload(&result.payload, output_limit));
                if let Some(message) = &result.message {
                    lines.push(format!("  Message: {message}"));
                }
            }
            ToolStatus::Preview => {
                let message = result.message.as_deref().unwrap_or("No preview");
                lines.push(format!("  Preview: {message}"));
                lines.extend(describe_payload(&result.payload, output_limit));
            }
            ToolStatus::Error => {
                let message = result.message.as_deref().unwrap_or("Unknown error");
                lines.push(format!("  Error: {}", truncate_chars(message, output_limit)));
                lines.extend(describe_payload(&result.payload, output_limit));
            }
        }
        lines.push(String::new());
    }

    lines.push(COMPLETION_INVITATION.to_string());
    lines.join("\n")
}

fn describe_payload(payload: &ToolPayload, limit: usize) -> Vec<String> {
    match payload {
        ToolPayload::None => Vec::new(),
        ToolPayload::Text(text) => vec![format!("  Output: {}", truncate_chars(text, limit))],
        ToolPayload::Files(files) => {
            let mut out = vec![format!("  Found {} files", files.len())];
            if !files.is_empty() {
                out.push(indent(&truncate_chars(&files.join("\n"), limit)));
            }
            out
        }
        ToolPayload::Matches(matches) => {
            let total: usize = matches.values().map(Vec::len).sum();
            let mut listing = Vec::new();
            for (file, hits) in matches {
                for hit in hits {
                    listing.push(format!("{file}:{}: {}", hit.line, hit.content));
                }
            }
            let mut out = vec![format!(
                "  Found {total} matches in {} files",
                matches.len()
            )];
            if !listing.is_empty() {
                out.push(indent(&truncate_chars(&listing.join("\n"), limit)));
            }
            out
        }
        ToolPayload::Write(write) => {
            vec![
                format!("  File: {} ({} lines, existed: {})", write.file, write.lines, write.existed),
                format!("  Content: {}", truncate_chars(&write.content, limit)),
            ]
        }
        ToolPayload::Edit(edit) => vec![
            format!(
                "  File: {} ({} of {} occurrences)",
                edit.file, edit.replaced, edit.occurrences
            ),
            format!("  Diff:\n{}", indent(&truncate_chars(&edit.diff, limit))),
        ],
        ToolPayload::Command(command) => {
            let mut out = vec![format!("  Command: {}", truncate_chars(&command.command, limit))];
            if let Some(code) = command.exit_code {
                out.push(format!("  Exit code: {code}"));
            }
            if !command.stdout.is_empty() {
                out.push(format!("  Stdout: {}", truncate_chars(&command.stdout, limit)));
            }
            if !command.stderr.is_empty() {
                out.push(format!("  Stderr: {}", truncate_chars(&command.stderr, limit)));
            }
            out
        }
    }
}

fn indent(text: &str) -> String {
    text.lines()
        .map(|line| format!("    {line}"))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{CommandOutcome, ToolCall, ToolResult};
    use serde_json::Map;

    fn record(tool: &str, result: ToolResult) -> ActionRecord {
        ActionRecord {
            action: ToolCall {
                tool: tool.to_string(),
                args: Map::new(),
                reasoning: None,
            },
            result,
        }
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo wörld", 5), "héllo... (truncated)");
        assert_eq!(truncate_chars("short", 10), "short");
        assert_eq!(truncate_chars("exact", 5), "exact");
    }

    #[test]
    fn long_output_is_capped() {
        let long = "x".repeat(2_000);
        let feedback = format_feedback(
            &[record("read_file", ToolResult::success(ToolPayload::Text(long)))],
            500,
        );
        let expected = format!("  Output: {}... (truncated)", "x".repeat(500));
        assert!(feedback.contains(&expected));
        assert!(!feedback.contains(&"x".repeat(501)));
    }

    #[test]
    fn long_command_is_capped() {
        let command = format!("echo {}", "y".repeat(1_000));
        let feedback = format_feedback(
            &[record(
                "bash",
                ToolResult::preview(
                    ToolPayload::Command(CommandOutcome::planned(&command)),
                    "Preview only - not executed",
                ),
            )],
            100,
        );
        let expected = format!("  Command: {}... (truncated)", &command[..100]);
        assert!(feedback.contains(&expected));
        assert!(!feedback.contains(&command));
    }

    #[test]
    fn each_action_reports_status_and_ends_with_invitation() {
        let feedback = format_feedback(
            &[
                record("read_file", ToolResult::error("File not found: a.txt")),
                record(
                    "bash",
                    ToolResult::preview(
                        ToolPayload::Command(CommandOutcome::planned("npm test")),
                        "Preview only - not executed",
                    ),
                ),
            ],
            500,
        );
        assert!(feedback.contains("Action 1 (read_file):\n  Status: error\n  Error: File not found: a.txt"));
        assert!(feedback.contains("Action 2 (bash):\n  Status: preview\n  Preview: Preview only - not executed\n  Command: npm test"));
        assert!(feedback.ends_with(COMPLETION_INVITATION));
    }
}
