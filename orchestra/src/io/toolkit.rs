//! File and process primitives exposed to agents.
//!
//! Every primitive returns a [`ToolResult`]; failures never escape as `Err`.
//! Mutating primitives honor the [`SafetyMode`]: in preview mode they compute
//! exactly what execute mode would apply and stop there.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use regex::RegexBuilder;
use tracing::{debug, info, instrument};
use walkdir::WalkDir;

use crate::core::diff::first_change_excerpt;
use crate::core::tool_call::{
    BashArgs, EditFileArgs, GlobArgs, GrepArgs, ReadFileArgs, ToolRequest, WriteFileArgs,
};
use crate::core::types::{
    ChangeRecord, CommandOutcome, EditOutcome, GrepMatch, SafetyMode, ToolCall, ToolPayload,
    ToolResult, ToolStatus, WriteOutcome, summarize_changes,
};
use crate::io::config::OrchestraConfig;
use crate::io::process::{ProcessLimits, run_with_timeout, shell_command};

pub const PREVIEW_MESSAGE: &str = "Preview only - not executed";

const SKIP_DIRS: [&str; 7] = [
    ".git",
    "node_modules",
    "target",
    "venv",
    "__pycache__",
    "dist",
    "build",
];

const BINARY_EXTENSIONS: [&str; 12] = [
    "pyc", "png", "jpg", "jpeg", "gif", "pdf", "ico", "zip", "gz", "wav", "mp3", "woff2",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolkitLimits {
    pub command_timeout: Duration,
    pub command_output_limit_bytes: usize,
}

impl ToolkitLimits {
    pub fn from_config(cfg: &OrchestraConfig) -> Self {
        Self {
            command_timeout: cfg.command_timeout(),
            command_output_limit_bytes: cfg.command_output_limit_bytes,
        }
    }
}

impl Default for ToolkitLimits {
    fn default() -> Self {
        Self::from_config(&OrchestraConfig::default())
    }
}

/// Primitive operations rooted at one project directory, plus the log of
/// changes applied in execute mode.
#[derive(Debug)]
pub struct Toolkit {
    root: PathBuf,
    limits: ToolkitLimits,
    changes: Vec<ChangeRecord>,
}

impl Toolkit {
    pub fn new(root: &Path, limits: ToolkitLimits) -> Result<Self> {
        let root = root
            .canonicalize()
            .with_context(|| format!("resolve project root {}", root.display()))?;
        Ok(Self {
            root,
            limits,
            changes: Vec::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute paths pass through; relative paths join the project root.
    pub fn resolve_path(&self, path: &str) -> PathBuf {
        let candidate = Path::new(path);
        if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.root.join(candidate)
        }
    }

    pub fn changes(&self) -> &[ChangeRecord] {
        &self.changes
    }

    pub fn changes_summary(&self) -> String {
        summarize_changes(&self.changes)
    }

    pub fn clear_changes(&mut self) {
        self.changes.clear();
    }

    /// Decode and dispatch a raw model call.
    pub fn execute_call(&mut self, call: &ToolCall, mode: SafetyMode) -> ToolResult {
        match ToolRequest::from_call(call) {
            Ok(request) => self.dispatch(&request, mode),
            Err(message) => {
                debug!(tool = %call.tool, %message, "rejected tool call");
                ToolResult::error(message)
            }
        }
    }

    #[instrument(skip_all, fields(tool = %request.name(), mode = %mode))]
    pub fn dispatch(&mut self, request: &ToolRequest, mode: SafetyMode) -> ToolResult {
        match request {
            ToolRequest::ReadFile(args) => self.read_file(args),
            ToolRequest::WriteFile(args) => self.write_file(args, mode),
            ToolRequest::EditFile(args) => self.edit_file(args, mode),
            ToolRequest::Glob(args) => self.glob(args),
            ToolRequest::Grep(args) => self.grep(args),
            ToolRequest::Bash(args) => self.bash(args, mode),
        }
    }

    /// Numbered lines, starting at `offset + 1`.
    pub fn read_file(&self, args: &ReadFileArgs) -> ToolResult {
        let path = self.resolve_path(&args.file_path);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return ToolResult::error(format!("File not found: {}", args.file_path));
            }
            Err(err) => return ToolResult::error(format!("Error reading file: {err}")),
        };
        // A zero limit means the whole file.
        let take = args.limit.filter(|&n| n > 0).unwrap_or(usize::MAX);
        let numbered: Vec<String> = content
            .lines()
            .enumerate()
            .skip(args.offset)
            .take(take)
            .map(|(i, line)| format!("{:>6}\t{}", i + 1, line))
            .collect();
        ToolResult::success(ToolPayload::Text(numbered.join("\n")))
    }

    pub fn write_file(&mut self, args: &WriteFileArgs, mode: SafetyMode) -> ToolResult {
        let path = self.resolve_path(&args.file_path);
        let outcome = WriteOutcome {
            file: args.file_path.clone(),
            existed: path.exists(),
            lines: args.content.split('\n').count(),
            content: args.content.clone(),
        };
        if mode.is_preview() {
            return ToolResult::preview(ToolPayload::Write(outcome), PREVIEW_MESSAGE);
        }

        if let Err(err) = write_with_parents(&path, &args.content) {
            return ToolResult::error(format!("Error writing file: {err:#}"));
        }
        info!(file = %args.file_path, lines = outcome.lines, "file written");
        self.changes.push(ChangeRecord::Write {
            file: outcome.file.clone(),
            lines: outcome.lines,
        });
        let message = format!("File written: {}", args.file_path);
        ToolResult::success(ToolPayload::Write(outcome)).with_message(message)
    }

    pub fn edit_file(&mut self, args: &EditFileArgs, mode: SafetyMode) -> ToolResult {
        if args.old_string.is_empty() {
            return ToolResult::error("old_string must not be empty");
        }
        let path = self.resolve_path(&args.file_path);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return ToolResult::error(format!("File not found: {}", args.file_path));
            }
            Err(err) => return ToolResult::error(format!("Error editing file: {err}")),
        };

        let occurrences = content.matches(args.old_string.as_str()).count();
        if occurrences == 0 {
            let shown: String = args.old_string.chars().take(100).collect();
            return ToolResult::error(format!("String not found in file: {shown}"));
        }
        if occurrences > 1 && !args.replace_all {
            return ToolResult::error(format!(
                "String appears {occurrences} times - must be unique or use replace_all=true"
            ));
        }

        let (updated_content, replaced) = if args.replace_all {
            (content.replace(&args.old_string, &args.new_string), occurrences)
        } else {
            (content.replacen(&args.old_string, &args.new_string, 1), 1)
        };
        let outcome = EditOutcome {
            file: args.file_path.clone(),
            occurrences,
            replaced,
            diff: first_change_excerpt(&content, &updated_content),
            updated_content,
        };
        if mode.is_preview() {
            return ToolResult::preview(ToolPayload::Edit(outcome), PREVIEW_MESSAGE);
        }

        if let Err(err) = fs::write(&path, &outcome.updated_content) {
            return ToolResult::error(format!("Error editing file: {err}"));
        }
        info!(file = %args.file_path, replaced, "file edited");
        self.changes.push(ChangeRecord::Edit {
            file: outcome.file.clone(),
            replaced,
        });
        let message = format!("File edited: {}", args.file_path);
        ToolResult::success(ToolPayload::Edit(outcome)).with_message(message)
    }

    /// Files matching `pattern`, newest first.
    pub fn glob(&self, args: &GlobArgs) -> ToolResult {
        let base = match &args.path {
            Some(path) => self.resolve_path(path),
            None => self.root.clone(),
        };
        match self.glob_files(&args.pattern, &base) {
            Ok(files) => ToolResult::success(ToolPayload::Files(files)),
            Err(message) => ToolResult::error(message),
        }
    }

    fn glob_files(&self, pattern: &str, base: &Path) -> Result<Vec<String>, String> {
        let escaped_base = glob::Pattern::escape(&base.to_string_lossy());
        let full = format!("{}/{}", escaped_base.trim_end_matches('/'), pattern);
        let entries =
            glob::glob(&full).map_err(|err| format!("Invalid glob pattern: {err}"))?;

        let mut found: Vec<(SystemTime, String)> = entries
            .filter_map(Result::ok)
            .filter(|path| path.is_file())
            .map(|path| {
                let modified = fs::metadata(&path)
                    .and_then(|meta| meta.modified())
                    .unwrap_or(SystemTime::UNIX_EPOCH);
                (modified, self.display_path(&path))
            })
            .collect();
        found.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
        Ok(found.into_iter().map(|(_, path)| path).collect())
    }

    /// Regex search grouped by file.
    pub fn grep(&self, args: &GrepArgs) -> ToolResult {
        let regex = match RegexBuilder::new(&args.pattern)
            .case_insensitive(args.case_insensitive)
            .build()
        {
            Ok(regex) => regex,
            Err(err) => return ToolResult::error(format!("Invalid regex pattern: {err}")),
        };
        let base = match &args.path {
            Some(path) => self.resolve_path(path),
            None => self.root.clone(),
        };

        let files: Vec<PathBuf> = if base.is_file() {
            vec![base]
        } else if let Some(file_pattern) = &args.file_pattern {
            match self.glob_files(file_pattern, &base) {
                Ok(files) => files.iter().map(|f| self.resolve_path(f)).collect(),
                Err(message) => return ToolResult::error(message),
            }
        } else {
            walk_text_files(&base)
        };

        let mut results: BTreeMap<String, Vec<GrepMatch>> = BTreeMap::new();
        for file in files {
            let Ok(content) = fs::read_to_string(&file) else {
                debug!(file = %file.display(), "skipped unreadable file");
                continue;
            };
            let lines: Vec<&str> = content.lines().collect();
            let mut matches = Vec::new();
            for (idx, line) in lines.iter().enumerate() {
                if !regex.is_match(line) {
                    continue;
                }
                let context = if args.context > 0 {
                    let start = idx.saturating_sub(args.context);
                    let end = idx
                        .saturating_add(args.context)
                        .saturating_add(1)
                        .min(lines.len());
                    (start..end)
                        .map(|j| format!("{}: {}", j + 1, lines[j]))
                        .collect()
                } else {
                    Vec::new()
                };
                matches.push(GrepMatch {
                    line: idx + 1,
                    content: (*line).to_string(),
                    context,
                });
            }
            if !matches.is_empty() {
                results.insert(self.display_path(&file), matches);
            }
        }
        ToolResult::success(ToolPayload::Matches(results))
    }

    pub fn bash(&mut self, args: &BashArgs, mode: SafetyMode) -> ToolResult {
        if mode.is_preview() {
            return ToolResult::preview(
                ToolPayload::Command(CommandOutcome::planned(&args.command)),
                PREVIEW_MESSAGE,
            );
        }

        let timeout = args
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(self.limits.command_timeout);
        let limits = ProcessLimits {
            timeout,
            output_limit_bytes: self.limits.command_output_limit_bytes,
        };
        let output = match run_with_timeout(shell_command(&args.command, &self.root), limits) {
            Ok(output) => output,
            Err(err) => return ToolResult::error(format!("Error executing command: {err:#}")),
        };

        let mut outcome = CommandOutcome::planned(&args.command);
        if output.timed_out {
            outcome.timed_out = true;
            return ToolResult {
                status: ToolStatus::Error,
                payload: ToolPayload::Command(outcome),
                message: Some(format!("Command timed out after {}s", timeout.as_secs())),
            };
        }

        outcome.exit_code = output.status.code();
        outcome.stdout = output.stdout_lossy();
        outcome.stderr = output.stderr_lossy();
        info!(command = %args.command, exit_code = ?outcome.exit_code, "command ran");
        self.changes.push(ChangeRecord::Command {
            command: args.command.clone(),
            exit_code: outcome.exit_code,
        });

        if output.status.success() {
            ToolResult::success(ToolPayload::Command(outcome))
        } else {
            let message = match outcome.exit_code {
                Some(code) => format!("Command exited with code {code}"),
                None => "Command terminated by signal".to_string(),
            };
            ToolResult {
                status: ToolStatus::Error,
                payload: ToolPayload::Command(outcome),
                message: Some(message),
            }
        }
    }

    fn display_path(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .to_string_lossy()
            .into_owned()
    }
}

fn write_with_parents(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    fs::write(path, content).with_context(|| format!("write {}", path.display()))
}

fn walk_text_files(base: &Path) -> Vec<PathBuf> {
    WalkDir::new(base)
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0
                || !(entry.file_type().is_dir()
                    && SKIP_DIRS.contains(&entry.file_name().to_string_lossy().as_ref()))
        })
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            let ext = entry
                .path()
                .extension()
                .map(|e| e.to_string_lossy().to_ascii_lowercase());
            !matches!(ext, Some(ext) if BINARY_EXTENSIONS.contains(&ext.as_str()))
        })
        .map(|entry| entry.into_path())
        .collect()
}
