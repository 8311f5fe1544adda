//! Interactive read-eval-print loop.
//!
//! Errors from a command are printed and the prompt returns; only I/O errors
//! on the terminal itself end the session.

use std::io::{BufRead, Write};

use anyhow::{Context, Result};
use tracing::debug;

use crate::core::types::SafetyMode;
use crate::io::gateway::ModelGateway;
use crate::render::{render_agents, render_report, render_request_outcome};
use crate::router::Router;

pub const PROMPT: &str = "orchestra> ";

const HELP: &str = "Commands:
  preview <task>   Describe what the agent would do (nothing runs)
  execute <task>   Run the tool loop in preview mode (no changes on disk)
  auto <task>      Run the tool loop in execute mode after confirmation
  ask <request>    Plan across agents and synthesize one answer
  agents           List agents
  log              Show delegated steps since the last reset
  reset            Clear all conversations and change logs
  help             Show this help
  quit             Leave (also: exit, q)

Start a task with @<agent> to pick the agent, e.g. `execute @security audit auth`.";

/// A task with an optional explicit agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskInput {
    pub agent: Option<String>,
    pub task: String,
}

/// Split a leading `@agent` token off `raw`.
pub fn parse_task(raw: &str) -> TaskInput {
    let raw = raw.trim();
    if let Some(rest) = raw.strip_prefix('@') {
        let (agent, task) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
        if !agent.is_empty() {
            return TaskInput {
                agent: Some(agent.to_string()),
                task: task.trim().to_string(),
            };
        }
    }
    TaskInput {
        agent: None,
        task: raw.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    Preview(TaskInput),
    Execute(TaskInput),
    Auto(TaskInput),
    Ask(String),
    Agents,
    Log,
    Reset,
    Help,
    Quit,
    Empty,
    MissingArgument(&'static str),
    Unknown(String),
}

pub fn parse_command(line: &str) -> ReplCommand {
    let line = line.trim();
    if line.is_empty() {
        return ReplCommand::Empty;
    }
    let (word, rest) = line
        .split_once(char::is_whitespace)
        .map(|(w, r)| (w, r.trim()))
        .unwrap_or((line, ""));
    let word = word.to_ascii_lowercase();

    let with_task = |name: &'static str, build: fn(TaskInput) -> ReplCommand| {
        let input = parse_task(rest);
        if input.task.is_empty() {
            ReplCommand::MissingArgument(name)
        } else {
            build(input)
        }
    };

    match word.as_str() {
        "preview" => with_task("preview", ReplCommand::Preview),
        "execute" => with_task("execute", ReplCommand::Execute),
        "auto" => with_task("auto", ReplCommand::Auto),
        "ask" if rest.is_empty() => ReplCommand::MissingArgument("ask"),
        "ask" => ReplCommand::Ask(rest.to_string()),
        "agents" => ReplCommand::Agents,
        "log" => ReplCommand::Log,
        "reset" => ReplCommand::Reset,
        "help" | "?" => ReplCommand::Help,
        "quit" | "exit" | "q" => ReplCommand::Quit,
        _ => ReplCommand::Unknown(line.to_string()),
    }
}

/// Run the loop until `quit` or end of input.
pub fn run_repl<G, R, W>(router: &mut Router<G>, input: R, out: &mut W) -> Result<()>
where
    G: ModelGateway,
    R: BufRead,
    W: Write,
{
    writeln!(
        out,
        "orchestra: {} agents ready. Type `help` for commands.",
        router.registry().agents().len()
    )?;
    let mut lines = input.lines();
    loop {
        write!(out, "{PROMPT}")?;
        out.flush().context("flush prompt")?;
        let Some(line) = lines.next() else {
            writeln!(out)?;
            break;
        };
        let line = line.context("read command")?;
        let command = parse_command(&line);
        debug!(?command, "repl command");

        let outcome: Result<()> = match command {
            ReplCommand::Quit => break,
            ReplCommand::Empty => Ok(()),
            ReplCommand::Help => writeln!(out, "{HELP}").map_err(Into::into),
            ReplCommand::Agents => {
                writeln!(out, "{}", render_agents(router.registry())).map_err(Into::into)
            }
            ReplCommand::Log => write_log(router, out),
            ReplCommand::Reset => {
                router.reset();
                writeln!(out, "All conversations and change logs cleared.").map_err(Into::into)
            }
            ReplCommand::MissingArgument(name) => {
                writeln!(out, "Usage: {name} <task>").map_err(Into::into)
            }
            ReplCommand::Unknown(text) => {
                writeln!(out, "Unknown command: {text}. Type `help` for commands.")
                    .map_err(Into::into)
            }
            ReplCommand::Preview(input) => router
                .preview_task(&input.task, input.agent.as_deref())
                .and_then(|preview| {
                    writeln!(out, "Plan from {}:\n\n{}", preview.agent, preview.plan.trim())?;
                    Ok(())
                }),
            ReplCommand::Execute(input) => {
                run_loop(router, &input, SafetyMode::Preview, out)
            }
            ReplCommand::Auto(input) => {
                if confirm(router, &input, &mut lines, out)? {
                    run_loop(router, &input, SafetyMode::Execute, out)
                } else {
                    writeln!(out, "Cancelled.").map_err(Into::into)
                }
            }
            ReplCommand::Ask(request) => router.process_request(&request).and_then(|outcome| {
                writeln!(out, "{}", render_request_outcome(&outcome))?;
                Ok(())
            }),
        };

        if let Err(err) = outcome {
            writeln!(out, "Error: {err:#}")?;
        }
    }
    Ok(())
}

fn run_loop<G: ModelGateway, W: Write>(
    router: &mut Router<G>,
    input: &TaskInput,
    mode: SafetyMode,
    out: &mut W,
) -> Result<()> {
    let report = router.execute_task(&input.task, input.agent.as_deref(), mode, None)?;
    writeln!(out, "{}", render_report(&report))?;
    Ok(())
}

/// Ask for a literal `yes` before execute mode. End of input declines.
fn confirm<G, I, W>(router: &Router<G>, input: &TaskInput, lines: &mut I, out: &mut W) -> Result<bool>
where
    G: ModelGateway,
    I: Iterator<Item = std::io::Result<String>>,
    W: Write,
{
    let agent = match router.select_agent(&input.task, input.agent.as_deref()) {
        Ok(agent) => agent,
        Err(err) => {
            writeln!(out, "Error: {err}")?;
            return Ok(false);
        }
    };
    write!(
        out,
        "Agent `{agent}` will modify files and run commands. Type 'yes' to continue: "
    )?;
    out.flush().context("flush confirmation")?;
    let answer = match lines.next() {
        Some(line) => line.context("read confirmation")?,
        None => return Ok(false),
    };
    Ok(answer.trim() == "yes")
}

fn write_log<G: ModelGateway, W: Write>(router: &Router<G>, out: &mut W) -> Result<()> {
    if router.task_log().is_empty() {
        writeln!(out, "No delegated steps yet.")?;
        return Ok(());
    }
    for (i, entry) in router.task_log().iter().enumerate() {
        writeln!(
            out,
            "{}. {} [{}] {}",
            i + 1,
            entry.agent,
            entry.status.as_str(),
            entry.task
        )?;
    }
    Ok(())
}
