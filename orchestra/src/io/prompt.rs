//! Prompt rendering for agents, the planner and synthesis.

use anyhow::Result;
use minijinja::{Environment, context};
use serde::Serialize;

use crate::core::types::SafetyMode;

const TASK_TEMPLATE: &str = include_str!("prompts/task.md");
const PLAN_PREVIEW_TEMPLATE: &str = include_str!("prompts/plan_preview.md");
const PLANNER_SYSTEM_TEMPLATE: &str = include_str!("prompts/planner_system.md");
const PLANNER_REQUEST_TEMPLATE: &str = include_str!("prompts/planner_request.md");
const STEP_TEMPLATE: &str = include_str!("prompts/step.md");
const SYNTHESIS_TEMPLATE: &str = include_str!("prompts/synthesis.md");

pub const SYNTHESIS_SYSTEM_PROMPT: &str = "You are synthesizing technical recommendations from several specialist agents. Give specific, actionable guidance.";

/// One agent line in the planner roster.
#[derive(Debug, Clone, Serialize)]
pub struct RosterEntry {
    pub name: String,
    pub title: String,
}

/// Output of an earlier step, as shown to later prompts.
#[derive(Debug, Clone, Serialize)]
pub struct StepOutput {
    pub agent: String,
    pub output: String,
}

/// Template engine wrapper around minijinja.
struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    fn new() -> Self {
        let mut env = Environment::new();
        for (name, source) in [
            ("task", TASK_TEMPLATE),
            ("plan_preview", PLAN_PREVIEW_TEMPLATE),
            ("planner_system", PLANNER_SYSTEM_TEMPLATE),
            ("planner_request", PLANNER_REQUEST_TEMPLATE),
            ("step", STEP_TEMPLATE),
            ("synthesis", SYNTHESIS_TEMPLATE),
        ] {
            env.add_template(name, source)
                .expect("bundled prompt template should be valid");
        }
        Self { env }
    }

    fn render(&self, name: &str, ctx: minijinja::Value) -> Result<String> {
        let rendered = self.env.get_template(name)?.render(ctx)?;
        Ok(rendered.trim().to_string())
    }
}

fn non_blank(text: Option<&str>) -> Option<&str> {
    text.map(str::trim).filter(|s| !s.is_empty())
}

/// First-iteration prompt: the task, tool documentation and the safety mode.
pub fn render_task_prompt(task: &str, mode: SafetyMode, command_timeout_secs: u64) -> Result<String> {
    PromptEngine::new().render(
        "task",
        context! {
            task => task.trim(),
            mode => mode.as_str(),
            preview => mode.is_preview(),
            command_timeout_secs => command_timeout_secs,
        },
    )
}

pub fn render_plan_preview(task: &str) -> Result<String> {
    PromptEngine::new().render("plan_preview", context! { task => task.trim() })
}

/// System prompt for planning mode.
pub fn render_planner_system(roster: &[RosterEntry], project_context: Option<&str>) -> Result<String> {
    PromptEngine::new().render(
        "planner_system",
        context! {
            agents => roster,
            project_context => non_blank(project_context),
        },
    )
}

pub fn render_planner_request(request: &str) -> Result<String> {
    PromptEngine::new().render("planner_request", context! { request => request.trim() })
}

/// Delegated step: the task plus shared project context and dependency results.
pub fn render_step_prompt(
    task: &str,
    project_context: Option<&str>,
    previous: &[StepOutput],
) -> Result<String> {
    PromptEngine::new().render(
        "step",
        context! {
            task => task.trim(),
            project_context => non_blank(project_context),
            previous => previous,
        },
    )
}

pub fn render_synthesis(analysis: &str, priority: Option<&str>, results: &[StepOutput]) -> Result<String> {
    let analysis = non_blank(Some(analysis)).unwrap_or("N/A");
    PromptEngine::new().render(
        "synthesis",
        context! {
            analysis => analysis,
            priority => priority.unwrap_or("N/A"),
            results => results,
        },
    )
}
