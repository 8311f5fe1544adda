//! Human-readable rendering of reports for stdout.

use crate::agents::AgentRegistry;
use crate::core::feedback::truncate_chars;
use crate::core::plan::PlanOutcome;
use crate::core::types::{ExecutionReport, LoopStatus};
use crate::router::{RequestOutcome, StepStatus};

const ACTION_MESSAGE_CHARS: usize = 200;

pub fn render_agents(registry: &AgentRegistry) -> String {
    let width = registry
        .agents()
        .iter()
        .map(|a| a.name.len())
        .max()
        .unwrap_or(0);
    let mut lines = vec!["Available agents:".to_string()];
    for agent in registry.agents() {
        let marker = if agent.name == registry.default_agent() {
            " (default)"
        } else {
            ""
        };
        lines.push(format!(
            "  {:<width$}  {}{marker}",
            agent.name,
            agent.title,
            width = width
        ));
    }
    lines.join("\n")
}

pub fn render_report(report: &ExecutionReport) -> String {
    let mut lines = vec![format!("Agent: {} (mode: {})", report.agent, report.mode)];
    lines.push(match report.status {
        LoopStatus::Done => format!("Status: done after {} iteration(s)", report.iterations),
        LoopStatus::IterationExhausted => format!(
            "Status: stopped at the iteration limit ({}) with tool calls pending",
            report.iterations
        ),
    });

    if !report.actions.is_empty() {
        lines.push(String::new());
        lines.push("Actions:".to_string());
        for (i, record) in report.actions.iter().enumerate() {
            let mut line = format!(
                "  {}. {} [{}]",
                i + 1,
                record.action.tool,
                record.result.status.as_str()
            );
            if let Some(message) = &record.result.message {
                line.push_str(&format!(" {}", truncate_chars(message, ACTION_MESSAGE_CHARS)));
            }
            lines.push(line);
        }
    }

    if let Some(text) = &report.final_response {
        lines.push(String::new());
        lines.push(text.trim().to_string());
    }

    lines.push(String::new());
    lines.push(report.changes_summary.clone());
    lines.join("\n")
}

pub fn render_request_outcome(outcome: &RequestOutcome) -> String {
    let mut lines = Vec::new();
    if let PlanOutcome::Plan(plan) = &outcome.plan {
        let priority = plan.priority.map(|p| p.as_str()).unwrap_or("unspecified");
        lines.push(format!("Priority: {priority}"));
        if !plan.analysis.trim().is_empty() {
            lines.push(format!("Analysis: {}", plan.analysis.trim()));
        }
        for (i, step) in outcome.steps.iter().enumerate() {
            let status = match step.status {
                StepStatus::Success => "",
                StepStatus::Error => " [error]",
            };
            lines.push(format!("  {}. {}: {}{status}", i + 1, step.agent, step.task));
        }
        lines.push(String::new());
    }
    lines.push(outcome.answer.trim().to_string());
    lines.join("\n")
}
