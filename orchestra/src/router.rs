//! Request routing: keyword selection for single-agent work, and planning
//! mode that delegates an ordered plan to several agents and synthesizes
//! their answers.

use std::path::Path;

use anyhow::Result;
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::agents::executor::{AgentExecutor, LoopSettings};
use crate::agents::{AgentRegistry, UnknownAgentError};
use crate::core::plan::{ExecutionPlan, PlanOutcome, parse_plan};
use crate::core::types::{Conversation, ExecutionReport, Message, SafetyMode};
use crate::io::config::OrchestraConfig;
use crate::io::gateway::{ChatRequest, ModelGateway};
use crate::io::prompt::{
    SYNTHESIS_SYSTEM_PROMPT, StepOutput, render_planner_request, render_planner_system,
    render_step_prompt, render_synthesis,
};
use crate::io::toolkit::{Toolkit, ToolkitLimits};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Success,
    Error,
}

impl StepStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            StepStatus::Success => "success",
            StepStatus::Error => "error",
        }
    }
}

/// Outcome of one delegated plan step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepResult {
    pub agent: String,
    pub task: String,
    pub status: StepStatus,
    pub output: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskLogEntry {
    pub agent: String,
    pub task: String,
    pub status: StepStatus,
}

/// Plain-English plan from the agent that would handle a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskPreview {
    pub agent: String,
    pub plan: String,
}

/// Everything produced while answering one planning-mode request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestOutcome {
    pub plan: PlanOutcome,
    pub steps: Vec<StepResult>,
    pub answer: String,
}

/// Owns the gateway, the agent roster and one executor per agent.
pub struct Router<G: ModelGateway> {
    gateway: G,
    registry: AgentRegistry,
    executors: Vec<AgentExecutor>,
    conversation: Conversation,
    task_log: Vec<TaskLogEntry>,
    project_context: Option<String>,
    max_output_tokens: u32,
    max_iterations: u32,
}

impl<G: ModelGateway> Router<G> {
    pub fn new(gateway: G, registry: AgentRegistry, root: &Path, cfg: &OrchestraConfig) -> Result<Self> {
        let settings = LoopSettings::from_config(cfg);
        let limits = ToolkitLimits::from_config(cfg);
        let executors = registry
            .agents()
            .iter()
            .map(|agent| {
                let toolkit = Toolkit::new(root, limits)?;
                Ok(AgentExecutor::new(agent.clone(), toolkit, settings))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            gateway,
            registry,
            executors,
            conversation: Conversation::new(),
            task_log: Vec::new(),
            project_context: cfg.project_context.clone(),
            max_output_tokens: cfg.max_output_tokens,
            max_iterations: cfg.max_iterations,
        })
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn task_log(&self) -> &[TaskLogEntry] {
        &self.task_log
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn executor(&self, name: &str) -> Option<&AgentExecutor> {
        self.executors.iter().find(|e| e.agent().name == name)
    }

    /// The explicitly named agent, or the keyword match for `task`.
    pub fn select_agent(&self, task: &str, explicit: Option<&str>) -> Result<String, UnknownAgentError> {
        match explicit {
            Some(name) => self.registry.require(name).map(|agent| agent.name.clone()),
            None => Ok(self.registry.select(task).to_string()),
        }
    }

    /// Run the tool loop with the selected agent.
    #[instrument(skip_all, fields(mode = %mode))]
    pub fn execute_task(
        &mut self,
        task: &str,
        agent: Option<&str>,
        mode: SafetyMode,
        max_iterations: Option<u32>,
    ) -> Result<ExecutionReport> {
        let name = self.select_agent(task, agent)?;
        info!(agent = %name, "executing task");
        let max_iterations = max_iterations.unwrap_or(self.max_iterations);
        let executor = self
            .executors
            .iter_mut()
            .find(|e| e.agent().name == name)
            .ok_or_else(|| unknown_agent(&self.registry, &name))?;
        executor.execute_task(&self.gateway, task, mode, max_iterations)
    }

    /// Plain-English plan from the selected agent; nothing runs.
    pub fn preview_task(&self, task: &str, agent: Option<&str>) -> Result<TaskPreview> {
        let name = self.select_agent(task, agent)?;
        let executor = self
            .executor(&name)
            .ok_or_else(|| unknown_agent(&self.registry, &name))?;
        let plan = executor.preview_plan(&self.gateway, task)?;
        Ok(TaskPreview { agent: name, plan })
    }

    /// Planning mode: plan, delegate, synthesize.
    #[instrument(skip_all)]
    pub fn process_request(&mut self, request: &str) -> Result<RequestOutcome> {
        let plan = self.analyze_request(request)?;
        let steps = match &plan {
            PlanOutcome::Plan(plan) => self.execute_plan(plan)?,
            PlanOutcome::Unavailable { .. } => Vec::new(),
        };
        let answer = self.synthesize(&plan, &steps)?;
        Ok(RequestOutcome {
            plan,
            steps,
            answer,
        })
    }

    /// One round-trip on the router conversation asking for a JSON plan.
    pub fn analyze_request(&mut self, request: &str) -> Result<PlanOutcome> {
        let system = render_planner_system(&self.registry.roster(), self.project_context.as_deref())?;
        let user_text = render_planner_request(request)?;
        let mut messages = self.conversation.messages().to_vec();
        messages.push(Message::user(user_text.clone()));
        let reply = self.gateway.complete(&ChatRequest::new(
            Some(system),
            messages,
            self.max_output_tokens,
        ))?;
        self.conversation.push(Message::user(user_text));
        self.conversation.push(Message::assistant(reply.clone()));

        let outcome = parse_plan(&reply);
        match &outcome {
            PlanOutcome::Plan(plan) => info!(
                steps = plan.plan.len(),
                priority = plan.priority.map(|p| p.as_str()).unwrap_or("none"),
                "plan received"
            ),
            PlanOutcome::Unavailable { .. } => info!("direct answer, no plan"),
        }
        Ok(outcome)
    }

    /// Run plan steps in ascending `order`.
    ///
    /// Unknown agents yield an error step and the plan continues. Gateway
    /// failures abort.
    #[instrument(skip_all, fields(steps = plan.plan.len()))]
    pub fn execute_plan(&mut self, plan: &ExecutionPlan) -> Result<Vec<StepResult>> {
        let mut results: Vec<StepResult> = Vec::new();
        for step in plan.ordered_steps() {
            let Some(executor) = self.executors.iter_mut().find(|e| e.agent().name == step.agent)
            else {
                warn!(agent = %step.agent, "plan names an unknown agent");
                let result = StepResult {
                    agent: step.agent.clone(),
                    task: step.task.clone(),
                    status: StepStatus::Error,
                    output: format!("Error: Unknown agent '{}'", step.agent),
                };
                self.task_log.push(log_entry(&result));
                results.push(result);
                continue;
            };

            let previous: Vec<StepOutput> = step
                .depends_on
                .iter()
                .filter_map(|dep| {
                    results
                        .iter()
                        .find(|r| &r.agent == dep && r.status == StepStatus::Success)
                        .map(|r| StepOutput {
                            agent: r.agent.clone(),
                            output: r.output.clone(),
                        })
                })
                .collect();
            let prompt = render_step_prompt(&step.task, self.project_context.as_deref(), &previous)?;
            info!(agent = %step.agent, order = step.order, "delegating step");
            let output = executor.consult(&self.gateway, &prompt)?;

            let result = StepResult {
                agent: step.agent.clone(),
                task: step.task.clone(),
                status: StepStatus::Success,
                output,
            };
            self.task_log.push(log_entry(&result));
            results.push(result);
        }
        Ok(results)
    }

    /// Merge step results into one answer.
    ///
    /// Direct answers pass through unchanged and a plan without steps returns
    /// its analysis. Otherwise one round-trip with an empty history.
    pub fn synthesize(&self, plan: &PlanOutcome, results: &[StepResult]) -> Result<String> {
        let plan = match plan {
            PlanOutcome::Unavailable { raw } => return Ok(raw.clone()),
            PlanOutcome::Plan(plan) => plan,
        };
        if results.is_empty() {
            let analysis = plan.analysis.trim();
            return Ok(if analysis.is_empty() {
                "The plan has no steps.".to_string()
            } else {
                analysis.to_string()
            });
        }

        let outputs: Vec<StepOutput> = results
            .iter()
            .map(|r| StepOutput {
                agent: r.agent.clone(),
                output: r.output.clone(),
            })
            .collect();
        let prompt = render_synthesis(
            &plan.analysis,
            plan.priority.map(|p| p.as_str()),
            &outputs,
        )?;
        self.gateway.complete(&ChatRequest::new(
            Some(SYNTHESIS_SYSTEM_PROMPT.to_string()),
            vec![Message::user(prompt)],
            self.max_output_tokens,
        ))
    }

    /// Clear the router conversation, the task log and every agent.
    pub fn reset(&mut self) {
        self.conversation.clear();
        self.task_log.clear();
        for executor in &mut self.executors {
            executor.reset();
        }
        info!("router reset");
    }
}

fn unknown_agent(registry: &AgentRegistry, name: &str) -> UnknownAgentError {
    UnknownAgentError {
        name: name.to_string(),
        available: registry.names(),
    }
}

fn log_entry(result: &StepResult) -> TaskLogEntry {
    TaskLogEntry {
        agent: result.agent.clone(),
        task: result.task.clone(),
        status: result.status,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::LoopStatus;
    use crate::test_support::{ScriptedGateway, plan_block};

    fn router(root: &Path, gateway: ScriptedGateway) -> Router<ScriptedGateway> {
        let cfg = OrchestraConfig {
            project_context: Some("A band collaboration app".to_string()),
            ..OrchestraConfig::default()
        };
        Router::new(gateway, AgentRegistry::builtin(), root, &cfg).expect("router")
    }

    #[test]
    fn keyword_and_explicit_selection() {
        let temp = tempfile::tempdir().expect("tempdir");
        let router = router(temp.path(), ScriptedGateway::default());
        assert_eq!(router.select_agent("rotate the exposed api key", None).expect("select"), "security");
        assert_eq!(router.select_agent("remove unused imports", None).expect("select"), "cleanup");
        assert_eq!(router.select_agent("anything", Some("ui")).expect("select"), "ui");
        let err = router.select_agent("anything", Some("wizard")).unwrap_err();
        assert_eq!(err.name, "wizard");
        assert_eq!(err.available.len(), 8);
    }

    #[test]
    fn plan_runs_in_order_and_survives_unknown_agent() {
        let temp = tempfile::tempdir().expect("tempdir");
        let plan = plan_block(
            "Keys leaked",
            "critical",
            &[
                ("testing", "cover key rotation", 3, &["security"]),
                ("nonexistent", "do magic", 2, &[]),
                ("security", "rotate keys", 1, &[]),
            ],
        );
        let gateway = ScriptedGateway::new([
            plan.as_str(),
            "Rotated the keys in .env",
            "Added rotation tests",
            "Rotate, then test.",
        ]);
        let mut router = router(temp.path(), gateway);

        let outcome = router
            .process_request("our api keys leaked, fix it")
            .expect("process");

        let agents: Vec<&str> = outcome.steps.iter().map(|s| s.agent.as_str()).collect();
        assert_eq!(agents, vec!["security", "nonexistent", "testing"]);
        assert_eq!(outcome.steps[1].status, StepStatus::Error);
        assert_eq!(outcome.steps[1].output, "Error: Unknown agent 'nonexistent'");
        assert_eq!(outcome.steps[2].status, StepStatus::Success);
        assert_eq!(outcome.answer, "Rotate, then test.");

        let requests = router.gateway().requests();
        assert_eq!(requests.len(), 4);
        let testing_prompt = &requests[2].messages[0].content;
        assert!(testing_prompt.starts_with("cover key rotation"));
        assert!(testing_prompt.contains("Project:\nA band collaboration app"));
        assert!(testing_prompt.contains("Result from security:\nRotated the keys in .env"));

        let synthesis = &requests[3];
        assert_eq!(synthesis.system.as_deref(), Some(SYNTHESIS_SYSTEM_PROMPT));
        assert_eq!(synthesis.messages.len(), 1);
        assert!(synthesis.messages[0].content.contains("Priority: critical"));
        assert!(synthesis.messages[0].content.contains("=== NONEXISTENT ==="));

        assert_eq!(router.task_log().len(), 3);
        assert_eq!(router.task_log()[1].status, StepStatus::Error);
    }

    #[test]
    fn unparseable_plan_is_returned_as_direct_answer() {
        let temp = tempfile::tempdir().expect("tempdir");
        let gateway = ScriptedGateway::new(["Just run the test suite first."]);
        let mut router = router(temp.path(), gateway);

        let outcome = router.process_request("where do I start?").expect("process");

        assert_eq!(outcome.answer, "Just run the test suite first.");
        assert!(outcome.steps.is_empty());
        assert!(matches!(outcome.plan, PlanOutcome::Unavailable { .. }));
        assert_eq!(router.gateway().request_count(), 1);
        assert_eq!(router.conversation().len(), 2);
    }

    #[test]
    fn empty_plan_returns_analysis_without_synthesis() {
        let temp = tempfile::tempdir().expect("tempdir");
        let plan = plan_block("Nothing to delegate", "low", &[]);
        let gateway = ScriptedGateway::new([plan.as_str()]);
        let mut router = router(temp.path(), gateway);

        let outcome = router.process_request("hi").expect("process");

        assert_eq!(outcome.answer, "Nothing to delegate");
        assert_eq!(router.gateway().request_count(), 1);
    }

    #[test]
    fn planner_history_carries_across_requests() {
        let temp = tempfile::tempdir().expect("tempdir");
        let gateway = ScriptedGateway::new(["first answer", "second answer"]);
        let mut router = router(temp.path(), gateway);

        router.process_request("one").expect("first");
        router.process_request("two").expect("second");

        let second = &router.gateway().requests()[1];
        assert_eq!(second.messages.len(), 3);
        assert!(
            second
                .system
                .as_deref()
                .unwrap_or_default()
                .contains("- security: Security hardening")
        );
    }

    #[test]
    fn execute_task_routes_by_keyword() {
        let temp = tempfile::tempdir().expect("tempdir");
        let gateway = ScriptedGateway::new(["Nothing to change."]);
        let mut router = router(temp.path(), gateway);

        let report = router
            .execute_task("add a migration for tracks", None, SafetyMode::Preview, None)
            .expect("execute");

        assert_eq!(report.agent, "schema");
        assert_eq!(report.status, LoopStatus::Done);
        assert_eq!(
            router.executor("schema").expect("schema").conversation().len(),
            2
        );
    }

    #[test]
    fn preview_task_leaves_agent_history_empty() {
        let temp = tempfile::tempdir().expect("tempdir");
        let gateway = ScriptedGateway::new(["1. Find unused exports"]);
        let router = router(temp.path(), gateway);

        let preview = router
            .preview_task("remove dead code", None)
            .expect("preview");

        assert_eq!(preview.agent, "cleanup");
        assert_eq!(preview.plan, "1. Find unused exports");
        assert!(router.executor("cleanup").expect("cleanup").conversation().is_empty());
    }

    #[test]
    fn reset_clears_router_and_agents() {
        let temp = tempfile::tempdir().expect("tempdir");
        let plan = plan_block("x", "high", &[("security", "audit auth", 1, &[])]);
        let gateway = ScriptedGateway::new([plan.as_str(), "audited", "summary"]);
        let mut router = router(temp.path(), gateway);
        router.process_request("audit").expect("process");
        assert!(!router.task_log().is_empty());

        router.reset();

        assert!(router.task_log().is_empty());
        assert!(router.conversation().is_empty());
        assert!(router.executor("security").expect("security").conversation().is_empty());
    }

    #[test]
    fn gateway_failure_aborts_the_request() {
        let temp = tempfile::tempdir().expect("tempdir");
        let plan = plan_block("x", "high", &[("security", "audit auth", 1, &[])]);
        let gateway = ScriptedGateway::new([plan.as_str()]);
        gateway.push_failure("overloaded");
        let mut router = router(temp.path(), gateway);

        let err = router.process_request("audit").unwrap_err();
        assert!(err.to_string().contains("overloaded"));
    }
}
