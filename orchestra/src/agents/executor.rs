//! Tool-execution loop for one agent.
//!
//! Each iteration is one model round-trip. Tool calls found in the reply are
//! dispatched in order and their results are fed back as the next user turn,
//! until the model answers without tool calls or the iteration ceiling is
//! reached.

use anyhow::{Result, bail};
use tracing::{debug, info, instrument, warn};

use crate::agents::Agent;
use crate::core::feedback::format_feedback;
use crate::core::tool_call::{ParsedResponse, parse_tool_calls};
use crate::core::types::{
    ActionRecord, Conversation, ExecutionReport, LoopStatus, Message, SafetyMode, ToolCall,
};
use crate::io::config::OrchestraConfig;
use crate::io::gateway::{ChatRequest, ModelGateway};
use crate::io::prompt::{render_plan_preview, render_task_prompt};
use crate::io::toolkit::Toolkit;

/// Knobs for the loop and its prompts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopSettings {
    pub max_output_tokens: u32,
    pub feedback_output_chars: usize,
    pub command_timeout_secs: u64,
}

impl LoopSettings {
    pub fn from_config(cfg: &OrchestraConfig) -> Self {
        Self {
            max_output_tokens: cfg.max_output_tokens,
            feedback_output_chars: cfg.feedback_output_chars,
            command_timeout_secs: cfg.command_timeout_secs,
        }
    }
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self::from_config(&OrchestraConfig::default())
    }
}

#[derive(Debug)]
enum LoopState {
    AwaitingModel,
    DispatchingActions(Vec<ToolCall>),
    Done(String),
    IterationExhausted,
}

/// An agent bound to a toolkit and its own persistent conversation.
#[derive(Debug)]
pub struct AgentExecutor {
    agent: Agent,
    toolkit: Toolkit,
    conversation: Conversation,
    settings: LoopSettings,
}

impl AgentExecutor {
    pub fn new(agent: Agent, toolkit: Toolkit, settings: LoopSettings) -> Self {
        Self {
            agent,
            toolkit,
            conversation: Conversation::new(),
            settings,
        }
    }

    pub fn agent(&self) -> &Agent {
        &self.agent
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn toolkit(&self) -> &Toolkit {
        &self.toolkit
    }

    /// Run the tool loop for `task`.
    ///
    /// Returns `Err` only for gateway failures and prompt rendering; tool
    /// failures are part of the report.
    #[instrument(skip_all, fields(agent = %self.agent.name, mode = %mode, max_iterations = max_iterations))]
    pub fn execute_task<G: ModelGateway>(
        &mut self,
        gateway: &G,
        task: &str,
        mode: SafetyMode,
        max_iterations: u32,
    ) -> Result<ExecutionReport> {
        if max_iterations == 0 {
            bail!("max_iterations must be > 0");
        }
        let mut pending = render_task_prompt(task, mode, self.settings.command_timeout_secs)?;
        let mut iterations = 0u32;
        let mut actions: Vec<ActionRecord> = Vec::new();
        let mut state = LoopState::AwaitingModel;

        loop {
            state = match state {
                LoopState::AwaitingModel => {
                    iterations += 1;
                    debug!(iteration = iterations, "awaiting model");
                    let reply = self.round_trip(gateway, &pending)?;
                    match parse_tool_calls(&reply) {
                        ParsedResponse::ToolCalls(calls) => LoopState::DispatchingActions(calls),
                        ParsedResponse::NoToolCalls => LoopState::Done(reply),
                    }
                }
                LoopState::DispatchingActions(calls) => {
                    info!(iteration = iterations, calls = calls.len(), "dispatching actions");
                    let batch: Vec<ActionRecord> = calls
                        .into_iter()
                        .map(|call| {
                            let result = self.toolkit.execute_call(&call, mode);
                            ActionRecord {
                                action: call,
                                result,
                            }
                        })
                        .collect();
                    let feedback = format_feedback(&batch, self.settings.feedback_output_chars);
                    actions.extend(batch);
                    if iterations >= max_iterations {
                        LoopState::IterationExhausted
                    } else {
                        pending = feedback;
                        LoopState::AwaitingModel
                    }
                }
                LoopState::Done(reply) => {
                    info!(iterations, actions = actions.len(), "agent finished");
                    return Ok(self.report(LoopStatus::Done, iterations, actions, Some(reply), mode));
                }
                LoopState::IterationExhausted => {
                    warn!(iterations, "iteration ceiling reached with tool calls pending");
                    return Ok(self.report(
                        LoopStatus::IterationExhausted,
                        iterations,
                        actions,
                        None,
                        mode,
                    ));
                }
            };
        }
    }

    /// Ask for a plain-English plan. No tools run and the conversation is
    /// left untouched.
    #[instrument(skip_all, fields(agent = %self.agent.name))]
    pub fn preview_plan<G: ModelGateway>(&self, gateway: &G, task: &str) -> Result<String> {
        let request = ChatRequest::new(
            Some(self.agent.prompt.clone()),
            vec![Message::user(render_plan_preview(task)?)],
            self.settings.max_output_tokens,
        );
        gateway.complete(&request)
    }

    /// One round-trip on the agent's conversation, without tools.
    #[instrument(skip_all, fields(agent = %self.agent.name))]
    pub fn consult<G: ModelGateway>(&mut self, gateway: &G, prompt: &str) -> Result<String> {
        self.round_trip(gateway, prompt)
    }

    /// Forget the conversation and the change log.
    pub fn reset(&mut self) {
        self.conversation.clear();
        self.toolkit.clear_changes();
    }

    /// Send `user_text` after the existing history. The history only grows
    /// when the gateway answers.
    fn round_trip<G: ModelGateway>(&mut self, gateway: &G, user_text: &str) -> Result<String> {
        let mut messages = self.conversation.messages().to_vec();
        messages.push(Message::user(user_text));
        let request = ChatRequest::new(
            Some(self.agent.prompt.clone()),
            messages,
            self.settings.max_output_tokens,
        );
        let reply = gateway.complete(&request)?;
        self.conversation.push(Message::user(user_text));
        self.conversation.push(Message::assistant(reply.clone()));
        Ok(reply)
    }

    fn report(
        &self,
        status: LoopStatus,
        iterations: u32,
        actions: Vec<ActionRecord>,
        final_response: Option<String>,
        mode: SafetyMode,
    ) -> ExecutionReport {
        ExecutionReport {
            agent: self.agent.name.clone(),
            status,
            iterations,
            actions,
            final_response,
            changes_summary: self.toolkit.changes_summary(),
            mode,
        }
    }
}
