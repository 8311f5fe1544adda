//! Test-only helpers: a scripted model gateway and reply builders.

use std::cell::RefCell;
use std::collections::VecDeque;

use anyhow::{Result, anyhow};
use serde_json::Value;

use crate::agents::Agent;
use crate::io::gateway::{ChatRequest, GatewayError, ModelGateway};

/// Gateway that replays queued replies and records every request.
///
/// An `Err` entry is returned as a [`GatewayError`]. Running out of replies is
/// also an error so a test never hangs on an unexpected extra round-trip.
#[derive(Debug, Default)]
pub struct ScriptedGateway {
    replies: RefCell<VecDeque<Result<String, String>>>,
    requests: RefCell<Vec<ChatRequest>>,
}

impl ScriptedGateway {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: RefCell::new(replies.into_iter().map(|r| Ok(r.into())).collect()),
            requests: RefCell::new(Vec::new()),
        }
    }

    pub fn push_reply(&self, reply: impl Into<String>) {
        self.replies.borrow_mut().push_back(Ok(reply.into()));
    }

    pub fn push_failure(&self, message: impl Into<String>) {
        self.replies.borrow_mut().push_back(Err(message.into()));
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.borrow().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.borrow().len()
    }

    pub fn remaining(&self) -> usize {
        self.replies.borrow().len()
    }
}

impl ModelGateway for ScriptedGateway {
    fn complete(&self, request: &ChatRequest) -> Result<String> {
        self.requests.borrow_mut().push(request.clone());
        match self.replies.borrow_mut().pop_front() {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(message)) => Err(GatewayError {
                status: None,
                message,
            }
            .into()),
            None => Err(anyhow!("scripted gateway has no reply left")),
        }
    }
}

/// A fenced tool-call block as a model would emit it.
pub fn tool_block(tool: &str, args: Value) -> String {
    let call = serde_json::json!({ "tool": tool, "args": args });
    format!("```json\n{call}\n```")
}

/// A fenced plan block with `(agent, task, order, depends_on)` steps.
pub fn plan_block(analysis: &str, priority: &str, steps: &[(&str, &str, i64, &[&str])]) -> String {
    let plan: Vec<Value> = steps
        .iter()
        .map(|(agent, task, order, deps)| {
            serde_json::json!({
                "agent": agent,
                "task": task,
                "order": order,
                "depends_on": deps,
            })
        })
        .collect();
    let body = serde_json::json!({
        "analysis": analysis,
        "priority": priority,
        "plan": plan,
    });
    format!("```json\n{body:#}\n```")
}

/// A minimal agent with a recognizable prompt.
pub fn agent(name: &str) -> Agent {
    Agent::new(
        name,
        &format!("{name} title"),
        &format!("You are the {name} agent."),
        &[name],
    )
}
