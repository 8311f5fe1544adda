//! Agents: named system prompts sharing one tool-execution capability.
//!
//! The registry is an explicit value built at startup (built-ins plus config
//! overrides) and passed to the router. There is no global agent table.

use anyhow::{Result, anyhow};
use serde::Serialize;
use thiserror::Error;

use crate::core::selector::select_by_keywords;
use crate::io::config::OrchestraConfig;
use crate::io::prompt::RosterEntry;

pub mod executor;

/// A named system prompt plus the keywords that route tasks to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Agent {
    pub name: String,
    pub title: String,
    pub prompt: String,
    pub keywords: Vec<String>,
}

impl Agent {
    pub fn new(name: &str, title: &str, prompt: &str, keywords: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            title: title.to_string(),
            prompt: prompt.to_string(),
            keywords: keywords.iter().map(|k| (*k).to_string()).collect(),
        }
    }
}

/// A task named an agent that is not registered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown agent: {name}. Available: {}", .available.join(", "))]
pub struct UnknownAgentError {
    pub name: String,
    pub available: Vec<String>,
}

pub const DEFAULT_AGENT: &str = "architecture";

const SHARED_GUIDANCE: &str = "You work on an existing codebase. Fix and improve what is there rather than designing from scratch. Give specific code, exact file paths and step-by-step instructions, and explain the impact of each change.";

/// The eight built-in specialists, in keyword-priority order.
pub fn builtin_agents() -> Vec<Agent> {
    let specialists: [(&str, &str, &str, &[&str]); 8] = [
        (
            "security",
            "Security hardening (row-level security, keys, auth, input validation)",
            "You are a security hardening specialist. You design access policies, move privileged writes behind server-side functions, rotate exposed credentials, and add input validation and rate limiting.",
            &["security", "rls", "auth", "key", "jwt"],
        ),
        (
            "cleanup",
            "Dead code removal and technical debt",
            "You are a code cleanup specialist. You find unused modules, exports and dependencies, confirm nothing references them, and remove them in small, safe steps.",
            &["dead code", "cleanup", "remove", "delete"],
        ),
        (
            "schema",
            "Database schema fixes, migrations and type sync",
            "You are a database schema specialist. You reconcile the schema with the code that uses it, write reversible migrations, and keep generated types in sync.",
            &["schema", "database", "table", "migration"],
        ),
        (
            "testing",
            "Test setup, coverage and mocking",
            "You are a test coverage specialist. You set up test tooling, write focused unit and integration tests for existing flows, and mock external services.",
            &["test", "testing", "coverage"],
        ),
        (
            "architecture",
            "Refactoring and separation of concerns",
            "You are a software architect. You split oversized modules, separate data access from presentation, and introduce clear boundaries without changing behavior.",
            &["refactor", "architecture", "structure"],
        ),
        (
            "audio",
            "File upload, storage and media handling",
            "You are a media and storage specialist. You fix upload flows, validate files before storing them, and make playback and streaming reliable.",
            &["audio", "upload", "file", "storage"],
        ),
        (
            "ui",
            "UI refactoring, component splitting and styling",
            "You are a UI specialist. You break large screens into focused components, add error boundaries and loading states, and keep styling consistent.",
            &["ui", "component", "screen", "interface"],
        ),
        (
            "deployment",
            "Production readiness, CI/CD and monitoring",
            "You are a deployment specialist. You prepare production builds, set up CI pipelines, manage environment configuration, and add monitoring.",
            &["deploy", "production", "build"],
        ),
    ];

    specialists
        .into_iter()
        .map(|(name, title, role, keywords)| {
            let prompt = format!("{role}\n\n{SHARED_GUIDANCE}");
            Agent::new(name, title, &prompt, keywords)
        })
        .collect()
}

/// Ordered agent roster with a fallback for unmatched tasks.
#[derive(Debug, Clone)]
pub struct AgentRegistry {
    agents: Vec<Agent>,
    default_agent: String,
}

impl AgentRegistry {
    /// Build a registry; `default_agent` must be one of `agents`.
    pub fn new(agents: Vec<Agent>, default_agent: &str) -> Result<Self> {
        if agents.is_empty() {
            return Err(anyhow!("agent registry must not be empty"));
        }
        let registry = Self {
            agents,
            default_agent: default_agent.to_string(),
        };
        registry.require(default_agent).map_err(|err| {
            anyhow!(
                "default_agent {:?} is not registered (available: {})",
                err.name,
                err.available.join(", ")
            )
        })?;
        Ok(registry)
    }

    pub fn builtin() -> Self {
        Self {
            agents: builtin_agents(),
            default_agent: DEFAULT_AGENT.to_string(),
        }
    }

    /// Built-ins with `[[agents]]` entries applied: same name replaces, new
    /// names are appended in file order.
    pub fn from_config(cfg: &OrchestraConfig) -> Result<Self> {
        let mut agents = builtin_agents();
        for entry in &cfg.agents {
            let existing = agents.iter().position(|a| a.name == entry.name);
            let title = entry
                .title
                .clone()
                .or_else(|| existing.map(|idx| agents[idx].title.clone()))
                .unwrap_or_else(|| entry.name.clone());
            let agent = Agent {
                name: entry.name.clone(),
                title,
                prompt: entry.prompt.clone(),
                keywords: entry.keywords.clone(),
            };
            match existing {
                Some(idx) => agents[idx] = agent,
                None => agents.push(agent),
            }
        }
        Self::new(agents, &cfg.default_agent)
    }

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub fn names(&self) -> Vec<String> {
        self.agents.iter().map(|a| a.name.clone()).collect()
    }

    pub fn default_agent(&self) -> &str {
        &self.default_agent
    }

    pub fn get(&self, name: &str) -> Option<&Agent> {
        self.agents.iter().find(|a| a.name == name)
    }

    pub fn require(&self, name: &str) -> Result<&Agent, UnknownAgentError> {
        self.get(name).ok_or_else(|| UnknownAgentError {
            name: name.to_string(),
            available: self.names(),
        })
    }

    /// Name of the first agent whose keyword occurs in `task`, else the default.
    pub fn select(&self, task: &str) -> &str {
        let candidates = self
            .agents
            .iter()
            .map(|agent| (agent.name.as_str(), &agent.keywords));
        select_by_keywords(task, candidates).unwrap_or(self.default_agent.as_str())
    }

    pub fn roster(&self) -> Vec<RosterEntry> {
        self.agents
            .iter()
            .map(|agent| RosterEntry {
                name: agent.name.clone(),
                title: agent.title.clone(),
            })
            .collect()
    }
}
