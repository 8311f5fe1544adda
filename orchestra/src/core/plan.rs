//! Execution-plan wire format and parsing.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;

/// Severity tag attached to a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Critical,
    High,
    Medium,
    Low,
}

impl Priority {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "critical" => Some(Priority::Critical),
            "high" => Some(Priority::High),
            "medium" => Some(Priority::Medium),
            "low" => Some(Priority::Low),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Critical => "critical",
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One delegated agent/task assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanStep {
    pub agent: String,
    pub task: String,
    #[serde(default)]
    pub order: i64,
    #[serde(default)]
    pub depends_on: Vec<String>,
}

/// Ordered, dependency-annotated plan for one top-level request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    #[serde(default)]
    pub analysis: String,
    #[serde(default, deserialize_with = "lenient_priority")]
    pub priority: Option<Priority>,
    pub plan: Vec<PlanStep>,
}

impl ExecutionPlan {
    /// Steps in ascending `order`; ties keep their original position.
    pub fn ordered_steps(&self) -> Vec<&PlanStep> {
        let mut steps: Vec<&PlanStep> = self.plan.iter().collect();
        steps.sort_by_key(|step| step.order);
        steps
    }
}

fn lenient_priority<'de, D>(deserializer: D) -> Result<Option<Priority>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<serde_json::Value> = Option::deserialize(deserializer)?;
    Ok(raw
        .as_ref()
        .and_then(serde_json::Value::as_str)
        .and_then(Priority::parse))
}

/// Outcome of interpreting a planning response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanOutcome {
    Plan(ExecutionPlan),
    /// The response was not a structured plan; `raw` is the direct answer.
    Unavailable { raw: String },
}

/// Interpret a planning response.
///
/// JSON is taken from the first ```` ```json ```` block, else the first bare
/// fenced block, else the whole text.
pub fn parse_plan(response: &str) -> PlanOutcome {
    let candidate = extract_json_text(response);
    match serde_json::from_str::<ExecutionPlan>(candidate) {
        Ok(plan) => PlanOutcome::Plan(plan),
        Err(err) => {
            debug!(err = %err, "response is not a structured plan");
            PlanOutcome::Unavailable {
                raw: response.to_string(),
            }
        }
    }
}

fn extract_json_text(response: &str) -> &str {
    if let Some(body) = fenced_body(response, "```json") {
        return body;
    }
    if let Some(body) = fenced_body(response, "```") {
        return body;
    }
    response.trim()
}

fn fenced_body<'a>(response: &'a str, opener: &str) -> Option<&'a str> {
    let start = response.find(opener)? + opener.len();
    let rest = &response[start..];
    let end = rest.find("```")?;
    Some(rest[..end].trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAN_JSON: &str = r#"{
  "analysis": "Keys leaked and need rotation",
  "priority": "Critical",
  "plan": [
    {"agent": "testing", "task": "cover rotation", "order": 2, "depends_on": ["security"]},
    {"agent": "security", "task": "rotate keys", "order": 1}
  ]
}"#;

    #[test]
    fn parses_fenced_plan() {
        let response = format!("Here is the plan:\n```json\n{PLAN_JSON}\n```\nDone.");
        let PlanOutcome::Plan(plan) = parse_plan(&response) else {
            panic!("expected plan");
        };
        assert_eq!(plan.priority, Some(Priority::Critical));
        let agents: Vec<&str> = plan
            .ordered_steps()
            .iter()
            .map(|step| step.agent.as_str())
            .collect();
        assert_eq!(agents, vec!["security", "testing"]);
        assert!(plan.plan[1].depends_on.is_empty());
    }

    #[test]
    fn parses_unfenced_plan() {
        let PlanOutcome::Plan(plan) = parse_plan(PLAN_JSON) else {
            panic!("expected plan");
        };
        assert_eq!(plan.plan.len(), 2);
    }

    #[test]
    fn unknown_priority_becomes_none() {
        let outcome = parse_plan(r#"{"analysis": "x", "priority": "urgent-ish", "plan": []}"#);
        let PlanOutcome::Plan(plan) = outcome else {
            panic!("expected plan");
        };
        assert_eq!(plan.priority, None);
    }

    #[test]
    fn non_string_priority_keeps_the_plan() {
        for priority in ["1", "null", "{\"level\": \"high\"}", "[\"high\"]"] {
            let raw = format!(
                r#"{{"analysis": "x", "priority": {priority}, "plan": [{{"agent": "ui", "task": "t"}}]}}"#
            );
            let PlanOutcome::Plan(plan) = parse_plan(&raw) else {
                panic!("expected plan for priority {priority}");
            };
            assert_eq!(plan.priority, None);
            assert_eq!(plan.plan.len(), 1);
        }
    }

    #[test]
    fn prose_is_a_direct_answer() {
        let response = "Start with enabling row level security on every table.";
        assert_eq!(
            parse_plan(response),
            PlanOutcome::Unavailable {
                raw: response.to_string()
            }
        );
    }

    #[test]
    fn object_without_plan_is_a_direct_answer() {
        let outcome = parse_plan("```json\n{\"answer\": 42}\n```");
        assert!(matches!(outcome, PlanOutcome::Unavailable { .. }));
    }

    #[test]
    fn ordered_steps_is_stable_for_equal_orders() {
        let plan = ExecutionPlan {
            analysis: String::new(),
            priority: None,
            plan: vec![
                PlanStep {
                    agent: "b".to_string(),
                    task: "t".to_string(),
                    order: 1,
                    depends_on: Vec::new(),
                },
                PlanStep {
                    agent: "a".to_string(),
                    task: "t".to_string(),
                    order: 1,
                    depends_on: Vec::new(),
                },
                PlanStep {
                    agent: "c".to_string(),
                    task: "t".to_string(),
                    order: 0,
                    depends_on: Vec::new(),
                },
            ],
        };
        let agents: Vec<&str> = plan
            .ordered_steps()
            .iter()
            .map(|step| step.agent.as_str())
            .collect();
        assert_eq!(agents, vec!["c", "b", "a"]);
    }
}
