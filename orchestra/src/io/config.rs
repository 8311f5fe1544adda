//! Orchestra configuration stored under `.orchestra/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
pub const DEFAULT_API_BASE_URL: &str = "https://api.anthropic.com/v1";

/// Orchestra configuration (TOML).
///
/// Meant to be edited by humans. Missing fields fall back to the defaults
/// below.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OrchestraConfig {
    /// Model identifier sent with every request.
    pub model: String,

    /// Base URL of the Messages API (without the `/messages` suffix).
    pub api_base_url: String,

    /// `max_tokens` for each model response.
    pub max_output_tokens: u32,

    /// Transport timeout for one model round-trip.
    pub request_timeout_secs: u64,

    /// Iteration ceiling for the tool-execution loop.
    pub max_iterations: u32,

    /// Per-output character cap in the feedback sent back to the model.
    pub feedback_output_chars: usize,

    /// Default timeout for the `bash` tool.
    pub command_timeout_secs: u64,

    /// Truncate `bash` stdout/stderr beyond this many bytes.
    pub command_output_limit_bytes: usize,

    /// Agent used when keyword selection finds no match.
    pub default_agent: String,

    /// Free-text project description shared with the planner and delegated steps.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_context: Option<String>,

    /// Agents that replace a built-in of the same name or extend the roster.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub agents: Vec<AgentOverride>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentOverride {
    pub name: String,
    #[serde(default)]
    pub title: Option<String>,
    pub prompt: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl Default for OrchestraConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            max_output_tokens: 4_000,
            request_timeout_secs: 120,
            max_iterations: 10,
            feedback_output_chars: 500,
            command_timeout_secs: 30,
            command_output_limit_bytes: 100_000,
            default_agent: "architecture".to_string(),
            project_context: None,
            agents: Vec::new(),
        }
    }
}

impl OrchestraConfig {
    /// Check limits and required fields.
    ///
    /// Whether `default_agent` names a registered agent is checked when the
    /// registry is built.
    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(anyhow!("model must be non-empty"));
        }
        if self.api_base_url.trim().is_empty() {
            return Err(anyhow!("api_base_url must be non-empty"));
        }
        if self.max_output_tokens == 0 {
            return Err(anyhow!("max_output_tokens must be > 0"));
        }
        if self.request_timeout_secs == 0 {
            return Err(anyhow!("request_timeout_secs must be > 0"));
        }
        if self.max_iterations == 0 {
            return Err(anyhow!("max_iterations must be > 0"));
        }
        if self.feedback_output_chars == 0 {
            return Err(anyhow!("feedback_output_chars must be > 0"));
        }
        if self.command_timeout_secs == 0 {
            return Err(anyhow!("command_timeout_secs must be > 0"));
        }
        if self.command_output_limit_bytes == 0 {
            return Err(anyhow!("command_output_limit_bytes must be > 0"));
        }
        if self.default_agent.trim().is_empty() {
            return Err(anyhow!("default_agent must be non-empty"));
        }
        for agent in &self.agents {
            if agent.name.trim().is_empty() {
                return Err(anyhow!("agents[].name must be non-empty"));
            }
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

/// Resolved locations of orchestra state under a project root.
#[derive(Debug, Clone)]
pub struct OrchestraPaths {
    pub root: PathBuf,
    pub state_dir: PathBuf,
    pub config_path: PathBuf,
    pub settings_path: PathBuf,
}

impl OrchestraPaths {
    pub fn new(root: &Path) -> Self {
        let state_dir = root.join(".orchestra");
        Self {
            root: root.to_path_buf(),
            config_path: state_dir.join("config.toml"),
            settings_path: state_dir.join(".env"),
            state_dir,
        }
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `OrchestraConfig::default()`.
pub fn load_config(path: &Path) -> Result<OrchestraConfig> {
    if !path.exists() {
        let cfg = OrchestraConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: OrchestraConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &OrchestraConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, buf)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

/// Write the default config unless one exists (or `force` is set).
///
/// Returns whether a file was written.
pub fn init_config(path: &Path, force: bool) -> Result<bool> {
    if path.exists() && !force {
        return Ok(false);
    }
    write_config(path, &OrchestraConfig::default())?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, OrchestraConfig::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join(".orchestra/config.toml");
        let cfg = OrchestraConfig {
            max_iterations: 4,
            project_context: Some("A band collaboration app".to_string()),
            agents: vec![AgentOverride {
                name: "docs".to_string(),
                title: Some("Documentation writer".to_string()),
                prompt: "You write docs.".to_string(),
                keywords: vec!["readme".to_string()],
            }],
            ..OrchestraConfig::default()
        };
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(&path, "feedback_output_chars = 800\n").expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.feedback_output_chars, 800);
        assert_eq!(cfg.max_iterations, 10);
        assert_eq!(cfg.model, DEFAULT_MODEL);
    }

    #[test]
    fn zero_iteration_ceiling_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(&path, "max_iterations = 0\n").expect("write");
        let err = load_config(&path).unwrap_err();
        assert!(format!("{err:#}").contains("max_iterations must be > 0"));
    }

    #[test]
    fn init_does_not_overwrite_without_force() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join(".orchestra/config.toml");
        assert!(init_config(&path, false).expect("init"));
        fs::write(&path, "max_iterations = 3\n").expect("edit");
        assert!(!init_config(&path, false).expect("init again"));
        assert_eq!(load_config(&path).expect("load").max_iterations, 3);
        assert!(init_config(&path, true).expect("force"));
        assert_eq!(load_config(&path).expect("load").max_iterations, 10);
    }
}
