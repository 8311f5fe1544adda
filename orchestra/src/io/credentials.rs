//! API credential lookup.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use thiserror::Error;
use tracing::debug;

pub const API_KEY_VAR: &str = "ANTHROPIC_API_KEY";

/// No API key in the environment or any settings file.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "{var} is not set{checked}; export {var}=... or add `{var}=...` to .orchestra/.env",
    var = API_KEY_VAR,
    checked = searched_note(.searched)
)]
pub struct MissingCredentialError {
    pub searched: Vec<PathBuf>,
}

fn searched_note(searched: &[PathBuf]) -> String {
    if searched.is_empty() {
        return String::new();
    }
    let paths: Vec<String> = searched.iter().map(|p| p.display().to_string()).collect();
    format!(" (checked the environment and {})", paths.join(", "))
}

/// Settings files consulted after the environment, in priority order.
pub fn settings_files(root: &Path) -> Vec<PathBuf> {
    vec![root.join(".orchestra").join(".env"), root.join(".env")]
}

/// Resolve the API key for `root`.
///
/// `env_value` is the process environment value (passed in so lookups stay
/// testable). Settings files are parsed without touching the process
/// environment. Blank values count as unset.
pub fn resolve_api_key(root: &Path, env_value: Option<String>) -> Result<String> {
    if let Some(value) = env_value.filter(|v| !v.trim().is_empty()) {
        debug!("api key from environment");
        return Ok(value.trim().to_string());
    }
    let candidates = settings_files(root);
    for path in &candidates {
        if let Some(value) = read_key_from(path)? {
            debug!(path = %path.display(), "api key from settings file");
            return Ok(value);
        }
    }
    Err(MissingCredentialError {
        searched: candidates,
    }
    .into())
}

/// Resolve using the live `ANTHROPIC_API_KEY` environment variable.
pub fn api_key_from_env(root: &Path) -> Result<String> {
    resolve_api_key(root, std::env::var(API_KEY_VAR).ok())
}

fn read_key_from(path: &Path) -> Result<Option<String>> {
    if !path.is_file() {
        return Ok(None);
    }
    let entries =
        dotenvy::from_path_iter(path).with_context(|| format!("read {}", path.display()))?;
    for entry in entries {
        let (key, value) = entry.with_context(|| format!("parse {}", path.display()))?;
        if key == API_KEY_VAR && !value.trim().is_empty() {
            return Ok(Some(value.trim().to_string()));
        }
    }
    Ok(None)
}
