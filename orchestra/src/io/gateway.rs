//! Model gateway abstraction.
//!
//! The [`ModelGateway`] trait decouples the tool loop and the router from the
//! hosted chat API. Tests use scripted gateways that return predetermined
//! replies without network access.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::core::types::Message;
use crate::io::config::OrchestraConfig;

pub const ANTHROPIC_API_VERSION: &str = "2023-06-01";

/// One stateless round-trip: a system prompt plus a full message history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRequest {
    pub system: Option<String>,
    pub messages: Vec<Message>,
    pub max_tokens: u32,
}

impl ChatRequest {
    pub fn new(system: Option<String>, messages: Vec<Message>, max_tokens: u32) -> Self {
        Self {
            system,
            messages,
            max_tokens,
        }
    }
}

/// Abstraction over chat backends.
pub trait ModelGateway {
    /// Send the request and return the concatenated text of the reply.
    fn complete(&self, request: &ChatRequest) -> Result<String>;
}

/// Transport or API failure talking to the model.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("model API error{}: {message}", http_note(.status))]
pub struct GatewayError {
    pub status: Option<u16>,
    pub message: String,
}

fn http_note(status: &Option<u16>) -> String {
    status
        .map(|code| format!(" (HTTP {code})"))
        .unwrap_or_default()
}

#[derive(Debug, Serialize)]
struct MessagesBody<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: &'a [Message],
}

/// Serialize a request as a Messages API body.
pub fn build_request_body(model: &str, request: &ChatRequest) -> Result<Value> {
    let body = MessagesBody {
        model,
        max_tokens: request.max_tokens,
        system: request.system.as_deref(),
        messages: &request.messages,
    };
    serde_json::to_value(body).context("serialize messages request")
}

/// Concatenate the text blocks of a Messages API response.
///
/// Non-text blocks are ignored. A response without a `content` array is an
/// error.
pub fn extract_text(response: &Value) -> Result<String, GatewayError> {
    let blocks = response
        .get("content")
        .and_then(Value::as_array)
        .ok_or_else(|| GatewayError {
            status: None,
            message: "response has no content array".to_string(),
        })?;
    let text = blocks
        .iter()
        .filter(|block| block.get("type").and_then(Value::as_str) == Some("text"))
        .filter_map(|block| block.get("text").and_then(Value::as_str))
        .collect::<Vec<_>>()
        .join("");
    Ok(text)
}

fn api_error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            let error = value.get("error")?;
            let kind = error.get("type").and_then(Value::as_str).unwrap_or("error");
            let message = error.get("message").and_then(Value::as_str)?;
            Some(format!("{kind}: {message}"))
        })
        .unwrap_or_else(|| body.trim().chars().take(500).collect())
}

/// Gateway backed by the hosted Messages API.
pub struct AnthropicGateway {
    client: reqwest::blocking::Client,
    api_key: String,
    model: String,
    endpoint: String,
}

impl AnthropicGateway {
    pub fn new(api_key: String, model: String, base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .context("build http client")?;
        Ok(Self {
            client,
            api_key,
            model,
            endpoint: format!("{}/messages", base_url.trim_end_matches('/')),
        })
    }

    pub fn from_config(api_key: String, cfg: &OrchestraConfig) -> Result<Self> {
        Self::new(
            api_key,
            cfg.model.clone(),
            &cfg.api_base_url,
            cfg.request_timeout(),
        )
    }
}

impl ModelGateway for AnthropicGateway {
    #[instrument(skip_all, fields(model = %self.model, messages = request.messages.len()))]
    fn complete(&self, request: &ChatRequest) -> Result<String> {
        let body = build_request_body(&self.model, request)?;
        debug!(endpoint = %self.endpoint, "sending model request");

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_API_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .map_err(|err| GatewayError {
                status: None,
                message: err.to_string(),
            })?;

        let status = response.status();
        let text = response.text().map_err(|err| GatewayError {
            status: Some(status.as_u16()),
            message: err.to_string(),
        })?;
        if !status.is_success() {
            return Err(GatewayError {
                status: Some(status.as_u16()),
                message: api_error_message(&text),
            }
            .into());
        }

        let value: Value = serde_json::from_str(&text).map_err(|err| GatewayError {
            status: Some(status.as_u16()),
            message: format!("invalid JSON response: {err}"),
        })?;
        let reply = extract_text(&value)?;
        debug!(chars = reply.len(), "model reply received");
        Ok(reply)
    }
}
