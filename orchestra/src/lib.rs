//! Multi-agent command layer over a hosted chat model.
//!
//! A request is routed to one of several specialist agents. Each agent drives
//! a tool loop: the model replies with fenced JSON tool calls, the toolkit
//! runs them against the project root (or previews them), and the results are
//! fed back until the model answers in plain text. Multi-agent requests are
//! planned by the model, executed step by step and synthesized into one answer.
//!
//! - **[`core`]**: Pure, deterministic logic (tool-call and plan extraction,
//!   keyword selection, diffs, feedback formatting). No I/O.
//! - **[`io`]**: Side effects (model gateway, filesystem and process toolkit,
//!   configuration, credentials, prompt templates).
//!
//! [`agents`] holds the registry and the per-agent loop, [`router`] ties them
//! together and [`repl`] is the interactive surface.

pub mod agents;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod render;
pub mod repl;
pub mod router;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
