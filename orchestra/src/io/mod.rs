//! I/O boundaries: configuration, credentials, the model gateway, the
//! filesystem/process toolkit and prompt rendering.

pub mod config;
pub mod credentials;
pub mod gateway;
pub mod process;
pub mod prompt;
pub mod toolkit;
