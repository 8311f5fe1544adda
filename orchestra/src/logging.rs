//! Development-time tracing for debugging orchestra.
//!
//! Diagnostics go to stderr and are controlled by `RUST_LOG` or `-v`. Agent
//! replies, plans and reports are written to stdout by the CLI and are
//! unaffected.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when `RUST_LOG` is unset.
pub fn default_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "orchestra=info",
        _ => "orchestra=debug",
    }
}

/// Initialize the tracing subscriber.
///
/// `RUST_LOG` wins over `verbosity`. Output: stderr, compact format.
///
/// # Example
/// ```bash
/// RUST_LOG=orchestra=debug orchestra execute "add a health check"
/// ```
pub fn init(verbosity: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity)));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
