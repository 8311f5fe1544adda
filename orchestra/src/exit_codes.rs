//! Stable exit codes for orchestra CLI commands.

/// Command succeeded (including a loop that finished with a final answer).
pub const OK: i32 = 0;
/// Model/transport failure, unknown agent, declined confirmation, or other errors.
pub const FAILED: i32 = 1;
/// Missing credentials or invalid configuration.
pub const CONFIG: i32 = 2;
/// The tool loop hit its iteration ceiling while the model still issued tool calls.
pub const ITERATION_EXHAUSTED: i32 = 3;
