//! Deterministic, pure logic shared by the orchestra.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data (model text, tool results, plans) and return deterministic outputs
//! suitable for tests.

pub mod diff;
pub mod feedback;
pub mod plan;
pub mod selector;
pub mod tool_call;
pub mod types;
