//! Logging and metrics setup shared by all crates of the workspace.

pub mod metrics;
pub mod tracing;
