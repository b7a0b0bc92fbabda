//! # agentrun-adapters
//!
//! Connectors that reach real agent runtimes.
//!
//! - `ProcessConnector` runs the runtime CLI as a child process and speaks
//!   newline-delimited JSON over its stdio.

mod process;

pub use process::ProcessConnector;
