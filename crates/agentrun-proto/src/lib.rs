//! # agentrun-proto
//!
//! Shared types, error definitions, and traits for agentrun.
//!
//! This crate provides the boundary every other agentrun crate builds on:
//! - `SessionEvent`, the typed view over raw runtime event envelopes
//! - `AgentConfig`, the immutable per-run agent configuration
//! - `RunResult` and the records it aggregates (turns, tool calls, usage, ...)
//! - The `Connector` / `AgentSession` transport traits
//! - Common error types

mod config;
mod confirmation;
mod connector;
mod error;
pub mod event;
mod result;

pub use config::{
    AgentConfig, ReasoningEffort, SubagentDescriptor, SystemMessageMode, ToolFilter,
};
pub use confirmation::{ConfirmationDecision, ConfirmationReply};
pub use connector::{AgentSession, Connector};
pub use error::{ConfigError, Error, Result};
pub use event::{
    ConfirmationRequest, MalformedEvent, RawEvent, SessionEvent, ToolCompleteData,
    ToolStartData, UsageData,
};
pub use result::{
    MappingAnomaly, PermissionRecord, PermissionStatus, Role, RunResult, SubagentInvocation,
    SubagentStatus, TokenUsage, ToolCall, Turn, UsageInfo,
};
