//! Error types shared across agentrun crates.

/// Errors that cross the session boundary.
///
/// Only transport-level failures are errors. Everything the agent itself
/// reports (tool failures, `session.error`, timeouts) is carried inside the
/// `RunResult` instead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The runtime could not be reached or refused to open a session.
    #[error("Failed to open agent session: {0}")]
    Connect(String),

    /// The event stream ended before any terminal event arrived.
    #[error("Agent runtime disconnected before the session finished")]
    Disconnected,

    /// Sending to or receiving from the runtime failed mid-session.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The config was rejected before any session was opened.
    #[error("Invalid agent config: {0}")]
    Config(#[from] ConfigError),

    /// Underlying I/O failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias using the agentrun [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Problems found while validating an `AgentConfig`.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("allowed_tools and excluded_tools are mutually exclusive")]
    ConflictingToolFilters,

    #[error("Agent name must not be empty")]
    EmptyName,

    #[error("Timeout must be a positive number of seconds, got {0}")]
    InvalidTimeout(f64),

    #[error("Sub-agent at index {0} has no name")]
    UnnamedSubagent(usize),

    #[error("Sub-agent '{0}' is defined more than once")]
    DuplicateSubagent(String),
}
