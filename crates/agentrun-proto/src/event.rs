//! Session event types for agent runtime streams.
//!
//! A runtime emits one JSON envelope per event, `{"type": "...", "data": {...}}`.
//! [`SessionEvent::decode`] turns an envelope into a typed variant and never
//! fails: unknown kinds become [`SessionEvent::Other`], and known kinds whose
//! payload does not fit become [`SessionEvent::Malformed`]. Both keep the raw
//! envelope so nothing is lost.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Wire `type` strings for the event kinds agentrun understands.
pub mod kind {
    pub const SESSION_START: &str = "session.start";
    pub const SESSION_IDLE: &str = "session.idle";
    pub const ABORT: &str = "abort";
    pub const SESSION_ERROR: &str = "session.error";
    pub const USER_MESSAGE: &str = "user.message";
    pub const TURN_START: &str = "assistant.turn_start";
    pub const TURN_END: &str = "assistant.turn_end";
    pub const ASSISTANT_MESSAGE: &str = "assistant.message";
    pub const REASONING: &str = "assistant.reasoning";
    pub const USAGE: &str = "assistant.usage";
    pub const TOOL_START: &str = "tool.execution_start";
    pub const TOOL_PROGRESS: &str = "tool.execution_progress";
    pub const TOOL_COMPLETE: &str = "tool.execution_complete";
    pub const PERMISSION_REQUESTED: &str = "permission.requested";
    pub const PERMISSION_RESOLVED: &str = "permission.resolved";
    pub const SUBAGENT_SELECTED: &str = "subagent.selected";
    pub const SUBAGENT_STARTED: &str = "subagent.started";
    pub const SUBAGENT_COMPLETED: &str = "subagent.completed";
    pub const SUBAGENT_FAILED: &str = "subagent.failed";
}

/// An event envelope exactly as the transport delivered it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    /// The event kind discriminator (e.g. "tool.execution_start").
    #[serde(rename = "type")]
    pub kind: String,

    /// Kind-specific payload.
    #[serde(default)]
    pub data: Value,
}

impl RawEvent {
    pub fn new(kind: impl Into<String>, data: Value) -> Self {
        Self {
            kind: kind.into(),
            data,
        }
    }
}

/// Data for `session.start`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStartData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_model: Option<String>,
}

/// Data for `session.idle`, the normal end of a session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionIdleData {
    /// Set when the runtime ended the session because it was cancelled.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub cancelled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Data for `abort`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AbortData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Data for `session.error`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    #[serde(default)]
    pub message: String,
}

/// Data for `assistant.message` and `user.message`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// Data for `assistant.turn_start` / `assistant.turn_end`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub turn_id: Option<String>,
}

/// Data for `assistant.reasoning`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReasoningData {
    #[serde(alias = "reasoningText")]
    pub content: String,
}

/// Data for `tool.execution_progress`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(alias = "progressMessage")]
    pub message: String,
}

/// Data for `tool.execution_start`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolStartData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    pub tool_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
}

/// Successful tool output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResultContent {
    pub content: String,
}

/// Tool failure details.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolErrorContent {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// Data for `tool.execution_complete`.
///
/// `tool_call_id` is optional on the wire; completions without it can only be
/// matched by tool name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCompleteData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ToolResultContent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ToolErrorContent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<f64>,
}

/// Data for `permission.requested`: the runtime asks before a sensitive action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmationRequest {
    pub request_id: String,
    /// Category of the action ("write", "shell", "url", ...).
    #[serde(default)]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub details: Value,
}

/// Data for `permission.resolved`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmationResolvedData {
    pub request_id: String,
    pub approved: bool,
}

/// Data shared by every `subagent.*` event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubagentData {
    /// Correlates the lifecycle events of one invocation.
    #[serde(default, alias = "toolCallId", skip_serializing_if = "Option::is_none")]
    pub invocation_id: Option<String>,
    pub agent_name: String,
    #[serde(default, alias = "duration", skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Data for `assistant.usage`: one underlying model call.
///
/// Token counts arrive as JSON numbers that are not always integral, so they
/// are kept as `f64` on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_tokens: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_tokens: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_read_tokens: Option<f64>,
    /// Runtime-reported cost in an unspecified unit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
    /// Call duration in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}

/// A known event kind whose payload could not be decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct MalformedEvent {
    pub raw: RawEvent,
    pub error: String,
}

/// A typed session event.
///
/// Serializes to and from the raw envelope format, so a recorded stream of
/// `SessionEvent`s replays byte-for-byte through [`SessionEvent::decode`].
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    SessionStarted(SessionStartData),
    /// Terminal: the runtime finished processing the task.
    SessionCompleted(SessionIdleData),
    /// Terminal: the runtime aborted the task.
    SessionCancelled(AbortData),
    Error(ErrorData),
    UserMessage(MessageData),
    TurnStarted(TurnData),
    TurnEnded(TurnData),
    Text(MessageData),
    Reasoning(ReasoningData),
    Progress(ProgressData),
    ToolStarted(ToolStartData),
    ToolCompleted(ToolCompleteData),
    ConfirmationRequested(ConfirmationRequest),
    ConfirmationResolved(ConfirmationResolvedData),
    SubagentQueued(SubagentData),
    SubagentStarted(SubagentData),
    SubagentCompleted(SubagentData),
    SubagentFailed(SubagentData),
    Usage(UsageData),
    /// A kind agentrun does not interpret; kept as opaque metadata.
    Other(RawEvent),
    Malformed(MalformedEvent),
}

impl SessionEvent {
    /// Decodes a raw envelope into a typed event.
    pub fn decode(raw: RawEvent) -> Self {
        match raw.kind.as_str() {
            kind::SESSION_START => typed(raw, Self::SessionStarted),
            kind::SESSION_IDLE => typed(raw, Self::SessionCompleted),
            kind::ABORT => typed(raw, Self::SessionCancelled),
            kind::SESSION_ERROR => typed(raw, Self::Error),
            kind::USER_MESSAGE => typed(raw, Self::UserMessage),
            kind::TURN_START => typed(raw, Self::TurnStarted),
            kind::TURN_END => typed(raw, Self::TurnEnded),
            kind::ASSISTANT_MESSAGE => typed(raw, Self::Text),
            kind::REASONING => typed(raw, Self::Reasoning),
            kind::TOOL_PROGRESS => typed(raw, Self::Progress),
            kind::TOOL_START => typed(raw, Self::ToolStarted),
            kind::TOOL_COMPLETE => typed(raw, Self::ToolCompleted),
            kind::PERMISSION_REQUESTED => typed(raw, Self::ConfirmationRequested),
            kind::PERMISSION_RESOLVED => typed(raw, Self::ConfirmationResolved),
            kind::SUBAGENT_SELECTED => typed(raw, Self::SubagentQueued),
            kind::SUBAGENT_STARTED => typed(raw, Self::SubagentStarted),
            kind::SUBAGENT_COMPLETED => typed(raw, Self::SubagentCompleted),
            kind::SUBAGENT_FAILED => typed(raw, Self::SubagentFailed),
            kind::USAGE => typed(raw, Self::Usage),
            _ => Self::Other(raw),
        }
    }

    /// Parses one line of newline-delimited JSON.
    ///
    /// Returns `None` for blank lines. Lines that are not a JSON envelope at
    /// all are surfaced as `Other` events of kind `"stdout.unparsed"` so they
    /// still reach the raw event log.
    pub fn parse_line(line: &str) -> Option<Self> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }
        match serde_json::from_str::<RawEvent>(trimmed) {
            Ok(raw) => Some(Self::decode(raw)),
            Err(_) => Some(Self::Other(RawEvent::new(
                "stdout.unparsed",
                Value::String(trimmed.to_string()),
            ))),
        }
    }

    /// Re-encodes the event as its raw envelope.
    pub fn to_raw(&self) -> RawEvent {
        let (kind, data) = match self {
            Self::SessionStarted(d) => (kind::SESSION_START, to_value(d)),
            Self::SessionCompleted(d) => (kind::SESSION_IDLE, to_value(d)),
            Self::SessionCancelled(d) => (kind::ABORT, to_value(d)),
            Self::Error(d) => (kind::SESSION_ERROR, to_value(d)),
            Self::UserMessage(d) => (kind::USER_MESSAGE, to_value(d)),
            Self::TurnStarted(d) => (kind::TURN_START, to_value(d)),
            Self::TurnEnded(d) => (kind::TURN_END, to_value(d)),
            Self::Text(d) => (kind::ASSISTANT_MESSAGE, to_value(d)),
            Self::Reasoning(d) => (kind::REASONING, to_value(d)),
            Self::Progress(d) => (kind::TOOL_PROGRESS, to_value(d)),
            Self::ToolStarted(d) => (kind::TOOL_START, to_value(d)),
            Self::ToolCompleted(d) => (kind::TOOL_COMPLETE, to_value(d)),
            Self::ConfirmationRequested(d) => (kind::PERMISSION_REQUESTED, to_value(d)),
            Self::ConfirmationResolved(d) => (kind::PERMISSION_RESOLVED, to_value(d)),
            Self::SubagentQueued(d) => (kind::SUBAGENT_SELECTED, to_value(d)),
            Self::SubagentStarted(d) => (kind::SUBAGENT_STARTED, to_value(d)),
            Self::SubagentCompleted(d) => (kind::SUBAGENT_COMPLETED, to_value(d)),
            Self::SubagentFailed(d) => (kind::SUBAGENT_FAILED, to_value(d)),
            Self::Usage(d) => (kind::USAGE, to_value(d)),
            Self::Other(raw) => return raw.clone(),
            Self::Malformed(m) => return m.raw.clone(),
        };
        RawEvent::new(kind, data)
    }

    /// The wire kind of this event.
    pub fn kind(&self) -> &str {
        match self {
            Self::SessionStarted(_) => kind::SESSION_START,
            Self::SessionCompleted(_) => kind::SESSION_IDLE,
            Self::SessionCancelled(_) => kind::ABORT,
            Self::Error(_) => kind::SESSION_ERROR,
            Self::UserMessage(_) => kind::USER_MESSAGE,
            Self::TurnStarted(_) => kind::TURN_START,
            Self::TurnEnded(_) => kind::TURN_END,
            Self::Text(_) => kind::ASSISTANT_MESSAGE,
            Self::Reasoning(_) => kind::REASONING,
            Self::Progress(_) => kind::TOOL_PROGRESS,
            Self::ToolStarted(_) => kind::TOOL_START,
            Self::ToolCompleted(_) => kind::TOOL_COMPLETE,
            Self::ConfirmationRequested(_) => kind::PERMISSION_REQUESTED,
            Self::ConfirmationResolved(_) => kind::PERMISSION_RESOLVED,
            Self::SubagentQueued(_) => kind::SUBAGENT_SELECTED,
            Self::SubagentStarted(_) => kind::SUBAGENT_STARTED,
            Self::SubagentCompleted(_) => kind::SUBAGENT_COMPLETED,
            Self::SubagentFailed(_) => kind::SUBAGENT_FAILED,
            Self::Usage(_) => kind::USAGE,
            Self::Other(raw) => &raw.kind,
            Self::Malformed(m) => &m.raw.kind,
        }
    }

    /// Returns true for events that end the session.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::SessionCompleted(_) | Self::SessionCancelled(_))
    }

    pub fn session_started(model: Option<&str>) -> Self {
        Self::SessionStarted(SessionStartData {
            session_id: None,
            selected_model: model.map(str::to_string),
        })
    }

    pub fn session_completed() -> Self {
        Self::SessionCompleted(SessionIdleData::default())
    }

    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self::SessionCancelled(AbortData {
            reason: Some(reason.into()),
        })
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(ErrorData {
            error_type: None,
            message: message.into(),
        })
    }

    pub fn text(content: impl Into<String>) -> Self {
        Self::Text(MessageData {
            message_id: None,
            content: Some(content.into()),
        })
    }

    pub fn reasoning(content: impl Into<String>) -> Self {
        Self::Reasoning(ReasoningData {
            content: content.into(),
        })
    }

    pub fn tool_started(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self::ToolStarted(ToolStartData {
            tool_call_id: Some(id.into()),
            tool_name: name.into(),
            arguments: Some(arguments),
        })
    }

    pub fn tool_completed(id: impl Into<String>, result: impl Into<String>) -> Self {
        Self::ToolCompleted(ToolCompleteData {
            tool_call_id: Some(id.into()),
            success: Some(true),
            result: Some(ToolResultContent {
                content: result.into(),
            }),
            ..ToolCompleteData::default()
        })
    }

    pub fn tool_failed(id: impl Into<String>, error: impl Into<String>) -> Self {
        Self::ToolCompleted(ToolCompleteData {
            tool_call_id: Some(id.into()),
            success: Some(false),
            error: Some(ToolErrorContent {
                message: error.into(),
                code: None,
            }),
            ..ToolCompleteData::default()
        })
    }

    pub fn usage(model: impl Into<String>, input_tokens: u64, output_tokens: u64) -> Self {
        Self::Usage(UsageData {
            model: Some(model.into()),
            input_tokens: Some(input_tokens as f64),
            output_tokens: Some(output_tokens as f64),
            ..UsageData::default()
        })
    }

    pub fn confirmation(
        request_id: impl Into<String>,
        kind: impl Into<String>,
        tool_name: Option<&str>,
    ) -> Self {
        Self::ConfirmationRequested(ConfirmationRequest {
            request_id: request_id.into(),
            kind: kind.into(),
            tool_call_id: None,
            tool_name: tool_name.map(str::to_string),
            details: Value::Null,
        })
    }
}

fn typed<T: DeserializeOwned>(raw: RawEvent, wrap: fn(T) -> SessionEvent) -> SessionEvent {
    // A missing `data` field reads as an empty payload.
    let data = if raw.data.is_null() {
        Value::Object(serde_json::Map::new())
    } else {
        raw.data.clone()
    };
    match serde_json::from_value::<T>(data) {
        Ok(data) => wrap(data),
        Err(e) => SessionEvent::Malformed(MalformedEvent {
            raw,
            error: e.to_string(),
        }),
    }
}

fn to_value<T: Serialize>(data: &T) -> Value {
    serde_json::to_value(data).unwrap_or(Value::Null)
}

impl Serialize for SessionEvent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_raw().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SessionEvent {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        RawEvent::deserialize(deserializer).map(Self::decode)
    }
}
