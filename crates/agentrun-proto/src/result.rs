//! The run result and the records it aggregates.
//!
//! A [`RunResult`] is produced once per session by the normalizer and is not
//! changed after it is returned. Query methods answer the questions test
//! assertions usually ask: which tools ran, what the agent said last, how
//! many tokens were spent.

use crate::event::RawEvent;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

/// One coherent unit of activity within a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    /// Tool calls issued while this turn was open, in start order.
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
}

impl Turn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }
}

/// One tool invocation requested by the agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Correlation id, unique within a result.
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
    pub result: Option<String>,
    pub error: Option<String>,
    pub duration_ms: Option<f64>,
}

impl ToolCall {
    /// True when no completion has been matched to this call.
    pub fn is_open(&self) -> bool {
        self.result.is_none() && self.error.is_none()
    }

    pub fn succeeded(&self) -> bool {
        self.result.is_some() && self.error.is_none()
    }
}

impl fmt::Display for ToolCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = if self.error.is_some() {
            "error"
        } else if self.is_open() {
            "open"
        } else {
            "ok"
        };
        write!(f, "{}({}", self.name, status)?;
        if let Some(ms) = self.duration_ms.filter(|ms| *ms > 0.0) {
            write!(f, ", {:.1}ms", ms)?;
        }
        write!(f, ")")
    }
}

/// Token usage and cost for one underlying model call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageInfo {
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_read_tokens: u64,
    pub duration_ms: f64,
    /// Cost derived from the pricing table.
    pub cost_usd: f64,
    /// Cost as reported by the runtime, in the runtime's own unit.
    pub reported_cost: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubagentStatus {
    Selected,
    Started,
    Completed,
    Failed,
}

impl SubagentStatus {
    /// Position in the lifecycle; a status never moves to a lower rank.
    pub fn rank(self) -> u8 {
        match self {
            Self::Selected => 0,
            Self::Started => 1,
            Self::Completed | Self::Failed => 2,
        }
    }

    pub fn is_terminal(self) -> bool {
        self.rank() == 2
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Selected => "selected",
            Self::Started => "started",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// A delegation to a named sub-agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubagentInvocation {
    /// Invocation id, or the agent name when the runtime sent none.
    pub id: String,
    pub name: String,
    pub status: SubagentStatus,
    pub duration_ms: Option<f64>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionStatus {
    Pending,
    Granted,
    Denied,
}

/// One confirmation request and what became of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermissionRecord {
    pub request_id: String,
    pub kind: String,
    pub tool_name: Option<String>,
    pub status: PermissionStatus,
    pub reason: Option<String>,
}

impl PermissionRecord {
    pub fn granted(&self) -> bool {
        self.status == PermissionStatus::Granted
    }
}

/// An event that could not be folded into the result cleanly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingAnomaly {
    /// Zero-based position of the event in the stream.
    pub seq: usize,
    pub kind: String,
    pub message: String,
}

/// Aggregate token counts in prompt/completion form.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt: u64,
    pub completion: u64,
    pub total: u64,
}

/// Everything observed during one session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub success: bool,
    pub error: Option<String>,
    pub model_used: Option<String>,
    /// Wall-clock duration measured by the driver.
    pub duration_ms: f64,
    pub started_at: Option<DateTime<Utc>>,
    pub timed_out: bool,
    pub turns: Vec<Turn>,
    pub usage: Vec<UsageInfo>,
    pub reasoning_traces: Vec<String>,
    pub subagent_invocations: Vec<SubagentInvocation>,
    pub permission_requested: bool,
    pub permissions: Vec<PermissionRecord>,
    pub anomalies: Vec<MappingAnomaly>,
    /// Every event received, verbatim. Kept for debugging only.
    pub raw_events: Vec<RawEvent>,
}

impl RunResult {
    /// The last assistant response, if the agent said anything.
    pub fn final_response(&self) -> Option<&str> {
        self.assistant_turns()
            .rev()
            .map(|t| t.content.as_str())
            .find(|c| !c.is_empty())
    }

    /// All non-empty assistant responses in order.
    pub fn all_responses(&self) -> Vec<&str> {
        self.assistant_turns()
            .map(|t| t.content.as_str())
            .filter(|c| !c.is_empty())
            .collect()
    }

    /// All tool calls across all turns, in start order.
    pub fn all_tool_calls(&self) -> impl Iterator<Item = &ToolCall> {
        self.turns.iter().flat_map(|t| t.tool_calls.iter())
    }

    pub fn tool_names_called(&self) -> BTreeSet<&str> {
        self.all_tool_calls().map(|c| c.name.as_str()).collect()
    }

    pub fn tool_was_called(&self, name: &str) -> bool {
        self.all_tool_calls().any(|c| c.name == name)
    }

    pub fn tool_call_count(&self, name: &str) -> usize {
        self.all_tool_calls().filter(|c| c.name == name).count()
    }

    pub fn tool_calls_for(&self, name: &str) -> Vec<&ToolCall> {
        self.all_tool_calls().filter(|c| c.name == name).collect()
    }

    /// Calls that never received a completion.
    pub fn open_tool_calls(&self) -> Vec<&ToolCall> {
        self.all_tool_calls().filter(|c| c.is_open()).collect()
    }

    pub fn total_input_tokens(&self) -> u64 {
        self.usage.iter().map(|u| u.input_tokens).sum()
    }

    pub fn total_output_tokens(&self) -> u64 {
        self.usage.iter().map(|u| u.output_tokens).sum()
    }

    pub fn total_tokens(&self) -> u64 {
        self.total_input_tokens() + self.total_output_tokens()
    }

    pub fn total_cost_usd(&self) -> f64 {
        self.usage.iter().map(|u| u.cost_usd).sum()
    }

    pub fn token_usage(&self) -> TokenUsage {
        TokenUsage {
            prompt: self.total_input_tokens(),
            completion: self.total_output_tokens(),
            total: self.total_tokens(),
        }
    }

    fn assistant_turns(&self) -> impl DoubleEndedIterator<Item = &Turn> {
        self.turns.iter().filter(|t| t.role == Role::Assistant)
    }
}

impl fmt::Display for RunResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.success {
            writeln!(f, "RunResult(SUCCESS)")?;
        } else {
            writeln!(
                f,
                "RunResult(FAILED: {})",
                self.error.as_deref().unwrap_or("unknown error")
            )?;
        }

        let names = self.tool_names_called();
        let tools = if names.is_empty() {
            "none".to_string()
        } else {
            names.into_iter().collect::<Vec<_>>().join(", ")
        };
        let cost = self.total_cost_usd();
        let cost = if cost > 0.0 {
            format!("${:.6}", cost)
        } else {
            "N/A".to_string()
        };
        let final_response: String = self
            .final_response()
            .unwrap_or("")
            .chars()
            .take(100)
            .collect();

        writeln!(f, "  Turns: {}", self.turns.len())?;
        writeln!(f, "  Tools called: {}", tools)?;
        writeln!(f, "  Duration: {:.0}ms", self.duration_ms)?;
        writeln!(f, "  Tokens: {} | Cost: {}", self.total_tokens(), cost)?;
        writeln!(f, "  Model: {}", self.model_used.as_deref().unwrap_or("default"))?;
        write!(f, "  Final: {:?}", final_response)
    }
}
