//! Agent configuration.
//!
//! An [`AgentConfig`] is built once by the caller and passed by shared
//! reference into every session that uses it. The `with_*` builders consume
//! and return the value; nothing in agentrun mutates a config after a run
//! has started.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for one agent under test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Human-readable label used in logs and paired-run reports.
    #[serde(default = "default_name")]
    pub name: String,

    /// Model identifier. `None` lets the runtime pick its default.
    #[serde(default)]
    pub model: Option<String>,

    #[serde(default)]
    pub reasoning_effort: Option<ReasoningEffort>,

    /// Instructions delivered as the session's system message.
    #[serde(default)]
    pub instructions: Option<String>,

    #[serde(default)]
    pub system_message_mode: SystemMessageMode,

    /// Directory the agent works in. The Comparative Runner fills this in
    /// with a scratch directory when it is unset.
    #[serde(default)]
    pub working_directory: Option<PathBuf>,

    /// Tool allow-list or deny-list (never both).
    #[serde(flatten)]
    pub tools: ToolFilter,

    /// Attached tool-server descriptors, keyed by server name.
    #[serde(default, alias = "mcp_servers")]
    pub tool_servers: BTreeMap<String, Value>,

    /// Sub-agents the runtime may delegate to.
    #[serde(default, alias = "custom_agents")]
    pub subagents: Vec<SubagentDescriptor>,

    #[serde(default)]
    pub skill_directories: Vec<PathBuf>,

    #[serde(default)]
    pub disabled_skills: Vec<String>,

    /// Advisory turn ceiling. Recorded in logs, never enforced by the driver.
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,

    /// Wall-clock timeout for one run, in seconds.
    #[serde(default = "default_timeout_secs", alias = "timeout")]
    pub timeout_secs: f64,

    /// Approve every confirmation request automatically.
    #[serde(default = "default_true")]
    pub auto_confirm: bool,

    /// Options passed to the runtime verbatim, applied after everything else.
    #[serde(default, alias = "extra_config")]
    pub extra: Map<String, Value>,
}

fn default_name() -> String {
    "agent".to_string()
}

fn default_max_turns() -> u32 {
    25
}

fn default_timeout_secs() -> f64 {
    300.0
}

fn default_true() -> bool {
    true
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            model: None,
            reasoning_effort: None,
            instructions: None,
            system_message_mode: SystemMessageMode::default(),
            working_directory: None,
            tools: ToolFilter::All,
            tool_servers: BTreeMap::new(),
            subagents: Vec::new(),
            skill_directories: Vec::new(),
            disabled_skills: Vec::new(),
            max_turns: default_max_turns(),
            timeout_secs: default_timeout_secs(),
            auto_confirm: true,
            extra: Map::new(),
        }
    }
}

impl AgentConfig {
    /// Creates a config with defaults and the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_reasoning_effort(mut self, effort: ReasoningEffort) -> Self {
        self.reasoning_effort = Some(effort);
        self
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    pub fn with_system_message_mode(mut self, mode: SystemMessageMode) -> Self {
        self.system_message_mode = mode;
        self
    }

    pub fn with_working_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }

    /// Restricts the agent to the given tools, replacing any deny-list.
    pub fn with_allowed_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tools = ToolFilter::Allow(tools.into_iter().map(Into::into).collect());
        self
    }

    /// Hides the given tools from the agent, replacing any allow-list.
    pub fn with_excluded_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tools = ToolFilter::Deny(tools.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_tool_server(mut self, name: impl Into<String>, descriptor: Value) -> Self {
        self.tool_servers.insert(name.into(), descriptor);
        self
    }

    pub fn with_subagent(mut self, subagent: SubagentDescriptor) -> Self {
        self.subagents.push(subagent);
        self
    }

    pub fn with_skill_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.skill_directories.push(dir.into());
        self
    }

    pub fn with_disabled_skill(mut self, skill: impl Into<String>) -> Self {
        self.disabled_skills.push(skill.into());
        self
    }

    pub fn with_max_turns(mut self, max_turns: u32) -> Self {
        self.max_turns = max_turns;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs_f64();
        self
    }

    pub fn with_auto_confirm(mut self, auto_confirm: bool) -> Self {
        self.auto_confirm = auto_confirm;
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// The wall-clock timeout as a `Duration`.
    ///
    /// Non-finite or negative values clamp to zero; `validate` reports them.
    pub fn timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.timeout_secs).unwrap_or(Duration::ZERO)
    }

    /// Checks the config for values a runtime would reject.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::EmptyName);
        }
        if !(self.timeout_secs.is_finite() && self.timeout_secs > 0.0) {
            return Err(ConfigError::InvalidTimeout(self.timeout_secs));
        }
        let mut seen = HashSet::new();
        for (index, subagent) in self.subagents.iter().enumerate() {
            if subagent.name.trim().is_empty() {
                return Err(ConfigError::UnnamedSubagent(index));
            }
            if !seen.insert(subagent.name.as_str()) {
                return Err(ConfigError::DuplicateSubagent(subagent.name.clone()));
            }
        }
        Ok(())
    }

    /// Renders the session document sent to the runtime when a session opens.
    ///
    /// Only set fields are included so runtime defaults stay in effect.
    /// `max_turns` and the timeout are harness-side settings and are never sent.
    pub fn session_config(&self) -> Value {
        let mut doc = Map::new();

        if let Some(model) = &self.model {
            doc.insert("model".into(), Value::String(model.clone()));
        }
        if let Some(effort) = self.reasoning_effort {
            doc.insert("reasoning_effort".into(), Value::String(effort.as_str().into()));
        }
        if let Some(instructions) = self.instructions.as_deref().filter(|s| !s.is_empty()) {
            doc.insert(
                "system_message".into(),
                serde_json::json!({
                    "mode": self.system_message_mode.as_str(),
                    "content": instructions,
                }),
            );
        }
        if let Some(dir) = &self.working_directory {
            doc.insert(
                "working_directory".into(),
                Value::String(dir.to_string_lossy().into_owned()),
            );
        }
        match &self.tools {
            ToolFilter::All => {}
            ToolFilter::Allow(tools) => {
                doc.insert("available_tools".into(), string_array(tools));
            }
            ToolFilter::Deny(tools) => {
                doc.insert("excluded_tools".into(), string_array(tools));
            }
        }
        if !self.tool_servers.is_empty() {
            let servers = self
                .tool_servers
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            doc.insert("mcp_servers".into(), Value::Object(servers));
        }
        if !self.subagents.is_empty() {
            let agents = self
                .subagents
                .iter()
                .map(|a| serde_json::to_value(a).unwrap_or(Value::Null))
                .collect();
            doc.insert("custom_agents".into(), Value::Array(agents));
        }
        if !self.skill_directories.is_empty() {
            let dirs = self
                .skill_directories
                .iter()
                .map(|d| Value::String(d.to_string_lossy().into_owned()))
                .collect();
            doc.insert("skill_directories".into(), Value::Array(dirs));
        }
        if !self.disabled_skills.is_empty() {
            doc.insert("disabled_skills".into(), string_array(&self.disabled_skills));
        }

        for (key, value) in &self.extra {
            doc.insert(key.clone(), value.clone());
        }

        Value::Object(doc)
    }
}

fn string_array(items: &[String]) -> Value {
    Value::Array(items.iter().cloned().map(Value::String).collect())
}

/// Which tools the agent may use.
///
/// Allow-list and deny-list are mutually exclusive; a document carrying both
/// `allowed_tools` and `excluded_tools` fails to deserialize.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ToolFilterFields", into = "ToolFilterFields")]
pub enum ToolFilter {
    /// Runtime default tool set.
    #[default]
    All,
    /// Only these tools are available.
    Allow(Vec<String>),
    /// These tools are hidden.
    Deny(Vec<String>),
}

impl ToolFilter {
    /// Whether a tool with this name passes the filter.
    pub fn permits(&self, tool: &str) -> bool {
        match self {
            Self::All => true,
            Self::Allow(tools) => tools.iter().any(|t| t == tool),
            Self::Deny(tools) => !tools.iter().any(|t| t == tool),
        }
    }
}

/// Flat on-disk representation of [`ToolFilter`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ToolFilterFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    allowed_tools: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    excluded_tools: Option<Vec<String>>,
}

impl TryFrom<ToolFilterFields> for ToolFilter {
    type Error = ConfigError;

    fn try_from(fields: ToolFilterFields) -> Result<Self, Self::Error> {
        match (fields.allowed_tools, fields.excluded_tools) {
            (Some(_), Some(_)) => Err(ConfigError::ConflictingToolFilters),
            (Some(allow), None) => Ok(Self::Allow(allow)),
            (None, Some(deny)) => Ok(Self::Deny(deny)),
            (None, None) => Ok(Self::All),
        }
    }
}

impl From<ToolFilter> for ToolFilterFields {
    fn from(filter: ToolFilter) -> Self {
        match filter {
            ToolFilter::All => Self::default(),
            ToolFilter::Allow(tools) => Self {
                allowed_tools: Some(tools),
                excluded_tools: None,
            },
            ToolFilter::Deny(tools) => Self {
                allowed_tools: None,
                excluded_tools: Some(tools),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
    Low,
    Medium,
    High,
    Xhigh,
}

impl ReasoningEffort {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Xhigh => "xhigh",
        }
    }
}

/// How instructions combine with the runtime's built-in system prompt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SystemMessageMode {
    #[default]
    Append,
    Replace,
}

impl SystemMessageMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Append => "append",
            Self::Replace => "replace",
        }
    }
}

/// A named secondary configuration the agent can delegate to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubagentDescriptor {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<String>>,

    /// Runtime-specific fields passed through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SubagentDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }
}
