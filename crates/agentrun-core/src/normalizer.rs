//! Event normalizer: folds an ordered session event stream into a [`RunResult`].
//!
//! The normalizer is a plain synchronous reducer. It never blocks, never
//! fails, and produces the same result for the same event sequence, which is
//! what makes a timed-out prefix replayable. Events that cannot be folded in
//! cleanly (unknown ids, lifecycle regressions, malformed payloads) are kept
//! in the raw log, logged, and listed in [`RunResult::anomalies`].

use crate::confirmation::{AutoApprove, ConfirmationPolicy};
use crate::pricing::PricingTable;
use agentrun_proto::event::{
    ConfirmationResolvedData, ErrorData, MalformedEvent, MessageData, SessionIdleData,
    SubagentData, ToolCompleteData, ToolStartData, UsageData, kind,
};
use agentrun_proto::{
    ConfirmationDecision, ConfirmationReply, ConfirmationRequest, MappingAnomaly,
    PermissionRecord, PermissionStatus, RawEvent, Role, RunResult, SessionEvent,
    SubagentInvocation, SubagentStatus, ToolCall, Turn, UsageInfo,
};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// How to match a tool completion that carries no correlation id.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FallbackMatching {
    /// Attribute the completion only when exactly one open call has that
    /// name. Anything else is recorded as an anomaly.
    #[default]
    Strict,
    /// Attribute to the most recently started open call with that name.
    /// Can mis-attribute results when same-named calls run concurrently.
    LastOpenSameName,
}

#[derive(Debug, Clone, Default)]
pub struct NormalizerOptions {
    pub fallback_matching: FallbackMatching,
    pub pricing: PricingTable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Terminal {
    Completed,
    Cancelled(String),
}

/// Where an open tool call lives inside `turns`.
#[derive(Debug, Clone)]
struct OpenCall {
    id: String,
    name: String,
    turn: usize,
    index: usize,
}

/// Stateful reducer for one session's events.
pub struct EventNormalizer {
    policy: Box<dyn ConfirmationPolicy>,
    options: NormalizerOptions,
    seq: usize,

    turns: Vec<Turn>,
    /// Index into `turns` of the turn new tool calls attach to.
    open_turn: Option<usize>,
    /// Open calls in start order.
    open_calls: Vec<OpenCall>,
    seen_call_ids: HashSet<String>,

    usage: Vec<UsageInfo>,
    reasoning: Vec<String>,
    subagents: Vec<SubagentInvocation>,
    subagent_index: HashMap<String, usize>,
    permissions: Vec<PermissionRecord>,
    permission_index: HashMap<String, usize>,
    anomalies: Vec<MappingAnomaly>,
    raw_events: Vec<RawEvent>,

    error: Option<String>,
    terminal: Option<Terminal>,
    start_model: Option<String>,
    usage_model: Option<String>,
}

impl Default for EventNormalizer {
    fn default() -> Self {
        Self::new(Box::new(AutoApprove))
    }
}

impl EventNormalizer {
    pub fn new(policy: Box<dyn ConfirmationPolicy>) -> Self {
        Self::with_options(policy, NormalizerOptions::default())
    }

    pub fn with_options(policy: Box<dyn ConfirmationPolicy>, options: NormalizerOptions) -> Self {
        Self {
            policy,
            options,
            seq: 0,
            turns: Vec::new(),
            open_turn: None,
            open_calls: Vec::new(),
            seen_call_ids: HashSet::new(),
            usage: Vec::new(),
            reasoning: Vec::new(),
            subagents: Vec::new(),
            subagent_index: HashMap::new(),
            permissions: Vec::new(),
            permission_index: HashMap::new(),
            anomalies: Vec::new(),
            raw_events: Vec::new(),
            error: None,
            terminal: None,
            start_model: None,
            usage_model: None,
        }
    }

    /// Number of events consumed so far.
    pub fn events_seen(&self) -> usize {
        self.seq
    }

    /// True once an agent-reported error has been recorded.
    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    /// True once a terminal event has been consumed.
    pub fn is_terminated(&self) -> bool {
        self.terminal.is_some()
    }

    /// Folds one event into the result.
    ///
    /// Returns the reply to send when the event was a confirmation request
    /// and the policy decided to answer it.
    pub fn consume(&mut self, event: SessionEvent) -> Option<ConfirmationReply> {
        let seq = self.seq;
        self.seq += 1;
        self.raw_events.push(event.to_raw());

        match event {
            SessionEvent::SessionStarted(data) => {
                if let Some(model) = data.selected_model.filter(|m| !m.is_empty()) {
                    self.start_model = Some(model);
                }
            }
            SessionEvent::SessionCompleted(data) => self.on_idle(data),
            SessionEvent::SessionCancelled(data) => {
                let reason = data.reason.unwrap_or_else(|| "aborted".to_string());
                self.set_terminal(Terminal::Cancelled(reason));
            }
            SessionEvent::Error(data) => self.on_error(data),
            SessionEvent::UserMessage(data) => self.on_user_message(data),
            SessionEvent::TurnStarted(_) => {
                self.close_turn();
                self.open_assistant_turn(String::new());
            }
            SessionEvent::TurnEnded(_) => self.close_turn(),
            SessionEvent::Text(data) => self.on_text(data),
            SessionEvent::Reasoning(data) => self.push_trace(data.content),
            SessionEvent::Progress(data) => self.push_trace(data.message),
            SessionEvent::ToolStarted(data) => self.on_tool_start(seq, data),
            SessionEvent::ToolCompleted(data) => self.on_tool_complete(seq, data),
            SessionEvent::ConfirmationRequested(request) => {
                return self.on_confirmation(request);
            }
            SessionEvent::ConfirmationResolved(data) => self.on_confirmation_resolved(seq, data),
            SessionEvent::SubagentQueued(data) => {
                self.on_subagent(seq, data, SubagentStatus::Selected);
            }
            SessionEvent::SubagentStarted(data) => {
                self.on_subagent(seq, data, SubagentStatus::Started);
            }
            SessionEvent::SubagentCompleted(data) => {
                self.on_subagent(seq, data, SubagentStatus::Completed);
            }
            SessionEvent::SubagentFailed(data) => {
                self.on_subagent(seq, data, SubagentStatus::Failed);
            }
            SessionEvent::Usage(data) => self.on_usage(data),
            SessionEvent::Other(raw) => {
                debug!(seq, kind = %raw.kind, "Ignoring unrecognized event kind");
            }
            SessionEvent::Malformed(malformed) => self.on_malformed(seq, malformed),
        }
        None
    }

    /// Closes the open turn and produces the result.
    ///
    /// `success` is true only when a completion event arrived and no error was
    /// recorded. Tool calls that never completed stay in the result with
    /// neither result nor error.
    pub fn finalize(mut self) -> RunResult {
        self.close_turn();

        if !self.open_calls.is_empty() {
            debug!(count = self.open_calls.len(), "Tool calls left open at session end");
        }

        let mut error = self.error;
        if let Some(Terminal::Cancelled(reason)) = &self.terminal {
            if error.is_none() {
                error = Some(format!("cancelled: {}", reason));
            }
        }
        let success = self.terminal == Some(Terminal::Completed) && error.is_none();

        RunResult {
            success,
            error,
            model_used: self.start_model.or(self.usage_model),
            turns: self.turns,
            usage: self.usage,
            reasoning_traces: self.reasoning,
            subagent_invocations: self.subagents,
            permission_requested: !self.permissions.is_empty(),
            permissions: self.permissions,
            anomalies: self.anomalies,
            raw_events: self.raw_events,
            ..RunResult::default()
        }
    }

    fn set_terminal(&mut self, terminal: Terminal) {
        if self.terminal.is_none() {
            self.terminal = Some(terminal);
        }
    }

    fn on_idle(&mut self, data: SessionIdleData) {
        if data.cancelled {
            let reason = data.reason.unwrap_or_else(|| "cancelled by runtime".to_string());
            self.set_terminal(Terminal::Cancelled(reason));
        } else {
            self.set_terminal(Terminal::Completed);
        }
    }

    /// An error event still fails the run when its payload is unreadable.
    fn on_malformed(&mut self, seq: usize, malformed: MalformedEvent) {
        let MalformedEvent { raw, error } = malformed;
        self.anomaly(seq, &raw.kind, error);
        if raw.kind == kind::SESSION_ERROR {
            let message = raw
                .data
                .get("message")
                .and_then(serde_json::Value::as_str)
                .unwrap_or_default()
                .to_string();
            self.on_error(ErrorData {
                error_type: None,
                message,
            });
        }
    }

    fn on_error(&mut self, data: ErrorData) {
        let message = if data.message.trim().is_empty() {
            "unknown error".to_string()
        } else {
            data.message
        };
        warn!(error_type = ?data.error_type, message = %message, "Agent reported an error");
        if self.error.is_none() {
            self.error = Some(message);
        }
    }

    fn close_turn(&mut self) {
        self.open_turn = None;
    }

    fn open_assistant_turn(&mut self, content: String) -> usize {
        self.turns.push(Turn::new(Role::Assistant, content));
        let index = self.turns.len() - 1;
        self.open_turn = Some(index);
        index
    }

    fn current_turn(&mut self) -> usize {
        match self.open_turn {
            Some(index) => index,
            None => self.open_assistant_turn(String::new()),
        }
    }

    fn on_user_message(&mut self, data: MessageData) {
        let Some(content) = data.content.filter(|c| !c.is_empty()) else {
            return;
        };
        self.close_turn();
        self.turns.push(Turn::new(Role::User, content));
    }

    fn on_text(&mut self, data: MessageData) {
        let Some(content) = data.content.filter(|c| !c.is_empty()) else {
            return;
        };
        match self.open_turn {
            Some(index) if self.turns[index].content.is_empty() => {
                self.turns[index].content = content;
            }
            _ => {
                self.close_turn();
                self.open_assistant_turn(content);
            }
        }
    }

    fn push_trace(&mut self, text: String) {
        if !text.is_empty() {
            self.reasoning.push(text);
        }
    }

    fn on_tool_start(&mut self, seq: usize, data: ToolStartData) {
        let id = match data.tool_call_id {
            Some(id) => id,
            None => format!("{}#{}", data.tool_name, seq),
        };
        if !self.seen_call_ids.insert(id.clone()) {
            self.anomaly(
                seq,
                "tool.execution_start",
                format!("duplicate tool call id '{}' ignored", id),
            );
            return;
        }

        let turn = self.current_turn();
        let calls = &mut self.turns[turn].tool_calls;
        calls.push(ToolCall {
            id: id.clone(),
            name: data.tool_name.clone(),
            arguments: data.arguments.unwrap_or(serde_json::Value::Null),
            result: None,
            error: None,
            duration_ms: None,
        });
        self.open_calls.push(OpenCall {
            id,
            name: data.tool_name,
            turn,
            index: calls.len() - 1,
        });
    }

    fn on_tool_complete(&mut self, seq: usize, data: ToolCompleteData) {
        let position = match &data.tool_call_id {
            Some(id) => {
                let found = self.open_calls.iter().position(|c| &c.id == id);
                if found.is_none() {
                    let message = if self.seen_call_ids.contains(id) {
                        format!("tool call '{}' completed more than once", id)
                    } else {
                        format!("completion for unknown tool call '{}'", id)
                    };
                    self.anomaly(seq, "tool.execution_complete", message);
                }
                found
            }
            None => self.match_by_name(seq, data.tool_name.as_deref()),
        };
        let Some(position) = position else {
            return;
        };

        let open = self.open_calls.remove(position);
        let call = &mut self.turns[open.turn].tool_calls[open.index];
        let failed = data.success == Some(false) || data.error.is_some();
        if failed {
            call.error = Some(
                data.error
                    .map(|e| e.message)
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| "tool failed".to_string()),
            );
        } else {
            call.result = Some(data.result.map(|r| r.content).unwrap_or_default());
        }
        call.duration_ms = data.duration_ms;
    }

    fn match_by_name(&mut self, seq: usize, name: Option<&str>) -> Option<usize> {
        let Some(name) = name else {
            self.anomaly(
                seq,
                "tool.execution_complete",
                "completion carries neither tool call id nor tool name".to_string(),
            );
            return None;
        };

        let candidates: Vec<usize> = self
            .open_calls
            .iter()
            .enumerate()
            .filter(|(_, c)| c.name == name)
            .map(|(i, _)| i)
            .collect();

        match (self.options.fallback_matching, candidates.as_slice()) {
            (_, []) => {
                self.anomaly(
                    seq,
                    "tool.execution_complete",
                    format!("id-less completion for '{}' matches no open call", name),
                );
                None
            }
            (FallbackMatching::Strict, [only]) => Some(*only),
            (FallbackMatching::Strict, many) => {
                self.anomaly(
                    seq,
                    "tool.execution_complete",
                    format!(
                        "id-less completion for '{}' is ambiguous between {} open calls",
                        name,
                        many.len()
                    ),
                );
                None
            }
            (FallbackMatching::LastOpenSameName, [.., last]) => Some(*last),
        }
    }

    fn on_confirmation(&mut self, request: ConfirmationRequest) -> Option<ConfirmationReply> {
        let decision = self.policy.resolve(&request);
        let (status, reason) = match &decision {
            ConfirmationDecision::Approve => (PermissionStatus::Granted, None),
            ConfirmationDecision::Deny { reason } => {
                (PermissionStatus::Denied, Some(reason.clone()))
            }
            ConfirmationDecision::NoResponse => (PermissionStatus::Pending, None),
        };
        debug!(
            request_id = %request.request_id,
            kind = %request.kind,
            policy = self.policy.name(),
            ?status,
            "Confirmation requested"
        );

        self.permission_index
            .insert(request.request_id.clone(), self.permissions.len());
        self.permissions.push(PermissionRecord {
            request_id: request.request_id.clone(),
            kind: request.kind,
            tool_name: request.tool_name,
            status,
            reason,
        });
        decision.reply_for(&request.request_id)
    }

    fn on_confirmation_resolved(&mut self, seq: usize, data: ConfirmationResolvedData) {
        let Some(&index) = self.permission_index.get(&data.request_id) else {
            self.anomaly(
                seq,
                "permission.resolved",
                format!("resolution for unknown request '{}'", data.request_id),
            );
            return;
        };
        self.permissions[index].status = if data.approved {
            PermissionStatus::Granted
        } else {
            PermissionStatus::Denied
        };
    }

    fn on_subagent(&mut self, seq: usize, data: SubagentData, status: SubagentStatus) {
        let key = data
            .invocation_id
            .clone()
            .unwrap_or_else(|| data.agent_name.clone());
        let kind = format!("subagent.{}", status.as_str());

        // A selection without an id is adopted by the first id-carrying
        // event for the same agent.
        if data.invocation_id.is_some() && !self.subagent_index.contains_key(&key) {
            self.adopt_unbound_subagent(&data.agent_name, &key);
        }

        // Without an id, a fresh selection or start after a finished
        // invocation of the same agent is a new delegation.
        let existing = self.subagent_index.get(&key).copied().filter(|&index| {
            data.invocation_id.is_some()
                || status.is_terminal()
                || !self.subagents[index].status.is_terminal()
        });

        let Some(index) = existing else {
            if status.is_terminal() {
                let message = format!(
                    "sub-agent '{}' reached {} without starting",
                    data.agent_name,
                    status.as_str()
                );
                self.anomaly(seq, &kind, message);
            }
            self.subagent_index.insert(key.clone(), self.subagents.len());
            self.subagents.push(SubagentInvocation {
                id: key,
                name: data.agent_name,
                status,
                duration_ms: data.duration_ms,
                error: data.error,
            });
            return;
        };

        let invocation = &mut self.subagents[index];
        let current = invocation.status;
        if status.rank() <= current.rank() {
            let message = format!(
                "sub-agent '{}' cannot move from {} to {}",
                invocation.name,
                current.as_str(),
                status.as_str()
            );
            self.anomaly(seq, &kind, message);
            return;
        }

        invocation.status = status;
        if data.duration_ms.is_some() {
            invocation.duration_ms = data.duration_ms;
        }
        if data.error.is_some() {
            invocation.error = data.error;
        }
    }

    fn adopt_unbound_subagent(&mut self, agent_name: &str, id: &str) {
        let Some(&index) = self.subagent_index.get(agent_name) else {
            return;
        };
        let invocation = &mut self.subagents[index];
        if invocation.id != agent_name || invocation.status.is_terminal() {
            return;
        }
        invocation.id = id.to_string();
        self.subagent_index.remove(agent_name);
        self.subagent_index.insert(id.to_string(), index);
    }

    fn on_usage(&mut self, data: UsageData) {
        let model = data
            .model
            .filter(|m| !m.is_empty())
            .or_else(|| self.start_model.clone())
            .unwrap_or_default();
        if self.usage_model.is_none() && !model.is_empty() {
            self.usage_model = Some(model.clone());
        }

        let input_tokens = tokens(data.input_tokens);
        let output_tokens = tokens(data.output_tokens);
        let cache_read_tokens = tokens(data.cache_read_tokens);
        let cost_usd = self
            .options
            .pricing
            .cost(&model, input_tokens, output_tokens, cache_read_tokens);

        self.usage.push(UsageInfo {
            model,
            input_tokens,
            output_tokens,
            cache_read_tokens,
            duration_ms: data.duration.unwrap_or(0.0),
            cost_usd,
            reported_cost: data.cost,
        });
    }

    fn anomaly(&mut self, seq: usize, kind: &str, message: String) {
        warn!(seq, kind, message = %message, "Event mapping anomaly");
        self.anomalies.push(MappingAnomaly {
            seq,
            kind: kind.to_string(),
            message,
        });
    }
}

fn tokens(value: Option<f64>) -> u64 {
    match value {
        Some(v) if v.is_finite() && v > 0.0 => v.round() as u64,
        _ => 0,
    }
}
