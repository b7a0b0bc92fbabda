//! Confirmation policies.
//!
//! A policy is consulted synchronously by the normalizer at the exact point a
//! `permission.requested` event arrives, so its decision is ordered relative
//! to every other event in the stream. Policies take `&self`; one that needs
//! to remember something must use its own interior synchronization, and a
//! fresh policy is built for every run.

use agentrun_proto::{AgentConfig, ConfirmationDecision, ConfirmationRequest};
use std::sync::Arc;

/// Decides how to answer runtime confirmation requests.
pub trait ConfirmationPolicy: Send + Sync {
    /// Short label for logs.
    fn name(&self) -> &str;

    fn resolve(&self, request: &ConfirmationRequest) -> ConfirmationDecision;
}

/// Builds the policy for one run from that run's config.
pub type PolicyFactory = Arc<dyn Fn(&AgentConfig) -> Box<dyn ConfirmationPolicy> + Send + Sync>;

/// Approves every request.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoApprove;

impl ConfirmationPolicy for AutoApprove {
    fn name(&self) -> &str {
        "auto-approve"
    }

    fn resolve(&self, _request: &ConfirmationRequest) -> ConfirmationDecision {
        ConfirmationDecision::Approve
    }
}

/// Never answers; the runtime's own default governs what happens next.
#[derive(Debug, Clone, Copy, Default)]
pub struct Passthrough;

impl ConfirmationPolicy for Passthrough {
    fn name(&self) -> &str {
        "passthrough"
    }

    fn resolve(&self, _request: &ConfirmationRequest) -> ConfirmationDecision {
        ConfirmationDecision::NoResponse
    }
}

/// Allows or denies by tool name, falling back to a default decision.
///
/// Deny rules win over allow rules. Requests that name no tool always get
/// the fallback.
#[derive(Debug, Clone)]
pub struct ToolRules {
    allow: Vec<String>,
    deny: Vec<String>,
    fallback: ConfirmationDecision,
}

impl ToolRules {
    pub fn new(fallback: ConfirmationDecision) -> Self {
        Self {
            allow: Vec::new(),
            deny: Vec::new(),
            fallback,
        }
    }

    pub fn allow(mut self, tool: impl Into<String>) -> Self {
        self.allow.push(tool.into());
        self
    }

    pub fn deny(mut self, tool: impl Into<String>) -> Self {
        self.deny.push(tool.into());
        self
    }
}

impl ConfirmationPolicy for ToolRules {
    fn name(&self) -> &str {
        "tool-rules"
    }

    fn resolve(&self, request: &ConfirmationRequest) -> ConfirmationDecision {
        let Some(tool) = request.tool_name.as_deref() else {
            return self.fallback.clone();
        };
        if self.deny.iter().any(|t| t == tool) {
            ConfirmationDecision::deny(format!("tool '{}' is denied", tool))
        } else if self.allow.iter().any(|t| t == tool) {
            ConfirmationDecision::Approve
        } else {
            self.fallback.clone()
        }
    }
}

/// Any closure over the request works as a policy.
impl<F> ConfirmationPolicy for F
where
    F: Fn(&ConfirmationRequest) -> ConfirmationDecision + Send + Sync,
{
    fn name(&self) -> &str {
        "custom"
    }

    fn resolve(&self, request: &ConfirmationRequest) -> ConfirmationDecision {
        self(request)
    }
}

/// The policy a config asks for: auto-approve when `auto_confirm` is set,
/// passthrough otherwise.
pub fn default_policy(config: &AgentConfig) -> Box<dyn ConfirmationPolicy> {
    if config.auto_confirm {
        Box::new(AutoApprove)
    } else {
        Box::new(Passthrough)
    }
}

/// A factory wrapping [`default_policy`].
pub fn default_policy_factory() -> PolicyFactory {
    Arc::new(default_policy)
}
