//! Confirmation decisions and the reply sent back to the runtime.

use serde::{Deserialize, Serialize};

/// What a confirmation policy decided for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmationDecision {
    Approve,
    Deny { reason: String },
    /// Send nothing and let the runtime apply its own default.
    NoResponse,
}

impl ConfirmationDecision {
    pub fn deny(reason: impl Into<String>) -> Self {
        Self::Deny {
            reason: reason.into(),
        }
    }

    /// The reply to deliver for `request_id`, if any.
    pub fn reply_for(&self, request_id: &str) -> Option<ConfirmationReply> {
        match self {
            Self::Approve => Some(ConfirmationReply {
                request_id: request_id.to_string(),
                approved: true,
                reason: None,
            }),
            Self::Deny { reason } => Some(ConfirmationReply {
                request_id: request_id.to_string(),
                approved: false,
                reason: Some(reason.clone()),
            }),
            Self::NoResponse => None,
        }
    }
}

/// A decision as delivered to the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmationReply {
    pub request_id: String,
    pub approved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}
