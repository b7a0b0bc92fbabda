//! Transport traits between the session driver and an agent runtime.
//!
//! The wire format behind these traits belongs to the implementor. The
//! driver only relies on the ordering contract: `next_event` yields events in
//! delivery order, and `Ok(None)` means the stream has ended.

use crate::config::AgentConfig;
use crate::confirmation::ConfirmationReply;
use crate::error::Result;
use crate::event::SessionEvent;
use async_trait::async_trait;
use std::sync::Arc;

/// Opens sessions against an agent runtime.
///
/// One connector may serve many concurrent sessions; each call to `open`
/// returns an independently owned session handle.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Opens a session bound to `config`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Connect`] when the runtime cannot be reached.
    async fn open(&self, config: &AgentConfig) -> Result<Box<dyn AgentSession>>;
}

#[async_trait]
impl<C: Connector + ?Sized> Connector for Arc<C> {
    async fn open(&self, config: &AgentConfig) -> Result<Box<dyn AgentSession>> {
        (**self).open(config).await
    }
}

/// One live session, exclusively owned by a single driver run.
#[async_trait]
pub trait AgentSession: Send {
    /// Runtime-assigned session id, when the transport knows one.
    fn session_id(&self) -> Option<&str> {
        None
    }

    /// Submits the task prompt.
    async fn send(&mut self, prompt: &str) -> Result<()>;

    /// Waits for the next event. `Ok(None)` means the stream ended.
    async fn next_event(&mut self) -> Result<Option<SessionEvent>>;

    /// Delivers a confirmation decision.
    async fn reply(&mut self, reply: ConfirmationReply) -> Result<()>;

    /// Releases the session. Called exactly once, on every exit path.
    async fn close(&mut self) -> Result<()>;
}
