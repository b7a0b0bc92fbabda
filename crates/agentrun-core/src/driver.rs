//! Session driver.
//!
//! Runs one task against one agent configuration: opens a session through a
//! [`Connector`], submits the task, pumps events into an [`EventNormalizer`],
//! answers confirmation requests, and enforces the wall-clock timeout.
//!
//! Only transport failures surface as `Err`. A timeout, an agent-reported
//! error or a cancellation all come back as a `RunResult` with
//! `success == false`.

use crate::confirmation::{PolicyFactory, default_policy_factory};
use crate::normalizer::{EventNormalizer, NormalizerOptions};
use agentrun_proto::{AgentConfig, AgentSession, Connector, Error, Result, RunResult};
use chrono::Utc;
use tokio::time::Instant;
use tracing::{Instrument, debug, info, info_span, warn};

/// Error text of a run that hit its timeout.
pub const TIMEOUT_MARKER: &str = "timeout";

/// How the event pump stopped.
enum PumpOutcome {
    Terminal,
    EndOfStream,
}

/// Drives sessions against a runtime reachable through `C`.
///
/// A driver holds no per-run state, so one driver can execute any number of
/// runs concurrently through `&self`.
pub struct SessionDriver<C> {
    connector: C,
    policy_factory: PolicyFactory,
    options: NormalizerOptions,
}

impl<C: Connector> SessionDriver<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            policy_factory: default_policy_factory(),
            options: NormalizerOptions::default(),
        }
    }

    /// Replaces how each run's confirmation policy is built.
    pub fn with_policy_factory(mut self, factory: PolicyFactory) -> Self {
        self.policy_factory = factory;
        self
    }

    pub fn with_options(mut self, options: NormalizerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Runs `task` against the agent described by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error when the config is invalid, the session cannot be
    /// opened, or the transport fails before the session reaches a terminal
    /// event without the agent having reported an error of its own.
    pub async fn run(&self, config: &AgentConfig, task: &str) -> Result<RunResult> {
        let span = info_span!("session", agent = %config.name, side = tracing::field::Empty);
        self.execute(config, task).instrument(span).await
    }

    /// Like [`run`](Self::run), tagged with a paired-run side in logs.
    pub(crate) async fn run_side(
        &self,
        config: &AgentConfig,
        task: &str,
        side: &str,
    ) -> Result<RunResult> {
        let span = info_span!("session", agent = %config.name, side);
        self.execute(config, task).instrument(span).await
    }

    async fn execute(&self, config: &AgentConfig, task: &str) -> Result<RunResult> {
        config.validate()?;

        let timeout = config.timeout();
        info!(
            model = config.model.as_deref().unwrap_or("default"),
            timeout_secs = timeout.as_secs_f64(),
            max_turns = config.max_turns,
            "Starting session"
        );

        let started_at = Utc::now();
        let clock = Instant::now();

        let deadline = clock + timeout;

        let mut session = tokio::time::timeout_at(deadline, self.connector.open(config))
            .await
            .map_err(|_| {
                warn!(timeout_secs = timeout.as_secs_f64(), "Timed out opening session");
                Error::Connect(format!(
                    "session did not open within {:.1}s",
                    timeout.as_secs_f64()
                ))
            })??;
        if let Some(id) = session.session_id() {
            debug!(session_id = id, "Session opened");
        }

        let policy = (self.policy_factory)(config);
        let mut normalizer = EventNormalizer::with_options(policy, self.options.clone());

        let outcome =
            tokio::time::timeout_at(deadline, pump(session.as_mut(), &mut normalizer, task)).await;

        if let Err(e) = session.close().await {
            warn!(error = %e, "Failed to close session");
        }

        let mut result = match outcome {
            Ok(Ok(PumpOutcome::Terminal)) => normalizer.finalize(),
            Ok(Ok(PumpOutcome::EndOfStream)) => {
                if !normalizer.has_error() {
                    warn!(
                        events = normalizer.events_seen(),
                        "Stream ended without a terminal event"
                    );
                    return Err(Error::Disconnected);
                }
                debug!("Stream ended after an agent-reported error");
                normalizer.finalize()
            }
            Ok(Err(e)) => {
                if !normalizer.has_error() {
                    warn!(error = %e, "Transport failed before the session finished");
                    return Err(e);
                }
                warn!(error = %e, "Transport failed after an agent-reported error");
                normalizer.finalize()
            }
            Err(_) => {
                warn!(
                    timeout_secs = timeout.as_secs_f64(),
                    events = normalizer.events_seen(),
                    "Session timeout reached, returning partial result"
                );
                let mut partial = normalizer.finalize();
                partial.success = false;
                partial.error = Some(TIMEOUT_MARKER.to_string());
                partial.timed_out = true;
                partial
            }
        };

        result.started_at = Some(started_at);
        result.duration_ms = clock.elapsed().as_secs_f64() * 1000.0;

        let turns = result.turns.len();
        if turns > config.max_turns as usize {
            debug!(turns, max_turns = config.max_turns, "Session exceeded advisory turn ceiling");
        }
        info!(
            success = result.success,
            turns,
            tool_calls = result.all_tool_calls().count(),
            total_tokens = result.total_tokens(),
            duration_ms = result.duration_ms,
            "Session finished"
        );
        Ok(result)
    }
}

/// Submits the task and feeds events to the normalizer until a terminal
/// event or end of stream. Stops at the first transport error.
async fn pump(
    session: &mut dyn AgentSession,
    normalizer: &mut EventNormalizer,
    task: &str,
) -> Result<PumpOutcome> {
    session.send(task).await?;

    while let Some(event) = session.next_event().await? {
        let terminal = event.is_terminal();
        if let Some(reply) = normalizer.consume(event) {
            session.reply(reply).await?;
        }
        if terminal {
            return Ok(PumpOutcome::Terminal);
        }
    }
    Ok(PumpOutcome::EndOfStream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Script, ScriptedConnector};
    use agentrun_proto::SessionEvent;
    use serde_json::json;
    use std::time::Duration;

    fn driver(script: Script) -> SessionDriver<ScriptedConnector> {
        SessionDriver::new(ScriptedConnector::new(script))
    }

    #[tokio::test]
    async fn test_run_records_task_and_duration() {
        let script = Script::new()
            .event(SessionEvent::text("hello"))
            .event(SessionEvent::session_completed());
        let driver = driver(script);

        let result = driver.run(&AgentConfig::new("a"), "say hello").await.unwrap();

        assert!(result.success);
        assert!(result.started_at.is_some());
        assert!(result.duration_ms >= 0.0);
        assert_eq!(driver.connector().sent_tasks(), vec!["say hello".to_string()]);
        assert_eq!(driver.connector().closed_sessions(), 1);
    }

    #[tokio::test]
    async fn test_idle_without_payload_ends_the_run() {
        let idle = SessionEvent::parse_line(r#"{"type":"session.idle"}"#).unwrap();
        let driver = driver(Script::new().event(SessionEvent::text("done")).event(idle));

        let result = driver.run(&AgentConfig::new("a"), "task").await.unwrap();

        assert!(result.success);
        assert_eq!(result.final_response(), Some("done"));
    }

    #[tokio::test]
    async fn test_end_of_stream_without_terminal_is_disconnect() {
        let driver = driver(Script::new().event(SessionEvent::text("partial")));
        let err = driver.run(&AgentConfig::new("a"), "task").await.unwrap_err();
        assert!(matches!(err, Error::Disconnected));
        assert_eq!(driver.connector().closed_sessions(), 1);
    }

    #[tokio::test]
    async fn test_invalid_config_never_opens_a_session() {
        let config = AgentConfig::new("a").with_timeout(Duration::ZERO);
        let driver = driver(Script::new().event(SessionEvent::session_completed()));
        let err = driver.run(&config, "task").await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(driver.connector().opened_configs().is_empty());
    }

    #[tokio::test]
    async fn test_stall_times_out_with_partial_result() {
        let script = Script::new()
            .event(SessionEvent::tool_started("1", "bash", json!({"cmd": "sleep"})))
            .stall();
        let config = AgentConfig::new("a").with_timeout(Duration::from_millis(50));
        let driver = driver(script);

        let result = driver.run(&config, "task").await.unwrap();

        assert!(!result.success);
        assert!(result.timed_out);
        assert_eq!(result.error.as_deref(), Some(TIMEOUT_MARKER));
        assert_eq!(result.tool_call_count("bash"), 1);
        assert_eq!(driver.connector().closed_sessions(), 1);
    }

    #[tokio::test]
    async fn test_hanging_open_is_bounded_by_the_timeout() {
        struct NeverOpens;

        #[async_trait::async_trait]
        impl Connector for NeverOpens {
            async fn open(&self, _config: &AgentConfig) -> Result<Box<dyn AgentSession>> {
                std::future::pending().await
            }
        }

        let config = AgentConfig::new("a").with_timeout(Duration::from_millis(50));
        let err = SessionDriver::new(NeverOpens).run(&config, "task").await.unwrap_err();
        assert!(matches!(err, Error::Connect(_)));
    }

    #[tokio::test]
    async fn test_policy_factory_is_used_per_run() {
        use crate::confirmation::Passthrough;
        use std::sync::Arc;

        let script = Script::new()
            .event(SessionEvent::confirmation("p1", "shell", Some("bash")))
            .event(SessionEvent::session_completed());
        let driver = driver(script).with_policy_factory(Arc::new(|_: &AgentConfig| {
            Box::new(Passthrough) as Box<dyn crate::ConfirmationPolicy>
        }));

        let result = driver.run(&AgentConfig::new("a"), "task").await.unwrap();

        assert!(result.permission_requested);
        assert!(!result.permissions[0].granted());
        assert!(driver.connector().replies().is_empty());
    }
}
