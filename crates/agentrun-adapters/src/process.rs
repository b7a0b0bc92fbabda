//! Process connector.
//!
//! Spawns the runtime CLI as a child process and talks newline-delimited JSON
//! over its stdio. Every message in either direction is a `{"type", "data"}`
//! envelope:
//!
//! - stdin: `session.create` (once, on open), `session.send`, `permission.reply`
//! - stdout: session events, decoded with [`SessionEvent::parse_line`]
//!
//! Stderr is drained in the background and logged at debug level.

use agentrun_proto::{
    AgentConfig, AgentSession, ConfirmationReply, Connector, Error, RawEvent, Result, SessionEvent,
};
use async_trait::async_trait;
use serde_json::json;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[cfg(unix)]
use nix::sys::signal::{Signal, kill};
#[cfg(unix)]
use nix::unistd::Pid;

const CREATE: &str = "session.create";
const SEND: &str = "session.send";
const REPLY: &str = "permission.reply";

/// How long `close` waits for the child after SIGTERM before killing it.
const DEFAULT_CLOSE_GRACE: Duration = Duration::from_secs(5);

/// Connects to a runtime by spawning its CLI.
#[derive(Debug, Clone)]
pub struct ProcessConnector {
    program: PathBuf,
    args: Vec<String>,
    env: Vec<(String, String)>,
    close_grace: Duration,
}

impl ProcessConnector {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            close_grace: DEFAULT_CLOSE_GRACE,
        }
    }

    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub fn with_close_grace(mut self, grace: Duration) -> Self {
        self.close_grace = grace;
        self
    }

    fn command(&self, config: &AgentConfig) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .envs(self.env.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &config.working_directory {
            cmd.current_dir(dir);
        }
        cmd
    }
}

#[async_trait]
impl Connector for ProcessConnector {
    async fn open(&self, config: &AgentConfig) -> Result<Box<dyn AgentSession>> {
        let program = self.program.display().to_string();
        debug!(program = %program, args = ?self.args, "Spawning runtime process");

        let mut child = self
            .command(config)
            .spawn()
            .map_err(|e| Error::Connect(format!("failed to spawn {program}: {e}")))?;

        let (Some(stdin), Some(stdout), Some(stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            return Err(Error::Connect(format!("{program}: stdio not captured")));
        };

        let stderr_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(target: "agentrun::runtime", "{}", line);
            }
        });

        let mut session = ProcessSession {
            child,
            stdin: Some(stdin),
            stdout: BufReader::new(stdout).lines(),
            stderr_task,
            session_id: None,
            close_grace: self.close_grace,
        };

        session
            .write_message(CREATE, config.session_config())
            .await
            .map_err(|e| Error::Connect(format!("{program}: {e}")))?;

        Ok(Box::new(session))
    }
}

struct ProcessSession {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: Lines<BufReader<ChildStdout>>,
    stderr_task: JoinHandle<()>,
    session_id: Option<String>,
    close_grace: Duration,
}

impl ProcessSession {
    async fn write_message(&mut self, kind: &str, data: serde_json::Value) -> Result<()> {
        let stdin = self.stdin.as_mut().ok_or(Error::Disconnected)?;
        let mut line = serde_json::to_string(&RawEvent::new(kind, data))
            .map_err(|e| Error::Transport(e.to_string()))?;
        line.push('\n');
        stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| Error::Transport(format!("write {kind}: {e}")))?;
        stdin
            .flush()
            .await
            .map_err(|e| Error::Transport(format!("flush {kind}: {e}")))
    }

    /// Sends SIGTERM so the runtime can clean up.
    #[cfg(unix)]
    fn terminate(&mut self) {
        if let Some(pid) = self.child.id() {
            #[allow(clippy::cast_possible_wrap)]
            let pid = Pid::from_raw(pid as i32);
            debug!(%pid, "Sending SIGTERM to runtime process");
            let _ = kill(pid, Signal::SIGTERM);
        }
    }

    #[cfg(not(unix))]
    fn terminate(&mut self) {
        let _ = self.child.start_kill();
    }
}

#[async_trait]
impl AgentSession for ProcessSession {
    fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    async fn send(&mut self, prompt: &str) -> Result<()> {
        self.write_message(SEND, json!({ "prompt": prompt })).await
    }

    async fn next_event(&mut self) -> Result<Option<SessionEvent>> {
        loop {
            let line = self
                .stdout
                .next_line()
                .await
                .map_err(|e| Error::Transport(format!("read stdout: {e}")))?;
            let Some(line) = line else {
                return Ok(None);
            };
            let Some(event) = SessionEvent::parse_line(&line) else {
                continue;
            };
            if let SessionEvent::SessionStarted(start) = &event {
                if self.session_id.is_none() {
                    self.session_id.clone_from(&start.session_id);
                }
            }
            return Ok(Some(event));
        }
    }

    async fn reply(&mut self, reply: ConfirmationReply) -> Result<()> {
        let data = serde_json::to_value(&reply).map_err(|e| Error::Transport(e.to_string()))?;
        self.write_message(REPLY, data).await
    }

    async fn close(&mut self) -> Result<()> {
        // Closing stdin is the polite shutdown signal.
        drop(self.stdin.take());

        if let Ok(Some(status)) = self.child.try_wait() {
            debug!(?status, "Runtime process already exited");
        } else {
            self.terminate();
            match tokio::time::timeout(self.close_grace, self.child.wait()).await {
                Ok(Ok(status)) => debug!(?status, "Runtime process exited"),
                Ok(Err(e)) => return Err(Error::Io(e)),
                Err(_) => {
                    warn!(
                        grace_secs = self.close_grace.as_secs_f64(),
                        "Runtime ignored SIGTERM, killing"
                    );
                    self.child.kill().await?;
                }
            }
        }

        self.stderr_task.abort();
        Ok(())
    }
}
