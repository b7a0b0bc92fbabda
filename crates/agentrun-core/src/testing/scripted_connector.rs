//! A `Connector` that plays back scripts instead of talking to a runtime.

use super::script::{Script, Step};
use agentrun_proto::{
    AgentConfig, AgentSession, ConfirmationReply, Connector, Error, Result, SessionEvent,
};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

#[derive(Debug, Default)]
struct Log {
    opened: Vec<AgentConfig>,
    tasks: Vec<String>,
    replies: Vec<ConfirmationReply>,
    closed: usize,
}

/// Serves one script per agent name, falling back to a default script.
///
/// Every session opened through the connector shares one log of configs,
/// tasks, replies and closes, available through the accessor methods.
#[derive(Debug, Clone)]
pub struct ScriptedConnector {
    default: Script,
    scripts: HashMap<String, Script>,
    refuse: HashSet<String>,
    log: Arc<Mutex<Log>>,
}

impl ScriptedConnector {
    pub fn new(default: Script) -> Self {
        Self {
            default,
            scripts: HashMap::new(),
            refuse: HashSet::new(),
            log: Arc::new(Mutex::new(Log::default())),
        }
    }

    /// Uses `script` for sessions whose config is named `agent`.
    pub fn with_script(mut self, agent: impl Into<String>, script: Script) -> Self {
        self.scripts.insert(agent.into(), script);
        self
    }

    /// Makes `open` fail for configs named `agent`.
    pub fn refusing(mut self, agent: impl Into<String>) -> Self {
        self.refuse.insert(agent.into());
        self
    }

    pub fn opened_configs(&self) -> Vec<AgentConfig> {
        self.lock().opened.clone()
    }

    pub fn sent_tasks(&self) -> Vec<String> {
        self.lock().tasks.clone()
    }

    pub fn replies(&self) -> Vec<ConfirmationReply> {
        self.lock().replies.clone()
    }

    pub fn closed_sessions(&self) -> usize {
        self.lock().closed
    }

    fn lock(&self) -> MutexGuard<'_, Log> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn open(&self, config: &AgentConfig) -> Result<Box<dyn AgentSession>> {
        if self.refuse.contains(&config.name) {
            return Err(Error::Connect(format!("runtime refused agent '{}'", config.name)));
        }
        self.lock().opened.push(config.clone());

        let script = self.scripts.get(&config.name).unwrap_or(&self.default);
        debug!(agent = %config.name, steps = script.steps().len(), "Opening scripted session");
        Ok(Box::new(ScriptedSession {
            steps: script.clone().into_steps().into(),
            working_directory: config.working_directory.clone(),
            log: Arc::clone(&self.log),
        }))
    }
}

struct ScriptedSession {
    steps: VecDeque<Step>,
    working_directory: Option<PathBuf>,
    log: Arc<Mutex<Log>>,
}

impl ScriptedSession {
    fn lock(&self) -> MutexGuard<'_, Log> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn write_file(&self, path: PathBuf, contents: String) -> Result<()> {
        let path = match &self.working_directory {
            Some(dir) if path.is_relative() => dir.join(path),
            _ => path,
        };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, contents).await?;
        Ok(())
    }
}

#[async_trait]
impl AgentSession for ScriptedSession {
    async fn send(&mut self, prompt: &str) -> Result<()> {
        self.lock().tasks.push(prompt.to_string());
        Ok(())
    }

    async fn next_event(&mut self) -> Result<Option<SessionEvent>> {
        while let Some(step) = self.steps.pop_front() {
            match step {
                Step::Event(event) => return Ok(Some(event)),
                Step::Delay(duration) => tokio::time::sleep(duration).await,
                Step::WriteFile { path, contents } => self.write_file(path, contents).await?,
                Step::Disconnect => {
                    return Err(Error::Transport("scripted disconnect".to_string()));
                }
                Step::Stall => std::future::pending::<()>().await,
            }
        }
        Ok(None)
    }

    async fn reply(&mut self, reply: ConfirmationReply) -> Result<()> {
        self.lock().replies.push(reply);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.lock().closed += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_serves_script_by_agent_name() {
        let connector = ScriptedConnector::new(Script::new().event(SessionEvent::text("default")))
            .with_script("special", Script::new().event(SessionEvent::text("special")));

        let mut session = connector.open(&AgentConfig::new("special")).await.unwrap();
        assert_eq!(
            session.next_event().await.unwrap(),
            Some(SessionEvent::text("special"))
        );
        assert_eq!(session.next_event().await.unwrap(), None);

        let mut session = connector.open(&AgentConfig::new("other")).await.unwrap();
        assert_eq!(
            session.next_event().await.unwrap(),
            Some(SessionEvent::text("default"))
        );
        assert_eq!(connector.opened_configs().len(), 2);
    }

    #[tokio::test]
    async fn test_refusing_agent_fails_open() {
        let connector = ScriptedConnector::new(Script::new()).refusing("down");
        let err = connector.open(&AgentConfig::new("down")).await.err().unwrap();
        assert!(matches!(err, Error::Connect(_)));
        assert!(connector.opened_configs().is_empty());
    }

    #[tokio::test]
    async fn test_write_file_lands_in_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        let connector = ScriptedConnector::new(
            Script::new()
                .write_file("src/main.py", "print('hi')")
                .event(SessionEvent::session_completed()),
        );
        let config = AgentConfig::new("a").with_working_directory(dir.path());

        let mut session = connector.open(&config).await.unwrap();
        assert!(session.next_event().await.unwrap().unwrap().is_terminal());

        let written = std::fs::read_to_string(dir.path().join("src/main.py")).unwrap();
        assert_eq!(written, "print('hi')");
    }

    #[tokio::test]
    async fn test_disconnect_is_transport_error() {
        let connector = ScriptedConnector::new(Script::new().disconnect());
        let mut session = connector.open(&AgentConfig::new("a")).await.unwrap();
        assert!(matches!(session.next_event().await, Err(Error::Transport(_))));
    }
}
