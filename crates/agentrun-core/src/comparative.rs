//! Paired (A/B) runs.
//!
//! [`ComparativeRunner::run_pair`] executes the same task under a baseline and
//! a treatment config, each in its own working directory, and returns both
//! results together. Either side failing at the transport level fails the
//! whole pair.

use crate::driver::SessionDriver;
use agentrun_proto::{AgentConfig, Connector, Error, RunResult};
use std::fmt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info};

/// Which half of a pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Baseline,
    Treatment,
}

impl Side {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Baseline => "baseline",
            Self::Treatment => "treatment",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors from a paired run.
#[derive(Debug, thiserror::Error)]
pub enum PairError {
    /// The working directories could not be prepared or are not disjoint.
    #[error("Workspace error: {0}")]
    Workspace(String),

    /// One side failed at the transport level.
    #[error("{side} session failed: {source}")]
    Session {
        side: Side,
        #[source]
        source: Error,
    },
}

/// Whether the two sides run at the same time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PairExecution {
    #[default]
    Concurrent,
    Sequential,
}

/// A side's working directory. Temporary directories are removed when the
/// workspace is dropped.
#[derive(Debug)]
pub struct Workspace {
    path: PathBuf,
    temp: Option<TempDir>,
}

impl Workspace {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_temporary(&self) -> bool {
        self.temp.is_some()
    }
}

/// Both results of a paired run.
#[derive(Debug)]
pub struct RunPair {
    pub baseline: RunResult,
    pub treatment: RunResult,
    baseline_workspace: Workspace,
    treatment_workspace: Workspace,
}

impl RunPair {
    pub fn workspace(&self, side: Side) -> &Workspace {
        match side {
            Side::Baseline => &self.baseline_workspace,
            Side::Treatment => &self.treatment_workspace,
        }
    }

    pub fn result(&self, side: Side) -> &RunResult {
        match side {
            Side::Baseline => &self.baseline,
            Side::Treatment => &self.treatment,
        }
    }

    /// Drops the workspaces and returns `(baseline, treatment)`.
    pub fn into_results(self) -> (RunResult, RunResult) {
        (self.baseline, self.treatment)
    }
}

/// Runs baseline/treatment pairs through one [`SessionDriver`].
pub struct ComparativeRunner<C> {
    driver: SessionDriver<C>,
    execution: PairExecution,
}

impl<C: Connector> ComparativeRunner<C> {
    pub fn new(driver: SessionDriver<C>) -> Self {
        Self {
            driver,
            execution: PairExecution::default(),
        }
    }

    pub fn with_execution(mut self, execution: PairExecution) -> Self {
        self.execution = execution;
        self
    }

    pub fn driver(&self) -> &SessionDriver<C> {
        &self.driver
    }

    /// Runs `task` under both configs in disjoint working directories.
    ///
    /// A side without a working directory gets a fresh temporary one.
    /// Configured directories are created if missing and must not overlap.
    /// Each side's confirmation policy is built from its own config.
    ///
    /// In concurrent mode both sides always run to completion, so both
    /// sessions are closed even when one fails.
    ///
    /// # Errors
    ///
    /// Returns [`PairError::Workspace`] before any session opens when the
    /// directories cannot be prepared, and [`PairError::Session`] when either
    /// side fails. No partial pair is ever returned.
    pub async fn run_pair(
        &self,
        baseline: &AgentConfig,
        treatment: &AgentConfig,
        task: &str,
    ) -> Result<RunPair, PairError> {
        let baseline_workspace = prepare_workspace(baseline, Side::Baseline).await?;
        let treatment_workspace = prepare_workspace(treatment, Side::Treatment).await?;
        ensure_disjoint(baseline_workspace.path(), treatment_workspace.path())?;

        let baseline_config = baseline
            .clone()
            .with_working_directory(baseline_workspace.path());
        let treatment_config = treatment
            .clone()
            .with_working_directory(treatment_workspace.path());

        info!(
            baseline = %baseline_config.name,
            treatment = %treatment_config.name,
            execution = ?self.execution,
            "Starting paired run"
        );

        let baseline_run = self.run_side(&baseline_config, task, Side::Baseline);
        let treatment_run = self.run_side(&treatment_config, task, Side::Treatment);

        let (baseline_result, treatment_result) = match self.execution {
            PairExecution::Concurrent => {
                let (b, t) = futures::future::join(baseline_run, treatment_run).await;
                (b?, t?)
            }
            PairExecution::Sequential => {
                let b = baseline_run.await?;
                let t = treatment_run.await?;
                (b, t)
            }
        };

        info!(
            baseline_success = baseline_result.success,
            treatment_success = treatment_result.success,
            "Paired run finished"
        );

        Ok(RunPair {
            baseline: baseline_result,
            treatment: treatment_result,
            baseline_workspace,
            treatment_workspace,
        })
    }

    async fn run_side(
        &self,
        config: &AgentConfig,
        task: &str,
        side: Side,
    ) -> Result<RunResult, PairError> {
        self.driver
            .run_side(config, task, side.as_str())
            .await
            .map_err(|source| PairError::Session { side, source })
    }
}

async fn prepare_workspace(config: &AgentConfig, side: Side) -> Result<Workspace, PairError> {
    match &config.working_directory {
        Some(dir) => {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                PairError::Workspace(format!("cannot create {}: {}", dir.display(), e))
            })?;
            let path = tokio::fs::canonicalize(dir).await.map_err(|e| {
                PairError::Workspace(format!("cannot resolve {}: {}", dir.display(), e))
            })?;
            Ok(Workspace { path, temp: None })
        }
        None => {
            let temp = tempfile::Builder::new()
                .prefix(&format!("agentrun-{}-", side))
                .tempdir()
                .map_err(|e| PairError::Workspace(format!("cannot create temp dir: {}", e)))?;
            let path = temp.path().canonicalize().map_err(|e| {
                PairError::Workspace(format!("cannot resolve {}: {}", temp.path().display(), e))
            })?;
            debug!(%side, path = %path.display(), "Created temporary workspace");
            Ok(Workspace {
                path,
                temp: Some(temp),
            })
        }
    }
}

fn ensure_disjoint(a: &Path, b: &Path) -> Result<(), PairError> {
    if a.starts_with(b) || b.starts_with(a) {
        return Err(PairError::Workspace(format!(
            "working directories overlap: {} and {}",
            a.display(),
            b.display()
        )));
    }
    Ok(())
}
