//! Workflow engine port.
//!
//! Decouples the orchestrator from the execution backend. Every engine
//! honours the same contract:
//!
//! - `submit` is idempotent per task identity: a second call returns the
//!   existing handle and never spawns a duplicate sandbox.
//! - `poll` is non-blocking and safe to call repeatedly.
//! - `fetch_results` is defined only once the task is terminal and has no
//!   side effects.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::domain::errors::DomainResult;
use crate::domain::models::{AgentTaskStatus, TaskConfig, WorkspacePaths};

/// Everything needed to materialise one sandbox.
#[derive(Debug, Clone, PartialEq)]
pub struct SandboxTask {
    /// Deterministic task identity.
    pub id: String,
    /// Repository the workspace snapshot is copied from.
    pub source_repo: PathBuf,
    /// `None` leaves `task.json` absent, which the sandbox reports as a
    /// setup error.
    pub config: Option<TaskConfig>,
    /// Repo-relative paths snapshotted into `pristine/`.
    pub protected_paths: Vec<String>,
}

/// Reference to a submitted task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskHandle {
    pub task_id: String,
    pub workspace: WorkspacePaths,
}

/// Artifacts of a terminal task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskArtifacts {
    pub status: AgentTaskStatus,
    pub exit_code: Option<i32>,
    pub error_kind: Option<String>,
    pub error: Option<String>,
    /// Contents of `patch.diff`; empty when the agent changed nothing.
    pub patch: String,
    /// Agent stdout.
    pub output: String,
    /// Agent stderr.
    pub stderr: String,
    pub workspace: WorkspacePaths,
}

impl TaskArtifacts {
    pub fn patch_path(&self) -> PathBuf {
        self.workspace.patch_file()
    }

    pub fn transcript_path(&self) -> PathBuf {
        self.workspace.raw_transcript()
    }
}

/// Backend that executes agent tasks.
#[async_trait]
pub trait WorkflowEngine: Send + Sync {
    fn name(&self) -> &'static str;

    async fn submit(&self, task: &SandboxTask) -> DomainResult<TaskHandle>;

    async fn poll(&self, handle: &TaskHandle) -> DomainResult<AgentTaskStatus>;

    async fn fetch_results(&self, handle: &TaskHandle) -> DomainResult<TaskArtifacts>;

    /// Force-terminate a task. The task ends in `error`.
    async fn cancel(&self, handle: &TaskHandle, reason: &str) -> DomainResult<()>;

    /// Reclaim backend resources held for finished tasks.
    async fn reap(&self) -> DomainResult<()> {
        Ok(())
    }
}
