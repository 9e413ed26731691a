//! Job manager: workspace lifecycle on top of a sandbox driver.
//!
//! Prepares one workspace per task identity, launches the sandbox, and
//! derives task status from `status.json` with the driver as a liveness
//! check. Submission is idempotent per task identity: a task that is already
//! known, already finished, or still running in the backend is adopted
//! rather than launched again.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{AgentTaskStatus, StatusFile, WorkspacePaths};
use crate::domain::ports::{SandboxDriver, SandboxState, SandboxTask, TaskArtifacts, TaskHandle};
use crate::services::workspace;

/// Prepares task workspaces and runs them in sandboxes.
///
/// Each task gets a workspace named after its id. Submitting a task whose
/// workspace is finished or still running adopts it instead of launching a
/// second sandbox.
pub struct JobManager {
    workspaces_dir: PathBuf,
    driver: Arc<dyn SandboxDriver>,
    handles: RwLock<HashMap<String, TaskHandle>>,
}

fn infra(context: &str, err: &anyhow::Error) -> DomainError {
    DomainError::WorkflowInfrastructure(format!("{context}: {err:#}"))
}

impl JobManager {
    pub fn new(workspaces_dir: impl Into<PathBuf>, driver: Arc<dyn SandboxDriver>) -> Self {
        Self {
            workspaces_dir: workspaces_dir.into(),
            driver,
            handles: RwLock::new(HashMap::new()),
        }
    }

    pub fn driver(&self) -> &Arc<dyn SandboxDriver> {
        &self.driver
    }

    /// Workspace of the task `task_id`.
    pub fn workspace_for(&self, task_id: &str) -> WorkspacePaths {
        WorkspacePaths::new(self.workspaces_dir.join(task_id))
    }

    /// Whether an existing workspace can be adopted instead of rebuilt.
    async fn adoptable(&self, task_id: &str, ws: &WorkspacePaths) -> DomainResult<bool> {
        if !ws.exists() {
            return Ok(false);
        }
        if let Some(status) = workspace::read_status(ws).await {
            if status.status.is_terminal() {
                return Ok(true);
            }
        }
        Ok(self.driver.inspect(task_id).await?.is_active())
    }

    /// Prepare the workspace and launch a sandbox, or adopt an existing one.
    pub async fn submit(&self, task: &SandboxTask) -> DomainResult<TaskHandle> {
        if let Some(handle) = self.handles.read().await.get(&task.id) {
            return Ok(handle.clone());
        }

        let mut handles = self.handles.write().await;
        if let Some(handle) = handles.get(&task.id) {
            return Ok(handle.clone());
        }

        let ws = self.workspace_for(&task.id);
        let handle = TaskHandle {
            task_id: task.id.clone(),
            workspace: ws.clone(),
        };

        if self.adoptable(&task.id, &ws).await? {
            info!(task_id = %task.id, "Adopting existing workspace");
        } else {
            workspace::prepare(&ws, &task.source_repo, task.config.as_ref(), &task.protected_paths)
                .await
                .map_err(|e| infra("workspace preparation failed", &e))?;
            self.driver.launch(&task.id, &ws).await?;
            debug!(task_id = %task.id, driver = self.driver.name(), "Task launched");
        }

        handles.insert(task.id.clone(), handle.clone());
        Ok(handle)
    }

    /// Current status of a task, reconciling `status.json` with the driver.
    pub async fn poll(&self, handle: &TaskHandle) -> DomainResult<AgentTaskStatus> {
        let ws = &handle.workspace;
        let reported = workspace::read_status(ws).await;
        if let Some(status) = &reported {
            if status.status.is_terminal() {
                return Ok(status.status);
            }
        }

        let state = self.driver.inspect(&handle.task_id).await?;
        if state.is_active() {
            return Ok(reported.map_or(AgentTaskStatus::Pending, |s| s.status));
        }

        // The sandbox is gone. Its final status write may have landed after
        // the first read.
        if let Some(status) = workspace::read_status(ws).await {
            if status.status.is_terminal() {
                return Ok(status.status);
            }
        }

        let message = match state {
            SandboxState::Failed(reason) => format!("sandbox failed: {reason}"),
            SandboxState::Missing => "sandbox disappeared without reporting status".to_string(),
            _ => "sandbox exited without reporting status".to_string(),
        };
        warn!(task_id = %handle.task_id, %message, "Marking task as errored");
        workspace::write_status(ws, &StatusFile::error("agent_execution", message))
            .await
            .map_err(|e| infra("cannot record sandbox failure", &e))?;
        Ok(AgentTaskStatus::Error)
    }

    /// Read the artifacts of a terminal task.
    pub async fn fetch_results(&self, handle: &TaskHandle) -> DomainResult<TaskArtifacts> {
        let ws = &handle.workspace;
        let status = workspace::read_status(ws).await.ok_or_else(|| {
            DomainError::WorkflowInfrastructure(format!("no status recorded for {}", handle.task_id))
        })?;
        if !status.status.is_terminal() {
            return Err(DomainError::ValidationFailed(format!(
                "task {} is not finished ({})",
                handle.task_id,
                status.status.as_str()
            )));
        }

        let read = |path: PathBuf| async move {
            workspace::read_optional(path)
                .await
                .map_err(|e| infra("cannot read task artifact", &e))
        };

        Ok(TaskArtifacts {
            status: status.status,
            exit_code: status.exit_code,
            error_kind: status.error_kind,
            error: status.error,
            patch: read(ws.patch_file()).await?,
            output: read(ws.output_log()).await?,
            stderr: read(ws.stderr_log()).await?,
            workspace: ws.clone(),
        })
    }

    /// Terminate the sandbox and record the task as errored.
    pub async fn cancel(&self, handle: &TaskHandle, reason: &str) -> DomainResult<()> {
        self.driver.terminate(&handle.task_id).await?;

        let ws = &handle.workspace;
        let already_done = workspace::read_status(ws)
            .await
            .is_some_and(|s| s.status.is_terminal());
        if !already_done {
            workspace::write_status(ws, &StatusFile::error("agent_execution", reason))
                .await
                .map_err(|e| infra("cannot record cancellation", &e))?;
        }
        info!(task_id = %handle.task_id, reason, "Task cancelled");
        Ok(())
    }

    /// Release backend resources held by finished tasks.
    pub async fn reap(&self) -> DomainResult<()> {
        let handles: Vec<TaskHandle> = self.handles.read().await.values().cloned().collect();
        let mut reaped = 0usize;
        for handle in handles {
            let finished = workspace::read_status(&handle.workspace)
                .await
                .is_some_and(|s| s.status.is_terminal());
            if finished {
                if let Err(e) = self.driver.terminate(&handle.task_id).await {
                    warn!(task_id = %handle.task_id, error = %e, "Failed to reap sandbox");
                    continue;
                }
                self.handles.write().await.remove(&handle.task_id);
                reaped += 1;
            }
        }
        debug!(reaped, "Reaped finished sandboxes");
        Ok(())
    }
}
