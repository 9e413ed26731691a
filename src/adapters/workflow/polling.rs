//! Polling workflow engine.
//!
//! Drives tasks through the job manager and answers `poll` from the shared
//! workspace. Holds no state the workspaces do not, so a restarted
//! orchestrator resumes by resubmitting the same task identities.

use async_trait::async_trait;
use std::sync::Arc;

use crate::domain::errors::DomainResult;
use crate::domain::models::AgentTaskStatus;
use crate::domain::ports::{SandboxTask, TaskArtifacts, TaskHandle, WorkflowEngine};
use crate::services::JobManager;

/// Workflow engine that polls a [`JobManager`] for task state.
pub struct PollingWorkflowEngine {
    jobs: Arc<JobManager>,
}

impl PollingWorkflowEngine {
    pub fn new(jobs: Arc<JobManager>) -> Self {
        Self { jobs }
    }

    pub fn jobs(&self) -> &Arc<JobManager> {
        &self.jobs
    }
}

#[async_trait]
impl WorkflowEngine for PollingWorkflowEngine {
    fn name(&self) -> &'static str {
        "polling"
    }

    async fn submit(&self, task: &SandboxTask) -> DomainResult<TaskHandle> {
        self.jobs.submit(task).await
    }

    async fn poll(&self, handle: &TaskHandle) -> DomainResult<AgentTaskStatus> {
        self.jobs.poll(handle).await
    }

    async fn fetch_results(&self, handle: &TaskHandle) -> DomainResult<TaskArtifacts> {
        self.jobs.fetch_results(handle).await
    }

    async fn cancel(&self, handle: &TaskHandle, reason: &str) -> DomainResult<()> {
        self.jobs.cancel(handle, reason).await
    }

    async fn reap(&self) -> DomainResult<()> {
        self.jobs.reap().await
    }
}
