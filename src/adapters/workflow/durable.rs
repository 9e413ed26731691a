//! Durable workflow engine binding.
//!
//! Reserved for an external durable-execution service. Until one is
//! configured every operation fails as an infrastructure error, which
//! aborts the run instead of silently scoring agents at zero.

use async_trait::async_trait;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::AgentTaskStatus;
use crate::domain::ports::{SandboxTask, TaskArtifacts, TaskHandle, WorkflowEngine};

/// Placeholder binding for an external durable workflow service.
#[derive(Debug, Clone)]
pub struct DurableWorkflowEngine {
    endpoint: Option<String>,
}

impl DurableWorkflowEngine {
    pub fn new(endpoint: Option<String>) -> Self {
        Self { endpoint }
    }

    fn unavailable(&self) -> DomainError {
        DomainError::WorkflowInfrastructure(match &self.endpoint {
            Some(endpoint) => format!("durable workflow service at {endpoint} is not supported by this build"),
            None => "durable workflow engine selected but workflow.durable_endpoint is not set".to_string(),
        })
    }
}

#[async_trait]
impl WorkflowEngine for DurableWorkflowEngine {
    fn name(&self) -> &'static str {
        "durable"
    }

    async fn submit(&self, _task: &SandboxTask) -> DomainResult<TaskHandle> {
        Err(self.unavailable())
    }

    async fn poll(&self, _handle: &TaskHandle) -> DomainResult<AgentTaskStatus> {
        Err(self.unavailable())
    }

    async fn fetch_results(&self, _handle: &TaskHandle) -> DomainResult<TaskArtifacts> {
        Err(self.unavailable())
    }

    async fn cancel(&self, _handle: &TaskHandle, _reason: &str) -> DomainResult<()> {
        Err(self.unavailable())
    }
}
