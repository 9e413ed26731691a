//! Sandbox driver port.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::WorkspacePaths;

/// Backend view of one sandbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SandboxState {
    Pending,
    Running,
    /// Exited cleanly; `status.json` is authoritative.
    Succeeded,
    /// Crashed, was killed, or cannot start.
    Failed(String),
    /// The backend has no record of the sandbox.
    Missing,
}

impl SandboxState {
    /// Still pending or running.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::Running)
    }
}

/// Launches and supervises isolated environments that run
/// `sandbox-exec` against a prepared workspace.
#[async_trait]
pub trait SandboxDriver: Send + Sync {
    fn name(&self) -> &'static str;

    /// Start the sandbox. Launch failures are infrastructure errors.
    async fn launch(&self, task_id: &str, workspace: &WorkspacePaths) -> DomainResult<()>;

    async fn inspect(&self, task_id: &str) -> DomainResult<SandboxState>;

    /// Stop the sandbox if it is still running. Idempotent.
    async fn terminate(&self, task_id: &str) -> DomainResult<()>;

    /// Backend-side logs (container or process output), if any.
    async fn logs(&self, task_id: &str) -> DomainResult<String>;
}
