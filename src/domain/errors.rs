//! Domain errors for the Phylum orchestrator.

use thiserror::Error;
use uuid::Uuid;

/// Domain-level errors that can occur while driving a run.
///
/// Variants are grouped by locality. Agent- and generation-scoped failures
/// are absorbed by the orchestrator as scoring signal; only the fatal
/// classes (see [`DomainError::is_fatal`]) abort a run.
#[derive(Debug, Error)]
pub enum DomainError {
    /// Task configuration is missing or malformed.
    #[error("Setup error: {0}")]
    Setup(String),

    #[error("Unknown vendor: {0}")]
    UnknownVendor(String),

    /// The agent process exited nonzero or was force-terminated.
    #[error("Agent execution failed: {0}")]
    AgentExecution(String),

    /// The eval command could not be invoked at all.
    #[error("Eval harness error: {0}")]
    EvalHarness(String),

    /// The reasoning service call failed or timed out.
    #[error("Reasoning call failed: {0}")]
    Reasoning(String),

    #[error("Plan decomposition failed: {0}")]
    Decomposition(String),

    #[error("Analysis degraded: {0}")]
    AnalysisDegraded(String),

    /// The execution backend cannot submit or monitor tasks.
    #[error("Workflow infrastructure error: {0}")]
    WorkflowInfrastructure(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Applying or diffing against the run repository failed.
    #[error("Repository error: {0}")]
    Repository(String),

    #[error("Run not found: {0}")]
    RunNotFound(Uuid),

    #[error("Agent task not found: {0}")]
    AgentTaskNotFound(String),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl DomainError {
    /// Whether this error must abort the run instead of being absorbed as a
    /// low score.
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::WorkflowInfrastructure(_) | Self::Persistence(_) | Self::Repository(_)
        )
    }

    /// Short machine-readable tag recorded alongside failed agent tasks.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Setup(_) => "setup",
            Self::UnknownVendor(_) => "unknown_vendor",
            Self::AgentExecution(_) => "agent_execution",
            Self::EvalHarness(_) => "eval_harness",
            Self::Reasoning(_) => "reasoning",
            Self::Decomposition(_) => "decomposition",
            Self::AnalysisDegraded(_) => "analysis_degraded",
            Self::WorkflowInfrastructure(_) => "workflow_infrastructure",
            Self::Persistence(_) => "persistence",
            Self::Repository(_) => "repository",
            Self::RunNotFound(_) => "run_not_found",
            Self::AgentTaskNotFound(_) => "agent_task_not_found",
            Self::ValidationFailed(_) => "validation",
            Self::SerializationError(_) => "serialization",
            Self::Io(_) => "io",
        }
    }
}

/// Result alias for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        DomainError::Persistence(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::SerializationError(err.to_string())
    }
}

impl From<std::io::Error> for DomainError {
    fn from(err: std::io::Error) -> Self {
        DomainError::Io(err.to_string())
    }
}
