pub mod agent_task;
pub mod config;
pub mod eval;
pub mod hypothesis;
pub mod run;
pub mod sandbox;
pub mod strategy;
pub mod transcript;

pub use agent_task::{AgentTask, AgentTaskStatus};
pub use config::{
    Config, DatabaseConfig, EvalDefaults, EvolutionConfig, KubernetesConfig, LoggingConfig,
    ReasoningConfig, SandboxConfig, VendorConfig, WorkflowConfig,
};
pub use eval::{EvalResult, EvalSpec, SuccessCriteria};
pub use hypothesis::{Hypothesis, PromptDimension};
pub use run::{Generation, GenerationPhase, Run, RunRequest, RunStatus, Step, StepStatus};
pub use sandbox::{StatusFile, TaskConfig, WorkspacePaths};
pub use strategy::{InstructionOrder, PromptStrategy, Verbosity};
pub use transcript::{SegmentDraft, SegmentKind, TranscriptSegment, TranscriptSummary};
