//! Agent task domain model.
//!
//! One agent task is one sandboxed agent's attempt within a generation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::sandbox::WorkspacePaths;
use super::strategy::PromptStrategy;

/// Lifecycle of an agent task. Mirrors `status.json`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentTaskStatus {
    Pending,
    Running,
    Done,
    Error,
}

impl Default for AgentTaskStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl AgentTaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Done => "done",
            Self::Error => "error",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "done" => Some(Self::Done),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    /// `done` and `error` are final.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }
}

/// One agent's attempt at a step within a generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentTask {
    /// Deterministic identity, unique within the run.
    pub id: String,
    pub run_id: Uuid,
    pub step_index: u32,
    /// 1-based generation number.
    pub generation: u32,
    /// Position within the population; the tie-break key.
    pub index: u32,
    pub vendor: String,
    /// Prompt after strategy and hypotheses are applied.
    pub prompt: String,
    pub strategy: PromptStrategy,
    /// Workspace the sandbox runs in.
    pub workspace: WorkspacePaths,
    pub status: AgentTaskStatus,
    pub exit_code: Option<i32>,
    /// Eval score in `[0, 1]`; `None` until scored.
    pub score: Option<f64>,
    /// Diff of the agent's changes, once fetched.
    pub patch_path: Option<String>,
    pub transcript_path: Option<String>,
    /// Error class tag, see `DomainError::kind`.
    pub error_kind: Option<String>,
    pub error_message: Option<String>,
    /// Tail of the eval output.
    pub eval_details: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AgentTask {
    /// Build the deterministic task identity.
    ///
    /// Resubmitting after a restart yields the same id, which is what makes
    /// workflow submission idempotent. The full run id is embedded so tasks
    /// of different runs never share a row, workspace or sandbox.
    pub fn task_id(run_id: Uuid, step_index: u32, generation: u32, index: u32) -> String {
        format!("{}-s{}-g{}-a{}", run_id.simple(), step_index, generation, index)
    }

    /// Create a pending task with its deterministic id.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        run_id: Uuid,
        step_index: u32,
        generation: u32,
        index: u32,
        vendor: impl Into<String>,
        prompt: impl Into<String>,
        strategy: PromptStrategy,
        workspace: WorkspacePaths,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Self::task_id(run_id, step_index, generation, index),
            run_id,
            step_index,
            generation,
            index,
            vendor: vendor.into(),
            prompt: prompt.into(),
            strategy,
            workspace,
            status: AgentTaskStatus::Pending,
            exit_code: None,
            score: None,
            patch_path: None,
            transcript_path: None,
            error_kind: None,
            error_message: None,
            eval_details: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Record a terminal failure with score 0.
    pub fn fail(&mut self, kind: &str, message: impl Into<String>) {
        self.status = AgentTaskStatus::Error;
        self.score = Some(0.0);
        self.error_kind = Some(kind.to_string());
        self.error_message = Some(message.into());
        self.updated_at = Utc::now();
    }

    /// Score used for selection; unscored tasks count as 0.
    pub fn effective_score(&self) -> f64 {
        self.score.unwrap_or(0.0)
    }
}
