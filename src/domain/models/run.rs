//! Run, step and generation models.
//!
//! A run owns its steps, a step owns its generations and a generation owns
//! its agent tasks. Only the orchestrator holding the run's writer lease
//! mutates any of them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use super::agent_task::AgentTask;
use super::eval::EvalSpec;
use super::hypothesis::Hypothesis;

/// Lifecycle of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Created; plan not yet decomposed.
    Pending,
    Running,
    Done,
    Failed,
}

impl Default for RunStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "done" => Some(Self::Done),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

/// Lifecycle of a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Done,
    Failed,
}

impl Default for StepStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "done" => Some(Self::Done),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

/// Position of a generation inside the per-step state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationPhase {
    Spawn,
    Await,
    Score,
    Decide,
    /// A decision has been recorded.
    Decided,
}

impl Default for GenerationPhase {
    fn default() -> Self {
        Self::Spawn
    }
}

impl GenerationPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Spawn => "spawn",
            Self::Await => "await",
            Self::Score => "score",
            Self::Decide => "decide",
            Self::Decided => "decided",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "spawn" => Some(Self::Spawn),
            "await" => Some(Self::Await),
            "score" => Some(Self::Score),
            "decide" => Some(Self::Decide),
            "decided" => Some(Self::Decided),
            _ => None,
        }
    }
}

/// One population-wide attempt at a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Generation {
    pub run_id: Uuid,
    pub step_index: u32,
    /// 1-based index within the step.
    pub index: u32,
    /// Progress through spawn, await, score and decide.
    pub phase: GenerationPhase,
    /// Inherited from the previous generation; empty for generation 1.
    pub hypotheses: Vec<Hypothesis>,
    /// Population, ordered by index.
    pub tasks: Vec<AgentTask>,
    /// Agent index of the winner, if any.
    pub winner: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Generation {
    pub fn new(run_id: Uuid, step_index: u32, index: u32, hypotheses: Vec<Hypothesis>) -> Self {
        let now = Utc::now();
        Self {
            run_id,
            step_index,
            index,
            phase: GenerationPhase::Spawn,
            hypotheses,
            tasks: Vec::new(),
            winner: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn set_phase(&mut self, phase: GenerationPhase) {
        self.phase = phase;
        self.updated_at = Utc::now();
    }

    pub fn is_decided(&self) -> bool {
        self.phase == GenerationPhase::Decided
    }

    /// The task selected as winner, if any.
    pub fn winner_task(&self) -> Option<&AgentTask> {
        self.winner
            .and_then(|w| self.tasks.iter().find(|t| t.index == w))
    }

    /// Highest score in the generation; `None` before scoring.
    pub fn best_score(&self) -> Option<f64> {
        self.tasks
            .iter()
            .filter_map(|t| t.score)
            .max_by(f64::total_cmp)
    }
}

/// One ordered unit of work derived from the plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub run_id: Uuid,
    /// 0-based; steps execute strictly in this order.
    pub index: u32,
    /// Short label shown by `status`.
    pub description: String,
    /// Base prompt given to every agent for this step.
    pub prompt: String,
    pub status: StepStatus,
    /// Generations run so far, oldest first.
    pub generations: Vec<Generation>,
    /// Task whose patch was applied to the repository.
    pub winner_agent_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Step {
    pub fn new(run_id: Uuid, index: u32, description: impl Into<String>, prompt: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            run_id,
            index,
            description: description.into(),
            prompt: prompt.into(),
            status: StepStatus::Pending,
            generations: Vec::new(),
            winner_agent_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn set_status(&mut self, status: StepStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }
}

/// Parameters a run is created from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRequest {
    /// Plain-language description of the change.
    pub plan: String,
    /// Repository the winners are applied to.
    pub repo_path: PathBuf,
    /// Command that decides whether an agent passed.
    pub eval: EvalSpec,
    /// Registered agent vendor name.
    pub vendor: String,
    #[serde(default)]
    pub agent_config: serde_json::Value,
    /// Agents per generation.
    pub population_size: u32,
    /// Generations per step before the step fails.
    pub max_generations: u32,
}

/// One end-to-end execution of a plan against an eval command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: Uuid,
    pub plan: String,
    /// Repository the winners are applied to.
    pub repo_path: PathBuf,
    pub eval: EvalSpec,
    pub vendor: String,
    pub agent_config: serde_json::Value,
    pub population_size: u32,
    pub max_generations: u32,
    /// Overall status; `running` while any step is unfinished.
    pub status: RunStatus,
    /// Decomposed steps in execution order.
    pub steps: Vec<Step>,
    /// Last fatal error; a run with one set is resumable.
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Set once the run is `done` or `failed`.
    pub completed_at: Option<DateTime<Utc>>,
}

impl Run {
    /// Create a pending run from a validated request.
    pub fn new(request: RunRequest) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            plan: request.plan,
            repo_path: request.repo_path,
            eval: request.eval,
            vendor: request.vendor,
            agent_config: request.agent_config,
            population_size: request.population_size,
            max_generations: request.max_generations,
            status: RunStatus::Pending,
            steps: Vec::new(),
            error_message: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    pub fn set_status(&mut self, status: RunStatus) {
        let now = Utc::now();
        self.status = status;
        self.updated_at = now;
        if status.is_terminal() {
            self.completed_at = Some(now);
        }
    }

    /// Mark the run failed with `message`.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.error_message = Some(message.into());
        self.set_status(RunStatus::Failed);
    }

    /// First eight characters of the id, as shown by the CLI.
    pub fn short_id(&self) -> String {
        self.id.to_string()[..8].to_string()
    }

    /// Look up a task anywhere in the run.
    pub fn find_agent_task(&self, agent_id: &str) -> Option<&AgentTask> {
        self.steps
            .iter()
            .flat_map(|s| s.generations.iter())
            .flat_map(|g| g.tasks.iter())
            .find(|t| t.id == agent_id)
    }
}
