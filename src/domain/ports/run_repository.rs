//! Run repository port (State Store).

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{AgentTask, Generation, Run, Step};

/// Durable record of run, step, generation and agent task state.
///
/// Writes are performed only by the orchestrator holding the run's writer
/// lease. Readers (status, results, logs) never take the lease.
#[async_trait]
pub trait RunRepository: Send + Sync {
    /// Insert a new run record (without children).
    async fn create_run(&self, run: &Run) -> DomainResult<()>;

    /// Update run status, error and timestamps.
    async fn update_run(&self, run: &Run) -> DomainResult<()>;

    /// Insert or update a step record.
    async fn upsert_step(&self, step: &Step) -> DomainResult<()>;

    /// Store the full decomposition of a run atomically: either every step
    /// is written or none is.
    async fn insert_steps(&self, steps: &[Step]) -> DomainResult<()>;

    /// Insert or update a generation record including its hypotheses.
    async fn upsert_generation(&self, generation: &Generation) -> DomainResult<()>;

    /// Insert or update an agent task record.
    async fn upsert_agent_task(&self, task: &AgentTask) -> DomainResult<()>;

    /// Reconstruct a run with all steps, generations and tasks.
    async fn get_run(&self, id: Uuid) -> DomainResult<Option<Run>>;

    /// Resolve a run from a full id or unique prefix.
    async fn resolve_run_id(&self, prefix: &str) -> DomainResult<Option<Uuid>>;

    /// Most recent runs, newest first, without children.
    async fn list_runs(&self, limit: usize) -> DomainResult<Vec<Run>>;

    /// Most recently created run, fully reconstructed.
    async fn latest_run(&self) -> DomainResult<Option<Run>>;

    /// Find an agent task by its identity.
    async fn find_agent_task(&self, agent_id: &str) -> DomainResult<Option<AgentTask>>;

    /// Take the single-writer lease for a run.
    ///
    /// Succeeds when the lease is free or already held by `writer_id`, or
    /// when `steal` is set. Fails with a persistence error otherwise.
    async fn acquire_writer(&self, run_id: Uuid, writer_id: &str, steal: bool) -> DomainResult<()>;

    /// Release the lease if held by `writer_id`.
    async fn release_writer(&self, run_id: Uuid, writer_id: &str) -> DomainResult<()>;
}
