//! SQLite implementation of the RunRepository.

use async_trait::async_trait;
use sqlx::SqlitePool;
use std::path::PathBuf;
use uuid::Uuid;

use super::{parse_datetime, parse_json_or_default, parse_optional_datetime, parse_uuid};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    AgentTask, AgentTaskStatus, EvalSpec, Generation, GenerationPhase, Run, RunStatus, Step,
    StepStatus, WorkspacePaths,
};
use crate::domain::ports::RunRepository;

/// [`RunRepository`] backed by SQLite.
///
/// Runs, steps, generations and agent tasks live in separate tables keyed
/// by run id; `get_run` reassembles the whole tree.
#[derive(Clone)]
pub struct SqliteRunRepository {
    pool: SqlitePool,
}

impl SqliteRunRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn load_children(&self, run: &mut Run) -> DomainResult<()> {
        let run_id = run.id.to_string();

        let step_rows: Vec<StepRow> =
            sqlx::query_as("SELECT * FROM steps WHERE run_id = ? ORDER BY step_index")
                .bind(&run_id)
                .fetch_all(&self.pool)
                .await?;

        let generation_rows: Vec<GenerationRow> = sqlx::query_as(
            "SELECT * FROM generations WHERE run_id = ? ORDER BY step_index, generation_index",
        )
        .bind(&run_id)
        .fetch_all(&self.pool)
        .await?;

        let task_rows: Vec<AgentTaskRow> = sqlx::query_as(
            "SELECT * FROM agent_tasks WHERE run_id = ? ORDER BY step_index, generation_index, agent_index",
        )
        .bind(&run_id)
        .fetch_all(&self.pool)
        .await?;

        let mut generations: Vec<Generation> = generation_rows
            .into_iter()
            .map(TryInto::try_into)
            .collect::<DomainResult<_>>()?;

        for row in task_rows {
            let task: AgentTask = row.try_into()?;
            if let Some(generation) = generations
                .iter_mut()
                .find(|g| g.step_index == task.step_index && g.index == task.generation)
            {
                generation.tasks.push(task);
            }
        }

        let mut steps: Vec<Step> = step_rows
            .into_iter()
            .map(TryInto::try_into)
            .collect::<DomainResult<_>>()?;

        for generation in generations {
            if let Some(step) = steps.iter_mut().find(|s| s.index == generation.step_index) {
                step.generations.push(generation);
            }
        }

        run.steps = steps;
        Ok(())
    }
}

/// Insert or update one step row on any executor, so a batch can share a
/// transaction.
async fn write_step<'c, E>(executor: E, step: &Step) -> DomainResult<()>
where
    E: sqlx::Executor<'c, Database = sqlx::Sqlite>,
{
    sqlx::query(
        r#"INSERT INTO steps (run_id, step_index, description, prompt, status, winner_agent_id, created_at, updated_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?)
           ON CONFLICT(run_id, step_index) DO UPDATE SET
               description = excluded.description,
               prompt = excluded.prompt,
               status = excluded.status,
               winner_agent_id = excluded.winner_agent_id,
               updated_at = excluded.updated_at"#,
    )
    .bind(step.run_id.to_string())
    .bind(i64::from(step.index))
    .bind(&step.description)
    .bind(&step.prompt)
    .bind(step.status.as_str())
    .bind(&step.winner_agent_id)
    .bind(step.created_at.to_rfc3339())
    .bind(step.updated_at.to_rfc3339())
    .execute(executor)
    .await?;

    Ok(())
}

#[async_trait]
impl RunRepository for SqliteRunRepository {
    async fn create_run(&self, run: &Run) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT INTO runs (id, plan, repo_path, eval_spec, vendor, agent_config, population_size,
                                 max_generations, status, error_message, created_at, updated_at, completed_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(run.id.to_string())
        .bind(&run.plan)
        .bind(run.repo_path.to_string_lossy().to_string())
        .bind(serde_json::to_string(&run.eval)?)
        .bind(&run.vendor)
        .bind(serde_json::to_string(&run.agent_config)?)
        .bind(i64::from(run.population_size))
        .bind(i64::from(run.max_generations))
        .bind(run.status.as_str())
        .bind(&run.error_message)
        .bind(run.created_at.to_rfc3339())
        .bind(run.updated_at.to_rfc3339())
        .bind(run.completed_at.map(|dt| dt.to_rfc3339()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_run(&self, run: &Run) -> DomainResult<()> {
        let result = sqlx::query(
            "UPDATE runs SET status = ?, error_message = ?, updated_at = ?, completed_at = ? WHERE id = ?",
        )
        .bind(run.status.as_str())
        .bind(&run.error_message)
        .bind(run.updated_at.to_rfc3339())
        .bind(run.completed_at.map(|dt| dt.to_rfc3339()))
        .bind(run.id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::RunNotFound(run.id));
        }
        Ok(())
    }

    async fn upsert_step(&self, step: &Step) -> DomainResult<()> {
        write_step(&self.pool, step).await
    }

    async fn insert_steps(&self, steps: &[Step]) -> DomainResult<()> {
        let mut tx = self.pool.begin().await?;
        for step in steps {
            write_step(&mut *tx, step).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn upsert_generation(&self, generation: &Generation) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT INTO generations (run_id, step_index, generation_index, phase, hypotheses, winner_index, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(run_id, step_index, generation_index) DO UPDATE SET
                   phase = excluded.phase,
                   hypotheses = excluded.hypotheses,
                   winner_index = excluded.winner_index,
                   updated_at = excluded.updated_at"#,
        )
        .bind(generation.run_id.to_string())
        .bind(i64::from(generation.step_index))
        .bind(i64::from(generation.index))
        .bind(generation.phase.as_str())
        .bind(serde_json::to_string(&generation.hypotheses)?)
        .bind(generation.winner.map(i64::from))
        .bind(generation.created_at.to_rfc3339())
        .bind(generation.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn upsert_agent_task(&self, task: &AgentTask) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT INTO agent_tasks (id, run_id, step_index, generation_index, agent_index, vendor, prompt, strategy,
                                        workspace, status, exit_code, score, patch_path, transcript_path, error_kind,
                                        error_message, eval_details, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(id) DO UPDATE SET
                   prompt = excluded.prompt,
                   strategy = excluded.strategy,
                   status = excluded.status,
                   exit_code = excluded.exit_code,
                   score = excluded.score,
                   patch_path = excluded.patch_path,
                   transcript_path = excluded.transcript_path,
                   error_kind = excluded.error_kind,
                   error_message = excluded.error_message,
                   eval_details = excluded.eval_details,
                   updated_at = excluded.updated_at"#,
        )
        .bind(&task.id)
        .bind(task.run_id.to_string())
        .bind(i64::from(task.step_index))
        .bind(i64::from(task.generation))
        .bind(i64::from(task.index))
        .bind(&task.vendor)
        .bind(&task.prompt)
        .bind(serde_json::to_string(&task.strategy)?)
        .bind(task.workspace.root.to_string_lossy().to_string())
        .bind(task.status.as_str())
        .bind(task.exit_code)
        .bind(task.score)
        .bind(&task.patch_path)
        .bind(&task.transcript_path)
        .bind(&task.error_kind)
        .bind(&task.error_message)
        .bind(&task.eval_details)
        .bind(task.created_at.to_rfc3339())
        .bind(task.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_run(&self, id: Uuid) -> DomainResult<Option<Run>> {
        let row: Option<RunRow> = sqlx::query_as("SELECT * FROM runs WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut run: Run = row.try_into()?;
        self.load_children(&mut run).await?;
        Ok(Some(run))
    }

    async fn resolve_run_id(&self, prefix: &str) -> DomainResult<Option<Uuid>> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT id FROM runs WHERE id LIKE ? || '%' LIMIT 2")
            .bind(prefix)
            .fetch_all(&self.pool)
            .await?;

        match rows.as_slice() {
            [(id,)] => parse_uuid(id).map(Some),
            [] => Ok(None),
            _ => Err(DomainError::ValidationFailed(format!(
                "Run id prefix '{prefix}' is ambiguous"
            ))),
        }
    }

    async fn list_runs(&self, limit: usize) -> DomainResult<Vec<Run>> {
        let rows: Vec<RunRow> = sqlx::query_as("SELECT * FROM runs ORDER BY created_at DESC LIMIT ?")
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn latest_run(&self) -> DomainResult<Option<Run>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT id FROM runs ORDER BY created_at DESC LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some((id,)) => self.get_run(parse_uuid(&id)?).await,
            None => Ok(None),
        }
    }

    async fn find_agent_task(&self, agent_id: &str) -> DomainResult<Option<AgentTask>> {
        let row: Option<AgentTaskRow> = sqlx::query_as("SELECT * FROM agent_tasks WHERE id = ?")
            .bind(agent_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn acquire_writer(&self, run_id: Uuid, writer_id: &str, steal: bool) -> DomainResult<()> {
        let result = sqlx::query(
            "UPDATE runs SET writer_id = ? WHERE id = ? AND (writer_id IS NULL OR writer_id = ? OR ?)",
        )
        .bind(writer_id)
        .bind(run_id.to_string())
        .bind(writer_id)
        .bind(steal)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(());
        }

        let holder: Option<(Option<String>,)> = sqlx::query_as("SELECT writer_id FROM runs WHERE id = ?")
            .bind(run_id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        match holder {
            None => Err(DomainError::RunNotFound(run_id)),
            Some((holder,)) => Err(DomainError::Persistence(format!(
                "Run {run_id} is being driven by another orchestrator ({})",
                holder.unwrap_or_default()
            ))),
        }
    }

    async fn release_writer(&self, run_id: Uuid, writer_id: &str) -> DomainResult<()> {
        sqlx::query("UPDATE runs SET writer_id = NULL WHERE id = ? AND writer_id = ?")
            .bind(run_id.to_string())
            .bind(writer_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct RunRow {
    id: String,
    plan: String,
    repo_path: String,
    eval_spec: String,
    vendor: String,
    agent_config: Option<String>,
    population_size: i64,
    max_generations: i64,
    status: String,
    error_message: Option<String>,
    created_at: String,
    updated_at: String,
    completed_at: Option<String>,
}

impl TryFrom<RunRow> for Run {
    type Error = DomainError;

    fn try_from(row: RunRow) -> Result<Self, Self::Error> {
        let status = RunStatus::from_str(&row.status)
            .ok_or_else(|| DomainError::SerializationError(format!("Invalid run status: {}", row.status)))?;
        let eval: EvalSpec = serde_json::from_str(&row.eval_spec)?;
        let agent_config: serde_json::Value = parse_json_or_default(row.agent_config)?;

        Ok(Run {
            id: parse_uuid(&row.id)?,
            plan: row.plan,
            repo_path: PathBuf::from(row.repo_path),
            eval,
            vendor: row.vendor,
            agent_config,
            population_size: u32::try_from(row.population_size).unwrap_or(0),
            max_generations: u32::try_from(row.max_generations).unwrap_or(0),
            status,
            steps: Vec::new(),
            error_message: row.error_message,
            created_at: parse_datetime(&row.created_at)?,
            updated_at: parse_datetime(&row.updated_at)?,
            completed_at: parse_optional_datetime(row.completed_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct StepRow {
    run_id: String,
    step_index: i64,
    description: String,
    prompt: String,
    status: String,
    winner_agent_id: Option<String>,
    created_at: String,
    updated_at: String,
}

impl TryFrom<StepRow> for Step {
    type Error = DomainError;

    fn try_from(row: StepRow) -> Result<Self, Self::Error> {
        let status = StepStatus::from_str(&row.status)
            .ok_or_else(|| DomainError::SerializationError(format!("Invalid step status: {}", row.status)))?;

        Ok(Step {
            run_id: parse_uuid(&row.run_id)?,
            index: to_u32(row.step_index)?,
            description: row.description,
            prompt: row.prompt,
            status,
            generations: Vec::new(),
            winner_agent_id: row.winner_agent_id,
            created_at: parse_datetime(&row.created_at)?,
            updated_at: parse_datetime(&row.updated_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct GenerationRow {
    run_id: String,
    step_index: i64,
    generation_index: i64,
    phase: String,
    hypotheses: Option<String>,
    winner_index: Option<i64>,
    created_at: String,
    updated_at: String,
}

impl TryFrom<GenerationRow> for Generation {
    type Error = DomainError;

    fn try_from(row: GenerationRow) -> Result<Self, Self::Error> {
        let phase = GenerationPhase::from_str(&row.phase)
            .ok_or_else(|| DomainError::SerializationError(format!("Invalid generation phase: {}", row.phase)))?;

        Ok(Generation {
            run_id: parse_uuid(&row.run_id)?,
            step_index: to_u32(row.step_index)?,
            index: to_u32(row.generation_index)?,
            phase,
            hypotheses: parse_json_or_default(row.hypotheses)?,
            tasks: Vec::new(),
            winner: row.winner_index.map(to_u32).transpose()?,
            created_at: parse_datetime(&row.created_at)?,
            updated_at: parse_datetime(&row.updated_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct AgentTaskRow {
    id: String,
    run_id: String,
    step_index: i64,
    generation_index: i64,
    agent_index: i64,
    vendor: String,
    prompt: String,
    strategy: String,
    workspace: String,
    status: String,
    exit_code: Option<i64>,
    score: Option<f64>,
    patch_path: Option<String>,
    transcript_path: Option<String>,
    error_kind: Option<String>,
    error_message: Option<String>,
    eval_details: Option<String>,
    created_at: String,
    updated_at: String,
}

impl TryFrom<AgentTaskRow> for AgentTask {
    type Error = DomainError;

    fn try_from(row: AgentTaskRow) -> Result<Self, Self::Error> {
        let status = AgentTaskStatus::from_str(&row.status)
            .ok_or_else(|| DomainError::SerializationError(format!("Invalid agent status: {}", row.status)))?;

        Ok(AgentTask {
            id: row.id,
            run_id: parse_uuid(&row.run_id)?,
            step_index: to_u32(row.step_index)?,
            generation: to_u32(row.generation_index)?,
            index: to_u32(row.agent_index)?,
            vendor: row.vendor,
            prompt: row.prompt,
            strategy: serde_json::from_str(&row.strategy)?,
            workspace: WorkspacePaths::new(row.workspace),
            status,
            exit_code: row.exit_code.map(|c| c as i32),
            score: row.score,
            patch_path: row.patch_path,
            transcript_path: row.transcript_path,
            error_kind: row.error_kind,
            error_message: row.error_message,
            eval_details: row.eval_details,
            created_at: parse_datetime(&row.created_at)?,
            updated_at: parse_datetime(&row.updated_at)?,
        })
    }
}

fn to_u32(value: i64) -> DomainResult<u32> {
    u32::try_from(value).map_err(|e| DomainError::SerializationError(e.to_string()))
}
