//! Evolution orchestrator.
//!
//! Drives a run through its steps in order. Each step runs generations of
//! agents through `spawn → await → score → decide` until one agent passes
//! or the generation cap is reached. Every phase transition is persisted
//! before the next phase starts, so a restarted orchestrator continues from
//! the recorded phase and resubmits in-flight tasks under the same
//! identities.
//!
//! Agent-level failures (setup, execution, timeout, eval harness) become a
//! score of 0. Only fatal errors (see [`DomainError::is_fatal`]) abort the
//! run; an aborted run stays resumable.

use chrono::Utc;
use futures::future::join_all;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    AgentTask, AgentTaskStatus, EvalSpec, EvolutionConfig, Generation, GenerationPhase,
    Hypothesis, Run, RunRequest, RunStatus, Step, StepStatus, WorkspacePaths,
};
use crate::domain::ports::{
    AgentVendor, Reasoner, RunRepository, SandboxTask, TaskHandle, VendorFactory, WorkflowEngine,
};
use crate::services::{selection, workspace, EvalHarness, HypothesisEngine, PlanDecomposer};

/// Tunables that apply to every run an orchestrator drives.
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorSettings {
    /// Minimum score that counts as a pass.
    pub pass_threshold: f64,
    /// Agents compared at each end of the ranking during analysis.
    pub analysis_top_k: usize,
    /// Wall clock limit per agent, measured from when awaiting starts.
    pub agent_timeout: Duration,
    pub poll_interval: Duration,
}

impl From<&EvolutionConfig> for OrchestratorSettings {
    fn from(config: &EvolutionConfig) -> Self {
        Self {
            pass_threshold: config.pass_threshold,
            analysis_top_k: config.analysis_top_k,
            agent_timeout: Duration::from_secs(config.agent_timeout_secs),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
        }
    }
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from(&EvolutionConfig::default())
    }
}

/// Run-level values every phase needs, detached from the mutable run.
struct RunContext {
    run_id: Uuid,
    repo_path: PathBuf,
    eval: EvalSpec,
    agent_config: serde_json::Value,
    population_size: u32,
    max_generations: u32,
}

impl RunContext {
    fn new(run: &Run) -> Self {
        Self {
            run_id: run.id,
            repo_path: run.repo_path.clone(),
            eval: run.eval.clone(),
            agent_config: run.agent_config.clone(),
            population_size: run.population_size,
            max_generations: run.max_generations,
        }
    }
}

/// What a step needs next, derived from its latest generation.
enum StepAction {
    Open,
    Drive,
    Commit,
    Exhausted,
    Analyze,
}

/// Drives runs through decomposition, generations and winner commits.
///
/// Every state change is persisted before the next one starts, so a run
/// interrupted at any point can be picked up by [`resume`].
///
/// [`resume`]: EvolutionOrchestrator::resume
pub struct EvolutionOrchestrator {
    repository: Arc<dyn RunRepository>,
    engine: Arc<dyn WorkflowEngine>,
    vendors: Arc<dyn VendorFactory>,
    decomposer: PlanDecomposer,
    hypotheses: HypothesisEngine,
    eval: EvalHarness,
    settings: OrchestratorSettings,
    writer_id: String,
}

impl EvolutionOrchestrator {
    /// Build an orchestrator; the reasoner is shared by decomposition and
    /// failure analysis.
    pub fn new(
        repository: Arc<dyn RunRepository>,
        engine: Arc<dyn WorkflowEngine>,
        vendors: Arc<dyn VendorFactory>,
        reasoner: Arc<dyn Reasoner>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            repository,
            engine,
            vendors,
            decomposer: PlanDecomposer::new(reasoner.clone()),
            hypotheses: HypothesisEngine::new(reasoner, settings.analysis_top_k),
            eval: EvalHarness::new(),
            settings,
            writer_id: format!("{}-{}", std::process::id(), Uuid::new_v4().simple()),
        }
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Validate and persist a new pending run.
    pub async fn create_run(&self, request: RunRequest) -> DomainResult<Run> {
        if request.plan.trim().is_empty() {
            return Err(DomainError::ValidationFailed("plan is empty".to_string()));
        }
        if request.eval.command.trim().is_empty() {
            return Err(DomainError::ValidationFailed("eval command is empty".to_string()));
        }
        if request.population_size == 0 {
            return Err(DomainError::ValidationFailed("population size must be at least 1".to_string()));
        }
        if request.max_generations == 0 {
            return Err(DomainError::ValidationFailed("max generations must be at least 1".to_string()));
        }
        if !request.repo_path.is_dir() {
            return Err(DomainError::ValidationFailed(format!(
                "repository {} is not a directory",
                request.repo_path.display()
            )));
        }
        self.vendors.resolve(&request.vendor)?;

        let run = Run::new(request);
        self.repository.create_run(&run).await?;
        info!(run_id = %run.id, vendor = %run.vendor, population = run.population_size, max_generations = run.max_generations, "Run created");
        Ok(run)
    }

    /// Create a run and drive it to a terminal state.
    pub async fn start(&self, request: RunRequest) -> DomainResult<Run> {
        let run = self.create_run(request).await?;
        self.execute(run, false).await
    }

    /// Continue a run from its persisted state. Terminal runs are returned
    /// unchanged.
    pub async fn resume(&self, run_id: Uuid) -> DomainResult<Run> {
        let run = self
            .repository
            .get_run(run_id)
            .await?
            .ok_or(DomainError::RunNotFound(run_id))?;

        if run.status.is_terminal() {
            info!(run_id = %run.id, status = run.status.as_str(), "Run already finished, nothing to resume");
            return Ok(run);
        }
        info!(run_id = %run.id, status = run.status.as_str(), "Resuming run");
        self.execute(run, true).await
    }

    /// Drive `run` while holding its writer lease.
    ///
    /// `steal` takes the lease over from a writer that died without
    /// releasing it.
    pub async fn execute(&self, mut run: Run, steal: bool) -> DomainResult<Run> {
        self.repository.acquire_writer(run.id, &self.writer_id, steal).await?;

        let result = self.drive(&mut run).await;

        if let Err(e) = self.engine.reap().await {
            warn!(run_id = %run.id, error = %e, "Failed to reap finished sandboxes");
        }
        if let Err(e) = &result {
            error!(run_id = %run.id, error = %e, error_kind = e.kind(), "Run aborted");
            run.error_message = Some(e.to_string());
            if let Err(persist) = self.repository.update_run(&run).await {
                warn!(run_id = %run.id, error = %persist, "Failed to record abort");
            }
        }
        if let Err(e) = self.repository.release_writer(run.id, &self.writer_id).await {
            warn!(run_id = %run.id, error = %e, "Failed to release writer lease");
        }

        result.map(|()| run)
    }

    #[instrument(skip_all, fields(run_id = %run.id))]
    async fn drive(&self, run: &mut Run) -> DomainResult<()> {
        let vendor = match self.vendors.resolve(&run.vendor) {
            Ok(vendor) => vendor,
            Err(e) => {
                warn!(error = %e, "Run vendor is unavailable");
                run.fail(e.to_string());
                return self.repository.update_run(run).await;
            }
        };

        if run.steps.is_empty() {
            let planned = self
                .decomposer
                .decompose(&run.plan, &run.repo_path.display().to_string())
                .await;
            let steps: Vec<Step> = (0u32..)
                .zip(planned)
                .map(|(index, planned)| Step::new(run.id, index, planned.description, planned.prompt))
                .collect();
            self.repository.insert_steps(&steps).await?;
            run.steps = steps;
        }
        if run.status != RunStatus::Running || run.error_message.is_some() {
            run.error_message = None;
            run.set_status(RunStatus::Running);
            self.repository.update_run(run).await?;
        }

        let ctx = RunContext::new(run);
        for position in 0..run.steps.len() {
            let step = &mut run.steps[position];
            let step_index = step.index;
            let outcome = match step.status {
                StepStatus::Done => continue,
                StepStatus::Failed => StepStatus::Failed,
                StepStatus::Pending | StepStatus::Running => self.run_step(&ctx, step, vendor.as_ref()).await?,
            };

            if outcome == StepStatus::Failed {
                run.fail(format!(
                    "step {step_index} found no passing agent in {} generations",
                    ctx.max_generations
                ));
                self.repository.update_run(run).await?;
                warn!(step = step_index, "Run failed");
                return Ok(());
            }
        }

        run.set_status(RunStatus::Done);
        self.repository.update_run(run).await?;
        info!(steps = run.steps.len(), "Run completed");
        Ok(())
    }

    #[instrument(skip_all, fields(step = step.index))]
    async fn run_step(&self, ctx: &RunContext, step: &mut Step, vendor: &dyn AgentVendor) -> DomainResult<StepStatus> {
        if step.status == StepStatus::Pending {
            step.set_status(StepStatus::Running);
            self.repository.upsert_step(step).await?;
            info!(description = %step.description, "Step started");
        }

        loop {
            let action = match step.generations.last() {
                None => StepAction::Open,
                Some(g) if !g.is_decided() => StepAction::Drive,
                Some(g) if g.winner.is_some() => StepAction::Commit,
                Some(g) if g.index >= ctx.max_generations => StepAction::Exhausted,
                Some(_) => StepAction::Analyze,
            };

            match action {
                StepAction::Open => self.open_generation(ctx, step, 1, Vec::new()).await?,
                StepAction::Drive => {}
                StepAction::Commit => {
                    self.commit_winner(ctx, step).await?;
                    return Ok(StepStatus::Done);
                }
                StepAction::Exhausted => {
                    step.set_status(StepStatus::Failed);
                    self.repository.upsert_step(step).await?;
                    warn!(generations = ctx.max_generations, "Step exhausted its generations");
                    return Ok(StepStatus::Failed);
                }
                StepAction::Analyze => {
                    let (next_index, hypotheses) = match step.generations.last() {
                        Some(previous) => (
                            previous.index + 1,
                            self.hypotheses.analyze(&step.prompt, &previous.tasks, vendor).await,
                        ),
                        None => (1, Vec::new()),
                    };
                    self.open_generation(ctx, step, next_index, hypotheses).await?;
                }
            }

            self.run_generation(ctx, step, vendor).await?;
        }
    }

    async fn open_generation(
        &self,
        ctx: &RunContext,
        step: &mut Step,
        index: u32,
        hypotheses: Vec<Hypothesis>,
    ) -> DomainResult<()> {
        let generation = Generation::new(ctx.run_id, step.index, index, hypotheses);
        self.repository.upsert_generation(&generation).await?;
        info!(generation = index, hypotheses = generation.hypotheses.len(), "Generation opened");
        step.generations.push(generation);
        Ok(())
    }

    /// Advance the step's latest generation from its recorded phase to
    /// `Decided`.
    #[instrument(skip_all, fields(generation = step.generations.len()))]
    async fn run_generation(&self, ctx: &RunContext, step: &mut Step, vendor: &dyn AgentVendor) -> DomainResult<()> {
        let Some(last) = step.generations.len().checked_sub(1) else {
            return Ok(());
        };
        let (earlier, current) = step.generations.split_at_mut(last);
        let generation = &mut current[0];
        let previous = earlier.last();
        let mut handles: HashMap<u32, TaskHandle> = HashMap::new();

        if generation.phase == GenerationPhase::Spawn {
            self.spawn(ctx, &step.prompt, previous, generation, vendor, &mut handles).await?;
        }
        if generation.phase == GenerationPhase::Await {
            self.await_population(ctx, generation, vendor, &mut handles).await?;
        }
        if generation.phase == GenerationPhase::Score {
            self.score(ctx, generation).await?;
        }
        if generation.phase == GenerationPhase::Decide {
            self.decide(generation).await?;
        }
        Ok(())
    }

    async fn spawn(
        &self,
        ctx: &RunContext,
        base_prompt: &str,
        previous: Option<&Generation>,
        generation: &mut Generation,
        vendor: &dyn AgentVendor,
        handles: &mut HashMap<u32, TaskHandle>,
    ) -> DomainResult<()> {
        for index in 0..ctx.population_size {
            if generation.tasks.iter().any(|t| t.index == index) {
                continue;
            }
            let parent = previous.and_then(|p| p.tasks.iter().find(|t| t.index == index));
            let strategy = match parent {
                Some(parent) => vendor.mutate_strategy(&parent.strategy, &generation.hypotheses),
                None => vendor.baseline_strategy(index),
            };
            let prompt = vendor.build_prompt(base_prompt, &strategy);
            generation.tasks.push(AgentTask::new(
                ctx.run_id,
                generation.step_index,
                generation.index,
                index,
                vendor.name(),
                prompt,
                strategy,
                WorkspacePaths::new(""),
            ));
        }
        generation.tasks.sort_by_key(|t| t.index);

        for task in &mut generation.tasks {
            let handle = self.submit(ctx, task, vendor).await?;
            task.workspace = handle.workspace.clone();
            task.updated_at = Utc::now();
            self.repository.upsert_agent_task(task).await?;
            handles.insert(task.index, handle);
        }

        generation.set_phase(GenerationPhase::Await);
        self.repository.upsert_generation(generation).await?;
        info!(agents = generation.tasks.len(), "Population spawned");
        Ok(())
    }

    /// Submit one task. A task whose configuration cannot be built is still
    /// submitted without `task.json`, so the sandbox records the setup error.
    async fn submit(&self, ctx: &RunContext, task: &AgentTask, vendor: &dyn AgentVendor) -> DomainResult<TaskHandle> {
        let config = match vendor.build_task_config(task, &ctx.agent_config) {
            Ok(config) => Some(config),
            Err(e) => {
                warn!(task_id = %task.id, error = %e, "Cannot build task config");
                None
            }
        };
        self.engine
            .submit(&SandboxTask {
                id: task.id.clone(),
                source_repo: ctx.repo_path.clone(),
                config,
                protected_paths: ctx.eval.protected_paths.clone(),
            })
            .await
    }

    /// Wait for every agent to reach a terminal state or its timeout.
    async fn await_population(
        &self,
        ctx: &RunContext,
        generation: &mut Generation,
        vendor: &dyn AgentVendor,
        handles: &mut HashMap<u32, TaskHandle>,
    ) -> DomainResult<()> {
        // Handles are lost across restarts; resubmission adopts the sandbox.
        for task in &generation.tasks {
            if !task.status.is_terminal() && !handles.contains_key(&task.index) {
                let handle = self.submit(ctx, task, vendor).await?;
                handles.insert(task.index, handle);
            }
        }

        let timeout = self.settings.agent_timeout;
        let deadline = Instant::now() + timeout;
        loop {
            let mut in_flight = 0usize;
            for task in generation.tasks.iter_mut().filter(|t| !t.status.is_terminal()) {
                let Some(handle) = handles.get(&task.index) else {
                    continue;
                };
                let status = self.engine.poll(handle).await?;

                if status.is_terminal() {
                    self.collect(task, handle).await?;
                } else if Instant::now() >= deadline {
                    let reason = format!("timed out after {timeout:?}");
                    self.engine.cancel(handle, &reason).await?;
                    self.collect(task, handle).await?;
                    task.fail("agent_execution", reason);
                    warn!(task_id = %task.id, "Agent timed out");
                } else {
                    in_flight += 1;
                    if status == task.status {
                        continue;
                    }
                    task.status = status;
                    task.updated_at = Utc::now();
                }
                self.repository.upsert_agent_task(task).await?;
            }

            if in_flight == 0 {
                break;
            }
            tokio::time::sleep(self.settings.poll_interval).await;
        }

        generation.set_phase(GenerationPhase::Score);
        self.repository.upsert_generation(generation).await?;
        Ok(())
    }

    /// Copy a terminal task's artifacts onto the record.
    async fn collect(&self, task: &mut AgentTask, handle: &TaskHandle) -> DomainResult<()> {
        match self.engine.fetch_results(handle).await {
            Ok(artifacts) => {
                task.status = artifacts.status;
                task.exit_code = artifacts.exit_code;
                task.error_kind = artifacts.error_kind.clone();
                task.error_message = artifacts.error.clone();
                task.patch_path = Some(artifacts.patch_path().display().to_string());
                task.transcript_path = Some(artifacts.transcript_path().display().to_string());
                task.updated_at = Utc::now();
                if artifacts.status == AgentTaskStatus::Error {
                    task.score = Some(0.0);
                }
                info!(task_id = %task.id, status = artifacts.status.as_str(), exit_code = ?artifacts.exit_code, "Agent finished");
                Ok(())
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!(task_id = %task.id, error = %e, "Cannot fetch agent results");
                task.fail(e.kind(), e.to_string());
                Ok(())
            }
        }
    }

    /// Evaluate every finished agent that has no score yet.
    async fn score(&self, ctx: &RunContext, generation: &mut Generation) -> DomainResult<()> {
        let pending: Vec<usize> = generation
            .tasks
            .iter()
            .enumerate()
            .filter(|(_, t)| t.status == AgentTaskStatus::Done && t.score.is_none())
            .map(|(i, _)| i)
            .collect();

        let results = join_all(
            pending
                .iter()
                .map(|&i| self.eval.evaluate(&generation.tasks[i].workspace, &ctx.eval)),
        )
        .await;

        for (i, result) in pending.into_iter().zip(results) {
            let task = &mut generation.tasks[i];
            match result {
                Ok(eval) => {
                    info!(task_id = %task.id, score = eval.score, passed = eval.passed, "Agent scored");
                    task.score = Some(eval.score);
                    task.eval_details = Some(eval.details);
                }
                Err(e) => {
                    warn!(task_id = %task.id, error = %e, error_kind = e.kind(), "Eval harness failed");
                    task.score = Some(0.0);
                    task.error_kind = Some(e.kind().to_string());
                    task.error_message = Some(e.to_string());
                }
            }
            task.updated_at = Utc::now();
            self.repository.upsert_agent_task(task).await?;
        }

        for task in generation.tasks.iter_mut().filter(|t| t.score.is_none()) {
            task.score = Some(0.0);
            self.repository.upsert_agent_task(task).await?;
        }

        generation.set_phase(GenerationPhase::Decide);
        self.repository.upsert_generation(generation).await?;
        Ok(())
    }

    async fn decide(&self, generation: &mut Generation) -> DomainResult<()> {
        let scores: Vec<(u32, f64)> = generation.tasks.iter().map(|t| (t.index, t.effective_score())).collect();
        generation.winner = selection::select_winner(&scores, self.settings.pass_threshold);
        generation.set_phase(GenerationPhase::Decided);
        self.repository.upsert_generation(generation).await?;

        match generation.winner_task() {
            Some(winner) => info!(winner = %winner.id, score = winner.effective_score(), "Winner selected"),
            None => info!(best_score = ?generation.best_score(), threshold = self.settings.pass_threshold, "No agent passed"),
        }
        Ok(())
    }

    /// Apply the winning patch to the run repository and close the step.
    ///
    /// Safe to repeat: a patch that is already applied is not applied again.
    async fn commit_winner(&self, ctx: &RunContext, step: &mut Step) -> DomainResult<()> {
        let winner = step
            .generations
            .last()
            .and_then(Generation::winner_task)
            .cloned()
            .ok_or_else(|| DomainError::ValidationFailed(format!("step {} has no winner", step.index)))?;

        let patch_file = winner.workspace.patch_file();
        let patch = workspace::read_optional(patch_file.clone())
            .await
            .map_err(|e| DomainError::Repository(format!("cannot read patch of {}: {e:#}", winner.id)))?;

        if patch.trim().is_empty() {
            warn!(agent_id = %winner.id, "Winning agent changed nothing, no patch to apply");
        } else if workspace::patch_applied(&ctx.repo_path, &patch_file).await {
            info!(agent_id = %winner.id, "Winning patch already applied");
        } else {
            workspace::apply_patch(&ctx.repo_path, &patch_file)
                .await
                .map_err(|e| DomainError::Repository(format!("cannot apply patch of {}: {e:#}", winner.id)))?;
            info!(agent_id = %winner.id, "Winning patch applied");
        }

        step.winner_agent_id = Some(winner.id);
        step.set_status(StepStatus::Done);
        self.repository.upsert_step(step).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_from_config() {
        let config = EvolutionConfig {
            agent_timeout_secs: 90,
            poll_interval_ms: 250,
            pass_threshold: 0.8,
            ..EvolutionConfig::default()
        };
        let settings = OrchestratorSettings::from(&config);
        assert_eq!(settings.agent_timeout, Duration::from_secs(90));
        assert_eq!(settings.poll_interval, Duration::from_millis(250));
        assert!((settings.pass_threshold - 0.8).abs() < f64::EPSILON);
        assert_eq!(settings.analysis_top_k, config.analysis_top_k);
    }

    #[test]
    fn test_default_settings_require_full_pass() {
        let settings = OrchestratorSettings::default();
        assert!((settings.pass_threshold - 1.0).abs() < f64::EPSILON);
        assert!(settings.agent_timeout > settings.poll_interval);
    }
}
