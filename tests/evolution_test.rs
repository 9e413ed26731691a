//! End-to-end evolution runs against the real stack: SQLite state, the
//! polling engine and process sandboxes running `phylum sandbox-exec` with
//! scripted shell agents.

mod common;

use std::sync::Arc;
use uuid::Uuid;

use common::{Fixture, FlakyEngine};
use phylum::adapters::reasoners::ScriptedReasoner;
use phylum::adapters::vendors::{LineParser, ShellVendor, VendorRegistry};
use phylum::adapters::workflow::create_engine;
use phylum::domain::errors::{DomainError, DomainResult};
use phylum::domain::models::{
    AgentTask, AgentTaskStatus, GenerationPhase, PromptDimension, Run, RunStatus, StepStatus, TaskConfig,
};
use phylum::domain::ports::{AgentInvocation, AgentVendor, RunRepository, TranscriptParser};
use phylum::services::EvolutionOrchestrator;

/// Only variant 1 fixes the answer.
const SECOND_AGENT_FIXES: &str = r#"if [ "$PHYLUM_VARIANT_INDEX" = 1 ]; then echo fixed > answer.txt; fi; echo attempt"#;

#[tokio::test]
async fn test_first_generation_winner_is_applied() {
    common::setup_test_logging();
    let fixture = Fixture::new();
    let repository = common::repository().await;
    let reasoner = Arc::new(ScriptedReasoner::new());
    let orchestrator =
        common::orchestrator(repository.clone(), &fixture.config(), common::vendors(), reasoner.clone());

    let run = orchestrator.start(fixture.request(SECOND_AGENT_FIXES, 2, 3)).await.unwrap();

    assert_eq!(run.status, RunStatus::Done);
    assert!(run.completed_at.is_some());
    assert_eq!(fixture.answer(), "fixed\n");

    let step = &run.steps[0];
    assert_eq!(step.status, StepStatus::Done);
    assert_eq!(step.generations.len(), 1);
    let generation = &step.generations[0];
    assert_eq!(generation.phase, GenerationPhase::Decided);
    assert_eq!(generation.winner, Some(1));
    assert_eq!(step.winner_agent_id.as_deref(), Some(generation.tasks[1].id.as_str()));

    // the failing agent earns partial credit from the test summary
    assert_eq!(generation.tasks[0].score, Some(0.5));
    assert_eq!(generation.tasks[1].score, Some(1.0));

    // only the decomposition call; no analysis after a winning generation
    assert_eq!(reasoner.prompts().len(), 1);

    let stored = repository.get_run(run.id).await.unwrap().unwrap();
    assert_eq!(stored.status, RunStatus::Done);
    assert_eq!(stored.steps[0].generations[0].tasks.len(), 2);
}

#[tokio::test]
async fn test_single_generation_of_three_picks_the_only_passing_agent() {
    let fixture = Fixture::new();
    let repository = common::repository().await;
    let orchestrator = common::orchestrator(
        repository.clone(),
        &fixture.config(),
        common::vendors(),
        Arc::new(ScriptedReasoner::new()),
    );

    let run = orchestrator.start(fixture.request(SECOND_AGENT_FIXES, 3, 1)).await.unwrap();

    assert_eq!(run.status, RunStatus::Done);
    assert_eq!(fixture.answer(), "fixed\n");
    let generation = &run.steps[0].generations[0];
    assert_eq!(generation.tasks.len(), 3);
    assert_eq!(generation.winner, Some(1));
    let scores: Vec<_> = generation.tasks.iter().map(|t| t.score).collect();
    assert_eq!(scores, vec![Some(0.5), Some(1.0), Some(0.5)]);
    assert_eq!(fixture.launches().len(), 3);
}

#[tokio::test]
async fn test_runs_sharing_an_id_prefix_stay_isolated() {
    let fixture = Fixture::new();
    let repository = common::repository().await;
    let orchestrator = common::orchestrator(
        repository.clone(),
        &fixture.config(),
        common::vendors(),
        Arc::new(ScriptedReasoner::new()),
    );

    let mut first = Run::new(fixture.request(SECOND_AGENT_FIXES, 2, 1));
    first.id = Uuid::parse_str("deadbeef-0000-4000-8000-000000000000").unwrap();
    repository.create_run(&first).await.unwrap();
    let first = orchestrator.execute(first, false).await.unwrap();
    assert_eq!(first.status, RunStatus::Done);

    std::fs::write(fixture.repo().join("answer.txt"), "broken\n").unwrap();

    let mut second = Run::new(fixture.request("true", 2, 1));
    second.id = Uuid::parse_str("deadbeef-ffff-4fff-bfff-ffffffffffff").unwrap();
    repository.create_run(&second).await.unwrap();
    let second = orchestrator.execute(second, false).await.unwrap();

    // the second run launches its own agents instead of adopting the first run's
    assert_eq!(second.status, RunStatus::Failed);
    assert_eq!(fixture.answer(), "broken\n");
    let second_ids: Vec<String> = (0..2).map(|i| AgentTask::task_id(second.id, 0, 1, i)).collect();
    let launches = fixture.launches();
    assert!(second_ids.iter().all(|id| launches.contains(id)));
    assert_eq!(launches.len(), 4);

    let stored_first = repository.get_run(first.id).await.unwrap().unwrap();
    let stored_second = repository.get_run(second.id).await.unwrap().unwrap();
    assert_eq!(stored_first.steps[0].generations[0].winner, Some(1));
    assert_eq!(stored_first.steps[0].generations[0].tasks.len(), 2);
    assert_eq!(stored_second.steps[0].generations[0].tasks.len(), 2);
    assert!(stored_second.steps[0].generations[0]
        .tasks
        .iter()
        .all(|t| t.run_id == second.id));
}

#[tokio::test]
async fn test_second_generation_wins_after_analysis() {
    let fixture = Fixture::new();
    let repository = common::repository().await;
    let reasoner = Arc::new(
        ScriptedReasoner::new()
            .with_response(r#"[{"description": "fix answer", "prompt": "Make answer.txt say fixed"}]"#)
            .with_response(
                r#"{"hypotheses": [{"rationale": "nobody touched answer.txt", "dimension": "scope", "directive": "Edit answer.txt"}]}"#,
            ),
    );
    let orchestrator =
        common::orchestrator(repository.clone(), &fixture.config(), common::vendors(), reasoner.clone());

    let script = r#"if [ "$PHYLUM_GENERATION" = 2 ] && [ "$PHYLUM_VARIANT_INDEX" = 0 ]; then echo fixed > answer.txt; fi"#;
    let run = orchestrator.start(fixture.request(script, 2, 3)).await.unwrap();

    assert_eq!(run.status, RunStatus::Done);
    assert_eq!(fixture.answer(), "fixed\n");

    let step = &run.steps[0];
    assert_eq!(step.description, "fix answer");
    assert_eq!(step.generations.len(), 2);
    assert_eq!(step.generations[0].winner, None);

    let second = &step.generations[1];
    assert_eq!(second.hypotheses.len(), 1);
    assert_eq!(second.hypotheses[0].dimension, PromptDimension::Scope);
    assert!(second.tasks.iter().all(|t| t.prompt.contains("Edit answer.txt")));
    assert_eq!(second.winner, Some(0));
    assert_eq!(
        step.winner_agent_id.as_deref(),
        Some(AgentTask::task_id(run.id, 0, 2, 0).as_str())
    );

    let prompts = reasoner.prompts();
    assert_eq!(prompts.len(), 2);
    assert!(prompts[1].contains(&step.generations[0].tasks[0].id));
}

#[tokio::test]
async fn test_exhausted_generations_fail_the_run() {
    let fixture = Fixture::new();
    let repository = common::repository().await;
    let reasoner = Arc::new(ScriptedReasoner::new());
    let orchestrator =
        common::orchestrator(repository.clone(), &fixture.config(), common::vendors(), reasoner.clone());

    let run = orchestrator.start(fixture.request("echo still broken", 2, 2)).await.unwrap();

    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(
        run.error_message.as_deref(),
        Some("step 0 found no passing agent in 2 generations")
    );
    assert_eq!(run.steps[0].status, StepStatus::Failed);
    assert_eq!(run.steps[0].generations.len(), 2);
    assert_eq!(fixture.answer(), "broken\n");

    // the failed analysis falls back to a generic mutation
    let second = &run.steps[0].generations[1];
    assert!(second.hypotheses.iter().all(|h| h.generic));
    assert_eq!(reasoner.prompts().len(), 2);
}

/// Shell vendor that cannot build a configuration for variant 1.
struct PickyVendor(ShellVendor);

impl AgentVendor for PickyVendor {
    fn name(&self) -> &'static str {
        "shell"
    }

    fn approaches(&self) -> &[&'static str] {
        self.0.approaches()
    }

    fn build_task_config(&self, task: &AgentTask, agent_config: &serde_json::Value) -> DomainResult<TaskConfig> {
        if task.index == 1 {
            return Err(DomainError::Setup("variant 1 has no credentials".to_string()));
        }
        Ok(TaskConfig {
            version: 1,
            id: task.id.clone(),
            vendor: self.name().to_string(),
            prompt: task.prompt.clone(),
            agent_config: agent_config.clone(),
            strategy: Some(task.strategy.clone()),
            generation: task.generation,
            index: task.index,
        })
    }

    fn invocation(&self, config: &TaskConfig) -> DomainResult<AgentInvocation> {
        self.0.invocation(config)
    }

    fn transcript_parser(&self) -> Box<dyn TranscriptParser> {
        Box::new(LineParser)
    }
}

#[tokio::test]
async fn test_setup_error_scores_zero_without_aborting() {
    let fixture = Fixture::new();
    let repository = common::repository().await;
    let mut registry = VendorRegistry::new();
    registry.register("shell", || Box::new(PickyVendor(ShellVendor::new())));
    let orchestrator = common::orchestrator(
        repository.clone(),
        &fixture.config(),
        Arc::new(registry),
        Arc::new(ScriptedReasoner::new()),
    );

    let run = orchestrator.start(fixture.request("echo fixed > answer.txt", 2, 1)).await.unwrap();

    assert_eq!(run.status, RunStatus::Done);
    let tasks = &run.steps[0].generations[0].tasks;
    assert_eq!(tasks[1].status, AgentTaskStatus::Error);
    assert_eq!(tasks[1].error_kind.as_deref(), Some("setup"));
    assert_eq!(tasks[1].score, Some(0.0));
    assert_eq!(run.steps[0].generations[0].winner, Some(0));

    // the misconfigured agent never ran
    assert_eq!(fixture.launches(), vec![tasks[0].id.clone()]);
}

#[tokio::test]
async fn test_missing_task_config_in_population_of_three() {
    let fixture = Fixture::new();
    let repository = common::repository().await;
    let mut registry = VendorRegistry::new();
    registry.register("shell", || Box::new(PickyVendor(ShellVendor::new())));
    let orchestrator = common::orchestrator(
        repository.clone(),
        &fixture.config(),
        Arc::new(registry),
        Arc::new(ScriptedReasoner::new()),
    );

    let run = orchestrator
        .start(fixture.request("echo fixed > answer.txt", 3, 1))
        .await
        .unwrap();

    assert_eq!(run.status, RunStatus::Done);
    let generation = &run.steps[0].generations[0];
    let statuses: Vec<_> = generation.tasks.iter().map(|t| t.status).collect();
    assert_eq!(
        statuses,
        vec![AgentTaskStatus::Done, AgentTaskStatus::Error, AgentTaskStatus::Done]
    );
    assert_eq!(generation.tasks[1].error_kind.as_deref(), Some("setup"));
    assert_eq!(generation.tasks[1].score, Some(0.0));
    assert_eq!(generation.winner, Some(0));

    let mut launches = fixture.launches();
    launches.sort();
    assert_eq!(launches, vec![generation.tasks[0].id.clone(), generation.tasks[2].id.clone()]);
}

#[tokio::test]
async fn test_timed_out_agent_is_terminated() {
    let fixture = Fixture::new();
    let mut config = fixture.config();
    config.evolution.agent_timeout_secs = 3;
    let repository = common::repository().await;
    let orchestrator =
        common::orchestrator(repository.clone(), &config, common::vendors(), Arc::new(ScriptedReasoner::new()));

    let script = r#"if [ "$PHYLUM_VARIANT_INDEX" = 1 ]; then sleep 60; else echo fixed > answer.txt; fi"#;
    let run = orchestrator.start(fixture.request(script, 2, 1)).await.unwrap();

    assert_eq!(run.status, RunStatus::Done);
    let slow = &run.steps[0].generations[0].tasks[1];
    assert_eq!(slow.status, AgentTaskStatus::Error);
    assert_eq!(slow.score, Some(0.0));
    assert!(slow.error_message.as_deref().unwrap_or_default().contains("timed out"));
}

#[tokio::test]
async fn test_protected_paths_defeat_tampering() {
    let fixture = Fixture::new();
    std::fs::write(fixture.repo().join("expected.txt"), "fixed\n").unwrap();
    let repository = common::repository().await;
    let orchestrator = common::orchestrator(
        repository.clone(),
        &fixture.config(),
        common::vendors(),
        Arc::new(ScriptedReasoner::new()),
    );

    // variant 0 rewrites the expectation to match its wrong answer
    let script = r#"if [ "$PHYLUM_VARIANT_INDEX" = 0 ]; then echo cheat > answer.txt; echo cheat > expected.txt; else echo fixed > answer.txt; fi"#;
    let mut request = fixture.request(script, 2, 1);
    request.eval = phylum::domain::models::EvalSpec::new("cmp -s answer.txt expected.txt")
        .with_protected_paths(vec!["expected.txt".to_string()]);

    let run = orchestrator.start(request).await.unwrap();

    assert_eq!(run.status, RunStatus::Done);
    assert_eq!(run.steps[0].generations[0].winner, Some(1));
    assert_eq!(run.steps[0].generations[0].tasks[0].score, Some(0.0));
    assert_eq!(fixture.answer(), "fixed\n");
    assert_eq!(std::fs::read_to_string(fixture.repo().join("expected.txt")).unwrap(), "fixed\n");
}

#[tokio::test]
async fn test_resume_after_infrastructure_failure() {
    let fixture = Fixture::new();
    let config = fixture.config();
    let repository = common::repository().await;

    let flaky = Arc::new(FlakyEngine::failing_on(create_engine(&config).unwrap(), 2));
    let first = EvolutionOrchestrator::new(
        repository.clone(),
        flaky.clone(),
        common::vendors(),
        Arc::new(ScriptedReasoner::new()),
        common::settings(&config),
    );
    let run = first
        .create_run(fixture.request("echo fixed > answer.txt", 2, 1))
        .await
        .unwrap();

    let err = first.execute(run.clone(), false).await.unwrap_err();
    assert!(err.is_fatal());
    assert_eq!(flaky.submits(), 2);

    // the aborted run stays resumable with its error recorded
    let stored = repository.get_run(run.id).await.unwrap().unwrap();
    assert_eq!(stored.status, RunStatus::Running);
    assert!(stored.error_message.unwrap().contains("backend unavailable"));
    assert_eq!(stored.steps[0].generations[0].phase, GenerationPhase::Spawn);
    assert_eq!(stored.steps[0].generations[0].tasks.len(), 1);

    let first_task = AgentTask::task_id(run.id, 0, 1, 0);
    fixture.wait_terminal(&first_task).await;

    let second = common::orchestrator(
        repository.clone(),
        &config,
        common::vendors(),
        Arc::new(ScriptedReasoner::new()),
    );
    let resumed = second.resume(run.id).await.unwrap();

    assert_eq!(resumed.status, RunStatus::Done);
    assert!(resumed.error_message.is_none());
    assert_eq!(fixture.answer(), "fixed\n");

    // every agent ran exactly once across both orchestrators
    let mut launches = fixture.launches();
    launches.sort();
    assert_eq!(launches, vec![first_task, AgentTask::task_id(run.id, 0, 1, 1)]);

    // resuming a finished run is a no-op
    let again = second.resume(run.id).await.unwrap();
    assert_eq!(again.status, RunStatus::Done);
    assert_eq!(fixture.launches().len(), 2);
}

#[tokio::test]
async fn test_create_run_rejects_invalid_requests() {
    let fixture = Fixture::new();
    let repository = common::repository().await;
    let orchestrator = common::orchestrator(
        repository.clone(),
        &fixture.config(),
        common::vendors(),
        Arc::new(ScriptedReasoner::new()),
    );

    let mut request = fixture.request("true", 0, 1);
    assert!(matches!(
        orchestrator.create_run(request.clone()).await,
        Err(DomainError::ValidationFailed(_))
    ));

    request.population_size = 1;
    request.vendor = "copilot".to_string();
    assert!(matches!(
        orchestrator.create_run(request.clone()).await,
        Err(DomainError::UnknownVendor(_))
    ));

    request.vendor = "shell".to_string();
    request.repo_path = fixture.dir.path().join("missing");
    assert!(orchestrator.create_run(request).await.is_err());

    assert!(repository.list_runs(10).await.unwrap().is_empty());
}
