//! Common test utilities for integration tests
//!
//! Builds the real orchestration stack (SQLite state store, polling engine,
//! process sandboxes running the `phylum` binary) around throwaway
//! repositories and scripted shell agents.

#![allow(dead_code)]

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use phylum::adapters::reasoners::ScriptedReasoner;
use phylum::adapters::sqlite::{create_migrated_test_pool, SqliteRunRepository};
use phylum::adapters::vendors::VendorRegistry;
use phylum::adapters::workflow::create_engine;
use phylum::domain::errors::{DomainError, DomainResult};
use phylum::domain::models::{AgentTaskStatus, Config, EvalSpec, RunRequest, WorkspacePaths};
use phylum::domain::ports::{SandboxTask, TaskArtifacts, TaskHandle, VendorFactory, WorkflowEngine};
use phylum::services::{workspace, EvolutionOrchestrator, OrchestratorSettings};

/// Eval that passes once `answer.txt` says "fixed".
pub const EVAL_COMMAND: &str = "if grep -q fixed answer.txt; then exit 0; else cat summary.txt; exit 1; fi";

/// Setup test logging
///
/// Initializes tracing subscriber for test output.
pub fn setup_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// A project directory holding the repository under repair and the
/// workspaces of every agent.
pub struct Fixture {
    pub dir: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let repo = dir.path().join("repo");
        std::fs::create_dir_all(&repo).unwrap();
        std::fs::write(repo.join("answer.txt"), "broken\n").unwrap();
        std::fs::write(repo.join("summary.txt"), "1 passed, 1 failed\n").unwrap();
        Self { dir }
    }

    pub fn repo(&self) -> PathBuf {
        self.dir.path().join("repo")
    }

    pub fn workspaces(&self) -> PathBuf {
        self.dir.path().join("workspaces")
    }

    /// File every agent appends its id to when it starts.
    pub fn launch_log(&self) -> PathBuf {
        self.dir.path().join("launches.log")
    }

    pub fn launches(&self) -> Vec<String> {
        std::fs::read_to_string(self.launch_log())
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    pub fn answer(&self) -> String {
        std::fs::read_to_string(self.repo().join("answer.txt")).unwrap()
    }

    /// Configuration whose process sandboxes run the freshly built binary.
    pub fn config(&self) -> Config {
        let mut config = Config::default();
        config.sandbox.workspaces_dir = self.workspaces().display().to_string();
        config.sandbox.runner_program = Some(env!("CARGO_BIN_EXE_phylum").to_string());
        config.evolution.poll_interval_ms = 50;
        config
    }

    /// A shell-agent run whose agent executes `agent_script`. Every agent
    /// first records its launch.
    pub fn request(&self, agent_script: &str, population: u32, generations: u32) -> RunRequest {
        let command = format!(
            "echo \"$PHYLUM_AGENT_ID\" >> '{}'; {agent_script}",
            self.launch_log().display()
        );
        RunRequest {
            plan: "Make answer.txt say fixed".to_string(),
            repo_path: self.repo(),
            eval: EvalSpec::new(EVAL_COMMAND).with_timeout(30),
            vendor: "shell".to_string(),
            agent_config: serde_json::json!({ "command": command }),
            population_size: population,
            max_generations: generations,
        }
    }

    pub fn workspace(&self, task_id: &str) -> WorkspacePaths {
        WorkspacePaths::new(self.workspaces().join(task_id))
    }

    /// Wait until the sandbox for `task_id` has recorded a terminal status.
    pub async fn wait_terminal(&self, task_id: &str) {
        let ws = self.workspace(task_id);
        for _ in 0..200 {
            if let Some(status) = workspace::read_status(&ws).await {
                if status.status.is_terminal() {
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("task {task_id} never finished");
    }
}

pub async fn repository() -> Arc<SqliteRunRepository> {
    let pool = create_migrated_test_pool().await.expect("Failed to create test pool");
    Arc::new(SqliteRunRepository::new(pool))
}

pub fn settings(config: &Config) -> OrchestratorSettings {
    OrchestratorSettings::from(&config.evolution)
}

/// Orchestrator over the real polling engine and process driver.
pub fn orchestrator(
    repository: Arc<SqliteRunRepository>,
    config: &Config,
    vendors: Arc<dyn VendorFactory>,
    reasoner: Arc<ScriptedReasoner>,
) -> EvolutionOrchestrator {
    let engine = create_engine(config).expect("Failed to create engine");
    EvolutionOrchestrator::new(repository, engine, vendors, reasoner, settings(config))
}

pub fn vendors() -> Arc<VendorRegistry> {
    Arc::new(VendorRegistry::new())
}

/// Engine wrapper that fails one chosen submission with an infrastructure
/// error and counts the rest.
pub struct FlakyEngine {
    inner: Arc<dyn WorkflowEngine>,
    fail_on_submit: usize,
    submits: AtomicUsize,
}

impl FlakyEngine {
    /// Fail the `n`th submission (1-based).
    pub fn failing_on(inner: Arc<dyn WorkflowEngine>, n: usize) -> Self {
        Self {
            inner,
            fail_on_submit: n,
            submits: AtomicUsize::new(0),
        }
    }

    pub fn submits(&self) -> usize {
        self.submits.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WorkflowEngine for FlakyEngine {
    fn name(&self) -> &'static str {
        "flaky"
    }

    async fn submit(&self, task: &SandboxTask) -> DomainResult<TaskHandle> {
        let n = self.submits.fetch_add(1, Ordering::SeqCst) + 1;
        if n == self.fail_on_submit {
            return Err(DomainError::WorkflowInfrastructure("backend unavailable".to_string()));
        }
        self.inner.submit(task).await
    }

    async fn poll(&self, handle: &TaskHandle) -> DomainResult<AgentTaskStatus> {
        self.inner.poll(handle).await
    }

    async fn fetch_results(&self, handle: &TaskHandle) -> DomainResult<TaskArtifacts> {
        self.inner.fetch_results(handle).await
    }

    async fn cancel(&self, handle: &TaskHandle, reason: &str) -> DomainResult<()> {
        self.inner.cancel(handle, reason).await
    }
}

/// Run `phylum` from `dir`.
pub fn phylum_cmd(dir: &Path) -> assert_cmd::Command {
    let mut cmd = assert_cmd::Command::new(env!("CARGO_BIN_EXE_phylum"));
    cmd.current_dir(dir).env_remove("RUST_LOG");
    cmd
}
