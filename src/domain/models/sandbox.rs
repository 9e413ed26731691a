//! Shared-filesystem contract between the orchestrator and a sandbox.
//!
//! Every agent task gets one workspace directory with a fixed layout:
//!
//! ```text
//! task.json            { vendor, prompt, agent_config, ... }
//! repo/                git-initialized snapshot the agent mutates in place
//! results/status.json  { status, progress, timestamp, ... }
//! results/output.log   agent stdout
//! results/stderr.log   agent stderr
//! results/patch.diff   all changes since the baseline commit
//! transcript/raw.jsonl raw vendor event stream
//! pristine/            untouched copies of protected eval paths
//! ```
//!
//! The file names and schemas here are versioned by [`CONTRACT_VERSION`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::agent_task::AgentTaskStatus;
use super::strategy::PromptStrategy;

/// Version of the `task.json` / `status.json` contract.
pub const CONTRACT_VERSION: u32 = 1;

pub const TASK_CONFIG_FILE: &str = "task.json";
pub const REPO_DIR: &str = "repo";
pub const RESULTS_DIR: &str = "results";
pub const TRANSCRIPT_DIR: &str = "transcript";
pub const PRISTINE_DIR: &str = "pristine";
pub const EVAL_DIR: &str = "eval";

/// Git tag marking the snapshot the agent started from.
pub const BASELINE_TAG: &str = "phylum-baseline";

/// Resolved paths of one task workspace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkspacePaths {
    pub root: PathBuf,
}

impl WorkspacePaths {
    /// Layout rooted at `root`. Nothing is created on disk.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn task_config(&self) -> PathBuf {
        self.root.join(TASK_CONFIG_FILE)
    }

    pub fn repo(&self) -> PathBuf {
        self.root.join(REPO_DIR)
    }

    pub fn results(&self) -> PathBuf {
        self.root.join(RESULTS_DIR)
    }

    pub fn transcript_dir(&self) -> PathBuf {
        self.root.join(TRANSCRIPT_DIR)
    }

    pub fn pristine(&self) -> PathBuf {
        self.root.join(PRISTINE_DIR)
    }

    pub fn eval_dir(&self) -> PathBuf {
        self.root.join(EVAL_DIR)
    }

    pub fn status_file(&self) -> PathBuf {
        self.results().join("status.json")
    }

    pub fn output_log(&self) -> PathBuf {
        self.results().join("output.log")
    }

    pub fn stderr_log(&self) -> PathBuf {
        self.results().join("stderr.log")
    }

    /// Diff of the agent's changes against the baseline tag.
    pub fn patch_file(&self) -> PathBuf {
        self.results().join("patch.diff")
    }

    /// Vendor event stream as written by the agent.
    pub fn raw_transcript(&self) -> PathBuf {
        self.transcript_dir().join("raw.jsonl")
    }

    /// Whether the directory skeleton has been laid out.
    pub fn exists(&self) -> bool {
        self.results().is_dir() && self.repo().is_dir()
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Contents of `task.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Contract version the orchestrator wrote.
    #[serde(default = "default_contract_version")]
    pub version: u32,
    /// Deterministic task id.
    pub id: String,
    /// Registered vendor name resolved inside the sandbox.
    pub vendor: String,
    /// Fully rendered prompt for the agent.
    pub prompt: String,
    #[serde(default)]
    pub agent_config: serde_json::Value,
    #[serde(default)]
    pub strategy: Option<PromptStrategy>,
    #[serde(default)]
    pub generation: u32,
    #[serde(default)]
    pub index: u32,
}

const fn default_contract_version() -> u32 {
    CONTRACT_VERSION
}

/// Contents of `results/status.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusFile {
    pub status: AgentTaskStatus,
    /// Free-form note on what the sandbox is doing.
    #[serde(default)]
    pub progress: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub exit_code: Option<i32>,
    /// Error class tag for `error` status (see `DomainError::kind`).
    #[serde(default)]
    pub error_kind: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl StatusFile {
    pub fn new(status: AgentTaskStatus, progress: impl Into<String>) -> Self {
        Self {
            status,
            progress: progress.into(),
            timestamp: Utc::now(),
            exit_code: None,
            error_kind: None,
            error: None,
        }
    }

    pub fn pending() -> Self {
        Self::new(AgentTaskStatus::Pending, "workspace prepared")
    }

    /// Terminal error tagged with an error kind.
    pub fn error(kind: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            status: AgentTaskStatus::Error,
            progress: message.clone(),
            timestamp: Utc::now(),
            exit_code: None,
            error_kind: Some(kind.to_string()),
            error: Some(message),
        }
    }

    pub fn with_exit_code(mut self, code: Option<i32>) -> Self {
        self.exit_code = code;
        self
    }
}
