//! Eval definition and outcome models.

use serde::{Deserialize, Serialize};

/// How a test command's outcome is turned into a pass/fail decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SuccessCriteria {
    /// Exit code 0 passes.
    ExitCode,
    /// Output must contain `expected_output`.
    OutputMatch,
}

impl Default for SuccessCriteria {
    fn default() -> Self {
        Self::ExitCode
    }
}

impl SuccessCriteria {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExitCode => "exit-code",
            Self::OutputMatch => "output-match",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "exit-code" => Some(Self::ExitCode),
            "output-match" => Some(Self::OutputMatch),
            _ => None,
        }
    }
}

/// Caller-supplied validation for candidate patches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvalSpec {
    /// Shell command run from the snapshot root.
    pub command: String,
    #[serde(default = "default_eval_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub criteria: SuccessCriteria,
    /// Substring required in the output for [`SuccessCriteria::OutputMatch`].
    #[serde(default)]
    pub expected_output: Option<String>,
    /// Repo-relative paths restored from the pristine snapshot before
    /// scoring, so agents cannot edit the harness they are judged by.
    #[serde(default)]
    pub protected_paths: Vec<String>,
}

const fn default_eval_timeout_secs() -> u64 {
    120
}

impl EvalSpec {
    /// Exit-code eval with the default timeout and no protected paths.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            timeout_secs: default_eval_timeout_secs(),
            criteria: SuccessCriteria::ExitCode,
            expected_output: None,
            protected_paths: Vec::new(),
        }
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn with_protected_paths(mut self, paths: Vec<String>) -> Self {
        self.protected_paths = paths;
        self
    }

    /// Pass when the combined output contains `expected`.
    pub fn with_output_match(mut self, expected: impl Into<String>) -> Self {
        self.criteria = SuccessCriteria::OutputMatch;
        self.expected_output = Some(expected.into());
        self
    }
}

/// Result of scoring one candidate snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalResult {
    /// The success criteria were met.
    pub passed: bool,
    /// 1.0 for a pass; strictly below 1.0 otherwise.
    pub score: f64,
    pub exit_code: Option<i32>,
    /// The command was killed at its timeout.
    pub timed_out: bool,
    /// Tail of the combined output.
    pub details: String,
}

impl EvalResult {
    /// Outcome of an eval that could not run at all.
    pub fn failed(details: impl Into<String>) -> Self {
        Self {
            passed: false,
            score: 0.0,
            exit_code: None,
            timed_out: false,
            details: details.into(),
        }
    }
}
