//! Eval harness: scores an agent's repository snapshot with the run's test
//! command.
//!
//! The command always runs in a scratch copy (`<workspace>/eval/`) with the
//! protected paths restored from `pristine/`, so neither the agent's snapshot
//! nor the validation harness can be altered by scoring.

use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{info, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{EvalResult, EvalSpec, SuccessCriteria, WorkspacePaths};
use crate::services::workspace;

/// Characters of combined output kept as `details`.
const DETAILS_TAIL: usize = 2000;

/// Highest score a failing command can earn.
const MAX_FAILING_SCORE: f64 = 0.99;

/// Runs the eval command against an agent's repository and scores it.
///
/// The snapshot is scored in place; protected paths are compared against
/// the pristine copy taken before the agent started.
#[derive(Debug, Clone, Copy, Default)]
pub struct EvalHarness;

impl EvalHarness {
    pub fn new() -> Self {
        Self
    }

    /// Score the snapshot in `ws.repo()`.
    ///
    /// `Err(EvalHarness)` means the command could not be run at all. A command
    /// that runs and fails, or times out, is an `Ok` failing result.
    pub async fn evaluate(&self, ws: &WorkspacePaths, spec: &EvalSpec) -> DomainResult<EvalResult> {
        let repo = ws.repo();
        if !repo.is_dir() {
            return Err(DomainError::EvalHarness(format!(
                "repository snapshot {} does not exist",
                repo.display()
            )));
        }

        let eval_dir = ws.eval_dir();
        let pristine = ws.pristine();
        let protected = spec.protected_paths.clone();
        let scratch = eval_dir.clone();
        tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
            if scratch.exists() {
                std::fs::remove_dir_all(&scratch)?;
            }
            workspace::copy_tree(&repo, &scratch)?;
            workspace::restore_protected(&pristine, &scratch, &protected)
        })
        .await
        .map_err(|e| DomainError::EvalHarness(format!("eval preparation panicked: {e}")))?
        .map_err(|e| DomainError::EvalHarness(format!("cannot prepare eval copy: {e:#}")))?;

        let result = run_command(&eval_dir, spec).await;

        if let Err(e) = tokio::fs::remove_dir_all(&eval_dir).await {
            warn!(path = %eval_dir.display(), error = %e, "Failed to remove eval copy");
        }

        result
    }
}

async fn run_command(dir: &Path, spec: &EvalSpec) -> DomainResult<EvalResult> {
    let child = Command::new("sh")
        .arg("-c")
        .arg(&spec.command)
        .current_dir(dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .process_group(0)
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| DomainError::EvalHarness(format!("cannot start eval command: {e}")))?;
    let pid = child.id();

    let timeout = Duration::from_secs(spec.timeout_secs);
    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => return Err(DomainError::EvalHarness(format!("eval command failed: {e}"))),
        Err(_) => {
            if let Some(pid) = pid {
                let _ = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL);
            }
            info!(command = %spec.command, timeout_secs = spec.timeout_secs, "Eval timed out");
            return Ok(EvalResult {
                timed_out: true,
                ..EvalResult::failed(format!("timed out after {}s", spec.timeout_secs))
            });
        }
    };

    let combined = format!(
        "{}\n{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    let exit_code = output.status.code();

    let (passed, score) = match spec.criteria {
        SuccessCriteria::ExitCode => {
            if output.status.success() {
                (true, 1.0)
            } else {
                (false, parse_test_score(&combined))
            }
        }
        SuccessCriteria::OutputMatch => {
            let expected = spec.expected_output.as_deref().unwrap_or("");
            let matched = combined.contains(expected);
            (matched, if matched { 1.0 } else { 0.0 })
        }
    };

    info!(command = %spec.command, ?exit_code, passed, score, "Eval finished");

    Ok(EvalResult {
        passed,
        score,
        exit_code,
        timed_out: false,
        details: tail(&combined, DETAILS_TAIL),
    })
}

fn tail(text: &str, max_chars: usize) -> String {
    let count = text.chars().count();
    text.chars().skip(count.saturating_sub(max_chars)).collect()
}

/// The integer immediately before the first occurrence of ` {word}`.
fn count_before(text: &str, word: &str) -> Option<u64> {
    text.match_indices(word).find_map(|(idx, _)| {
        let before = text[..idx].strip_suffix(' ')?;
        let digits: String = before
            .chars()
            .rev()
            .take_while(char::is_ascii_digit)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        digits.parse().ok()
    })
}

/// Partial credit from a recognised test summary, clamped below a pass.
pub fn parse_test_score(output: &str) -> f64 {
    let cargo_lines: Vec<&str> = output
        .lines()
        .filter(|line| line.trim_start().starts_with("test result:"))
        .collect();

    let (passed, total) = if cargo_lines.is_empty() {
        let passed = count_before(output, "passed").unwrap_or(0);
        let failed = count_before(output, "failed").unwrap_or(0);
        let errors = count_before(output, "error").unwrap_or(0);
        (passed, passed + failed + errors)
    } else {
        cargo_lines.iter().fold((0, 0), |(p, t), line| {
            let passed = count_before(line, "passed").unwrap_or(0);
            let failed = count_before(line, "failed").unwrap_or(0);
            (p + passed, t + passed + failed)
        })
    };

    if total == 0 {
        return 0.0;
    }
    (passed as f64 / total as f64).min(MAX_FAILING_SCORE)
}
