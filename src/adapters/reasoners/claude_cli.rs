//! Reasoner backed by the Claude Code CLI in print mode.

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::ports::Reasoner;

/// Reasoner that shells out to `claude -p` and reads the final text.
#[derive(Debug, Clone)]
pub struct ClaudeCliReasoner {
    claude_path: String,
    model: Option<String>,
    timeout: Duration,
}

impl ClaudeCliReasoner {
    pub fn new(claude_path: impl Into<String>, model: Option<String>, timeout: Duration) -> Self {
        Self {
            claude_path: claude_path.into(),
            model,
            timeout,
        }
    }

    async fn query(&self, prompt: &str) -> DomainResult<String> {
        let mut cmd = Command::new(&self.claude_path);
        cmd.arg("--print").arg("--output-format").arg("text");
        if let Some(model) = &self.model {
            cmd.arg("--model").arg(model);
        }

        // The prompt goes over stdin; analysis prompts can exceed argv limits.
        let mut child = cmd
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| DomainError::Reasoning(format!("failed to execute {}: {e}", self.claude_path)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(prompt.as_bytes())
                .await
                .map_err(|e| DomainError::Reasoning(format!("failed to send prompt: {e}")))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| DomainError::Reasoning(format!("claude did not finish: {e}")))?;

        if !output.status.success() {
            return Err(DomainError::Reasoning(format!(
                "claude exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let response = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if response.is_empty() {
            return Err(DomainError::Reasoning("claude returned an empty response".to_string()));
        }
        Ok(response)
    }
}

#[async_trait]
impl Reasoner for ClaudeCliReasoner {
    fn name(&self) -> &'static str {
        "claude-cli"
    }

    async fn complete(&self, prompt: &str) -> DomainResult<String> {
        tokio::time::timeout(self.timeout, self.query(prompt))
            .await
            .map_err(|_| DomainError::Reasoning(format!("claude timed out after {:?}", self.timeout)))?
    }
}
