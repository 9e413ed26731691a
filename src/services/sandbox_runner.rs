//! Sandbox runner: the vendor-agnostic entry point executed inside every
//! sandbox (`phylum sandbox-exec <workspace>`).
//!
//! Status protocol: `pending → running → {done | error}`. A missing or
//! malformed `task.json`, or an unknown vendor, goes straight to `error`
//! without entering `running` and without executing anything.

use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::sandbox::CONTRACT_VERSION;
use crate::domain::models::{AgentTaskStatus, StatusFile, TaskConfig, WorkspacePaths};
use crate::domain::ports::{AgentInvocation, VendorFactory};
use crate::services::workspace;

/// Executes one task inside its sandbox: the body of `phylum sandbox-exec`.
pub struct SandboxRunner {
    vendors: Arc<dyn VendorFactory>,
}

impl SandboxRunner {
    pub fn new(vendors: Arc<dyn VendorFactory>) -> Self {
        Self { vendors }
    }

    /// Run the task in `root` and return its terminal status.
    ///
    /// `Err` only when the status itself cannot be recorded.
    pub async fn run(&self, root: &Path) -> DomainResult<AgentTaskStatus> {
        let ws = WorkspacePaths::new(root);

        let config = match load_task_config(&ws).await {
            Ok(config) => config,
            Err(e) => return self.finish(&ws, StatusFile::error(e.kind(), e.to_string())).await,
        };

        let invocation = match self
            .vendors
            .resolve(&config.vendor)
            .and_then(|vendor| vendor.invocation(&config))
        {
            Ok(invocation) => invocation,
            Err(e) => return self.finish(&ws, StatusFile::error(e.kind(), e.to_string())).await,
        };

        self.record(&ws, &StatusFile::new(AgentTaskStatus::Running, "agent started"))
            .await?;
        info!(task_id = %config.id, vendor = %config.vendor, program = %invocation.program, "Agent started");

        let exit = execute(&ws, &config, &invocation).await;

        let patch_result = match workspace::diff_since_baseline(&ws.repo()).await {
            Ok(patch) => tokio::fs::write(ws.patch_file(), patch)
                .await
                .map_err(|e| format!("cannot write patch: {e}")),
            Err(e) => Err(format!("cannot compute patch: {e:#}")),
        };

        let status = match (exit, patch_result) {
            (Ok(0), Ok(())) => StatusFile::new(AgentTaskStatus::Done, "agent finished").with_exit_code(Some(0)),
            (Ok(code), Ok(())) => {
                StatusFile::error("agent_execution", format!("agent exited with code {code}"))
                    .with_exit_code(Some(code))
            }
            (Ok(code), Err(patch_err)) => StatusFile::error("agent_execution", patch_err).with_exit_code(Some(code)),
            (Err(e), _) => StatusFile::error(e.kind(), e.to_string()),
        };
        self.finish(&ws, status).await
    }

    async fn record(&self, ws: &WorkspacePaths, status: &StatusFile) -> DomainResult<()> {
        workspace::write_status(ws, status)
            .await
            .map_err(|e| DomainError::Io(format!("cannot write status.json: {e:#}")))
    }

    async fn finish(&self, ws: &WorkspacePaths, status: StatusFile) -> DomainResult<AgentTaskStatus> {
        if status.status == AgentTaskStatus::Error {
            warn!(error_kind = ?status.error_kind, error = ?status.error, "Task ended in error");
        } else {
            info!(exit_code = ?status.exit_code, "Task done");
        }
        self.record(ws, &status).await?;
        Ok(status.status)
    }
}

async fn load_task_config(ws: &WorkspacePaths) -> DomainResult<TaskConfig> {
    let path = ws.task_config();
    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(DomainError::Setup("task.json is missing".to_string()))
        }
        Err(e) => return Err(DomainError::Setup(format!("cannot read task.json: {e}"))),
    };
    let config: TaskConfig =
        serde_json::from_slice(&bytes).map_err(|e| DomainError::Setup(format!("malformed task.json: {e}")))?;

    if config.version > CONTRACT_VERSION {
        return Err(DomainError::Setup(format!(
            "task.json version {} is newer than supported version {CONTRACT_VERSION}",
            config.version
        )));
    }
    if config.vendor.trim().is_empty() {
        return Err(DomainError::Setup("task.json has no vendor".to_string()));
    }
    Ok(config)
}

/// Spawn the agent in `repo/` and stream its output into the workspace.
/// Returns the exit code (-1 when killed by a signal).
async fn execute(ws: &WorkspacePaths, config: &TaskConfig, invocation: &AgentInvocation) -> DomainResult<i32> {
    let io_err = |what: &str, e: std::io::Error| DomainError::AgentExecution(format!("{what}: {e}"));

    tokio::fs::create_dir_all(ws.transcript_dir())
        .await
        .map_err(|e| io_err("cannot create transcript dir", e))?;

    let mut child = Command::new(&invocation.program)
        .args(&invocation.args)
        .envs(invocation.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .env("PHYLUM_WORKSPACE", ws.root())
        .env("PHYLUM_TRANSCRIPT", ws.raw_transcript())
        .current_dir(ws.repo())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| io_err(&format!("cannot start {}", invocation.program), e))?;
    debug!(task_id = %config.id, pid = ?child.id(), "Agent process spawned");

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| DomainError::AgentExecution("agent stdout unavailable".to_string()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| DomainError::AgentExecution("agent stderr unavailable".to_string()))?;

    let output_log = File::create(ws.output_log())
        .await
        .map_err(|e| io_err("cannot create output.log", e))?;
    let stderr_log = File::create(ws.stderr_log())
        .await
        .map_err(|e| io_err("cannot create stderr.log", e))?;
    let transcript = if invocation.stdout_is_transcript {
        Some(
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(ws.raw_transcript())
                .await
                .map_err(|e| io_err("cannot open raw.jsonl", e))?,
        )
    } else {
        None
    };

    let (out_result, err_result, status) = tokio::join!(
        pump(stdout, output_log, transcript),
        pump(stderr, stderr_log, None),
        child.wait()
    );
    if let Err(e) = out_result.and(err_result) {
        warn!(error = %e, "Failed to capture agent output");
    }

    let status = status.map_err(|e| io_err("agent did not finish", e))?;
    Ok(status.code().unwrap_or(-1))
}

/// Copy `source` line by line into `log` and, if given, `transcript`.
/// Every line written to the transcript is newline-terminated.
async fn pump<R>(source: R, mut log: File, mut transcript: Option<File>) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(source);
    let mut line = Vec::new();
    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line).await? == 0 {
            break;
        }
        log.write_all(&line).await?;
        if let Some(transcript) = transcript.as_mut() {
            transcript.write_all(&line).await?;
            if line.last() != Some(&b'\n') {
                transcript.write_all(b"\n").await?;
            }
        }
    }
    log.flush().await?;
    if let Some(transcript) = transcript.as_mut() {
        transcript.flush().await?;
    }
    Ok(())
}
