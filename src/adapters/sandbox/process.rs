//! Local process sandbox driver.
//!
//! Each sandbox is a child process running `phylum sandbox-exec <workspace>`
//! in its own process group, so termination reaches the agent too. Isolation
//! is limited to the private workspace copy.

use async_trait::async_trait;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::WorkspacePaths;
use crate::domain::ports::{SandboxDriver, SandboxState};

/// Grace period between SIGTERM and SIGKILL.
const TERMINATE_GRACE: Duration = Duration::from_secs(5);

/// Name of the runner log written next to the other results.
pub const RUNNER_LOG: &str = "runner.log";

struct Tracked {
    child: Child,
    log_path: PathBuf,
    terminated: bool,
}

/// Sandbox driver backed by local child processes.
#[derive(Clone)]
pub struct ProcessSandboxDriver {
    runner_program: PathBuf,
    children: Arc<Mutex<HashMap<String, Tracked>>>,
}

impl ProcessSandboxDriver {
    /// Use `runner_program`, or the running executable when `None`.
    pub fn new(runner_program: Option<PathBuf>) -> DomainResult<Self> {
        let runner_program = match runner_program {
            Some(path) => path,
            None => std::env::current_exe().map_err(|e| {
                DomainError::WorkflowInfrastructure(format!("cannot locate phylum executable: {e}"))
            })?,
        };
        Ok(Self {
            runner_program,
            children: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    pub fn runner_program(&self) -> &PathBuf {
        &self.runner_program
    }
}

#[async_trait]
impl SandboxDriver for ProcessSandboxDriver {
    fn name(&self) -> &'static str {
        "process"
    }

    async fn launch(&self, task_id: &str, workspace: &WorkspacePaths) -> DomainResult<()> {
        let log_path = workspace.results().join(RUNNER_LOG);
        let log = std::fs::File::create(&log_path).map_err(|e| {
            DomainError::WorkflowInfrastructure(format!("cannot create {}: {e}", log_path.display()))
        })?;
        let log_err = log.try_clone().map_err(|e| DomainError::WorkflowInfrastructure(e.to_string()))?;

        let child = Command::new(&self.runner_program)
            .arg("sandbox-exec")
            .arg(workspace.root())
            .current_dir(workspace.root())
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err))
            .process_group(0)
            .spawn()
            .map_err(|e| {
                DomainError::WorkflowInfrastructure(format!(
                    "failed to spawn {}: {e}",
                    self.runner_program.display()
                ))
            })?;

        debug!(task_id, pid = ?child.id(), "Sandbox process launched");

        self.children.lock().await.insert(
            task_id.to_string(),
            Tracked {
                child,
                log_path,
                terminated: false,
            },
        );
        Ok(())
    }

    async fn inspect(&self, task_id: &str) -> DomainResult<SandboxState> {
        let mut children = self.children.lock().await;
        let Some(tracked) = children.get_mut(task_id) else {
            return Ok(SandboxState::Missing);
        };

        match tracked.child.try_wait() {
            Ok(None) => Ok(SandboxState::Running),
            Ok(Some(status)) if status.success() && !tracked.terminated => Ok(SandboxState::Succeeded),
            Ok(Some(status)) => Ok(SandboxState::Failed(if tracked.terminated {
                "sandbox was terminated".to_string()
            } else {
                format!("sandbox runner exited with {status}")
            })),
            Err(e) => Err(DomainError::WorkflowInfrastructure(format!(
                "cannot inspect sandbox {task_id}: {e}"
            ))),
        }
    }

    async fn terminate(&self, task_id: &str) -> DomainResult<()> {
        let mut children = self.children.lock().await;
        let Some(tracked) = children.get_mut(task_id) else {
            return Ok(());
        };
        if matches!(tracked.child.try_wait(), Ok(Some(_))) {
            return Ok(());
        }
        tracked.terminated = true;

        if let Some(pid) = tracked.child.id() {
            if let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                warn!(task_id, error = %e, "SIGTERM to sandbox process group failed");
            }
        }

        if tokio::time::timeout(TERMINATE_GRACE, tracked.child.wait()).await.is_err() {
            if let Some(pid) = tracked.child.id() {
                let _ = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL);
            }
            tracked
                .child
                .kill()
                .await
                .map_err(|e| DomainError::WorkflowInfrastructure(format!("cannot kill sandbox {task_id}: {e}")))?;
        }
        debug!(task_id, "Sandbox process terminated");
        Ok(())
    }

    async fn logs(&self, task_id: &str) -> DomainResult<String> {
        let log_path = {
            let children = self.children.lock().await;
            match children.get(task_id) {
                Some(tracked) => tracked.log_path.clone(),
                None => return Ok(String::new()),
            }
        };
        match tokio::fs::read(&log_path).await {
            Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn workspace(dir: &TempDir) -> WorkspacePaths {
        let ws = WorkspacePaths::new(dir.path());
        std::fs::create_dir_all(ws.results()).unwrap();
        ws
    }

    /// Driver running `/bin/sh sandbox-exec <root>` from the workspace root,
    /// so a plain `sandbox-exec` script stands in for the runner.
    fn fake_runner(dir: &TempDir, body: &str) -> ProcessSandboxDriver {
        std::fs::write(dir.path().join("sandbox-exec"), format!("{body}\n")).unwrap();
        ProcessSandboxDriver::new(Some(PathBuf::from("/bin/sh"))).unwrap()
    }

    #[tokio::test]
    async fn test_unknown_task_is_missing() {
        let driver = ProcessSandboxDriver::new(Some(PathBuf::from("/bin/true"))).unwrap();
        assert_eq!(driver.inspect("nope").await.unwrap(), SandboxState::Missing);
        driver.terminate("nope").await.unwrap();
    }

    #[tokio::test]
    async fn test_exit_states_and_logs() {
        let dir = TempDir::new().unwrap();
        let ws = workspace(&dir);
        let driver = fake_runner(&dir, "echo runner says hello; exit 3");

        driver.launch("t1", &ws).await.unwrap();
        let mut state = driver.inspect("t1").await.unwrap();
        for _ in 0..100 {
            if !state.is_active() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
            state = driver.inspect("t1").await.unwrap();
        }
        assert!(matches!(state, SandboxState::Failed(_)));
        assert!(driver.logs("t1").await.unwrap().contains("runner says hello"));
    }

    #[tokio::test]
    async fn test_terminate_running_sandbox() {
        let dir = TempDir::new().unwrap();
        let ws = workspace(&dir);
        let driver = fake_runner(&dir, "sleep 30");

        driver.launch("t2", &ws).await.unwrap();
        assert_eq!(driver.inspect("t2").await.unwrap(), SandboxState::Running);

        driver.terminate("t2").await.unwrap();
        assert_eq!(
            driver.inspect("t2").await.unwrap(),
            SandboxState::Failed("sandbox was terminated".to_string())
        );
    }
}
