//! Kubernetes sandbox driver.
//!
//! Each sandbox is a `batch/v1` Job whose single container runs
//! `phylum sandbox-exec /workspace` with the task workspace mounted from the
//! node. The driver talks to the cluster through `kubectl`.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{KubernetesConfig, WorkspacePaths};
use crate::domain::ports::{SandboxDriver, SandboxState};

/// Mount point of the workspace inside the container.
const CONTAINER_WORKSPACE: &str = "/workspace";

/// Container waiting reasons that will never resolve on their own.
const FATAL_WAITING_REASONS: &[&str] = &[
    "CrashLoopBackOff",
    "ErrImagePull",
    "ImagePullBackOff",
    "CreateContainerConfigError",
    "InvalidImageName",
];

/// Sandbox driver backed by Kubernetes Jobs.
#[derive(Debug, Clone)]
pub struct KubernetesSandboxDriver {
    config: KubernetesConfig,
    /// Local workspaces directory, used to map workspaces to node paths.
    workspaces_dir: PathBuf,
}

impl KubernetesSandboxDriver {
    /// `workspaces_dir` is the local path that `host_workspaces_dir` mirrors on the nodes.
    pub fn new(config: KubernetesConfig, workspaces_dir: impl Into<PathBuf>) -> Self {
        Self {
            config,
            workspaces_dir: workspaces_dir.into(),
        }
    }

    /// Job name for a task: a DNS-1123 label.
    pub fn job_name(task_id: &str) -> String {
        let mut name: String = format!("phylum-{task_id}")
            .to_lowercase()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
            .collect();
        name.truncate(63);
        name.trim_end_matches('-').to_string()
    }

    /// Path of the workspace as seen by the node.
    fn host_path(&self, workspace: &WorkspacePaths) -> PathBuf {
        match &self.config.host_workspaces_dir {
            Some(host_dir) => workspace
                .root()
                .strip_prefix(&self.workspaces_dir)
                .map_or_else(|_| workspace.root().to_path_buf(), |rel| PathBuf::from(host_dir).join(rel)),
            None => workspace.root().to_path_buf(),
        }
    }

    /// Build the Job manifest for a task.
    pub fn manifest(&self, task_id: &str, workspace: &WorkspacePaths) -> Value {
        let run_id = task_id.split('-').next().unwrap_or(task_id);
        json!({
            "apiVersion": "batch/v1",
            "kind": "Job",
            "metadata": {
                "name": Self::job_name(task_id),
                "namespace": self.config.namespace,
                "labels": {
                    "app": "phylum",
                    "phylum/run-id": run_id,
                    "phylum/task-id": task_id,
                }
            },
            "spec": {
                "backoffLimit": 0,
                "ttlSecondsAfterFinished": 600,
                "template": {
                    "metadata": {
                        "labels": {
                            "app": "phylum",
                            "phylum/task-id": task_id,
                        }
                    },
                    "spec": {
                        "restartPolicy": "Never",
                        "containers": [{
                            "name": "sandbox",
                            "image": self.config.image,
                            "command": ["phylum", "sandbox-exec", CONTAINER_WORKSPACE],
                            "workingDir": CONTAINER_WORKSPACE,
                            "resources": {
                                "requests": {
                                    "cpu": self.config.cpu_request,
                                    "memory": self.config.memory_request,
                                },
                                "limits": {
                                    "cpu": self.config.cpu_limit,
                                    "memory": self.config.memory_limit,
                                }
                            },
                            "volumeMounts": [{
                                "name": "workspace",
                                "mountPath": CONTAINER_WORKSPACE,
                            }]
                        }],
                        "volumes": [{
                            "name": "workspace",
                            "hostPath": {
                                "path": self.host_path(workspace).to_string_lossy(),
                                "type": "Directory",
                            }
                        }]
                    }
                }
            }
        })
    }

    async fn kubectl(&self, args: &[&str], stdin: Option<&[u8]>) -> DomainResult<std::process::Output> {
        let mut child = Command::new(&self.config.kubectl_path)
            .args(args)
            .args(["-n", self.config.namespace.as_str()])
            .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| DomainError::WorkflowInfrastructure(format!("failed to run kubectl: {e}")))?;

        if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
            pipe.write_all(input)
                .await
                .map_err(|e| DomainError::WorkflowInfrastructure(format!("kubectl stdin: {e}")))?;
        }

        child
            .wait_with_output()
            .await
            .map_err(|e| DomainError::WorkflowInfrastructure(format!("kubectl failed: {e}")))
    }

    async fn kubectl_json(&self, args: &[&str]) -> DomainResult<Option<Value>> {
        let output = self.kubectl(args, None).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("NotFound") || stderr.contains("not found") {
                return Ok(None);
            }
            return Err(DomainError::WorkflowInfrastructure(format!(
                "kubectl {}: {}",
                args.join(" "),
                stderr.trim()
            )));
        }
        let value = serde_json::from_slice(&output.stdout)
            .map_err(|e| DomainError::WorkflowInfrastructure(format!("unparseable kubectl output: {e}")))?;
        Ok(Some(value))
    }
}

/// Map a Job object (and its pods) to a sandbox state.
pub fn job_state(job: &Value, pods: Option<&Value>) -> SandboxState {
    let status = &job["status"];
    let count = |key: &str| status.get(key).and_then(Value::as_u64).unwrap_or(0);

    if count("succeeded") > 0 {
        return SandboxState::Succeeded;
    }
    if count("failed") > 0 {
        let reason = status["conditions"]
            .as_array()
            .and_then(|conds| {
                conds.iter().find_map(|c| {
                    (c["type"] == "Failed").then(|| c["message"].as_str().unwrap_or("job failed").to_string())
                })
            })
            .unwrap_or_else(|| "job failed".to_string());
        return SandboxState::Failed(reason);
    }

    if let Some(reason) = pods.and_then(fatal_pod_reason) {
        return SandboxState::Failed(reason);
    }

    if count("active") > 0 {
        SandboxState::Running
    } else {
        SandboxState::Pending
    }
}

fn fatal_pod_reason(pods: &Value) -> Option<String> {
    pods["items"].as_array()?.iter().find_map(|pod| {
        pod["status"]["containerStatuses"].as_array()?.iter().find_map(|cs| {
            let reason = cs["state"]["waiting"]["reason"].as_str()?;
            FATAL_WAITING_REASONS.contains(&reason).then(|| {
                let message = cs["state"]["waiting"]["message"].as_str().unwrap_or("");
                format!("{reason}: {message}").trim_end_matches([':', ' ']).to_string()
            })
        })
    })
}

#[async_trait]
impl SandboxDriver for KubernetesSandboxDriver {
    fn name(&self) -> &'static str {
        "kubernetes"
    }

    async fn launch(&self, task_id: &str, workspace: &WorkspacePaths) -> DomainResult<()> {
        let manifest = serde_json::to_vec(&self.manifest(task_id, workspace))?;
        let output = self.kubectl(&["apply", "-f", "-"], Some(&manifest)).await?;
        if !output.status.success() {
            return Err(DomainError::WorkflowInfrastructure(format!(
                "kubectl apply for {task_id} failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        debug!(task_id, job = %Self::job_name(task_id), "Sandbox job created");
        Ok(())
    }

    async fn inspect(&self, task_id: &str) -> DomainResult<SandboxState> {
        let name = Self::job_name(task_id);
        let Some(job) = self.kubectl_json(&["get", "job", &name, "-o", "json"]).await? else {
            return Ok(SandboxState::Missing);
        };
        let selector = format!("job-name={name}");
        let pods = self
            .kubectl_json(&["get", "pods", "-l", &selector, "-o", "json"])
            .await
            .unwrap_or_else(|e| {
                warn!(task_id, error = %e, "Could not list sandbox pods");
                None
            });
        Ok(job_state(&job, pods.as_ref()))
    }

    async fn terminate(&self, task_id: &str) -> DomainResult<()> {
        let name = Self::job_name(task_id);
        let output = self
            .kubectl(
                &["delete", "job", &name, "--ignore-not-found", "--wait=false", "--cascade=foreground"],
                None,
            )
            .await?;
        if !output.status.success() {
            return Err(DomainError::WorkflowInfrastructure(format!(
                "kubectl delete job {name} failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }

    async fn logs(&self, task_id: &str) -> DomainResult<String> {
        let target = format!("job/{}", Self::job_name(task_id));
        let output = self.kubectl(&["logs", &target, "--tail=500"], None).await?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_name_is_dns_label() {
        assert_eq!(
            KubernetesSandboxDriver::job_name("550e8400-s0-g1-a2"),
            "phylum-550e8400-s0-g1-a2"
        );
        let run_id = uuid::Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
        let task_id = crate::domain::models::AgentTask::task_id(run_id, 12, 30, 127);
        assert_eq!(KubernetesSandboxDriver::job_name(&task_id), format!("phylum-{task_id}"));
        let long = KubernetesSandboxDriver::job_name(&"X_".repeat(60));
        assert!(long.len() <= 63);
        assert!(long.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
        assert!(!long.ends_with('-'));
    }

    #[test]
    fn test_manifest_mounts_host_workspace() {
        let config = KubernetesConfig {
            host_workspaces_dir: Some("/mnt/phylum".to_string()),
            ..KubernetesConfig::default()
        };
        let driver = KubernetesSandboxDriver::new(config, "/repo/.phylum/workspaces");
        let task_id = "550e8400e29b41d4a716446655440000-s0-g1-a0";
        let ws = WorkspacePaths::new(format!("/repo/.phylum/workspaces/{task_id}"));
        let manifest = driver.manifest(task_id, &ws);

        assert_eq!(manifest["spec"]["backoffLimit"], 0);
        assert_eq!(
            manifest["spec"]["template"]["spec"]["volumes"][0]["hostPath"]["path"],
            format!("/mnt/phylum/{task_id}")
        );
        assert_eq!(
            manifest["metadata"]["labels"]["phylum/run-id"],
            "550e8400e29b41d4a716446655440000"
        );
        assert_eq!(
            manifest["spec"]["template"]["spec"]["containers"][0]["command"][1],
            "sandbox-exec"
        );
    }

    #[test]
    fn test_job_state_mapping() {
        assert_eq!(job_state(&json!({"status": {}}), None), SandboxState::Pending);
        assert_eq!(job_state(&json!({"status": {"active": 1}}), None), SandboxState::Running);
        assert_eq!(job_state(&json!({"status": {"succeeded": 1}}), None), SandboxState::Succeeded);
        assert!(matches!(
            job_state(&json!({"status": {"failed": 1}}), None),
            SandboxState::Failed(_)
        ));

        let pods = json!({"items": [{"status": {"containerStatuses": [
            {"state": {"waiting": {"reason": "ImagePullBackOff", "message": "no such image"}}}
        ]}}]});
        assert_eq!(
            job_state(&json!({"status": {"active": 1}}), Some(&pods)),
            SandboxState::Failed("ImagePullBackOff: no such image".to_string())
        );
    }
}
