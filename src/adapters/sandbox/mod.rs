//! Sandbox drivers.

pub mod kubernetes;
pub mod process;

use std::path::PathBuf;
use std::sync::Arc;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::SandboxConfig;
use crate::domain::ports::SandboxDriver;

pub use kubernetes::KubernetesSandboxDriver;
pub use process::ProcessSandboxDriver;

/// Names accepted for `sandbox.driver`.
pub const AVAILABLE_DRIVERS: &[&str] = &["process", "kubernetes"];

/// Build the sandbox driver selected by configuration.
pub fn create_driver(config: &SandboxConfig) -> DomainResult<Arc<dyn SandboxDriver>> {
    match config.driver.as_str() {
        "process" => Ok(Arc::new(ProcessSandboxDriver::new(
            config.runner_program.as_ref().map(PathBuf::from),
        )?)),
        "kubernetes" => Ok(Arc::new(KubernetesSandboxDriver::new(
            config.kubernetes.clone(),
            &config.workspaces_dir,
        ))),
        other => Err(DomainError::ValidationFailed(format!(
            "unknown sandbox driver '{other}' (expected one of: {})",
            AVAILABLE_DRIVERS.join(", ")
        ))),
    }
}
