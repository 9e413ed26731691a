//! Workflow engine adapters.

pub mod durable;
pub mod polling;

use std::sync::Arc;

use crate::adapters::sandbox::create_driver;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::Config;
use crate::domain::ports::WorkflowEngine;
use crate::services::JobManager;

pub use durable::DurableWorkflowEngine;
pub use polling::PollingWorkflowEngine;

/// Names accepted for `workflow.engine`.
pub const AVAILABLE_ENGINES: &[&str] = &["polling", "durable"];

/// Build the workflow engine selected by configuration.
pub fn create_engine(config: &Config) -> DomainResult<Arc<dyn WorkflowEngine>> {
    match config.workflow.engine.as_str() {
        "polling" => {
            let driver = create_driver(&config.sandbox)?;
            let jobs = Arc::new(JobManager::new(&config.sandbox.workspaces_dir, driver));
            Ok(Arc::new(PollingWorkflowEngine::new(jobs)))
        }
        "durable" => Ok(Arc::new(DurableWorkflowEngine::new(
            config.workflow.durable_endpoint.clone(),
        ))),
        other => Err(DomainError::ValidationFailed(format!(
            "unknown workflow engine '{other}' (expected one of: {})",
            AVAILABLE_ENGINES.join(", ")
        ))),
    }
}
