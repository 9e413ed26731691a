//! Implementation of the hidden `phylum sandbox-exec` command, the entry
//! point every sandbox runs.

use anyhow::Result;
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;

use crate::adapters::vendors::VendorRegistry;
use crate::services::SandboxRunner;

/// Arguments for the hidden `sandbox-exec` command.
#[derive(Args, Debug)]
pub struct SandboxExecArgs {
    /// Task workspace directory
    pub workspace: PathBuf,
}

/// Succeeds whenever a terminal status was recorded, including agent
/// failures. The orchestrator reads the outcome from `status.json`.
pub async fn execute(args: SandboxExecArgs, _json_mode: bool) -> Result<()> {
    let runner = SandboxRunner::new(Arc::new(VendorRegistry::new()));
    runner.run(&args.workspace).await?;
    Ok(())
}
