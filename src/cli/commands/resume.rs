//! Implementation of the `phylum resume` command.

use anyhow::Result;
use clap::Args;
use tracing::info;

use crate::cli::context::AppContext;
use crate::cli::output::output;
use crate::cli::report::RunReport;
use crate::cli::UnsuccessfulOutcome;
use crate::domain::models::RunStatus;

/// Arguments for `phylum resume`.
#[derive(Args, Debug)]
pub struct ResumeArgs {
    /// Run id or unique prefix (defaults to the most recent run)
    pub run_id: Option<String>,
}

/// Continue a run, taking over its writer lease.
pub async fn execute(args: ResumeArgs, json_mode: bool) -> Result<()> {
    let ctx = AppContext::open().await?;
    let run = ctx.resolve_run(args.run_id.as_deref()).await?;
    let orchestrator = ctx.orchestrator()?;

    info!(run_id = %run.id, status = run.status.as_str(), "Resuming run {}", run.short_id());
    let run = orchestrator.resume(run.id).await?;
    output(&RunReport::from(&run), json_mode);

    if run.status == RunStatus::Done {
        Ok(())
    } else {
        Err(UnsuccessfulOutcome(format!("run {} ended {}", run.short_id(), run.status.as_str())).into())
    }
}
