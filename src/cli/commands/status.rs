//! Implementation of the `phylum status` command.

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use crate::cli::context::AppContext;
use crate::cli::output::{output, truncate, CommandOutput};
use crate::cli::report::RunReport;
use crate::cli::table::{list_table, render_list, styled_status};
use crate::domain::models::Run;
use crate::domain::ports::RunRepository;

/// Arguments for `phylum status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Run id or unique prefix (defaults to the most recent run)
    pub run_id: Option<String>,

    /// List recent runs instead
    #[arg(short, long, conflicts_with = "run_id")]
    pub list: bool,

    /// Number of runs to list
    #[arg(long, default_value = "20")]
    pub limit: usize,
}

/// Summary line of one run.
#[derive(Debug, Serialize)]
pub struct RunListEntry {
    pub id: String,
    pub status: String,
    pub vendor: String,
    pub plan: String,
    pub created_at: String,
}

impl From<&Run> for RunListEntry {
    fn from(run: &Run) -> Self {
        Self {
            id: run.id.to_string(),
            status: run.status.as_str().to_string(),
            vendor: run.vendor.clone(),
            plan: run.plan.clone(),
            created_at: run.created_at.format("%Y-%m-%d %H:%M").to_string(),
        }
    }
}

/// Recent runs, newest first.
#[derive(Debug, Serialize)]
pub struct RunListOutput {
    pub runs: Vec<RunListEntry>,
    pub total: usize,
}

impl CommandOutput for RunListOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&["id", "status", "vendor", "created", "plan"]);
        for run in &self.runs {
            table.add_row(vec![
                run.id[..8].to_string(),
                styled_status(&run.status),
                run.vendor.clone(),
                run.created_at.clone(),
                truncate(run.plan.lines().next().unwrap_or(""), 50),
            ]);
        }
        render_list("run", &table, self.total)
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub async fn execute(args: StatusArgs, json_mode: bool) -> Result<()> {
    let ctx = AppContext::open().await?;

    if args.list {
        let runs = ctx.repository.list_runs(args.limit).await?;
        let entries: Vec<RunListEntry> = runs.iter().map(RunListEntry::from).collect();
        let total = entries.len();
        output(&RunListOutput { runs: entries, total }, json_mode);
        return Ok(());
    }

    let run = ctx.resolve_run(args.run_id.as_deref()).await?;
    output(&RunReport::from(&run), json_mode);
    Ok(())
}
