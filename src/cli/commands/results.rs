//! Implementation of the `phylum results` command.

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use crate::cli::context::AppContext;
use crate::cli::output::{format_score, output, truncate, CommandOutput};
use crate::cli::table::{list_table, render_list, styled_status};
use crate::domain::models::{AgentTask, Run};

/// Arguments for `phylum results`.
#[derive(Args, Debug)]
pub struct ResultsArgs {
    /// Run id or unique prefix (defaults to the most recent run)
    pub run_id: Option<String>,

    /// Only this step
    #[arg(short, long)]
    pub step: Option<u32>,

    /// Only this generation
    #[arg(short, long)]
    pub generation: Option<u32>,
}

/// One row of the results table.
#[derive(Debug, Serialize)]
pub struct AgentResult {
    pub id: String,
    pub step: u32,
    pub generation: u32,
    pub index: u32,
    pub status: String,
    pub score: Option<f64>,
    pub winner: bool,
    pub strategy: String,
    pub exit_code: Option<i32>,
    pub error_kind: Option<String>,
    pub error: Option<String>,
    pub patch_path: Option<String>,
    pub transcript_path: Option<String>,
}

impl AgentResult {
    fn new(task: &AgentTask, winner: bool) -> Self {
        Self {
            id: task.id.clone(),
            step: task.step_index,
            generation: task.generation,
            index: task.index,
            status: task.status.as_str().to_string(),
            score: task.score,
            winner,
            strategy: task.strategy.label(),
            exit_code: task.exit_code,
            error_kind: task.error_kind.clone(),
            error: task.error_message.clone(),
            patch_path: task.patch_path.clone(),
            transcript_path: task.transcript_path.clone(),
        }
    }
}

/// Scored agents of a run.
#[derive(Debug, Serialize)]
pub struct ResultsOutput {
    pub run_id: String,
    pub agents: Vec<AgentResult>,
    pub total: usize,
}

impl ResultsOutput {
    /// Gather agents of `run`, optionally narrowed to one step or generation.
    pub fn collect(run: &Run, step: Option<u32>, generation: Option<u32>) -> Self {
        let agents: Vec<AgentResult> = run
            .steps
            .iter()
            .filter(|s| step.map_or(true, |wanted| s.index == wanted))
            .flat_map(|s| s.generations.iter())
            .filter(|g| generation.map_or(true, |wanted| g.index == wanted))
            .flat_map(|g| g.tasks.iter().map(move |t| AgentResult::new(t, g.winner == Some(t.index))))
            .collect();
        let total = agents.len();
        Self {
            run_id: run.id.to_string(),
            agents,
            total,
        }
    }
}

impl CommandOutput for ResultsOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&["agent", "gen", "status", "score", "strategy", "error"]);
        for agent in &self.agents {
            let id = if agent.winner {
                format!("{} *", agent.id)
            } else {
                agent.id.clone()
            };
            let error = match (&agent.error_kind, &agent.error) {
                (Some(kind), Some(message)) => truncate(&format!("{kind}: {message}"), 50),
                (Some(kind), None) => kind.clone(),
                _ => String::new(),
            };
            table.add_row(vec![
                id,
                agent.generation.to_string(),
                styled_status(&agent.status),
                format_score(agent.score),
                agent.strategy.clone(),
                error,
            ]);
        }
        render_list("agent", &table, self.total)
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub async fn execute(args: ResultsArgs, json_mode: bool) -> Result<()> {
    let ctx = AppContext::open().await?;
    let run = ctx.resolve_run(args.run_id.as_deref()).await?;
    output(&ResultsOutput::collect(&run, args.step, args.generation), json_mode);
    Ok(())
}
