//! Run report shared by `run`, `resume` and `status`.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::cli::output::{format_score, truncate, CommandOutput};
use crate::cli::table::{list_table, styled_status};
use crate::domain::models::{AgentTaskStatus, Generation, Run, Step};

/// Outcome of one generation.
#[derive(Debug, Serialize)]
pub struct GenerationReport {
    pub index: u32,
    pub phase: String,
    pub agents: usize,
    pub errors: usize,
    pub best_score: Option<f64>,
    pub winner: Option<String>,
    /// Directives inherited from the previous generation's analysis.
    pub hypotheses: Vec<String>,
}

impl From<&Generation> for GenerationReport {
    fn from(generation: &Generation) -> Self {
        Self {
            index: generation.index,
            phase: generation.phase.as_str().to_string(),
            agents: generation.tasks.len(),
            errors: generation
                .tasks
                .iter()
                .filter(|t| t.status == AgentTaskStatus::Error)
                .count(),
            best_score: generation.best_score(),
            winner: generation.winner_task().map(|t| t.id.clone()),
            hypotheses: generation.hypotheses.iter().map(|h| h.directive.clone()).collect(),
        }
    }
}

/// Outcome of one step.
#[derive(Debug, Serialize)]
pub struct StepReport {
    pub index: u32,
    pub description: String,
    pub status: String,
    pub winner: Option<String>,
    pub generations: Vec<GenerationReport>,
}

impl From<&Step> for StepReport {
    fn from(step: &Step) -> Self {
        Self {
            index: step.index,
            description: step.description.clone(),
            status: step.status.as_str().to_string(),
            winner: step.winner_agent_id.clone(),
            generations: step.generations.iter().map(GenerationReport::from).collect(),
        }
    }
}

/// Printable state of a run, shared by `run`, `resume` and `status`.
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub id: String,
    pub status: String,
    pub plan: String,
    pub repo_path: String,
    pub vendor: String,
    pub population_size: u32,
    pub max_generations: u32,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub steps: Vec<StepReport>,
}

impl From<&Run> for RunReport {
    fn from(run: &Run) -> Self {
        Self {
            id: run.id.to_string(),
            status: run.status.as_str().to_string(),
            plan: run.plan.clone(),
            repo_path: run.repo_path.display().to_string(),
            vendor: run.vendor.clone(),
            population_size: run.population_size,
            max_generations: run.max_generations,
            error: run.error_message.clone(),
            created_at: run.created_at,
            completed_at: run.completed_at,
            steps: run.steps.iter().map(StepReport::from).collect(),
        }
    }
}

impl CommandOutput for RunReport {
    fn to_human(&self) -> String {
        let mut lines = vec![
            format!("Run {} {}", &self.id[..8], styled_status(&self.status)),
            format!("  Plan:       {}", truncate(self.plan.lines().next().unwrap_or(""), 70)),
            format!("  Repository: {}", self.repo_path),
            format!(
                "  Vendor:     {} (population {}, up to {} generations)",
                self.vendor, self.population_size, self.max_generations
            ),
        ];
        if let Some(error) = &self.error {
            lines.push(format!("  Error:      {error}"));
        }

        if self.steps.is_empty() {
            lines.push("\nPlan not decomposed yet.".to_string());
            return lines.join("\n");
        }

        let mut table = list_table(&["step", "status", "gen", "best", "winner", "description"]);
        for step in &self.steps {
            let latest = step.generations.last();
            table.add_row(vec![
                step.index.to_string(),
                styled_status(&step.status),
                latest.map_or_else(|| "-".to_string(), |g| format!("{}/{}", g.index, self.max_generations)),
                format_score(latest.and_then(|g| g.best_score)),
                step.winner.clone().unwrap_or_else(|| "-".to_string()),
                truncate(&step.description, 48),
            ]);
        }
        lines.push(String::new());
        lines.push(table.to_string());
        lines.join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}
