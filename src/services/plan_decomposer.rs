//! Plan decomposer: one reasoning call turns a plan into ordered steps.

use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::ports::Reasoner;
use crate::services::extract_json_from_response;

const DECOMPOSE_PROMPT: &str = "\
You are a software engineering planner. Given a high-level coding task, decompose it into \
ordered implementation steps. Each step must be independently implementable and testable \
against the project's test command.

Output a JSON array of steps. Each step has:
- \"description\": short summary of what the step accomplishes
- \"prompt\": detailed instructions a coding agent receives to implement the step

Be specific in each prompt: name files, functions and expected behaviour where possible.
Use a single step when the task is small.

Respond ONLY with the JSON array.

Repository: {repo}

Task:
{plan}
";

/// One decomposed step before it is attached to a run.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PlannedStep {
    pub description: String,
    #[serde(default)]
    pub prompt: String,
}

/// Splits a plan into ordered steps with one reasoning call.
pub struct PlanDecomposer {
    reasoner: Arc<dyn Reasoner>,
}

impl PlanDecomposer {
    pub fn new(reasoner: Arc<dyn Reasoner>) -> Self {
        Self { reasoner }
    }

    /// Decompose `plan` into at least one step.
    ///
    /// Never fails: any reasoning or parsing error degrades to a single step
    /// carrying the plan verbatim.
    pub async fn decompose(&self, plan: &str, repo: &str) -> Vec<PlannedStep> {
        match self.try_decompose(plan, repo).await {
            Ok(steps) => {
                info!(steps = steps.len(), "Plan decomposed");
                steps
            }
            Err(e) => {
                warn!(error = %e, error_kind = e.kind(), "Decomposition failed, using the plan as a single step");
                vec![PlannedStep {
                    description: plan.trim().to_string(),
                    prompt: plan.trim().to_string(),
                }]
            }
        }
    }

    async fn try_decompose(&self, plan: &str, repo: &str) -> DomainResult<Vec<PlannedStep>> {
        let prompt = DECOMPOSE_PROMPT.replace("{repo}", repo).replace("{plan}", plan);
        let response = self
            .reasoner
            .complete(&prompt)
            .await
            .map_err(|e| DomainError::Decomposition(e.to_string()))?;
        parse_steps(&response)
    }
}

/// Parse the decomposer's response into steps.
pub fn parse_steps(response: &str) -> DomainResult<Vec<PlannedStep>> {
    let json = extract_json_from_response(response);
    let steps: Vec<PlannedStep> = serde_json::from_str(&json)
        .map_err(|e| DomainError::Decomposition(format!("unparseable step list: {e}")))?;

    let steps: Vec<PlannedStep> = steps
        .into_iter()
        .filter(|s| !s.description.trim().is_empty() || !s.prompt.trim().is_empty())
        .map(|s| {
            let description = s.description.trim().to_string();
            let prompt = if s.prompt.trim().is_empty() {
                description.clone()
            } else {
                s.prompt.trim().to_string()
            };
            let description = if description.is_empty() { prompt.clone() } else { description };
            PlannedStep { description, prompt }
        })
        .collect();

    if steps.is_empty() {
        return Err(DomainError::Decomposition("no steps returned".to_string()));
    }
    Ok(steps)
}
