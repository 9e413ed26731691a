//! Hypothesis engine: compares the best and worst agents of a generation
//! and turns the comparison into prompt mutation directives.

use serde::Deserialize;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{info, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{AgentTask, Hypothesis, PromptDimension, TranscriptSummary};
use crate::domain::ports::{AgentVendor, Reasoner};
use crate::services::{extract_json_from_response, selection, transcript_processor, workspace};

const PATCH_EXCERPT: usize = 1500;
const TEXT_EXCERPT: usize = 500;
const MAX_HYPOTHESES: usize = 5;

const ANALYSIS_PROMPT: &str = "\
You are analyzing several AI coding agents that attempted the same task with different prompt \
variants. None of them met the pass threshold. Compare the higher-scoring agents with the \
lower-scoring ones and explain what made the difference, using their diffs and action logs.

Task prompt:
{prompt}

Higher-scoring agents:
{top}

Lower-scoring agents:
{bottom}

Propose prompt mutations for the next generation. Each mutation targets one dimension:
- \"strategy\": steer toward a different overall approach
- \"verbosity\": ask for more or less explanation and detail
- \"instruction_order\": present context before the task, or the task first
- \"scope\": focus the agent on specific files or components
- \"testing\": change how the agent validates its work
- \"other\": anything else

Respond ONLY with a JSON array:
[{\"rationale\": \"why, citing the evidence\", \"dimension\": \"...\", \"directive\": \"instruction to add to the prompt\"}]
";

#[derive(Debug, Deserialize)]
struct RawHypothesis {
    #[serde(default)]
    rationale: String,
    #[serde(default)]
    dimension: String,
    #[serde(default)]
    directive: String,
}

/// Turns a failed generation into hypotheses that steer the next one.
pub struct HypothesisEngine {
    reasoner: Arc<dyn Reasoner>,
    top_k: usize,
}

impl HypothesisEngine {
    /// `top_k` agents from each end of the score ranking are compared.
    pub fn new(reasoner: Arc<dyn Reasoner>, top_k: usize) -> Self {
        Self {
            reasoner,
            top_k: top_k.max(1),
        }
    }

    /// Produce hypotheses for the next generation. Always returns at least
    /// one; a failed or signal-free analysis yields the generic fallback.
    pub async fn analyze(&self, step_prompt: &str, tasks: &[AgentTask], vendor: &dyn AgentVendor) -> Vec<Hypothesis> {
        match self.try_analyze(step_prompt, tasks, vendor).await {
            Ok(hypotheses) => {
                info!(count = hypotheses.len(), "Hypotheses derived");
                hypotheses
            }
            Err(e) => {
                warn!(error = %e, error_kind = "analysis_degraded", "Analysis degraded, using generic mutation");
                Hypothesis::generic_fallback()
            }
        }
    }

    async fn try_analyze(
        &self,
        step_prompt: &str,
        tasks: &[AgentTask],
        vendor: &dyn AgentVendor,
    ) -> DomainResult<Vec<Hypothesis>> {
        if tasks.is_empty() {
            return Err(DomainError::AnalysisDegraded("no agents to compare".to_string()));
        }

        let (top, bottom) = self.partition(tasks);
        let mut top_text = String::new();
        for task in &top {
            top_text.push_str(&describe(task, vendor).await);
        }
        let mut bottom_text = String::new();
        for task in &bottom {
            bottom_text.push_str(&describe(task, vendor).await);
        }
        if bottom_text.is_empty() {
            bottom_text.push_str("(none)\n");
        }

        let prompt = ANALYSIS_PROMPT
            .replace("{prompt}", step_prompt)
            .replace("{top}", &top_text)
            .replace("{bottom}", &bottom_text);

        let response = self
            .reasoner
            .complete(&prompt)
            .await
            .map_err(|e| DomainError::AnalysisDegraded(e.to_string()))?;
        parse_hypotheses(&response)
    }

    /// Top-K and bottom-K agents, best first and worst last, disjoint.
    fn partition<'a>(&self, tasks: &'a [AgentTask]) -> (Vec<&'a AgentTask>, Vec<&'a AgentTask>) {
        let scores: Vec<(u32, f64)> = tasks.iter().map(|t| (t.index, t.effective_score())).collect();
        let ranked: Vec<&AgentTask> = selection::rank(&scores)
            .into_iter()
            .filter_map(|(index, _)| tasks.iter().find(|t| t.index == index))
            .collect();

        let k = self.top_k.min(ranked.len());
        let top = ranked[..k].to_vec();
        let bottom_start = ranked.len().saturating_sub(self.top_k).max(k);
        let bottom = ranked[bottom_start..].to_vec();
        (top, bottom)
    }
}

fn excerpt(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= max_chars {
        trimmed.to_string()
    } else {
        let cut: String = trimmed.chars().take(max_chars).collect();
        format!("{cut}\n[... truncated]")
    }
}

/// Render one agent's evidence block.
async fn describe(task: &AgentTask, vendor: &dyn AgentVendor) -> String {
    let ws = &task.workspace;
    let patch = workspace::read_optional(ws.patch_file()).await.unwrap_or_default();
    let output = workspace::read_optional(ws.output_log()).await.unwrap_or_default();
    let summary = transcript_processor::summarize_file(&ws.raw_transcript(), vendor.transcript_parser())
        .unwrap_or_else(|_| TranscriptSummary::default());

    let mut block = String::new();
    let _ = writeln!(
        block,
        "--- Agent {} (score {:.2}, status {}, strategy {}) ---",
        task.id,
        task.effective_score(),
        task.status.as_str(),
        task.strategy.label()
    );
    if let Some(error) = &task.error_message {
        let _ = writeln!(block, "Error: {error}");
    }
    let _ = writeln!(block, "Actions:\n{}", summary.render());
    let _ = writeln!(
        block,
        "Diff:\n{}",
        if patch.trim().is_empty() { "(no changes)".to_string() } else { excerpt(&patch, PATCH_EXCERPT) }
    );
    let tail: String = {
        let count = output.chars().count();
        output.chars().skip(count.saturating_sub(TEXT_EXCERPT)).collect()
    };
    let _ = writeln!(block, "Output tail:\n{}", tail.trim());
    if let Some(details) = &task.eval_details {
        let _ = writeln!(block, "Eval output:\n{}", excerpt(details, TEXT_EXCERPT));
    }
    block
}

/// Parse the analysis response into hypotheses.
pub fn parse_hypotheses(response: &str) -> DomainResult<Vec<Hypothesis>> {
    let json = extract_json_from_response(response);
    let value: serde_json::Value = serde_json::from_str(&json)
        .map_err(|e| DomainError::AnalysisDegraded(format!("unparseable analysis: {e}")))?;

    // Accept a bare array, a wrapper object, or a single hypothesis object.
    let items = match value {
        serde_json::Value::Array(items) => items,
        serde_json::Value::Object(mut map) => match map.remove("hypotheses") {
            Some(serde_json::Value::Array(items)) => items,
            _ => vec![serde_json::Value::Object(map)],
        },
        _ => Vec::new(),
    };

    let hypotheses: Vec<Hypothesis> = items
        .into_iter()
        .filter_map(|item| serde_json::from_value::<RawHypothesis>(item).ok())
        .filter(|raw| !raw.directive.trim().is_empty() || !raw.rationale.trim().is_empty())
        .take(MAX_HYPOTHESES)
        .map(|raw| {
            let directive = if raw.directive.trim().is_empty() { raw.rationale.clone() } else { raw.directive };
            Hypothesis::new(
                PromptDimension::parse_lenient(&raw.dimension),
                raw.rationale.trim(),
                directive.trim(),
            )
        })
        .collect();

    if hypotheses.is_empty() {
        return Err(DomainError::AnalysisDegraded("analysis produced no directives".to_string()));
    }
    Ok(hypotheses)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::reasoners::ScriptedReasoner;
    use crate::adapters::vendors::ShellVendor;
    use crate::domain::models::{PromptStrategy, WorkspacePaths};
    use uuid::Uuid;

    fn task(dir: &std::path::Path, index: u32, score: f64) -> AgentTask {
        let ws = WorkspacePaths::new(dir.join(format!("a{index}")));
        std::fs::create_dir_all(ws.results()).unwrap();
        std::fs::write(ws.patch_file(), format!("+++ b/file{index}.py\n")).unwrap();
        let mut t = AgentTask::new(Uuid::nil(), 0, 1, index, "shell", "p", PromptStrategy::baseline(index, 2), ws);
        t.score = Some(score);
        t
    }

    #[test]
    fn test_parse_hypotheses_variants() {
        let parsed = parse_hypotheses(
            r#"```json
[{"rationale":"winner read tests first","dimension":"testing","directive":"Run the tests before editing"},
 {"rationale":"","dimension":"","directive":""}]
```"#,
        )
        .unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].dimension, PromptDimension::Testing);
        assert!(!parsed[0].generic);

        let wrapped = parse_hypotheses(r#"{"hypotheses":[{"rationale":"r","dimension":"approach","directive":"d"}]}"#).unwrap();
        assert_eq!(wrapped[0].dimension, PromptDimension::Strategy);

        assert!(parse_hypotheses("[]").is_err());
    }

    #[tokio::test]
    async fn test_analyze_compares_top_and_bottom() {
        let dir = tempfile::TempDir::new().unwrap();
        let tasks = vec![task(dir.path(), 0, 0.2), task(dir.path(), 1, 0.7), task(dir.path(), 2, 0.0)];
        let reasoner = Arc::new(ScriptedReasoner::new().with_response(
            r#"[{"rationale":"agent 1 edited the parser","dimension":"scope","directive":"Focus on parser.py"}]"#,
        ));
        let engine = HypothesisEngine::new(reasoner.clone(), 1);

        let hypotheses = engine.analyze("fix parser", &tasks, &ShellVendor::new()).await;

        assert_eq!(hypotheses.len(), 1);
        assert_eq!(hypotheses[0].directive, "Focus on parser.py");
        let prompt = &reasoner.prompts()[0];
        let top = prompt.find("Higher-scoring agents").unwrap();
        let bottom = prompt.find("Lower-scoring agents").unwrap();
        assert!(prompt[top..bottom].contains("file1.py"));
        assert!(prompt[bottom..].contains("file2.py"));
        assert!(!prompt.contains("file0.py"));
    }

    #[tokio::test]
    async fn test_analyze_degrades_to_generic() {
        let dir = tempfile::TempDir::new().unwrap();
        let tasks = vec![task(dir.path(), 0, 0.0), task(dir.path(), 1, 0.0)];
        let engine = HypothesisEngine::new(Arc::new(ScriptedReasoner::new().with_failure("offline")), 2);

        let hypotheses = engine.analyze("fix parser", &tasks, &ShellVendor::new()).await;
        assert!(!hypotheses.is_empty());
        assert!(hypotheses.iter().all(|h| h.generic));
    }
}
