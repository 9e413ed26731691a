//! Agent vendor port.

use serde::{Deserialize, Serialize};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::sandbox::CONTRACT_VERSION;
use crate::domain::models::{AgentTask, Hypothesis, PromptStrategy, SegmentDraft, TaskConfig};

/// Concrete process the sandbox runner spawns for one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentInvocation {
    /// Executable to spawn.
    pub program: String,
    pub args: Vec<String>,
    /// Extra environment for the agent process.
    pub env: Vec<(String, String)>,
    /// Whether stdout is the vendor's structured event stream.
    pub stdout_is_transcript: bool,
}

/// Parses one raw transcript line into segments.
pub trait TranscriptParser: Send + Sync {
    /// `None` marks a malformed line that should be skipped.
    fn parse_line(&self, line: &str) -> Option<Vec<SegmentDraft>>;
}

/// Pluggable provider of prompt variants and task configuration for one
/// AI-agent product.
///
/// Strategy and prompt logic lives here so the sandbox entry point stays
/// vendor-agnostic.
pub trait AgentVendor: Send + Sync {
    fn name(&self) -> &'static str;

    /// Approach texts the strategy's `approach` index selects from.
    fn approaches(&self) -> &[&'static str];

    /// Baseline strategy for variant `index` in generation 1.
    fn baseline_strategy(&self, index: u32) -> PromptStrategy {
        PromptStrategy::baseline(index, self.approaches().len())
    }

    /// Next generation's strategy, given the inherited hypotheses.
    fn mutate_strategy(&self, strategy: &PromptStrategy, hypotheses: &[Hypothesis]) -> PromptStrategy {
        strategy.mutate(hypotheses, self.approaches().len())
    }

    /// Render the prompt variant for a step's base prompt.
    fn build_prompt(&self, base_prompt: &str, strategy: &PromptStrategy) -> String {
        let approaches = self.approaches();
        let approach = approaches
            .get(strategy.approach % approaches.len().max(1))
            .copied()
            .unwrap_or("Solve the task directly.");
        strategy.render(base_prompt, approach)
    }

    /// Produce the `task.json` payload.
    fn build_task_config(&self, task: &AgentTask, agent_config: &serde_json::Value) -> DomainResult<TaskConfig> {
        Ok(TaskConfig {
            version: CONTRACT_VERSION,
            id: task.id.clone(),
            vendor: self.name().to_string(),
            prompt: task.prompt.clone(),
            agent_config: agent_config.clone(),
            strategy: Some(task.strategy.clone()),
            generation: task.generation,
            index: task.index,
        })
    }

    /// The process to run inside the sandbox for `config`.
    fn invocation(&self, config: &TaskConfig) -> DomainResult<AgentInvocation>;

    fn transcript_parser(&self) -> Box<dyn TranscriptParser>;
}

/// Name-keyed lookup of vendors.
pub trait VendorFactory: Send + Sync {
    fn create(&self, name: &str) -> Option<Box<dyn AgentVendor>>;

    fn available_vendors(&self) -> Vec<&'static str>;

    /// Resolve a vendor or fail with `UnknownVendor`.
    fn resolve(&self, name: &str) -> DomainResult<Box<dyn AgentVendor>> {
        self.create(name)
            .ok_or_else(|| DomainError::UnknownVendor(name.to_string()))
    }
}
