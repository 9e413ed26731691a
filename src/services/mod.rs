//! Application services.
//!
//! Services compose the domain ports into the evolution loop and the
//! sandbox-side runner.

pub mod eval_harness;
pub mod evolution_orchestrator;
pub mod hypothesis_engine;
pub mod job_manager;
pub mod plan_decomposer;
pub mod retry;
pub mod sandbox_runner;
pub mod selection;
pub mod transcript_processor;
pub mod workspace;

pub use eval_harness::EvalHarness;
pub use evolution_orchestrator::{EvolutionOrchestrator, OrchestratorSettings};
pub use hypothesis_engine::HypothesisEngine;
pub use job_manager::JobManager;
pub use plan_decomposer::{PlanDecomposer, PlannedStep};
pub use retry::RetryPolicy;
pub use sandbox_runner::SandboxRunner;
pub use selection::select_winner;

/// Pull the JSON payload out of a model response.
///
/// Handles markdown code fences and surrounding prose by taking the span
/// from the first `[` or `{` to the last matching closer.
pub fn extract_json_from_response(response: &str) -> String {
    let mut text = response.trim();

    if let Some(fence) = text.find("```") {
        let after = &text[fence + 3..];
        // skip the language tag line
        let body = after.find('\n').map_or(after, |nl| &after[nl + 1..]);
        text = body.find("```").map_or(body, |end| &body[..end]).trim();
    }

    let Some(start) = text.find(['[', '{']) else {
        return text.to_string();
    };
    let closer = if text[start..].starts_with('[') { ']' } else { '}' };
    match text.rfind(closer) {
        Some(end) if end > start => text[start..=end].to_string(),
        _ => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_plain() {
        let input = r#"{"analysis": "test"}"#;
        assert_eq!(extract_json_from_response(input), input);
    }

    #[test]
    fn test_extract_json_code_block() {
        let input = "```json\n{\"analysis\": \"test\"}\n```";
        assert_eq!(extract_json_from_response(input), r#"{"analysis": "test"}"#);
    }

    #[test]
    fn test_extract_json_with_prose() {
        let input = "Sure! Here are the steps: [{\"description\": \"a\"}] Let me know.";
        assert_eq!(extract_json_from_response(input), r#"[{"description": "a"}]"#);
    }
}
