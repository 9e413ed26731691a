//! Shell vendor.
//!
//! Runs an arbitrary command from `agent_config.command` with the prompt
//! exported in the environment. Its stdout lines form the transcript.
//! Useful for scripted agents and tests.

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{SegmentDraft, SegmentKind, TaskConfig};
use crate::domain::ports::{AgentInvocation, AgentVendor, TranscriptParser};

const APPROACHES: &[&str] = &[
    "Solve the task directly.",
    "Work in small steps and verify each one.",
];

/// Runs `agent_config.command` through `sh -c`. Useful for scripted agents
/// and for wrapping tools phylum has no native vendor for.
#[derive(Debug, Clone, Default)]
pub struct ShellVendor;

impl ShellVendor {
    pub fn new() -> Self {
        Self
    }
}

impl AgentVendor for ShellVendor {
    fn name(&self) -> &'static str {
        "shell"
    }

    fn approaches(&self) -> &[&'static str] {
        APPROACHES
    }

    fn invocation(&self, config: &TaskConfig) -> DomainResult<AgentInvocation> {
        let command = config
            .agent_config
            .get("command")
            .and_then(|c| c.as_str())
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| {
                DomainError::Setup("shell vendor requires agent_config.command".to_string())
            })?;

        Ok(AgentInvocation {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), command.to_string()],
            env: vec![
                ("PHYLUM_PROMPT".to_string(), config.prompt.clone()),
                ("PHYLUM_AGENT_ID".to_string(), config.id.clone()),
                ("PHYLUM_GENERATION".to_string(), config.generation.to_string()),
                ("PHYLUM_VARIANT_INDEX".to_string(), config.index.to_string()),
            ],
            stdout_is_transcript: true,
        })
    }

    fn transcript_parser(&self) -> Box<dyn TranscriptParser> {
        Box::new(LineParser)
    }
}

/// Treats every non-blank output line as an `OTHER` segment.
#[derive(Debug, Clone, Copy, Default)]
pub struct LineParser;

impl TranscriptParser for LineParser {
    fn parse_line(&self, line: &str) -> Option<Vec<SegmentDraft>> {
        let trimmed = line.trim_end();
        if trimmed.trim().is_empty() {
            return Some(Vec::new());
        }
        Some(vec![SegmentDraft::new(SegmentKind::Other, trimmed).with_text(trimmed)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(agent_config: serde_json::Value) -> TaskConfig {
        TaskConfig {
            version: 1,
            id: "abc-s0-g2-a3".to_string(),
            vendor: "shell".to_string(),
            prompt: "make it pass".to_string(),
            agent_config,
            strategy: None,
            generation: 2,
            index: 3,
        }
    }

    #[test]
    fn test_invocation_exports_prompt() {
        let inv = ShellVendor::new()
            .invocation(&config(serde_json::json!({"command": "touch PASS"})))
            .unwrap();
        assert_eq!(inv.program, "sh");
        assert_eq!(inv.args, vec!["-c", "touch PASS"]);
        assert!(inv.env.contains(&("PHYLUM_PROMPT".to_string(), "make it pass".to_string())));
        assert!(inv.env.contains(&("PHYLUM_VARIANT_INDEX".to_string(), "3".to_string())));
        assert!(inv.stdout_is_transcript);
    }

    #[test]
    fn test_missing_command_is_setup_error() {
        let err = ShellVendor::new().invocation(&config(serde_json::json!({}))).unwrap_err();
        assert_eq!(err.kind(), "setup");
    }

    #[test]
    fn test_line_parser() {
        assert_eq!(LineParser.parse_line("   "), Some(vec![]));
        let segments = LineParser.parse_line("hello\n").unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].kind, SegmentKind::Other);
        assert_eq!(segments[0].text.as_deref(), Some("hello"));
    }
}
