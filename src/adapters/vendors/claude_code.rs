//! Claude Code vendor.
//!
//! Runs the `claude` CLI in print mode inside the sandbox. Its stdout is the
//! stream-json event log, which doubles as the raw transcript.

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{SegmentDraft, SegmentKind, TaskConfig};
use crate::domain::ports::{AgentInvocation, AgentVendor, TranscriptParser};

const APPROACHES: &[&str] = &[
    "Solve the task directly.",
    "Think step by step. Break the problem down before writing code.",
    "Focus on writing minimal, correct code. Prioritize passing tests over completeness.",
    "Start by reading existing code carefully. Match the project's patterns and conventions.",
    "Consider edge cases. Handle unexpected inputs explicitly.",
];

/// Claude Code in non-interactive `stream-json` mode.
#[derive(Debug, Clone, Default)]
pub struct ClaudeCodeVendor;

impl ClaudeCodeVendor {
    pub fn new() -> Self {
        Self
    }

    fn build_args(config: &TaskConfig) -> Vec<String> {
        let mut args = vec![
            "--print".to_string(),
            "--output-format".to_string(),
            "stream-json".to_string(),
            "--verbose".to_string(),
            "--dangerously-skip-permissions".to_string(),
        ];

        if let Some(model) = config_str(config, "model") {
            args.push("--model".to_string());
            args.push(model.to_string());
        }

        if let Some(max_turns) = config_str(config, "max_turns") {
            args.push("--max-turns".to_string());
            args.push(max_turns.to_string());
        }

        args.push("-p".to_string());
        args.push(config.prompt.clone());
        args
    }
}

/// Read a string (or number) setting from `agent_config`.
fn config_str<'a>(config: &'a TaskConfig, key: &str) -> Option<std::borrow::Cow<'a, str>> {
    match config.agent_config.get(key)? {
        serde_json::Value::String(s) if !s.is_empty() => Some(std::borrow::Cow::Borrowed(s.as_str())),
        serde_json::Value::Number(n) => Some(std::borrow::Cow::Owned(n.to_string())),
        _ => None,
    }
}

impl AgentVendor for ClaudeCodeVendor {
    fn name(&self) -> &'static str {
        "claude-code"
    }

    fn approaches(&self) -> &[&'static str] {
        APPROACHES
    }

    fn invocation(&self, config: &TaskConfig) -> DomainResult<AgentInvocation> {
        if config.prompt.trim().is_empty() {
            return Err(DomainError::Setup("task.json has an empty prompt".to_string()));
        }

        let program = config_str(config, "claude_path")
            .map_or_else(|| "claude".to_string(), |p| p.to_string());

        Ok(AgentInvocation {
            program,
            args: Self::build_args(config),
            env: vec![("PHYLUM_AGENT_ID".to_string(), config.id.clone())],
            stdout_is_transcript: true,
        })
    }

    fn transcript_parser(&self) -> Box<dyn TranscriptParser> {
        Box::new(ClaudeStreamParser)
    }
}

/// Parser for Claude Code `stream-json` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClaudeStreamParser;

impl ClaudeStreamParser {
    fn parse_tool_use(block: &serde_json::Value) -> SegmentDraft {
        let name = block.get("name").and_then(|n| n.as_str()).unwrap_or("unknown");
        let input = block.get("input");
        let field = |key: &str| {
            input
                .and_then(|i| i.get(key))
                .and_then(|v| v.as_str())
                .map(ToString::to_string)
        };
        let payload = block.to_string();

        match name {
            "Write" => SegmentDraft::new(SegmentKind::CodeWrite, payload)
                .with_path(field("file_path"))
                .with_tool(name),
            "Edit" | "MultiEdit" => SegmentDraft::new(SegmentKind::CodeEdit, payload)
                .with_path(field("file_path"))
                .with_tool(name),
            "NotebookEdit" => SegmentDraft::new(SegmentKind::CodeEdit, payload)
                .with_path(field("notebook_path").or_else(|| field("file_path")))
                .with_tool(name),
            "Bash" => SegmentDraft::new(SegmentKind::Command, payload)
                .with_command(field("command"))
                .with_tool(name),
            other => SegmentDraft::new(SegmentKind::Other, payload)
                .with_path(field("file_path").or_else(|| field("path")))
                .with_tool(other),
        }
    }
}

impl TranscriptParser for ClaudeStreamParser {
    fn parse_line(&self, line: &str) -> Option<Vec<SegmentDraft>> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Some(Vec::new());
        }

        let event: serde_json::Value = serde_json::from_str(trimmed).ok()?;
        let event_type = event.get("type").and_then(|t| t.as_str())?;

        let segments = match event_type {
            "assistant" => {
                let blocks = event
                    .get("message")
                    .and_then(|m| m.get("content"))
                    .and_then(|c| c.as_array())
                    .cloned()
                    .unwrap_or_default();

                blocks
                    .iter()
                    .filter_map(|block| match block.get("type").and_then(|t| t.as_str()) {
                        Some("text") => {
                            let text = block.get("text").and_then(|t| t.as_str()).unwrap_or("");
                            (!text.trim().is_empty()).then(|| {
                                SegmentDraft::new(SegmentKind::Thought, block.to_string()).with_text(text)
                            })
                        }
                        Some("thinking") => {
                            let text = block.get("thinking").and_then(|t| t.as_str()).unwrap_or("");
                            (!text.trim().is_empty()).then(|| {
                                SegmentDraft::new(SegmentKind::Thought, block.to_string()).with_text(text)
                            })
                        }
                        Some("tool_use") => Some(Self::parse_tool_use(block)),
                        _ => None,
                    })
                    .collect()
            }
            "tool_use" => vec![Self::parse_tool_use(&event)],
            "user" | "tool_result" => vec![SegmentDraft::new(SegmentKind::Other, trimmed).with_tool("tool_result")],
            "error" => vec![SegmentDraft::new(SegmentKind::Other, trimmed).with_tool("error")],
            "result" => vec![SegmentDraft::new(SegmentKind::Other, trimmed).with_tool("result")],
            // system init and other bookkeeping events carry no agent activity
            _ => Vec::new(),
        };

        Some(segments)
    }
}
