//! Implementation of the `phylum logs` command.

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use std::path::PathBuf;

use crate::cli::context::AppContext;
use crate::cli::output::{output, truncate, CommandOutput};
use crate::domain::models::{AgentTask, SegmentKind, TranscriptSegment};
use crate::domain::ports::{RunRepository, VendorFactory};
use crate::services::transcript_processor;

/// Arguments for `phylum logs`.
#[derive(Args, Debug)]
pub struct LogsArgs {
    /// Agent id (as shown by `phylum results`)
    pub agent_id: String,

    /// Print the raw vendor event stream instead of parsed segments
    #[arg(long, conflicts_with_all = ["stderr", "output"])]
    pub raw: bool,

    /// Print the agent's stderr log
    #[arg(long, conflicts_with = "output")]
    pub stderr: bool,

    /// Print the agent's stdout log
    #[arg(long)]
    pub output: bool,
}

/// Parsed transcript of one agent.
#[derive(Debug, Serialize)]
pub struct TranscriptOutput {
    pub agent_id: String,
    pub transcript_path: String,
    pub segments: Vec<TranscriptSegment>,
}

impl CommandOutput for TranscriptOutput {
    fn to_human(&self) -> String {
        if self.segments.is_empty() {
            return format!("No transcript segments in {}", self.transcript_path);
        }
        self.segments
            .iter()
            .map(|segment| {
                let detail = match segment.kind {
                    SegmentKind::Thought => segment.text.clone().unwrap_or_default(),
                    SegmentKind::CodeWrite | SegmentKind::CodeEdit => segment.path.clone().unwrap_or_default(),
                    SegmentKind::Command => segment.command.clone().unwrap_or_default(),
                    SegmentKind::Other => segment.tool.clone().or_else(|| segment.text.clone()).unwrap_or_default(),
                };
                format!(
                    "{:>4} {:<10} {}",
                    segment.index,
                    segment.kind.as_str(),
                    truncate(detail.lines().next().unwrap_or(""), 100)
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

/// Verbatim contents of one log file.
#[derive(Debug, Serialize)]
pub struct FileOutput {
    pub agent_id: String,
    pub path: String,
    pub content: String,
}

impl CommandOutput for FileOutput {
    fn to_human(&self) -> String {
        self.content.clone()
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

fn selected_file(task: &AgentTask, args: &LogsArgs) -> Option<PathBuf> {
    if args.stderr {
        Some(task.workspace.stderr_log())
    } else if args.output {
        Some(task.workspace.output_log())
    } else if args.raw {
        Some(transcript_path(task))
    } else {
        None
    }
}

fn transcript_path(task: &AgentTask) -> PathBuf {
    task.transcript_path
        .as_ref()
        .map_or_else(|| task.workspace.raw_transcript(), PathBuf::from)
}

/// Show an agent's transcript, or one of its raw log files.
pub async fn execute(args: LogsArgs, json_mode: bool) -> Result<()> {
    let ctx = AppContext::open().await?;
    let task = ctx
        .repository
        .find_agent_task(&args.agent_id)
        .await?
        .with_context(|| format!("No agent '{}'", args.agent_id))?;

    if let Some(path) = selected_file(&task, &args) {
        let content = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        output(
            &FileOutput {
                agent_id: task.id,
                path: path.display().to_string(),
                content,
            },
            json_mode,
        );
        return Ok(());
    }

    let vendor = ctx.vendors.resolve(&task.vendor)?;
    let path = transcript_path(&task);
    let segments: Vec<TranscriptSegment> = transcript_processor::open(&path, vendor.transcript_parser())?.collect();
    output(
        &TranscriptOutput {
            agent_id: task.id,
            transcript_path: path.display().to_string(),
            segments,
        },
        json_mode,
    );
    Ok(())
}
