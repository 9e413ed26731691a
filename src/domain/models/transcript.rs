//! Transcript segment model.

use serde::{Deserialize, Serialize};

/// Classification of one transcript event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SegmentKind {
    Thought,
    CodeWrite,
    CodeEdit,
    Command,
    Other,
}

impl SegmentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Thought => "THOUGHT",
            Self::CodeWrite => "CODE_WRITE",
            Self::CodeEdit => "CODE_EDIT",
            Self::Command => "COMMAND",
            Self::Other => "OTHER",
        }
    }
}

/// One typed unit of an agent's parsed event stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    /// Position in the parsed sequence.
    pub index: usize,
    pub kind: SegmentKind,
    /// Raw event (or the relevant block of it).
    pub payload: String,
    /// Extracted prose for thoughts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Tool or event name for `OTHER` segments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
}

/// A segment before it has been assigned a position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentDraft {
    pub kind: SegmentKind,
    pub payload: String,
    pub text: Option<String>,
    pub path: Option<String>,
    pub command: Option<String>,
    pub tool: Option<String>,
}

impl SegmentDraft {
    pub fn new(kind: SegmentKind, payload: impl Into<String>) -> Self {
        Self {
            kind,
            payload: payload.into(),
            text: None,
            path: None,
            command: None,
            tool: None,
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_path(mut self, path: Option<String>) -> Self {
        self.path = path;
        self
    }

    pub fn with_command(mut self, command: Option<String>) -> Self {
        self.command = command;
        self
    }

    pub fn with_tool(mut self, tool: impl Into<String>) -> Self {
        self.tool = Some(tool.into());
        self
    }

    /// Finish the draft at position `index`.
    pub fn into_segment(self, index: usize) -> TranscriptSegment {
        TranscriptSegment {
            index,
            kind: self.kind,
            payload: self.payload,
            text: self.text,
            path: self.path,
            command: self.command,
            tool: self.tool,
        }
    }
}

/// Aggregate view of a transcript used in analysis prompts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptSummary {
    pub thoughts: usize,
    pub files_written: Vec<String>,
    pub files_edited: Vec<String>,
    pub commands: Vec<String>,
    pub other: usize,
}

impl TranscriptSummary {
    /// Tally segments by kind.
    pub fn from_segments<'a>(segments: impl IntoIterator<Item = &'a TranscriptSegment>) -> Self {
        let mut summary = Self::default();
        for segment in segments {
            match segment.kind {
                SegmentKind::Thought => summary.thoughts += 1,
                SegmentKind::CodeWrite => push_path(&mut summary.files_written, segment.path.as_ref()),
                SegmentKind::CodeEdit => push_path(&mut summary.files_edited, segment.path.as_ref()),
                SegmentKind::Command => {
                    if let Some(cmd) = &segment.command {
                        summary.commands.push(cmd.clone());
                    }
                }
                SegmentKind::Other => summary.other += 1,
            }
        }
        summary
    }

    pub fn is_empty(&self) -> bool {
        self.thoughts == 0
            && self.files_written.is_empty()
            && self.files_edited.is_empty()
            && self.commands.is_empty()
            && self.other == 0
    }

    /// Render as a few lines for a prompt.
    pub fn render(&self) -> String {
        if self.is_empty() {
            return "(no transcript events)".to_string();
        }
        let mut lines = vec![format!("Thoughts: {}", self.thoughts)];
        if !self.files_written.is_empty() {
            lines.push(format!("Files written: {}", self.files_written.join(", ")));
        }
        if !self.files_edited.is_empty() {
            lines.push(format!("Files edited: {}", self.files_edited.join(", ")));
        }
        if !self.commands.is_empty() {
            let shown: Vec<&str> = self.commands.iter().take(10).map(String::as_str).collect();
            lines.push(format!("Commands: {}", shown.join(" | ")));
        }
        lines.join("\n")
    }
}

fn push_path(list: &mut Vec<String>, path: Option<&String>) {
    if let Some(path) = path {
        if !list.contains(path) {
            list.push(path.clone());
        }
    }
}
