//! Transcript processor.
//!
//! Turns a raw vendor event stream into typed segments, lazily. Only
//! newline-terminated lines are parsed: an unterminated trailing line is a
//! write cut short by a killed sandbox and ends the sequence, which makes
//! the segments of a truncated stream a prefix of those of the full stream.
//! Malformed complete lines are skipped.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::debug;

use crate::domain::errors::DomainResult;
use crate::domain::models::{SegmentDraft, TranscriptSegment, TranscriptSummary};
use crate::domain::ports::TranscriptParser;

/// Lazy iterator of segments over a buffered reader.
pub struct TranscriptSegments<R> {
    reader: R,
    parser: Box<dyn TranscriptParser>,
    pending: VecDeque<SegmentDraft>,
    buf: Vec<u8>,
    next_index: usize,
    line_no: usize,
    skipped: usize,
    finished: bool,
}

impl<R: BufRead> TranscriptSegments<R> {
    /// Parse events from `reader` with the vendor's parser.
    pub fn new(reader: R, parser: Box<dyn TranscriptParser>) -> Self {
        Self {
            reader,
            parser,
            pending: VecDeque::new(),
            buf: Vec::new(),
            next_index: 0,
            line_no: 0,
            skipped: 0,
            finished: false,
        }
    }

    /// Malformed lines skipped so far.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Read the next complete line into the pending queue. Returns `false`
    /// once the stream is exhausted.
    fn fill(&mut self) -> bool {
        self.buf.clear();
        match self.reader.read_until(b'\n', &mut self.buf) {
            Ok(0) => false,
            Ok(_) if self.buf.last() != Some(&b'\n') => {
                debug!(line = self.line_no + 1, "Ignoring unterminated trailing transcript line");
                false
            }
            Ok(_) => {
                self.line_no += 1;
                let line = String::from_utf8_lossy(&self.buf);
                match self.parser.parse_line(&line) {
                    Some(drafts) => self.pending.extend(drafts),
                    None => {
                        self.skipped += 1;
                        debug!(line = self.line_no, "Skipping malformed transcript line");
                    }
                }
                true
            }
            Err(e) => {
                debug!(error = %e, "Transcript read failed, ending sequence");
                false
            }
        }
    }
}

impl<R: BufRead> Iterator for TranscriptSegments<R> {
    type Item = TranscriptSegment;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(draft) = self.pending.pop_front() {
                let segment = draft.into_segment(self.next_index);
                self.next_index += 1;
                return Some(segment);
            }
            if self.finished {
                return None;
            }
            if !self.fill() {
                self.finished = true;
            }
        }
    }
}

/// Segments of an in-memory stream.
pub fn parse_str(raw: &str, parser: Box<dyn TranscriptParser>) -> Vec<TranscriptSegment> {
    TranscriptSegments::new(raw.as_bytes(), parser).collect()
}

/// Open a transcript file as a lazy segment sequence. A missing file is an
/// empty sequence.
pub fn open(
    path: &Path,
    parser: Box<dyn TranscriptParser>,
) -> DomainResult<TranscriptSegments<Box<dyn BufRead + Send>>> {
    let reader: Box<dyn BufRead + Send> = match File::open(path) {
        Ok(file) => Box::new(BufReader::new(file)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Box::new(std::io::empty()),
        Err(e) => return Err(e.into()),
    };
    Ok(TranscriptSegments::new(reader, parser))
}

/// Summarise a transcript file for analysis prompts.
pub fn summarize_file(path: &Path, parser: Box<dyn TranscriptParser>) -> DomainResult<TranscriptSummary> {
    let segments: Vec<TranscriptSegment> = open(path, parser)?.collect();
    Ok(TranscriptSummary::from_segments(&segments))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::vendors::{ClaudeStreamParser, LineParser};
    use crate::domain::models::SegmentKind;

    const STREAM: &str = concat!(
        r#"{"type":"system","subtype":"init"}"#, "\n",
        r#"{"type":"assistant","message":{"content":[{"type":"text","text":"Reading the parser."}]}}"#, "\n",
        "not json at all\n",
        r#"{"type":"assistant","message":{"content":[{"type":"tool_use","name":"Edit","input":{"file_path":"src/parse.rs"}}]}}"#, "\n",
        r#"{"type":"assistant","message":{"content":[{"type":"tool_use","name":"Bash","input":{"command":"cargo test"}}]}}"#, "\n",
        r#"{"type":"result","result":"done"}"#, "\n",
    );

    #[test]
    fn test_segments_are_typed_and_indexed() {
        let mut iter = TranscriptSegments::new(STREAM.as_bytes(), Box::new(ClaudeStreamParser));
        let segments: Vec<_> = iter.by_ref().collect();
        let kinds: Vec<SegmentKind> = segments.iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            vec![SegmentKind::Thought, SegmentKind::CodeEdit, SegmentKind::Command, SegmentKind::Other]
        );
        assert_eq!(segments.iter().map(|s| s.index).collect::<Vec<_>>(), vec![0, 1, 2, 3]);
        assert_eq!(iter.skipped(), 1);
    }

    #[test]
    fn test_reparse_is_identical() {
        let first = parse_str(STREAM, Box::new(ClaudeStreamParser));
        let second = parse_str(STREAM, Box::new(ClaudeStreamParser));
        assert_eq!(first, second);
    }

    #[test]
    fn test_truncated_stream_yields_prefix() {
        let full = parse_str(STREAM, Box::new(ClaudeStreamParser));
        let cut = STREAM.find("cargo test").unwrap();
        let truncated = parse_str(&STREAM[..cut], Box::new(ClaudeStreamParser));
        assert_eq!(truncated.len(), 2);
        assert_eq!(truncated[..], full[..2]);
    }

    #[test]
    fn test_unterminated_plain_line_is_dropped() {
        let segments = parse_str("first\nsecond line cut sh", Box::new(LineParser));
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].text.as_deref(), Some("first"));
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::TempDir::new().unwrap();
        let summary = summarize_file(&dir.path().join("raw.jsonl"), Box::new(LineParser)).unwrap();
        assert!(summary.is_empty());
    }
}
