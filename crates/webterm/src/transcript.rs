//! Ordered output transcripts and execution results.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;

use crate::script::Value;

/// Ordered, line-oriented output collected for one invocation.
///
/// A transcript can optionally forward every line to a listener as soon as
/// it is written, which is how streamed process output reaches a caller
/// before the child exits.
#[derive(Debug, Default)]
pub struct Transcript {
    lines: Vec<String>,
    listener: Option<UnboundedSender<String>>,
}

impl Transcript {
    /// Create an empty transcript.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a transcript that also forwards each line to `listener`.
    pub fn with_listener(listener: UnboundedSender<String>) -> Self {
        Self {
            lines: Vec::new(),
            listener: Some(listener),
        }
    }

    /// Append a single line.
    pub fn line(&mut self, line: impl Into<String>) {
        let line = line.into();
        if let Some(listener) = &self.listener {
            // A dropped receiver only means nobody is watching live.
            let _ = listener.send(line.clone());
        }
        self.lines.push(line);
    }

    /// Append an empty line.
    pub fn blank(&mut self) {
        self.line(String::new());
    }

    /// Append every line of a multi-line block.
    pub fn block(&mut self, text: &str) {
        for line in text.lines() {
            self.line(line);
        }
    }

    /// Lines written so far.
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Whether nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// The transcript joined with newlines.
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }

    /// Consume the transcript, returning its lines.
    pub fn into_lines(self) -> Vec<String> {
        self.lines
    }
}

/// Statistics about an execution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionStats {
    /// Wall clock time in milliseconds
    pub wall_time_ms: u64,
}

/// Result of one invocation of the evaluator, dispatcher or process runner.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// Exit or status code; zero means success.
    pub exit_code: i32,
    /// Captured transcript lines, in order.
    pub output: Vec<String>,
    /// Typed return value, only set by the evaluator.
    pub value: Option<Value>,
    /// Whether captured output was truncated.
    pub truncated: bool,
    /// Execution statistics
    pub stats: ExecutionStats,
}

impl ExecutionResult {
    /// Build a result from a finished transcript.
    pub fn from_transcript(exit_code: i32, transcript: Transcript) -> Self {
        Self {
            exit_code,
            output: transcript.into_lines(),
            value: None,
            truncated: false,
            stats: ExecutionStats::default(),
        }
    }

    /// Whether the exit code signals success.
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// The transcript joined with newlines.
    pub fn text(&self) -> String {
        self.output.join("\n")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_transcript_keeps_order() {
        let mut transcript = Transcript::new();
        transcript.line("first");
        transcript.blank();
        transcript.block("second\nthird");

        assert_eq!(transcript.lines(), &["first", "", "second", "third"]);
        assert_eq!(transcript.text(), "first\n\nsecond\nthird");
    }

    #[test]
    fn test_listener_sees_lines_as_written() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let mut transcript = Transcript::with_listener(tx);

        transcript.line("one");
        assert_eq!(rx.try_recv().unwrap(), "one");
        transcript.line("two");
        assert_eq!(rx.try_recv().unwrap(), "two");
    }

    #[test]
    fn test_dropped_listener_is_harmless() {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        drop(rx);
        let mut transcript = Transcript::with_listener(tx);
        transcript.line("still recorded");

        assert_eq!(transcript.lines().len(), 1);
    }

    #[test]
    fn test_result_from_transcript() {
        let mut transcript = Transcript::new();
        transcript.line("done");
        let result = ExecutionResult::from_transcript(0, transcript);

        assert!(result.success());
        assert_eq!(result.text(), "done");
        assert!(result.value.is_none());
    }
}
