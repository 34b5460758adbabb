//! Persistent REPL evaluation.
//!
//! [`Evaluator::evaluate`] turns one line of REPL input into a transcript.
//! Special commands (`vars`, `clear`, `exit`, empty input) are answered
//! directly. Everything else is classified, composed into a
//! [`ScriptRequest`] that first replays the session's stored variables, and
//! run on the scripting backend with a bounded output sink. Assignments also
//! capture every bound variable afterwards and merge them back into the
//! [`VariableStore`], but only when evaluation succeeds.
//!
//! A failed evaluation is not an error for the caller: the transcript holds a
//! single `Category: message` line, anything printed before the failure is
//! dropped, and the result carries exit code 1.

pub mod render;

use std::sync::{Arc, LazyLock};
use std::time::Instant;

use regex_lite::Regex;
use tracing::{debug, warn};

use crate::limits::LimitedBuffer;
use crate::script::{Binding, ScriptBackend, ScriptError, ScriptOutput, ScriptRequest, Value};
use crate::session::SessionKey;
use crate::store::VariableStore;
use crate::transcript::{ExecutionResult, ExecutionStats, Transcript};

pub use render::render;

/// Default cap on output captured from one evaluation.
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 1024 * 1024;

/// `$name = ...`, optionally with index targets or a compound operator.
static ASSIGNMENT: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"^\$([A-Za-z_][A-Za-z0-9_]*)(?:\s*\[[^\]]*\])*\s*(?:[-+*/.%]|\?\?)?=(?:[^=>]|$)")
        .map_err(|e| warn!(error = %e, "invalid assignment pattern"))
        .ok()
});

/// Leading keywords of input that runs as-is.
const STATEMENT_KEYWORDS: &[&str] = &[
    "if", "foreach", "for", "while", "do", "switch", "try", "echo", "print", "return",
    "throw", "unset", "function", "class", "global", "static", "const", "namespace", "use",
];

/// How REPL input is run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputKind {
    /// Binds `target`; variables are captured and persisted.
    Assignment {
        /// Name of the assigned variable, without `$`.
        target: String,
    },
    /// Runs as written; produces no implicit return value.
    Statement,
    /// Its value becomes the result.
    Expression,
}

impl InputKind {
    /// Classify trimmed REPL input.
    pub fn classify(code: &str) -> Self {
        if let Some(re) = ASSIGNMENT.as_ref()
            && let Some(caps) = re.captures(code)
            && let Some(target) = caps.get(1)
        {
            return InputKind::Assignment {
                target: target.as_str().to_string(),
            };
        }

        let word: String = code
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
            .collect();
        if STATEMENT_KEYWORDS.contains(&word.to_ascii_lowercase().as_str()) {
            InputKind::Statement
        } else {
            InputKind::Expression
        }
    }

    /// Source handed to the backend for `code`.
    pub fn compose(&self, code: &str) -> String {
        match self {
            InputKind::Expression => format!("return {};", code),
            InputKind::Assignment { .. } | InputKind::Statement => format!("{};", code),
        }
    }
}

/// Input answered without evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialCommand {
    /// `exit` or `quit`: clear the session and say goodbye.
    Exit,
    /// `clear` or `reset`: clear the session.
    Clear,
    /// `vars` or `variables`: list stored variables.
    Vars,
    /// Empty input: show help.
    Help,
}

impl SpecialCommand {
    /// Recognize a special command, ignoring case and surrounding whitespace.
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_lowercase().as_str() {
            "exit" | "quit" => Some(SpecialCommand::Exit),
            "clear" | "reset" => Some(SpecialCommand::Clear),
            "vars" | "variables" => Some(SpecialCommand::Vars),
            "" => Some(SpecialCommand::Help),
            _ => None,
        }
    }
}

/// Evaluates REPL input against a session's stored variables.
#[derive(Debug, Clone)]
pub struct Evaluator {
    backend: Arc<dyn ScriptBackend>,
    store: VariableStore,
    max_output_bytes: usize,
}

impl Evaluator {
    /// Create an evaluator running code on `backend`.
    pub fn new(backend: Arc<dyn ScriptBackend>, store: VariableStore) -> Self {
        Self {
            backend,
            store,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
        }
    }

    /// Cap the output captured from one evaluation.
    pub fn with_max_output_bytes(mut self, max_output_bytes: usize) -> Self {
        self.max_output_bytes = max_output_bytes;
        self
    }

    /// The store variables are persisted in.
    pub fn store(&self) -> &VariableStore {
        &self.store
    }

    /// Evaluate one line of input for `session`.
    pub async fn evaluate(&self, code: &str, session: &SessionKey) -> ExecutionResult {
        let start = Instant::now();
        let mut transcript = Transcript::new();

        let mut result = match SpecialCommand::parse(code) {
            Some(special) => {
                self.special(special, session, &mut transcript).await;
                ExecutionResult::from_transcript(0, transcript)
            }
            None => self.run(code, session, transcript).await,
        };

        result.stats = ExecutionStats {
            wall_time_ms: start.elapsed().as_millis() as u64,
        };
        result
    }

    async fn special(&self, special: SpecialCommand, session: &SessionKey, transcript: &mut Transcript) {
        match special {
            SpecialCommand::Exit => {
                self.store.clear(session).await;
                transcript.line("Goodbye! Variables cleared.");
            }
            SpecialCommand::Clear => {
                self.store.clear(session).await;
                transcript.line("Variables cleared!");
            }
            SpecialCommand::Vars => {
                let records = self.store.get(session).await;
                if records.is_empty() {
                    transcript.line("No variables stored yet.");
                    return;
                }
                transcript.line("Stored Variables:");
                for record in records {
                    transcript.line(format!(
                        "  ${} ({}) = {}",
                        record.name, record.type_tag, record.display
                    ));
                }
            }
            SpecialCommand::Help => self.help(transcript),
        }
    }

    fn help(&self, transcript: &mut Transcript) {
        transcript.line("Tinker Mode - With Persistent Variables");
        transcript.blank();
        transcript.line("Variables persist between commands!");
        transcript.blank();
        transcript.line("Examples:");
        transcript.line("  $number = 42");
        transcript.line("  $user = User::first()");
        transcript.line("  $user->name                 <-- Variables persist!");
        transcript.line("  $items = collect([1, 2, 3])");
        transcript.line("  $items->count()");
        transcript.blank();
        transcript.line("Quick expressions:");
        transcript.line("  1 + 1");
        transcript.line("  config(\"app.name\")");
        transcript.line("  User::count()");
        transcript.blank();
        transcript.line("Special commands:");
        transcript.line("  vars                        Show stored variables");
        transcript.line("  clear                       Clear all variables");
        transcript.line("  exit                        Exit and clear variables");
        transcript.blank();
        transcript.line(format!(
            "Variables expire after {} minutes of inactivity.",
            self.store.ttl().as_secs() / 60
        ));
    }

    async fn run(&self, code: &str, session: &SessionKey, mut transcript: Transcript) -> ExecutionResult {
        let trimmed = code.trim();
        let code = trimmed.strip_suffix(';').unwrap_or(trimmed).trim_end();
        transcript.line(format!(">>> {}", code));

        let kind = InputKind::classify(code);
        let bindings = self
            .store
            .get(session)
            .await
            .into_iter()
            .map(|record| Binding {
                name: record.name,
                payload: record.payload,
            })
            .collect();
        let request = ScriptRequest::new(kind.compose(code))
            .with_bindings(bindings)
            .capture(matches!(kind, InputKind::Assignment { .. }));
        debug!(session = %session, kind = ?kind, "evaluating");

        let (outcome, captured) = self.execute(request).await;
        let truncated = captured.was_truncated();

        let (exit_code, value) = match outcome {
            Ok(ScriptOutput { value, bindings }) => {
                let text = captured.to_string_lossy();
                if !text.is_empty() {
                    transcript.block(&text);
                }

                // Assignments are composed without `return`, so their value is
                // null unless the input returns one itself. The REPL then shows
                // the target as it was left.
                let value = match (&kind, bindings) {
                    (InputKind::Assignment { target }, Some(bindings)) => {
                        let assigned = bindings.get(target).cloned().unwrap_or_default();
                        self.store.merge(session, bindings).await;
                        if value == Value::Null { assigned } else { value }
                    }
                    _ => value,
                };

                let rendered = render(&value);
                let mut lines = rendered.lines();
                transcript.line(format!("=> {}", lines.next().unwrap_or_default()));
                for line in lines {
                    transcript.line(line);
                }
                (0, Some(value))
            }
            Err(e) => {
                debug!(session = %session, category = %e.category, "evaluation failed");
                transcript.line(e.to_string());
                (1, None)
            }
        };

        let mut result = ExecutionResult::from_transcript(exit_code, transcript);
        result.value = value;
        result.truncated = truncated;
        result
    }

    /// Run `request` off the async runtime with a bounded sink.
    async fn execute(&self, request: ScriptRequest) -> (Result<ScriptOutput, ScriptError>, LimitedBuffer) {
        let backend = Arc::clone(&self.backend);
        let limit = self.max_output_bytes;
        let joined = tokio::task::spawn_blocking(move || {
            let mut sink = LimitedBuffer::new(limit);
            let outcome = backend.evaluate(&request, &mut sink);
            (outcome, sink)
        })
        .await;

        joined.unwrap_or_else(|e| {
            warn!(error = %e, "evaluation task failed");
            (
                Err(ScriptError::error("evaluation aborted")),
                LimitedBuffer::new(0),
            )
        })
    }
}
