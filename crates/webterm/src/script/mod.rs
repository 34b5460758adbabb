//! Scripting backends.
//!
//! The evaluator never runs code itself. It composes a [`ScriptRequest`]
//! (prior bindings plus source) and hands it to a [`ScriptBackend`] together
//! with an explicit output sink. A failed evaluation comes back as a
//! [`ScriptError`] carrying an error category and message, never as a panic
//! or a partially updated state.
//!
//! [`Sandbox`] is the bundled backend: a restricted evaluator for a small
//! PHP-flavoured language with variables, arrays, control flow, a set of
//! builtins and host-registered static functions.

mod builtins;
mod interp;
mod lexer;
mod parser;
mod sandbox;
mod value;

pub use sandbox::{Sandbox, StaticFn};
pub use value::{
    Array, COLLECTION_CLASS, Key, Number, Object, ObjectKind, Value, class_basename,
    format_float, parse_numeric,
};

use std::collections::BTreeMap;
use std::fmt;
use std::io;

use thiserror::Error;

/// Error categories reported by [`Sandbox`].
pub mod category {
    /// Source text could not be parsed.
    pub const PARSE: &str = "ParseError";
    /// Unknown function, method or class, or an invalid operation.
    pub const ERROR: &str = "Error";
    /// Read of an undefined variable, index or property.
    pub const ERROR_EXCEPTION: &str = "ErrorException";
    /// Integer division or modulo by zero.
    pub const DIVISION_BY_ZERO: &str = "DivisionByZeroError";
    /// Operand or argument of the wrong type.
    pub const TYPE: &str = "TypeError";
    /// Builtin called with too few arguments.
    pub const ARGUMENT_COUNT: &str = "ArgumentCountError";
    /// Argument of the right type but an invalid value.
    pub const VALUE: &str = "ValueError";
}

/// A failed evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{category}: {message}")]
pub struct ScriptError {
    /// Error class name, e.g. `ParseError` or a thrown exception class.
    pub category: String,
    /// Human-readable message.
    pub message: String,
}

impl ScriptError {
    /// Create an error of `category`.
    pub fn new(category: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            message: message.into(),
        }
    }

    /// A parse error.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(category::PARSE, message)
    }

    /// A generic runtime error.
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(category::ERROR, message)
    }

    /// Read of something undefined.
    pub fn undefined(message: impl Into<String>) -> Self {
        Self::new(category::ERROR_EXCEPTION, message)
    }

    /// A type error.
    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(category::TYPE, message)
    }
}

/// A prior variable binding replayed before the source runs.
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    /// Variable name without the `$` sigil.
    pub name: String,
    /// Serialized value, as stored by the variable store.
    pub payload: serde_json::Value,
}

/// One evaluation request.
#[derive(Debug, Clone, Default)]
pub struct ScriptRequest {
    /// Bindings restored before `source` runs, in order.
    pub bindings: Vec<Binding>,
    /// Source text to run.
    pub source: String,
    /// Whether to return every variable bound after the run.
    pub capture: bool,
}

impl ScriptRequest {
    /// Request running `source` with no prior bindings.
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ..Self::default()
        }
    }

    /// Add prior bindings.
    pub fn with_bindings(mut self, bindings: Vec<Binding>) -> Self {
        self.bindings = bindings;
        self
    }

    /// Ask for the final variables to be returned.
    pub fn capture(mut self, capture: bool) -> Self {
        self.capture = capture;
        self
    }
}

/// A successful evaluation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScriptOutput {
    /// Value returned by the source, `Null` when nothing was returned.
    pub value: Value,
    /// Variables bound after the run, when capture was requested.
    pub bindings: Option<BTreeMap<String, Value>>,
}

/// A pluggable evaluation engine.
///
/// Anything the evaluated code prints goes to `out`, never to the real
/// standard output.
pub trait ScriptBackend: Send + Sync + fmt::Debug {
    /// Run `request`, writing side output to `out`.
    fn evaluate(
        &self,
        request: &ScriptRequest,
        out: &mut dyn io::Write,
    ) -> Result<ScriptOutput, ScriptError>;
}
