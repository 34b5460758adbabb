//! Top-level error type.

use thiserror::Error;

use crate::config::ConfigError;
use crate::process::ProcessError;
use crate::store::StoreError;

/// Errors that can occur while handling a terminal request.
///
/// None of these escape the gateway: it turns each one into a transcript
/// line or a JSON-RPC error envelope.
#[derive(Debug, Error)]
pub enum Error {
    /// A policy rejected the command before anything ran.
    #[error("Command \"{verb}\" is not allowed: {reason}")]
    CommandDenied {
        /// Leading token of the rejected command.
        verb: String,
        /// Why it was rejected.
        reason: String,
    },
    /// The request itself is malformed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// The host command dispatcher failed.
    #[error("dispatch error: {0}")]
    Dispatch(String),
    /// External process failure.
    #[error(transparent)]
    Process(#[from] ProcessError),
    /// Variable store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Configuration failure.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the error was raised by request validation rather than execution.
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::CommandDenied { .. } | Error::InvalidRequest(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_denied_message_names_verb() {
        let err = Error::CommandDenied {
            verb: "down".to_string(),
            reason: "maintenance".to_string(),
        };
        assert_eq!(err.to_string(), "Command \"down\" is not allowed: maintenance");
        assert!(err.is_validation());
    }

    #[test]
    fn test_execution_errors_are_not_validation() {
        let err = Error::Dispatch("boom".to_string());
        assert!(!err.is_validation());
    }
}
