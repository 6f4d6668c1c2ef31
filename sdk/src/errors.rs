//! Error types and handling
//!
//! This module provides the error types used throughout the Folio runtime.
//! All errors implement the `ErrorExt` trait which provides user-friendly
//! hints and indicates whether errors are recoverable.
//!
//! Duplicate commands and concurrent-run conflicts have no variant: the
//! orchestrator logs both and returns `Ok`. Stream failures inside a run
//! become `AssistantMessageFailed` events; `Stream` reports such a failure
//! to a caller outside the runtime.

use thiserror::Error;

/// Trait for runtime error extensions
///
/// Provides additional context for errors, including user-friendly hints
/// and recoverability information.
pub trait ErrorExt {
    /// Returns a user-friendly hint for the error
    ///
    /// The hint is safe to display to end users and does not contain
    /// prompt text, model output or internal identifiers.
    fn user_hint(&self) -> &str;

    /// Returns whether the error is recoverable
    ///
    /// Recoverable errors can be retried or worked around. Non-recoverable
    /// errors typically require fixing configuration or restarting.
    fn is_recoverable(&self) -> bool;
}

/// Main runtime error type
///
/// # Examples
///
/// ```
/// use sdk::errors::{ErrorExt, RuntimeError};
///
/// let error = RuntimeError::UnknownCommand("DeleteSession".to_string());
/// println!("Hint: {}", error.user_hint());
/// assert!(!error.is_recoverable());
///
/// let error = RuntimeError::Stream("connection reset".to_string());
/// assert!(error.is_recoverable());
/// ```
#[derive(Debug, Error)]
pub enum RuntimeError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Command errors
    #[error("Command {command} requires a session id")]
    MissingSessionId { command: String },

    #[error("Unknown command type: {0}")]
    UnknownCommand(String),

    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("No command handler registered")]
    HandlerNotRegistered,

    // Collaborator errors
    #[error("Failed to build assistant context: {0}")]
    ContextBuild(String),

    #[error("Stream failure: {0}")]
    Stream(String),

    // Wire format errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ErrorExt for RuntimeError {
    fn user_hint(&self) -> &str {
        match self {
            Self::Config(_) => "Check your config.toml file for errors",

            Self::MissingSessionId { .. } => "Select a session before sending this command",
            Self::UnknownCommand(_) => "This action is not supported by this version",
            Self::InvalidCommand(_) => "The request was malformed",
            Self::HandlerNotRegistered => "The session runtime is not initialized yet",

            Self::ContextBuild(_) => "Could not load the conversation history. Try again",
            Self::Stream(_) => "The model stopped responding. Send the message again",

            Self::Serialization(_) => "The request could not be parsed",
            Self::Io(_) => "File system operation failed",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            // Non-recoverable errors
            Self::Config(_) | Self::UnknownCommand(_) | Self::HandlerNotRegistered => false,

            // All other errors are potentially recoverable
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hints_are_never_empty() {
        let errors = vec![
            RuntimeError::Config("bad".to_string()),
            RuntimeError::MissingSessionId {
                command: "SendMessage".to_string(),
            },
            RuntimeError::UnknownCommand("X".to_string()),
            RuntimeError::InvalidCommand("x".to_string()),
            RuntimeError::HandlerNotRegistered,
            RuntimeError::ContextBuild("x".to_string()),
            RuntimeError::Stream("x".to_string()),
            RuntimeError::Io(std::io::Error::other("disk")),
        ];

        for err in errors {
            assert!(!err.user_hint().is_empty(), "empty hint for {err:?}");
        }
    }

    #[test]
    fn test_recoverability() {
        assert!(!RuntimeError::HandlerNotRegistered.is_recoverable());
        assert!(!RuntimeError::Config("x".to_string()).is_recoverable());
        assert!(RuntimeError::ContextBuild("x".to_string()).is_recoverable());
        assert!(RuntimeError::MissingSessionId {
            command: "RenameSession".to_string()
        }
        .is_recoverable());
    }

    #[test]
    fn test_display_includes_command_name() {
        let err = RuntimeError::MissingSessionId {
            command: "StopStreaming".to_string(),
        };
        assert_eq!(err.to_string(), "Command StopStreaming requires a session id");
    }
}
