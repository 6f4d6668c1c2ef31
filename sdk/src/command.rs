//! Commands: requests to change session state
//!
//! A command is immutable once built. Its `id` doubles as the idempotency
//! key the orchestrator uses to suppress redelivery.
//!
//! Wire shape: `{id, type, ts, sessionId, params}`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::RuntimeError;
use crate::types::{CommandId, SessionId};

/// Command type tags understood by the runtime
pub const COMMAND_TYPES: &[&str] = &[
    "CreateSession",
    "RenameSession",
    "ToggleDeepResearch",
    "ConfirmResearchDirection",
    "SendMessage",
    "StopStreaming",
];

/// A request to change state, handled exactly-once-in-effect
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Command {
    pub id: CommandId,

    pub ts: DateTime<Utc>,

    /// Target session; only `CreateSession` may leave it empty
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,

    #[serde(flatten)]
    pub kind: CommandKind,
}

/// Variant-specific command parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "params")]
pub enum CommandKind {
    CreateSession {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
    },
    RenameSession {
        title: String,
    },
    ToggleDeepResearch {
        enabled: bool,
    },
    /// Pin the research direction the assistant should follow; empty clears it
    ConfirmResearchDirection {
        direction: String,
    },
    SendMessage {
        text: String,
    },
    StopStreaming {},
}

impl CommandKind {
    /// The wire `type` tag of this command
    pub fn name(&self) -> &'static str {
        match self {
            CommandKind::CreateSession { .. } => "CreateSession",
            CommandKind::RenameSession { .. } => "RenameSession",
            CommandKind::ToggleDeepResearch { .. } => "ToggleDeepResearch",
            CommandKind::ConfirmResearchDirection { .. } => "ConfirmResearchDirection",
            CommandKind::SendMessage { .. } => "SendMessage",
            CommandKind::StopStreaming {} => "StopStreaming",
        }
    }
}

impl Command {
    /// Build a command with a fresh id and the current timestamp
    pub fn new(session_id: Option<SessionId>, kind: CommandKind) -> Self {
        Self {
            id: CommandId::generate(),
            ts: Utc::now(),
            session_id,
            kind,
        }
    }

    /// Replace the generated id, e.g. to redeliver a command
    pub fn with_id(mut self, id: impl Into<CommandId>) -> Self {
        self.id = id.into();
        self
    }

    pub fn create_session(session_id: Option<SessionId>, title: impl Into<String>) -> Self {
        Self::new(
            session_id,
            CommandKind::CreateSession {
                title: Some(title.into()),
            },
        )
    }

    pub fn rename_session(session_id: impl Into<SessionId>, title: impl Into<String>) -> Self {
        Self::new(
            Some(session_id.into()),
            CommandKind::RenameSession {
                title: title.into(),
            },
        )
    }

    pub fn toggle_deep_research(session_id: impl Into<SessionId>, enabled: bool) -> Self {
        Self::new(
            Some(session_id.into()),
            CommandKind::ToggleDeepResearch { enabled },
        )
    }

    pub fn confirm_research_direction(
        session_id: impl Into<SessionId>,
        direction: impl Into<String>,
    ) -> Self {
        Self::new(
            Some(session_id.into()),
            CommandKind::ConfirmResearchDirection {
                direction: direction.into(),
            },
        )
    }

    pub fn send_message(session_id: impl Into<SessionId>, text: impl Into<String>) -> Self {
        Self::new(
            Some(session_id.into()),
            CommandKind::SendMessage { text: text.into() },
        )
    }

    pub fn stop_streaming(session_id: impl Into<SessionId>) -> Self {
        Self::new(Some(session_id.into()), CommandKind::StopStreaming {})
    }

    /// The wire `type` tag of this command
    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    /// The target session, or an error naming the command that lacked one
    pub fn require_session(&self) -> Result<&SessionId, RuntimeError> {
        self.session_id
            .as_ref()
            .ok_or_else(|| RuntimeError::MissingSessionId {
                command: self.name().to_string(),
            })
    }

    /// Parse a command from its JSON wire form
    ///
    /// An unrecognized `type` tag yields `RuntimeError::UnknownCommand`
    /// rather than a generic parse error.
    pub fn from_json(json: &str) -> Result<Self, RuntimeError> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        let tag = value
            .get("type")
            .and_then(|t| t.as_str())
            .ok_or_else(|| RuntimeError::InvalidCommand("missing `type` tag".to_string()))?;

        if !COMMAND_TYPES.contains(&tag) {
            return Err(RuntimeError::UnknownCommand(tag.to_string()));
        }

        Ok(serde_json::from_value(value)?)
    }

    /// Serialize the command to its JSON wire form
    pub fn to_json(&self) -> Result<String, RuntimeError> {
        Ok(serde_json::to_string(self)?)
    }
}
