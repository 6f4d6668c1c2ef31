//! Events: immutable facts produced by handling commands
//!
//! Events are the sole source of read-model mutation. Within a session
//! they are ordered by publish order; there is no global total order.
//!
//! Wire shape: `{id, type, ts, sessionId, payload}`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{MessageId, SessionId};

/// Event type tags, used for subscriptions
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum EventType {
    SessionCreated,
    SessionRenamed,
    DeepResearchModeChanged,
    ResearchDirectionConfirmed,
    UserMessageAdded,
    AssistantMessageStarted,
    AssistantMessageDelta,
    AssistantMessageCompleted,
    AssistantMessageAborted,
    AssistantMessageFailed,
    /// Subscribe to all event types
    All,
}

/// An immutable fact about a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: Uuid,

    pub ts: DateTime<Utc>,

    pub session_id: SessionId,

    #[serde(flatten)]
    pub payload: EventPayload,
}

/// Variant-specific event data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all_fields = "camelCase")]
pub enum EventPayload {
    SessionCreated {
        title: String,
    },
    SessionRenamed {
        title: String,
    },
    DeepResearchModeChanged {
        enabled: bool,
    },
    ResearchDirectionConfirmed {
        direction: String,
    },
    UserMessageAdded {
        message_id: MessageId,
        text: String,
    },
    AssistantMessageStarted {
        message_id: MessageId,
    },
    AssistantMessageDelta {
        message_id: MessageId,
        delta: String,
    },
    AssistantMessageCompleted {
        message_id: MessageId,
    },
    AssistantMessageAborted {
        message_id: MessageId,
        reason: String,
    },
    AssistantMessageFailed {
        message_id: MessageId,
        error: String,
    },
}

impl Event {
    /// Create an event with a fresh id and the current timestamp
    pub fn new(session_id: SessionId, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            ts: Utc::now(),
            session_id,
            payload,
        }
    }

    /// Get the event type for this event
    pub fn event_type(&self) -> EventType {
        match self.payload {
            EventPayload::SessionCreated { .. } => EventType::SessionCreated,
            EventPayload::SessionRenamed { .. } => EventType::SessionRenamed,
            EventPayload::DeepResearchModeChanged { .. } => EventType::DeepResearchModeChanged,
            EventPayload::ResearchDirectionConfirmed { .. } => {
                EventType::ResearchDirectionConfirmed
            }
            EventPayload::UserMessageAdded { .. } => EventType::UserMessageAdded,
            EventPayload::AssistantMessageStarted { .. } => EventType::AssistantMessageStarted,
            EventPayload::AssistantMessageDelta { .. } => EventType::AssistantMessageDelta,
            EventPayload::AssistantMessageCompleted { .. } => EventType::AssistantMessageCompleted,
            EventPayload::AssistantMessageAborted { .. } => EventType::AssistantMessageAborted,
            EventPayload::AssistantMessageFailed { .. } => EventType::AssistantMessageFailed,
        }
    }

    /// The message this event concerns, if any
    pub fn message_id(&self) -> Option<&MessageId> {
        match &self.payload {
            EventPayload::UserMessageAdded { message_id, .. }
            | EventPayload::AssistantMessageStarted { message_id }
            | EventPayload::AssistantMessageDelta { message_id, .. }
            | EventPayload::AssistantMessageCompleted { message_id }
            | EventPayload::AssistantMessageAborted { message_id, .. }
            | EventPayload::AssistantMessageFailed { message_id, .. } => Some(message_id),
            _ => None,
        }
    }

    /// Whether this event ends an assistant run
    pub fn is_run_terminal(&self) -> bool {
        matches!(
            self.payload,
            EventPayload::AssistantMessageCompleted { .. }
                | EventPayload::AssistantMessageAborted { .. }
                | EventPayload::AssistantMessageFailed { .. }
        )
    }
}
