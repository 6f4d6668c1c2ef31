//! Projector and read model
//!
//! The read model is the materialized, queryable state derived by applying
//! events in order. `ReadModel::apply` is total over every event variant
//! and depends only on the event itself (timestamps come from the event,
//! never from the wall clock), so replaying the same sequence into a fresh
//! model always produces the same state.
//!
//! Invariants maintained by `apply`:
//! - a message reaches a terminal status at most once and never changes
//!   after that; late deltas for a finished message are dropped
//! - events for an unknown session are ignored

use chrono::{DateTime, Utc};
use sdk::event::{Event, EventPayload};
use sdk::types::{MessageId, MessageStatus, Role, SessionId};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::debug;

/// A message as seen by the UI
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub role: Role,
    pub content: String,
    pub status: MessageStatus,

    /// Failure text or abort reason for non-successful terminal states
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub created_at: DateTime<Utc>,
}

/// A session as seen by the UI
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: SessionId,
    pub title: String,
    pub messages: Vec<Message>,
    pub deep_research_enabled: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmed_direction: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    fn message_mut(&mut self, id: &MessageId) -> Option<&mut Message> {
        self.messages.iter_mut().find(|m| &m.id == id)
    }

    fn has_message(&self, id: &MessageId) -> bool {
        self.messages.iter().any(|m| &m.id == id)
    }
}

/// In-memory read model keyed by session
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadModel {
    sessions: HashMap<SessionId, Session>,

    /// Session ids in creation order
    order: Vec<SessionId>,
}

impl ReadModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a model by applying `events` in order
    pub fn replay<'a>(events: impl IntoIterator<Item = &'a Event>) -> Self {
        let mut model = Self::new();
        for event in events {
            model.apply(event);
        }
        model
    }

    /// Sessions in creation order
    pub fn sessions(&self) -> Vec<&Session> {
        self.order
            .iter()
            .filter_map(|id| self.sessions.get(id))
            .collect()
    }

    pub fn session(&self, id: &SessionId) -> Option<&Session> {
        self.sessions.get(id)
    }

    /// Apply one event
    pub fn apply(&mut self, event: &Event) {
        let session_id = &event.session_id;

        if let EventPayload::SessionCreated { title } = &event.payload {
            if self.sessions.contains_key(session_id) {
                debug!(session_id = %session_id, "Session already exists, ignoring SessionCreated");
                return;
            }
            self.sessions.insert(
                session_id.clone(),
                Session {
                    id: session_id.clone(),
                    title: title.clone(),
                    messages: Vec::new(),
                    deep_research_enabled: false,
                    confirmed_direction: None,
                    created_at: event.ts,
                    updated_at: event.ts,
                },
            );
            self.order.push(session_id.clone());
            return;
        }

        let Some(session) = self.sessions.get_mut(session_id) else {
            debug!(
                session_id = %session_id,
                event_type = ?event.event_type(),
                "Event for unknown session ignored"
            );
            return;
        };
        session.updated_at = event.ts;

        match &event.payload {
            EventPayload::SessionCreated { .. } => {}
            EventPayload::SessionRenamed { title } => {
                session.title = title.clone();
            }
            EventPayload::DeepResearchModeChanged { enabled } => {
                session.deep_research_enabled = *enabled;
            }
            EventPayload::ResearchDirectionConfirmed { direction } => {
                let direction = direction.trim();
                session.confirmed_direction =
                    (!direction.is_empty()).then(|| direction.to_string());
            }
            EventPayload::UserMessageAdded { message_id, text } => {
                if !session.has_message(message_id) {
                    session.messages.push(Message {
                        id: message_id.clone(),
                        role: Role::User,
                        content: text.clone(),
                        status: MessageStatus::Done,
                        error: None,
                        created_at: event.ts,
                    });
                }
            }
            EventPayload::AssistantMessageStarted { message_id } => {
                if !session.has_message(message_id) {
                    session.messages.push(Message {
                        id: message_id.clone(),
                        role: Role::Assistant,
                        content: String::new(),
                        status: MessageStatus::Pending,
                        error: None,
                        created_at: event.ts,
                    });
                }
            }
            EventPayload::AssistantMessageDelta { message_id, delta } => {
                if let Some(message) = session.message_mut(message_id) {
                    if message.status.is_terminal() {
                        debug!(message_id = %message_id, "Delta after terminal status dropped");
                    } else {
                        message.content.push_str(delta);
                        message.status = MessageStatus::Streaming;
                    }
                }
            }
            EventPayload::AssistantMessageCompleted { message_id } => {
                finish(session, message_id, MessageStatus::Done, None);
            }
            EventPayload::AssistantMessageAborted { message_id, reason } => {
                finish(
                    session,
                    message_id,
                    MessageStatus::Aborted,
                    Some(reason.clone()),
                );
            }
            EventPayload::AssistantMessageFailed { message_id, error } => {
                finish(session, message_id, MessageStatus::Failed, Some(error.clone()));
            }
        }
    }
}

fn finish(
    session: &mut Session,
    message_id: &MessageId,
    status: MessageStatus,
    error: Option<String>,
) {
    if let Some(message) = session.message_mut(message_id) {
        if message.status.is_terminal() {
            debug!(message_id = %message_id, "Message already terminal");
            return;
        }
        message.status = status;
        message.error = error;
    }
}

/// Shared owner of the read model
///
/// All mutation goes through `apply`; everything else is a read-only
/// selector returning owned snapshots.
#[derive(Debug, Default)]
pub struct Projector {
    model: RwLock<ReadModel>,
}

impl Projector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one event to the read model
    pub fn apply(&self, event: &Event) {
        self.model
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .apply(event);
    }

    /// All sessions in creation order
    pub fn get_sessions(&self) -> Vec<Session> {
        self.read(|model| model.sessions().into_iter().cloned().collect())
    }

    /// Messages of one session; empty for unknown sessions
    pub fn get_messages(&self, session_id: &SessionId) -> Vec<Message> {
        self.read(|model| {
            model
                .session(session_id)
                .map(|s| s.messages.clone())
                .unwrap_or_default()
        })
    }

    pub fn get_session(&self, session_id: &SessionId) -> Option<Session> {
        self.read(|model| model.session(session_id).cloned())
    }

    /// Full copy of the read model
    pub fn snapshot(&self) -> ReadModel {
        self.read(|model| model.clone())
    }

    fn read<T>(&self, f: impl FnOnce(&ReadModel) -> T) -> T {
        let guard = self
            .model
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&guard)
    }
}
