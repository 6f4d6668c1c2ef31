//! Assistant prompt assembly
//!
//! Builds the ordered prompt for one assistant run from the session's
//! recent dialogue. The prompt is laid out as:
//!
//! 1. a system message (configured prompt, deep-research note, confirmed
//!    research direction)
//! 2. the last `window` completed turns of the dialogue, oldest first
//! 3. the new user text
//!
//! Only messages that finished successfully are replayed; aborted or
//! failed assistant output never reaches the model again.

use async_trait::async_trait;
use sdk::errors::RuntimeError;
use sdk::types::{MessageStatus, Role, SessionId};
use std::sync::Arc;

use crate::llm::PromptMessage;
use crate::projection::{Message, Projector, Session};

/// Read access to persisted session history
pub trait SessionStore: Send + Sync {
    /// Messages of a session in insertion order
    fn list_messages(&self, session_id: &SessionId) -> Vec<Message>;

    fn session(&self, session_id: &SessionId) -> Option<Session>;
}

impl SessionStore for Projector {
    fn list_messages(&self, session_id: &SessionId) -> Vec<Message> {
        self.get_messages(session_id)
    }

    fn session(&self, session_id: &SessionId) -> Option<Session> {
        self.get_session(session_id)
    }
}

/// Produces the prompt for an assistant run
#[async_trait]
pub trait ContextBuilder: Send + Sync {
    /// Build the prompt answering `user_text`, keeping at most `window`
    /// earlier turns of dialogue
    async fn build_assistant_messages(
        &self,
        session_id: &SessionId,
        user_text: &str,
        window: usize,
    ) -> Result<Vec<PromptMessage>, RuntimeError>;
}

const DEEP_RESEARCH_NOTE: &str = "Deep research mode is enabled. Survey the literature broadly, \
compare competing findings and list the sources you would consult next.";

/// Context builder that keeps a sliding window of recent turns
pub struct WindowedContextBuilder {
    store: Arc<dyn SessionStore>,
    system_prompt: String,
}

impl WindowedContextBuilder {
    pub fn new(store: Arc<dyn SessionStore>, system_prompt: impl Into<String>) -> Self {
        Self {
            store,
            system_prompt: system_prompt.into(),
        }
    }

    fn system_message(&self, session: Option<&Session>) -> Option<PromptMessage> {
        let mut sections: Vec<String> = Vec::new();
        if !self.system_prompt.trim().is_empty() {
            sections.push(self.system_prompt.trim().to_string());
        }

        if let Some(session) = session {
            if session.deep_research_enabled {
                sections.push(DEEP_RESEARCH_NOTE.to_string());
            }
            if let Some(direction) = &session.confirmed_direction {
                sections.push(format!("Confirmed research direction: {}", direction));
            }
        }

        (!sections.is_empty()).then(|| PromptMessage::system(sections.join("\n\n")))
    }
}

#[async_trait]
impl ContextBuilder for WindowedContextBuilder {
    async fn build_assistant_messages(
        &self,
        session_id: &SessionId,
        user_text: &str,
        window: usize,
    ) -> Result<Vec<PromptMessage>, RuntimeError> {
        if window == 0 {
            return Err(RuntimeError::ContextBuild(
                "context window must hold at least one turn".to_string(),
            ));
        }

        let session = self.store.session(session_id);
        let mut history: Vec<Message> = self
            .store
            .list_messages(session_id)
            .into_iter()
            .filter(|m| m.status == MessageStatus::Done && !m.content.is_empty())
            .collect();

        // The triggering user message is usually already projected
        if history
            .last()
            .is_some_and(|m| m.role == Role::User && m.content == user_text)
        {
            history.pop();
        }

        let keep = window.saturating_mul(2);
        let skip = history.len().saturating_sub(keep);

        let mut prompt = Vec::with_capacity(keep + 2);
        prompt.extend(self.system_message(session.as_ref()));
        prompt.extend(history.into_iter().skip(skip).map(|m| match m.role {
            Role::User => PromptMessage::user(m.content),
            Role::Assistant => PromptMessage::assistant(m.content),
        }));
        prompt.push(PromptMessage::user(user_text));

        tracing::debug!(
            session_id = %session_id,
            prompt_len = prompt.len(),
            "Built assistant context"
        );
        Ok(prompt)
    }
}
