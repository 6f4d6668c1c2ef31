//! Text-stream collaborator abstraction
//!
//! The runtime never talks to a model directly. It consumes a
//! `StreamingTextSource`, which turns an ordered prompt into a lazy,
//! finite stream of `StreamItem`s. Adapters live in submodules: `ollama`
//! for a local model server and `scripted` for deterministic in-process
//! streams.

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub mod ollama;
pub mod scripted;

/// Abort reason reported when a run is cancelled before it finishes
pub const CANCELLED_REASON: &str = "cancelled by user";

/// Result type for LLM operations
pub type Result<T> = std::result::Result<T, LLMError>;

/// Errors that can occur while opening or consuming a text stream
#[derive(Debug, thiserror::Error)]
pub enum LLMError {
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Timeout")]
    Timeout,

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

/// Message in a prompt
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PromptMessage {
    pub role: PromptRole,
    pub content: String,
}

impl PromptMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: PromptRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: PromptRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: PromptRole::Assistant,
            content: content.into(),
        }
    }
}

/// Role of a prompt message
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PromptRole {
    System,
    User,
    Assistant,
}

impl fmt::Display for PromptRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PromptRole::System => write!(f, "system"),
            PromptRole::User => write!(f, "user"),
            PromptRole::Assistant => write!(f, "assistant"),
        }
    }
}

/// One item of a text stream
///
/// `Done`, `Aborted` and `Error` are terminal; a well-behaved source yields
/// nothing after them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamItem {
    Delta { text: String },
    Done,
    Aborted { reason: String },
    Error { message: String },
}

impl StreamItem {
    pub fn delta(text: impl Into<String>) -> Self {
        StreamItem::Delta { text: text.into() }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, StreamItem::Delta { .. })
    }
}

/// Per-run stream options
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamOptions {
    /// Use this model instead of the source's default
    pub model_override: Option<String>,

    pub temperature: Option<f32>,

    /// Coalesce deltas arriving within this window
    pub batching_interval_ms: Option<u64>,
}

/// Lazy, non-restartable stream of text items
pub type TextStream = BoxStream<'static, Result<StreamItem>>;

/// External collaborator that produces incremental completions
#[async_trait]
pub trait StreamingTextSource: Send + Sync {
    /// Returns the name of the source (e.g., "ollama", "scripted")
    fn name(&self) -> &str;

    /// Open a completion stream for `messages`
    ///
    /// `signal` is cancelled when the user stops the run; sources should
    /// stop producing promptly once they observe it.
    async fn start_text_stream(
        &self,
        messages: Vec<PromptMessage>,
        options: StreamOptions,
        signal: CancellationToken,
    ) -> Result<TextStream>;
}

struct BatchState {
    inner: TextStream,
    held: Option<Result<StreamItem>>,
    exhausted: bool,
    interval: Duration,
}

/// Merge consecutive deltas that arrive within `interval` of the first one
///
/// Non-delta items pass through unchanged and in order.
pub fn batch_deltas(inner: TextStream, interval: Duration) -> TextStream {
    let state = BatchState {
        inner,
        held: None,
        exhausted: false,
        interval,
    };

    stream::unfold(state, |mut st| async move {
        let first = match st.held.take() {
            Some(item) => item,
            None if st.exhausted => return None,
            None => st.inner.next().await?,
        };

        let mut text = match first {
            Ok(StreamItem::Delta { text }) => text,
            other => return Some((other, st)),
        };

        let deadline = tokio::time::Instant::now() + st.interval;
        loop {
            match tokio::time::timeout_at(deadline, st.inner.next()).await {
                Ok(Some(Ok(StreamItem::Delta { text: more }))) => text.push_str(&more),
                Ok(Some(other)) => {
                    st.held = Some(other);
                    break;
                }
                Ok(None) => {
                    st.exhausted = true;
                    break;
                }
                Err(_) => break,
            }
        }

        Some((Ok(StreamItem::Delta { text }), st))
    })
    .boxed()
}
