//! Deterministic in-process text source
//!
//! Replays a fixed list of stream items, optionally pausing before each
//! one. Used by `folio chat --offline` (echo mode) and throughout the test
//! suite, where it stands in for a real model.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::{
    LLMError, PromptMessage, PromptRole, Result, StreamItem, StreamOptions, StreamingTextSource,
    TextStream, CANCELLED_REASON,
};

#[derive(Debug, Clone)]
enum Script {
    Fixed(Vec<StreamItem>),
    /// Echo the last user prompt back word by word
    Echo,
    /// Fail before any item is produced
    FailOpen(String),
}

/// Scripted streaming source
#[derive(Debug)]
pub struct ScriptedSource {
    script: Script,
    delay: Duration,
    opened: AtomicUsize,
    last_prompt: Mutex<Option<Vec<PromptMessage>>>,
}

impl ScriptedSource {
    /// Replay `items` in order
    pub fn new(items: Vec<StreamItem>) -> Self {
        Self::from_script(Script::Fixed(items))
    }

    /// Emit each string as a delta, then `Done`
    pub fn deltas<I, S>(deltas: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut items: Vec<StreamItem> = deltas.into_iter().map(StreamItem::delta).collect();
        items.push(StreamItem::Done);
        Self::new(items)
    }

    /// Echo the user's last message back
    pub fn echo() -> Self {
        Self::from_script(Script::Echo)
    }

    /// Refuse to open a stream at all
    pub fn failing_open(message: impl Into<String>) -> Self {
        Self::from_script(Script::FailOpen(message.into()))
    }

    fn from_script(script: Script) -> Self {
        Self {
            script,
            delay: Duration::ZERO,
            opened: AtomicUsize::new(0),
            last_prompt: Mutex::new(None),
        }
    }

    /// Pause for `delay` before every item
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Number of streams opened so far
    pub fn streams_opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// The prompt passed to the most recent `start_text_stream` call
    pub fn last_prompt(&self) -> Option<Vec<PromptMessage>> {
        self.last_prompt
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn items_for(&self, messages: &[PromptMessage]) -> Result<Vec<StreamItem>> {
        match &self.script {
            Script::Fixed(items) => Ok(items.clone()),
            Script::FailOpen(message) => Err(LLMError::ProviderUnavailable(message.clone())),
            Script::Echo => {
                let last_user = messages
                    .iter()
                    .rev()
                    .find(|m| m.role == PromptRole::User)
                    .map(|m| m.content.as_str())
                    .unwrap_or_default();

                let mut items: Vec<StreamItem> = last_user
                    .split_inclusive(' ')
                    .map(StreamItem::delta)
                    .collect();
                items.push(StreamItem::Done);
                Ok(items)
            }
        }
    }
}

struct ScriptState {
    items: VecDeque<StreamItem>,
    delay: Duration,
    signal: CancellationToken,
    finished: bool,
}

#[async_trait]
impl StreamingTextSource for ScriptedSource {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn start_text_stream(
        &self,
        messages: Vec<PromptMessage>,
        _options: StreamOptions,
        signal: CancellationToken,
    ) -> Result<TextStream> {
        let items = self.items_for(&messages)?;
        self.opened.fetch_add(1, Ordering::SeqCst);
        *self
            .last_prompt
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(messages);

        let state = ScriptState {
            items: items.into(),
            delay: self.delay,
            signal,
            finished: false,
        };

        Ok(stream::unfold(state, |mut st| async move {
            if st.finished {
                return None;
            }

            if !st.delay.is_zero() {
                tokio::select! {
                    _ = st.signal.cancelled() => {}
                    _ = tokio::time::sleep(st.delay) => {}
                }
            }

            if st.signal.is_cancelled() {
                st.finished = true;
                let aborted = StreamItem::Aborted {
                    reason: CANCELLED_REASON.to_string(),
                };
                return Some((Ok(aborted), st));
            }

            let item = st.items.pop_front()?;
            if item.is_terminal() {
                st.finished = true;
            }
            Some((Ok(item), st))
        })
        .boxed())
    }
}
