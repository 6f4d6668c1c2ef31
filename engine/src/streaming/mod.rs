//! Streaming executor
//!
//! Runs one cancellable, incrementally delivered completion against a
//! `StreamingTextSource` and reports progress through `StreamCallbacks`.
//!
//! # Guarantees
//!
//! - `on_start` fires first, before the source is even opened
//! - exactly one of `on_done`, `on_abort` or `on_error` fires last
//! - an error opening the source, an error item, a failed chunk or a panic
//!   inside the source all end up in `on_error`
//! - cancellation is observed before every stream step; once observed no
//!   further deltas are delivered

use async_trait::async_trait;
use futures::{FutureExt, StreamExt};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::llm::{
    batch_deltas, PromptMessage, StreamItem, StreamOptions, StreamingTextSource, CANCELLED_REASON,
};

/// Observer of one streaming run
#[async_trait]
pub trait StreamCallbacks: Send + Sync {
    async fn on_start(&self);

    async fn on_delta(&self, delta: String);

    async fn on_done(&self);

    async fn on_abort(&self, reason: String);

    async fn on_error(&self, message: String);
}

/// Handle to a live run; `abort` signals its cancellation token
#[derive(Debug, Clone)]
pub struct RunHandle {
    run_id: Uuid,
    token: CancellationToken,
}

impl RunHandle {
    /// Create a handle with a fresh cancellation token
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            token: CancellationToken::new(),
        }
    }

    /// Request cancellation; best-effort and idempotent
    pub fn abort(&self) {
        self.token.cancel();
    }

    pub fn is_aborted(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }
}

impl Default for RunHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// What a run should generate
#[derive(Debug, Clone, Default)]
pub struct StreamRequest {
    pub messages: Vec<PromptMessage>,
    pub options: StreamOptions,
}

/// Terminal outcome of a run
#[derive(Debug, Clone, PartialEq)]
enum Outcome {
    Done,
    Aborted(String),
    Failed(String),
}

/// Executes streaming runs on the tokio runtime
pub struct StreamingExecutor {
    source: Arc<dyn StreamingTextSource>,
}

impl StreamingExecutor {
    pub fn new(source: Arc<dyn StreamingTextSource>) -> Self {
        Self { source }
    }

    /// Name of the underlying text source
    pub fn source_name(&self) -> &str {
        self.source.name()
    }

    /// Start a run with a fresh handle
    pub fn start(&self, request: StreamRequest, callbacks: Arc<dyn StreamCallbacks>) -> RunHandle {
        let handle = RunHandle::new();
        self.launch(&handle, request, callbacks);
        handle
    }

    /// Start a run controlled by an existing handle
    ///
    /// Lets the caller record the handle somewhere before any callback can
    /// fire. Returns immediately; the run proceeds on a spawned task.
    pub fn launch(
        &self,
        handle: &RunHandle,
        request: StreamRequest,
        callbacks: Arc<dyn StreamCallbacks>,
    ) {
        let source = Arc::clone(&self.source);
        let token = handle.token.clone();
        let run_id = handle.run_id;

        tokio::spawn(async move {
            callbacks.on_start().await;

            let outcome = AssertUnwindSafe(drive(source, request, token, Arc::clone(&callbacks)))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| Outcome::Failed(panic_message(panic)));

            tracing::debug!(run_id = %run_id, outcome = ?outcome, "Stream run finished");

            match outcome {
                Outcome::Done => callbacks.on_done().await,
                Outcome::Aborted(reason) => callbacks.on_abort(reason).await,
                Outcome::Failed(message) => callbacks.on_error(message).await,
            }
        });
    }
}

/// Consume the stream, delivering deltas, until a terminal outcome
async fn drive(
    source: Arc<dyn StreamingTextSource>,
    request: StreamRequest,
    token: CancellationToken,
    callbacks: Arc<dyn StreamCallbacks>,
) -> Outcome {
    let cancelled = || Outcome::Aborted(CANCELLED_REASON.to_string());

    let batching = request.options.batching_interval_ms;
    let opened = tokio::select! {
        biased;
        _ = token.cancelled() => return cancelled(),
        opened = source.start_text_stream(request.messages, request.options, token.clone()) => opened,
    };

    let mut stream = match opened {
        Ok(stream) => stream,
        Err(e) => return Outcome::Failed(e.to_string()),
    };
    if let Some(ms) = batching.filter(|ms| *ms > 0) {
        stream = batch_deltas(stream, Duration::from_millis(ms));
    }

    loop {
        let next = tokio::select! {
            biased;
            _ = token.cancelled() => return cancelled(),
            next = stream.next() => next,
        };

        match next {
            Some(Ok(StreamItem::Delta { text })) => {
                if !text.is_empty() {
                    callbacks.on_delta(text).await;
                }
            }
            Some(Ok(StreamItem::Done)) | None => return Outcome::Done,
            Some(Ok(StreamItem::Aborted { reason })) => return Outcome::Aborted(reason),
            Some(Ok(StreamItem::Error { message })) => return Outcome::Failed(message),
            Some(Err(e)) => return Outcome::Failed(e.to_string()),
        }
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    let detail = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("text source panicked: {}", detail)
}
