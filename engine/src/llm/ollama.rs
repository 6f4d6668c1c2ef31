//! Ollama text-stream source
//!
//! Streams chat completions from a local Ollama server
//! (typically http://localhost:11434) using its NDJSON `/api/chat` API.
//! Each line carries either a content fragment, a `done` marker or an
//! `error` string; these map onto `StreamItem`s one-to-one.

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::{
    LLMError, PromptMessage, Result, StreamItem, StreamOptions, StreamingTextSource, TextStream,
    CANCELLED_REASON,
};

/// Ollama streaming source
#[derive(Debug, Clone)]
pub struct OllamaSource {
    /// Base URL for Ollama API (typically http://localhost:11434)
    base_url: String,

    /// Default model name (e.g., "llama3.1:8b")
    model: String,

    client: Client,
}

impl OllamaSource {
    /// Create a new Ollama source
    ///
    /// # Arguments
    /// * `base_url` - Base URL for Ollama API (e.g., "http://localhost:11434")
    /// * `model` - Default model name (e.g., "llama3.1:8b")
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self::with_timeout(base_url, model, Duration::from_secs(300))
    }

    /// Create a source whose requests give up after `timeout`
    pub fn with_timeout(
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            client,
        }
    }

    fn build_request(&self, messages: &[PromptMessage], options: &StreamOptions) -> OllamaRequest {
        OllamaRequest {
            model: options
                .model_override
                .clone()
                .unwrap_or_else(|| self.model.clone()),
            messages: messages
                .iter()
                .map(|msg| OllamaMessage {
                    role: msg.role.to_string(),
                    content: msg.content.clone(),
                })
                .collect(),
            stream: true,
            options: options.temperature.map(|temperature| OllamaOptions { temperature }),
        }
    }

    fn map_send_error(&self, e: reqwest::Error) -> LLMError {
        if e.is_timeout() {
            LLMError::Timeout
        } else if e.is_connect() {
            LLMError::ProviderUnavailable(format!(
                "Cannot connect to Ollama at {}. Is Ollama running?",
                self.base_url
            ))
        } else {
            LLMError::NetworkError(e.to_string())
        }
    }
}

#[async_trait]
impl StreamingTextSource for OllamaSource {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn start_text_stream(
        &self,
        messages: Vec<PromptMessage>,
        options: StreamOptions,
        signal: CancellationToken,
    ) -> Result<TextStream> {
        let request = self.build_request(&messages, &options);

        tracing::debug!(
            model = %request.model,
            messages = request.messages.len(),
            total_chars = request.messages.iter().map(|m| m.content.len()).sum::<usize>(),
            "Ollama stream request"
        );

        let url = format!("{}/api/chat", self.base_url);
        let send = self.client.post(&url).json(&request).send();

        let response = tokio::select! {
            _ = signal.cancelled() => {
                return Ok(stream::iter(vec![Ok(StreamItem::Aborted {
                    reason: CANCELLED_REASON.to_string(),
                })])
                .boxed());
            }
            response = send => response.map_err(|e| self.map_send_error(e))?,
        };

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(LLMError::ProviderUnavailable(format!(
                "Ollama API error ({}): {}",
                status, error_text
            )));
        }

        let bytes = response
            .bytes_stream()
            .map(|chunk| chunk.map(|b| b.to_vec()))
            .boxed();

        Ok(ndjson_items(bytes, signal))
    }
}

struct NdjsonState {
    bytes: BoxStream<'static, std::result::Result<Vec<u8>, reqwest::Error>>,
    buffer: Vec<u8>,
    pending: VecDeque<Result<StreamItem>>,
    eof: bool,
    finished: bool,
    signal: CancellationToken,
}

/// Turn a raw NDJSON byte stream into stream items
fn ndjson_items(
    bytes: BoxStream<'static, std::result::Result<Vec<u8>, reqwest::Error>>,
    signal: CancellationToken,
) -> TextStream {
    let state = NdjsonState {
        bytes,
        buffer: Vec::new(),
        pending: VecDeque::new(),
        eof: false,
        finished: false,
        signal,
    };

    stream::unfold(state, |mut st| async move {
        loop {
            if st.finished {
                return None;
            }

            if let Some(item) = st.pending.pop_front() {
                if matches!(&item, Ok(i) if i.is_terminal()) || item.is_err() {
                    st.finished = true;
                }
                return Some((item, st));
            }

            if st.eof {
                return None;
            }

            let chunk = tokio::select! {
                biased;
                _ = st.signal.cancelled() => {
                    st.finished = true;
                    let aborted = StreamItem::Aborted { reason: CANCELLED_REASON.to_string() };
                    return Some((Ok(aborted), st));
                }
                chunk = st.bytes.next() => chunk,
            };

            match chunk {
                Some(Ok(bytes)) => {
                    st.buffer.extend_from_slice(&bytes);
                    while let Some(pos) = st.buffer.iter().position(|b| *b == b'\n') {
                        let line: Vec<u8> = st.buffer.drain(..=pos).collect();
                        st.pending.extend(parse_line(&line));
                    }
                }
                Some(Err(e)) => {
                    st.finished = true;
                    return Some((Err(LLMError::NetworkError(e.to_string())), st));
                }
                None => {
                    st.eof = true;
                    let rest = std::mem::take(&mut st.buffer);
                    st.pending.extend(parse_line(&rest));
                }
            }
        }
    })
    .boxed()
}

/// Parse one NDJSON line into zero, one or two items
fn parse_line(line: &[u8]) -> Vec<Result<StreamItem>> {
    let text = String::from_utf8_lossy(line);
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }

    let chunk: OllamaChunk = match serde_json::from_str(text) {
        Ok(chunk) => chunk,
        Err(e) => {
            return vec![Err(LLMError::ParseError(format!(
                "Failed to parse Ollama chunk: {}",
                e
            )))]
        }
    };

    if let Some(error) = chunk.error {
        return vec![Ok(StreamItem::Error { message: error })];
    }

    let mut items = Vec::new();
    if let Some(message) = chunk.message {
        if !message.content.is_empty() {
            items.push(Ok(StreamItem::delta(message.content)));
        }
    }
    if chunk.done {
        items.push(Ok(StreamItem::Done));
    }
    items
}

/// Ollama API request format
#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
}

/// Ollama message format
#[derive(Debug, Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    content: String,
}

/// One NDJSON line of a streaming chat response
#[derive(Debug, Deserialize)]
struct OllamaChunk {
    #[serde(default)]
    message: Option<OllamaMessage>,

    #[serde(default)]
    done: bool,

    #[serde(default)]
    error: Option<String>,
}
