//! Chat providers: the backend chat service and fallback AI providers.
//!
//! Every provider speaks SSE but frames tokens differently, so each one is
//! configured with a [`PayloadFormat`] that turns decoded events into
//! [`ChatChunk`]s.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use reqwest::header::ACCEPT;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::error::StreamError;
use super::sse::{decode_events, SseEvent, MAX_LINE_BYTES};

/// A user turn sent to a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

/// A decoded unit of provider output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatChunk {
    Token(String),
    /// The server asked for a different reconnection delay.
    Retry(Duration),
    Done,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkEvent {
    /// Event ID to resume from if the connection drops after this chunk.
    pub id: Option<String>,
    pub chunk: ChatChunk,
}

impl ChunkEvent {
    #[must_use]
    pub const fn new(chunk: ChatChunk) -> Self {
        Self { id: None, chunk }
    }
}

pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<ChunkEvent, StreamError>> + Send>>;

/// How a provider frames tokens inside SSE events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadFormat {
    /// `{"content": "...", "done": bool}` data; `done` and `error` event types.
    #[default]
    Native,
    /// OpenAI-style `choices[0].delta.content` with a `[DONE]` sentinel.
    OpenAi,
}

impl PayloadFormat {
    /// Decode one SSE event into zero or more chunks.
    ///
    /// # Errors
    ///
    /// Returns `StreamError::Parse` for undecodable payloads and
    /// `StreamError::Backend` for error events the provider sends in-band.
    pub fn decode(self, event: &SseEvent) -> Result<Vec<ChatChunk>, StreamError> {
        match self {
            Self::Native => decode_native(event),
            Self::OpenAi => decode_openai(event),
        }
    }

    fn request_body(self, request: &ChatRequest, model: Option<&str>) -> Value {
        match self {
            Self::Native => json!(request),
            Self::OpenAi => json!({
                "model": model.unwrap_or("gpt-4o-mini"),
                "stream": true,
                "messages": [{ "role": "user", "content": request.message }],
            }),
        }
    }
}

#[derive(Deserialize)]
struct NativePayload {
    #[serde(default)]
    content: String,
    #[serde(default)]
    done: bool,
}

#[derive(Deserialize)]
struct NativeError {
    #[serde(default = "default_error_status")]
    status: u16,
    #[serde(default)]
    message: String,
}

const fn default_error_status() -> u16 {
    502
}

fn decode_native(event: &SseEvent) -> Result<Vec<ChatChunk>, StreamError> {
    match event.event.as_str() {
        "done" => Ok(vec![ChatChunk::Done]),
        "error" => {
            let err: NativeError = serde_json::from_str(&event.data)
                .map_err(|e| StreamError::parse(format!("error event: {e}")))?;
            Err(StreamError::backend(err.status, err.message))
        }
        _ => {
            let payload: NativePayload = serde_json::from_str(&event.data)
                .map_err(|e| StreamError::parse(e.to_string()))?;
            let mut chunks = Vec::with_capacity(2);
            if !payload.content.is_empty() {
                chunks.push(ChatChunk::Token(payload.content));
            }
            if payload.done {
                chunks.push(ChatChunk::Done);
            }
            Ok(chunks)
        }
    }
}

fn decode_openai(event: &SseEvent) -> Result<Vec<ChatChunk>, StreamError> {
    if event.data.trim() == "[DONE]" {
        return Ok(vec![ChatChunk::Done]);
    }

    let value: Value =
        serde_json::from_str(&event.data).map_err(|e| StreamError::parse(e.to_string()))?;

    if let Some(error) = value.get("error") {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("provider error")
            .to_string();
        return Err(StreamError::backend(default_error_status(), message));
    }

    let content = value
        .pointer("/choices/0/delta/content")
        .and_then(Value::as_str)
        .unwrap_or_default();

    Ok(if content.is_empty() {
        Vec::new()
    } else {
        vec![ChatChunk::Token(content.to_string())]
    })
}

/// Turn a byte stream into chunk events.
///
/// Parse errors are yielded and decoding continues; a transport error ends
/// the stream after it is yielded. A `retry:` field is reported after the
/// chunks of the event that carried it.
pub fn decode_stream<S, B, E>(
    bytes: S,
    format: PayloadFormat,
) -> impl Stream<Item = Result<ChunkEvent, StreamError>> + Send
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<StreamError> + Send + 'static,
{
    async_stream::stream! {
        let mut events = Box::pin(decode_events(bytes, MAX_LINE_BYTES));

        while let Some(event) = events.next().await {
            let event = match event {
                Ok(event) => event,
                Err(e) => {
                    yield Err(e);
                    continue;
                }
            };

            match format.decode(&event) {
                Ok(chunks) => {
                    for chunk in chunks {
                        yield Ok(ChunkEvent { id: event.id.clone(), chunk });
                    }
                }
                Err(e) => yield Err(e),
            }

            if let Some(retry) = event.retry {
                yield Ok(ChunkEvent::new(ChatChunk::Retry(retry)));
            }
        }
    }
}

/// A source of streamed chat completions.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Short name used in logs and status updates.
    fn name(&self) -> &str;

    /// Open a stream for `request`, resuming after `last_event_id` if given.
    async fn open(
        &self,
        request: &ChatRequest,
        last_event_id: Option<&str>,
    ) -> Result<ChunkStream, StreamError>;
}

/// Connection settings for an HTTP chat provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Name used in logs and status events.
    #[serde(default = "default_provider_name")]
    pub name: String,

    /// Streaming endpoint URL.
    pub url: String,

    /// Bearer token, if the provider needs one.
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default)]
    pub format: PayloadFormat,

    /// Model name sent to OpenAI-style providers.
    #[serde(default)]
    pub model: Option<String>,

    /// TCP connect timeout in milliseconds.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

fn default_provider_name() -> String {
    "backend".to_string()
}

#[allow(clippy::missing_const_for_fn)]
fn default_connect_timeout_ms() -> u64 {
    10_000
}

/// HTTP implementation of [`ChatProvider`].
pub struct HttpChatProvider {
    client: reqwest::Client,
    config: ProviderConfig,
}

impl HttpChatProvider {
    /// Create a provider with its own `reqwest::Client`.
    ///
    /// # Errors
    ///
    /// Returns `StreamError::Connection` if the HTTP client cannot be built.
    pub fn new(config: ProviderConfig) -> Result<Self, StreamError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .build()?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl ChatProvider for HttpChatProvider {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn open(
        &self,
        request: &ChatRequest,
        last_event_id: Option<&str>,
    ) -> Result<ChunkStream, StreamError> {
        let format = self.config.format;
        let body = format.request_body(request, self.config.model.as_deref());

        let mut builder = self
            .client
            .post(&self.config.url)
            .header(ACCEPT, "text/event-stream")
            .json(&body);

        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }
        if let Some(id) = last_event_id {
            builder = builder.header("Last-Event-ID", id);
        }

        let response = builder.send().await?;
        let status = response.status();

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(StreamError::backend(status.as_u16(), message));
        }

        Ok(Box::pin(decode_stream(response.bytes_stream(), format)))
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[allow(
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    clippy::must_use_candidate
)]
pub mod mock {
    //! Scripted provider for unit and integration tests.

    use super::{async_trait, ChatProvider, ChatRequest, ChunkEvent, ChunkStream, StreamError};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    enum Script {
        Fail(StreamError),
        Stream(Vec<Result<ChunkEvent, StreamError>>),
    }

    /// Mock implementation of `ChatProvider`.
    ///
    /// Each `open` call consumes the next scripted outcome; once the script
    /// runs out, `open` fails with a connection error.
    pub struct MockChatProvider {
        name: String,
        script: Mutex<VecDeque<Script>>,
        open_calls: Mutex<Vec<(ChatRequest, Option<String>)>>,
    }

    impl MockChatProvider {
        pub fn new(name: impl Into<String>) -> Self {
            Self {
                name: name.into(),
                script: Mutex::new(VecDeque::new()),
                open_calls: Mutex::new(Vec::new()),
            }
        }

        /// Make the next `open` call fail with `err`.
        pub fn push_open_error(&self, err: StreamError) {
            self.script.lock().unwrap().push_back(Script::Fail(err));
        }

        /// Make the next `open` call succeed and yield `items`.
        pub fn push_stream(&self, items: Vec<Result<ChunkEvent, StreamError>>) {
            self.script.lock().unwrap().push_back(Script::Stream(items));
        }

        /// Requests and resume IDs passed to `open`, in call order.
        pub fn open_calls(&self) -> Vec<(ChatRequest, Option<String>)> {
            self.open_calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChatProvider for MockChatProvider {
        fn name(&self) -> &str {
            &self.name
        }

        async fn open(
            &self,
            request: &ChatRequest,
            last_event_id: Option<&str>,
        ) -> Result<ChunkStream, StreamError> {
            self.open_calls
                .lock()
                .unwrap()
                .push((request.clone(), last_event_id.map(String::from)));

            match self.script.lock().unwrap().pop_front() {
                Some(Script::Fail(err)) => Err(err),
                Some(Script::Stream(items)) => Ok(Box::pin(futures_util::stream::iter(items))),
                None => Err(StreamError::connection("no scripted response")),
            }
        }
    }
}
