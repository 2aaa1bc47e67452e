//! Resilient chat stream: reconnects with backoff and falls back to a
//! secondary provider.
//!
//! [`ChatStreamClient::start`] spawns one task per conversation turn. The task
//! owns the provider connection and reports progress as [`ChatUpdate`]s over a
//! bounded channel; the [`ChatSession`] returned to the caller reads them and
//! aborts the task when dropped.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::{Stream, StreamExt};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::backoff::BackoffPolicy;
use super::error::{ErrorKind, StreamError};
use super::provider::{ChatChunk, ChatProvider, ChatRequest, ChunkStream};
use super::state::{ConnectionState, ConnectionStatus, Recovery};

const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Progress reported to the consumer of a chat session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatUpdate {
    Status {
        status: ConnectionStatus,
        provider: String,
        attempt: u32,
    },
    Token {
        content: String,
    },
    /// The primary gave up; text received so far should be discarded.
    ProviderSwitched {
        from: String,
        to: String,
    },
    Done,
    Failed {
        kind: ErrorKind,
        message: String,
    },
}

impl ChatUpdate {
    /// SSE event name for this update.
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::Status { .. } => "status",
            Self::Token { .. } => "token",
            Self::ProviderSwitched { .. } => "provider",
            Self::Done => "done",
            Self::Failed { .. } => "error",
        }
    }
}

/// Starts chat sessions against a primary and optional fallback provider.
#[derive(Clone)]
pub struct ChatStreamClient {
    primary: Arc<dyn ChatProvider>,
    fallback: Option<Arc<dyn ChatProvider>>,
    policy: BackoffPolicy,
    channel_capacity: usize,
}

impl ChatStreamClient {
    pub fn new(primary: Arc<dyn ChatProvider>, policy: BackoffPolicy) -> Self {
        Self {
            primary,
            fallback: None,
            policy,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    #[must_use]
    pub fn with_fallback(mut self, fallback: Arc<dyn ChatProvider>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Updates buffered per session; the driver waits once it is full.
    #[must_use]
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    /// Start streaming a response to `request`.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn start(&self, request: ChatRequest) -> ChatSession {
        let id = Uuid::new_v4();
        let state = Arc::new(Mutex::new(ConnectionState::new()));
        let (tx, rx) = mpsc::channel(self.channel_capacity);

        let driver = Driver {
            session_id: id,
            primary: Arc::clone(&self.primary),
            fallback: self.fallback.clone(),
            policy: self.policy,
            request,
            state: Arc::clone(&state),
            tx,
        };
        let task = tokio::spawn(driver.run());

        ChatSession {
            id,
            updates: rx,
            state,
            task,
        }
    }
}

/// A running chat stream. Dropping it cancels the underlying connection.
pub struct ChatSession {
    id: Uuid,
    updates: mpsc::Receiver<ChatUpdate>,
    state: Arc<Mutex<ConnectionState>>,
    task: JoinHandle<()>,
}

impl ChatSession {
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Next update, or `None` once the session has finished.
    pub async fn next(&mut self) -> Option<ChatUpdate> {
        self.updates.recv().await
    }

    /// Snapshot of the connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        lock(&self.state).clone()
    }

    /// Consume the session as a stream of updates.
    pub fn into_stream(mut self) -> impl Stream<Item = ChatUpdate> + Send {
        async_stream::stream! {
            while let Some(update) = self.next().await {
                yield update;
            }
        }
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn lock(state: &Mutex<ConnectionState>) -> MutexGuard<'_, ConnectionState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

enum Outcome {
    Completed,
    Cancelled,
    Failed(StreamError),
}

struct Driver {
    session_id: Uuid,
    primary: Arc<dyn ChatProvider>,
    fallback: Option<Arc<dyn ChatProvider>>,
    policy: BackoffPolicy,
    request: ChatRequest,
    state: Arc<Mutex<ConnectionState>>,
    tx: mpsc::Sender<ChatUpdate>,
}

impl Driver {
    async fn run(self) {
        let mut provider = Arc::clone(&self.primary);
        let mut policy = self.policy;

        loop {
            let last_event_id = lock(&self.state).last_event_id.clone();
            tracing::debug!(
                session_id = %self.session_id,
                provider = provider.name(),
                last_event_id = ?last_event_id,
                "opening chat stream"
            );

            let outcome = match provider.open(&self.request, last_event_id.as_deref()).await {
                Ok(stream) => {
                    lock(&self.state).on_connected();
                    if !self.send_status(ConnectionStatus::Connected, provider.name(), 0).await {
                        return;
                    }
                    self.pump(stream, provider.name(), &mut policy).await
                }
                Err(err) => Outcome::Failed(err),
            };

            let err = match outcome {
                Outcome::Completed => {
                    lock(&self.state).on_completed();
                    tracing::info!(
                        session_id = %self.session_id,
                        provider = provider.name(),
                        "chat stream completed"
                    );
                    if self.tx.send(ChatUpdate::Done).await.is_err() {
                        tracing::debug!(session_id = %self.session_id, "consumer left before completion");
                    }
                    return;
                }
                Outcome::Cancelled => {
                    lock(&self.state).on_completed();
                    tracing::debug!(session_id = %self.session_id, "chat session dropped by consumer");
                    return;
                }
                Outcome::Failed(err) => err,
            };

            tracing::warn!(
                session_id = %self.session_id,
                provider = provider.name(),
                error = %err,
                retryable = err.is_retryable(),
                "chat stream failed"
            );

            let recovery = lock(&self.state).on_failure(
                &err,
                provider.name(),
                &policy,
                self.fallback.is_some(),
            );

            match (recovery, &self.fallback) {
                (Recovery::Retry { attempt }, _) => {
                    let delay = policy.delay(attempt - 1);
                    if !self
                        .send_status(ConnectionStatus::Reconnecting, provider.name(), attempt)
                        .await
                    {
                        return;
                    }
                    tracing::info!(
                        session_id = %self.session_id,
                        provider = provider.name(),
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "reconnecting chat stream"
                    );
                    tokio::time::sleep(delay).await;
                }
                (Recovery::SwitchToFallback, Some(fallback)) => {
                    tracing::warn!(
                        session_id = %self.session_id,
                        from = provider.name(),
                        to = fallback.name(),
                        "switching to fallback provider"
                    );
                    let switched = ChatUpdate::ProviderSwitched {
                        from: provider.name().to_string(),
                        to: fallback.name().to_string(),
                    };
                    if self.tx.send(switched).await.is_err() {
                        return;
                    }
                    provider = Arc::clone(fallback);
                    policy = self.policy;
                    if !self
                        .send_status(ConnectionStatus::Reconnecting, provider.name(), 0)
                        .await
                    {
                        return;
                    }
                }
                (Recovery::SwitchToFallback | Recovery::Fail, _) => {
                    tracing::error!(
                        session_id = %self.session_id,
                        provider = provider.name(),
                        error = %err,
                        "chat stream failed permanently"
                    );
                    let failed = ChatUpdate::Failed {
                        kind: err.kind(),
                        message: err.to_string(),
                    };
                    if self.tx.send(failed).await.is_err() {
                        tracing::debug!(session_id = %self.session_id, "consumer left before failure report");
                    }
                    return;
                }
            }
        }
    }

    /// Forward chunks until the stream finishes, fails or the consumer leaves.
    async fn pump(
        &self,
        mut stream: ChunkStream,
        provider: &str,
        policy: &mut BackoffPolicy,
    ) -> Outcome {
        let mut progressed = false;
        while let Some(item) = stream.next().await {
            match item {
                Ok(event) => {
                    let delivers = event.id.is_some()
                        || matches!(event.chunk, ChatChunk::Token(_) | ChatChunk::Done);
                    if delivers && !progressed {
                        progressed = true;
                        lock(&self.state).on_progress();
                    }
                    if let Some(id) = event.id {
                        lock(&self.state).last_event_id = Some(id);
                    }
                    match event.chunk {
                        ChatChunk::Token(content) => {
                            if self.tx.send(ChatUpdate::Token { content }).await.is_err() {
                                return Outcome::Cancelled;
                            }
                        }
                        ChatChunk::Retry(delay) => {
                            *policy = policy.with_base_delay(delay);
                        }
                        ChatChunk::Done => return Outcome::Completed,
                    }
                }
                Err(err) if err.kind() == ErrorKind::Parse => {
                    tracing::warn!(
                        session_id = %self.session_id,
                        provider,
                        error = %err,
                        "skipping malformed chat event"
                    );
                    lock(&self.state).record_error(&err, provider);
                }
                Err(err) => return Outcome::Failed(err),
            }
        }

        Outcome::Failed(StreamError::connection("stream ended before completion"))
    }

    async fn send_status(&self, status: ConnectionStatus, provider: &str, attempt: u32) -> bool {
        let update = ChatUpdate::Status {
            status,
            provider: provider.to_string(),
            attempt,
        };
        self.tx.send(update).await.is_ok()
    }
}

/// Zero-jitter policy with millisecond delays, for tests.
#[cfg(any(test, feature = "test-utils"))]
#[must_use]
pub const fn fast_policy(max_attempts: u32) -> BackoffPolicy {
    BackoffPolicy {
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        max_attempts,
        max_jitter: Duration::ZERO,
    }
}
