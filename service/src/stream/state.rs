//! Connection state machine for a single chat stream.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::backoff::BackoffPolicy;
use super::error::{ErrorKind, StreamError};

/// Most recent errors kept per connection.
pub const MAX_RECENT_ERRORS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
    Reconnecting,
    Failed,
}

/// Which provider the connection is currently using.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderSlot {
    Primary,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordedError {
    pub kind: ErrorKind,
    pub message: String,
    pub provider: String,
    pub at: DateTime<Utc>,
}

/// What the driver should do after a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// Reconnect to the same provider; `attempt` is 1-based.
    Retry { attempt: u32 },
    /// Give up on the primary and start over on the fallback provider.
    SwitchToFallback,
    /// Nothing left to try.
    Fail,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectionState {
    pub status: ConnectionStatus,
    /// Retries made against the current provider since it last made progress.
    pub attempt: u32,
    pub recent_errors: VecDeque<RecordedError>,
    pub slot: ProviderSlot,
    pub last_event_id: Option<String>,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionState {
    #[must_use]
    pub fn new() -> Self {
        Self {
            status: ConnectionStatus::Disconnected,
            attempt: 0,
            recent_errors: VecDeque::with_capacity(MAX_RECENT_ERRORS),
            slot: ProviderSlot::Primary,
            last_event_id: None,
        }
    }

    /// The provider accepted the connection.
    ///
    /// The retry budget is untouched: a provider that accepts and then closes
    /// without sending anything must still run out of attempts.
    pub fn on_connected(&mut self) {
        self.status = ConnectionStatus::Connected;
    }

    /// The connection delivered a token, an event ID or completion.
    pub fn on_progress(&mut self) {
        self.attempt = 0;
    }

    pub fn on_completed(&mut self) {
        self.status = ConnectionStatus::Disconnected;
    }

    pub fn record_error(&mut self, err: &StreamError, provider: &str) {
        if self.recent_errors.len() == MAX_RECENT_ERRORS {
            self.recent_errors.pop_front();
        }
        self.recent_errors.push_back(RecordedError {
            kind: err.kind(),
            message: err.to_string(),
            provider: provider.to_string(),
            at: Utc::now(),
        });
    }

    /// Record `err` and decide how to recover.
    ///
    /// Retryable errors reconnect to the same provider until the policy's
    /// attempts are used up. After that, or on a non-retryable error, the
    /// fallback provider is tried once if there is one.
    pub fn on_failure(
        &mut self,
        err: &StreamError,
        provider: &str,
        policy: &BackoffPolicy,
        has_fallback: bool,
    ) -> Recovery {
        self.record_error(err, provider);

        if err.is_retryable() && policy.allows_retry(self.attempt) {
            self.attempt += 1;
            self.status = ConnectionStatus::Reconnecting;
            return Recovery::Retry {
                attempt: self.attempt,
            };
        }

        if has_fallback && self.slot == ProviderSlot::Primary {
            self.slot = ProviderSlot::Fallback;
            self.attempt = 0;
            self.last_event_id = None;
            self.status = ConnectionStatus::Reconnecting;
            return Recovery::SwitchToFallback;
        }

        self.status = ConnectionStatus::Failed;
        Recovery::Fail
    }
}
