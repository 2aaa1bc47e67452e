//! Chat stream error classification.

use serde::Serialize;
use thiserror::Error;

/// Coarse error category, used for retry decisions and client reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Connection,
    Backend,
    Parse,
}

/// Errors that can occur while opening or reading a chat stream.
#[derive(Debug, Clone, Error)]
pub enum StreamError {
    /// Transport failure: refused connection, timeout, dropped stream
    #[error("connection error: {message}")]
    Connection { message: String },

    /// The provider answered with an error status or an error event
    #[error("backend error: {status} - {message}")]
    Backend { status: u16, message: String },

    /// An event payload could not be decoded
    #[error("malformed stream event: {message}")]
    Parse { message: String },
}

impl StreamError {
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    pub fn backend(status: u16, message: impl Into<String>) -> Self {
        Self::Backend {
            status,
            message: message.into(),
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Connection { .. } => ErrorKind::Connection,
            Self::Backend { .. } => ErrorKind::Backend,
            Self::Parse { .. } => ErrorKind::Parse,
        }
    }

    /// Whether reconnecting to the same provider can succeed.
    ///
    /// Backend errors are retryable only for timeouts (408), rate limiting
    /// (429) and server errors (5xx).
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Connection { .. } => true,
            Self::Backend { status, .. } => matches!(*status, 408 | 429 | 500..=599),
            Self::Parse { .. } => false,
        }
    }
}

impl From<reqwest::Error> for StreamError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => Self::backend(status.as_u16(), err.to_string()),
            None if err.is_decode() => Self::parse(err.to_string()),
            None => Self::connection(err.to_string()),
        }
    }
}
