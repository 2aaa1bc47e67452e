//! Streaming chat connection to the backend, with fallback.
//!
//! # Architecture
//!
//! - [`sse`] - incremental `text/event-stream` decoder
//! - [`provider`] - [`ChatProvider`] trait, HTTP implementation, payload formats
//! - [`error`] - connection / backend / parse classification
//! - [`backoff`] - exponential backoff with jitter
//! - [`state`] - per-connection state machine
//! - [`client`] - [`ChatStreamClient`], which drives all of the above
//!
//! # Testing Patterns
//!
//! Use `MockChatProvider` (behind the `test-utils` feature) to script
//! provider behavior:
//!
//! ```ignore
//! use chatwire_api::stream::provider::mock::MockChatProvider;
//!
//! let primary = Arc::new(MockChatProvider::new("backend"));
//! primary.push_open_error(StreamError::backend(503, "unavailable"));
//! primary.push_stream(vec![Ok(ChunkEvent::new(ChatChunk::Done))]);
//!
//! let client = ChatStreamClient::new(primary, fast_policy(3));
//! let mut session = client.start(request);
//! while let Some(update) = session.next().await { /* ... */ }
//! ```

pub mod backoff;
pub mod client;
pub mod error;
pub mod provider;
pub mod sse;
pub mod state;

pub use backoff::BackoffPolicy;
pub use client::{ChatSession, ChatStreamClient, ChatUpdate};
pub use error::{ErrorKind, StreamError};
pub use provider::{ChatProvider, ChatRequest, HttpChatProvider, PayloadFormat, ProviderConfig};
pub use state::{ConnectionState, ConnectionStatus};

#[cfg(any(test, feature = "test-utils"))]
pub use client::fast_policy;
