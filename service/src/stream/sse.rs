//! `text/event-stream` decoding.
//!
//! Parsing is done by `eventsource-stream`; this module bounds how much of an
//! unterminated line may be buffered and maps the result onto
//! [`StreamError`].

use std::time::Duration;

use eventsource_stream::{EventStreamError, Eventsource};
use futures_util::{Stream, StreamExt};

use super::error::StreamError;

/// Longest line accepted before the stream is treated as broken.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// One dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// Event type; `"message"` when the stream did not name one.
    pub event: String,
    pub data: String,
    /// Last event ID in effect when this event was dispatched.
    pub id: Option<String>,
    /// Reconnection delay the server sent with this event.
    pub retry: Option<Duration>,
}

/// Fail the stream once a line grows past `max_line` bytes without a terminator.
fn limit_line_length<S, B, E>(
    bytes: S,
    max_line: usize,
) -> impl Stream<Item = Result<B, StreamError>> + Send
where
    S: Stream<Item = Result<B, E>> + Send,
    B: AsRef<[u8]> + Send,
    E: Into<StreamError> + Send,
{
    let mut pending = 0usize;
    bytes.map(move |chunk| {
        let chunk = chunk.map_err(Into::<StreamError>::into)?;
        let data = chunk.as_ref();
        pending = match data.iter().rposition(|b| matches!(b, b'\n' | b'\r')) {
            Some(pos) => data.len() - pos - 1,
            None => pending.saturating_add(data.len()),
        };
        if pending > max_line {
            return Err(StreamError::connection(format!(
                "event stream line exceeds {max_line} bytes"
            )));
        }
        Ok(chunk)
    })
}

/// Decode a byte stream into events.
///
/// Undecodable input is yielded as `StreamError::Parse` and decoding
/// continues. A transport error, or a line longer than `max_line`, is yielded
/// and ends the stream.
pub fn decode_events<S, B, E>(
    bytes: S,
    max_line: usize,
) -> impl Stream<Item = Result<SseEvent, StreamError>> + Send
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<StreamError> + Send + 'static,
{
    async_stream::stream! {
        let mut events = Box::pin(limit_line_length(bytes, max_line).eventsource());
        let mut last_event_id: Option<String> = None;

        while let Some(item) = events.next().await {
            match item {
                Ok(event) => {
                    if !event.id.is_empty() {
                        last_event_id = Some(event.id);
                    }
                    yield Ok(SseEvent {
                        event: event.event,
                        data: event.data,
                        id: last_event_id.clone(),
                        retry: event.retry,
                    });
                }
                Err(EventStreamError::Transport(err)) => {
                    yield Err(err);
                    break;
                }
                Err(err) => yield Err(StreamError::parse(err.to_string())),
            }
        }
    }
}
