//! Chat streaming endpoint.
//!
//! `POST /api/chat` validates the prompt and relays the session's
//! [`ChatUpdate`]s to the browser as server-sent events. The event name is
//! the update kind and the data is the update as JSON.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Extension},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::post,
    Json, Router,
};
use futures_util::{Stream, StreamExt};
use serde::Deserialize;

use super::problem::ProblemDetails;
use crate::stream::{ChatRequest, ChatStreamClient, ChatUpdate};

/// Shared state for the chat handler.
#[derive(Clone)]
pub struct ChatState {
    pub client: ChatStreamClient,
    pub max_input_length: usize,
}

#[derive(Debug, Deserialize)]
pub struct ChatBody {
    pub message: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
}

/// Create chat router
pub fn router() -> Router {
    Router::new().route("/api/chat", post(chat))
}

fn to_event(update: &ChatUpdate) -> Event {
    let event = Event::default().event(update.event_name());
    match event.clone().json_data(update) {
        Ok(event) => event,
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize chat update");
            event.data("{}")
        }
    }
}

fn sse_stream(
    updates: impl Stream<Item = ChatUpdate> + Send,
) -> impl Stream<Item = Result<Event, Infallible>> + Send {
    updates.map(|update| Ok(to_event(&update)))
}

async fn chat(
    Extension(state): Extension<Arc<ChatState>>,
    body: Result<Json<ChatBody>, JsonRejection>,
) -> Response {
    let body = match body {
        Ok(Json(body)) => body,
        Err(rejection) => {
            tracing::debug!(error = %rejection, "Rejected chat request body");
            return ProblemDetails::malformed_body(&rejection).into_response();
        }
    };
    let message = body.message.trim();
    if let Err(e) = cw_web::check_input(message, state.max_input_length) {
        tracing::debug!(error = %e, "Rejected chat input");
        return ProblemDetails::invalid_input("message", &e).into_response();
    }

    let session = state.client.start(ChatRequest {
        message: message.to_string(),
        conversation_id: body.conversation_id,
    });
    tracing::info!(session_id = %session.id(), "Chat session started");

    Sse::new(sse_stream(session.into_stream()))
        .keep_alive(KeepAlive::default())
        .into_response()
}
