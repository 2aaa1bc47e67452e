//! HttpChatProvider tests against a wiremock chat backend.

mod common;

use std::sync::Arc;

use chatwire_api::stream::{
    fast_policy,
    provider::{ChatChunk, ChunkEvent},
    ChatProvider, ChatRequest, ChatStreamClient, ChatUpdate, ConnectionStatus, ErrorKind,
    HttpChatProvider, PayloadFormat, StreamError,
};
use common::http_mock::{
    body_partial_json, header, method, path, provider_config, sse_response, Mock,
    ResponseTemplate, WiremockServer,
};
use futures_util::StreamExt;
use serde_json::json;

fn request(message: &str) -> ChatRequest {
    ChatRequest {
        message: message.to_string(),
        conversation_id: None,
    }
}

async fn collect(
    provider: &HttpChatProvider,
    last_event_id: Option<&str>,
) -> Vec<Result<ChunkEvent, StreamError>> {
    let stream = provider
        .open(&request("hello"), last_event_id)
        .await
        .expect("stream should open");
    stream.collect().await
}

async fn drain(client: &ChatStreamClient) -> Vec<ChatUpdate> {
    let mut session = client.start(request("hello"));
    let mut updates = Vec::new();
    while let Some(update) = session.next().await {
        updates.push(update);
    }
    updates
}

#[tokio::test]
async fn test_native_stream_decodes_tokens_and_ids() {
    let server = WiremockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat/stream"))
        .and(header("accept", "text/event-stream"))
        .and(body_partial_json(json!({"message": "hello"})))
        .respond_with(sse_response(
            "id: 1\ndata: {\"content\":\"Hel\"}\n\n\
             id: 2\ndata: {\"content\":\"lo\"}\n\n\
             event: done\ndata: {}\n\n",
        ))
        .expect(1)
        .mount(&server)
        .await;

    let provider =
        HttpChatProvider::new(provider_config(&server, "backend", "/api/chat/stream")).expect("provider");
    let events = collect(&provider, None).await;

    let events: Vec<ChunkEvent> = events.into_iter().map(|e| e.expect("chunk")).collect();
    assert_eq!(
        events,
        vec![
            ChunkEvent {
                id: Some("1".into()),
                chunk: ChatChunk::Token("Hel".into())
            },
            ChunkEvent {
                id: Some("2".into()),
                chunk: ChatChunk::Token("lo".into())
            },
            ChunkEvent {
                id: Some("2".into()),
                chunk: ChatChunk::Done
            },
        ]
    );
}

#[tokio::test]
async fn test_error_status_becomes_backend_error() {
    let cases = [(503, true), (429, true), (401, false), (400, false)];

    for (status, retryable) in cases {
        let server = WiremockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(status).set_body_string("nope"))
            .mount(&server)
            .await;

        let provider =
            HttpChatProvider::new(provider_config(&server, "backend", "/chat")).expect("provider");
        let err = match provider.open(&request("hello"), None).await {
            Ok(_) => panic!("status {status} should fail"),
            Err(err) => err,
        };

        assert_eq!(err.kind(), ErrorKind::Backend, "status {status}");
        assert_eq!(err.is_retryable(), retryable, "status {status}");
        assert_eq!(err.to_string(), format!("backend error: {status} - nope"));
    }
}

#[tokio::test]
async fn test_sends_bearer_and_last_event_id() {
    let server = WiremockServer::start().await;
    Mock::given(method("POST"))
        .and(header("authorization", "Bearer sk-test"))
        .and(header("last-event-id", "41"))
        .respond_with(sse_response("event: done\ndata: {}\n\n"))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = provider_config(&server, "backend", "/chat");
    config.api_key = Some("sk-test".into());
    let provider = HttpChatProvider::new(config).expect("provider");

    let events = collect(&provider, Some("41")).await;
    assert_eq!(events.len(), 1);
}

#[tokio::test]
async fn test_openai_format() {
    let server = WiremockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(json!({
            "model": "gpt-4o-mini",
            "stream": true,
            "messages": [{"role": "user", "content": "hello"}],
        })))
        .respond_with(sse_response(
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n\
             data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\n\
             data: [DONE]\n\n",
        ))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = provider_config(&server, "openai", "/v1/chat/completions");
    config.format = PayloadFormat::OpenAi;
    let provider = HttpChatProvider::new(config).expect("provider");

    let chunks: Vec<ChatChunk> = collect(&provider, None)
        .await
        .into_iter()
        .map(|e| e.expect("chunk").chunk)
        .collect();
    assert_eq!(chunks, vec![ChatChunk::Token("Hi".into()), ChatChunk::Done]);
}

#[tokio::test]
async fn test_malformed_event_is_yielded_as_parse_error() {
    let server = WiremockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(sse_response(
            "data: not json\n\ndata: {\"content\":\"ok\",\"done\":true}\n\n",
        ))
        .mount(&server)
        .await;

    let provider =
        HttpChatProvider::new(provider_config(&server, "backend", "/chat")).expect("provider");
    let events = collect(&provider, None).await;

    assert_eq!(events.len(), 3);
    assert!(matches!(&events[0], Err(e) if e.kind() == ErrorKind::Parse));
    assert_eq!(
        events[2].as_ref().map(|e| e.chunk.clone()).ok(),
        Some(ChatChunk::Done)
    );
}

#[tokio::test]
async fn test_unreachable_backend_is_connection_error() {
    let server = WiremockServer::start().await;
    let config = provider_config(&server, "backend", "/chat");
    drop(server);

    let provider = HttpChatProvider::new(config).expect("provider");
    let err = match provider.open(&request("hello"), None).await {
        Ok(_) => panic!("closed server should fail"),
        Err(err) => err,
    };
    assert_eq!(err.kind(), ErrorKind::Connection);
    assert!(err.is_retryable());
}

// =============================================================================
// Client against real HTTP providers
// =============================================================================

#[tokio::test]
async fn test_client_retries_then_falls_back_over_http() {
    let primary_server = WiremockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .expect(3)
        .mount(&primary_server)
        .await;

    let fallback_server = WiremockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(sse_response(
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\ndata: [DONE]\n\n",
        ))
        .expect(1)
        .mount(&fallback_server)
        .await;

    let primary = HttpChatProvider::new(provider_config(&primary_server, "backend", "/chat"))
        .expect("primary");
    let mut fallback_config = provider_config(&fallback_server, "openai", "/v1/chat/completions");
    fallback_config.format = PayloadFormat::OpenAi;
    let fallback = HttpChatProvider::new(fallback_config).expect("fallback");

    let client = ChatStreamClient::new(Arc::new(primary), fast_policy(2))
        .with_fallback(Arc::new(fallback));
    let updates = drain(&client).await;

    let reconnects = updates
        .iter()
        .filter(|u| {
            matches!(
                u,
                ChatUpdate::Status {
                    status: ConnectionStatus::Reconnecting,
                    provider,
                    ..
                } if provider == "backend"
            )
        })
        .count();
    assert_eq!(reconnects, 2);
    assert!(updates.contains(&ChatUpdate::ProviderSwitched {
        from: "backend".into(),
        to: "openai".into(),
    }));
    assert!(updates.contains(&ChatUpdate::Token {
        content: "Hi".into()
    }));
    assert_eq!(updates.last(), Some(&ChatUpdate::Done));
}

#[tokio::test]
async fn test_client_gives_up_on_backend_that_never_sends() {
    let server = WiremockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(sse_response(""))
        .expect(2)
        .mount(&server)
        .await;

    let provider =
        HttpChatProvider::new(provider_config(&server, "backend", "/chat")).expect("provider");
    let client = ChatStreamClient::new(Arc::new(provider), fast_policy(1));
    let updates = drain(&client).await;

    assert_eq!(
        updates.last(),
        Some(&ChatUpdate::Failed {
            kind: ErrorKind::Connection,
            message: "connection error: stream ended before completion".into(),
        })
    );
    assert!(!updates
        .iter()
        .any(|u| matches!(u, ChatUpdate::Token { .. } | ChatUpdate::Done)));
}

#[tokio::test]
async fn test_client_resumes_with_last_event_id() {
    let server = WiremockServer::start().await;
    // Resumed request: finish the answer
    Mock::given(method("POST"))
        .and(header("last-event-id", "7"))
        .respond_with(sse_response("id: 8\ndata: {\"content\":\"!\",\"done\":true}\n\n"))
        .expect(1)
        .mount(&server)
        .await;
    // First request: the body ends before completion
    Mock::given(method("POST"))
        .respond_with(sse_response("id: 7\ndata: {\"content\":\"Hi\"}\n\n"))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    let provider =
        HttpChatProvider::new(provider_config(&server, "backend", "/chat")).expect("provider");
    let client = ChatStreamClient::new(Arc::new(provider), fast_policy(2));
    let updates = drain(&client).await;

    let tokens: Vec<_> = updates
        .iter()
        .filter_map(|u| match u {
            ChatUpdate::Token { content } => Some(content.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(tokens, vec!["Hi", "!"]);
    assert_eq!(updates.last(), Some(&ChatUpdate::Done));
}
