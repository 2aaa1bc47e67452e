//! wiremock helpers for stubbing chat backends.
//!
//! # Quick Start
//!
//! ```ignore
//! use crate::common::http_mock::{sse_response, Mock, WiremockServer, method, path};
//!
//! let server = WiremockServer::start().await;
//! Mock::given(method("POST"))
//!     .and(path("/api/chat/stream"))
//!     .respond_with(sse_response("data: {\"content\":\"hi\"}\n\n"))
//!     .mount(&server)
//!     .await;
//! ```

pub use wiremock::matchers::{body_partial_json, header, header_exists, method, path};
pub use wiremock::MockServer as WiremockServer;
pub use wiremock::{Mock, ResponseTemplate};

use chatwire_api::stream::{PayloadFormat, ProviderConfig};

/// A 200 response carrying `body` as an event stream.
pub fn sse_response(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "text/event-stream")
        .set_body_string(body)
}

/// Provider config pointing at `path` on the mock server.
pub fn provider_config(server: &WiremockServer, name: &str, route: &str) -> ProviderConfig {
    ProviderConfig {
        name: name.to_string(),
        url: format!("{}{route}", server.uri()),
        api_key: None,
        format: PayloadFormat::Native,
        model: None,
        connect_timeout_ms: 2_000,
    }
}
