//! Router assembly.

use std::sync::Arc;

use axum::{http::StatusCode, middleware, response::IntoResponse, routing::get, Extension, Router};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::http::{chat, cors_middleware, security_headers_middleware, ChatState};
use crate::stream::ChatStreamClient;

// Health check handler
async fn health_check() -> impl IntoResponse {
    StatusCode::OK
}

/// Build the application router.
///
/// Layer order, outermost first: security headers, CORS, tracing, routes.
/// CORS is skipped entirely when no origins are configured.
pub fn build_router(config: &Config, client: ChatStreamClient) -> Router {
    let chat_state = Arc::new(ChatState {
        client,
        max_input_length: config.chat.max_input_length,
    });

    let mut app = Router::new()
        .route("/health", get(health_check))
        .merge(chat::router())
        .layer(Extension(chat_state))
        .layer(TraceLayer::new_for_http());

    match config.cors.options() {
        Some(options) => {
            tracing::info!(origins = ?config.cors.allowed_origins, "CORS allowed origins configured");
            if config.cors.allowed_origins.iter().any(|o| o == "*") {
                tracing::warn!("CORS configured to allow any origin - not recommended for production");
            }
            app = app
                .layer(middleware::from_fn(cors_middleware))
                .layer(Extension(Arc::new(options)));
        }
        None => {
            tracing::info!(
                "CORS allowed origins not configured - cross-origin requests will be blocked"
            );
        }
    }

    // Add security headers middleware if enabled
    if config.security_headers.enabled {
        tracing::info!("Security headers enabled");
        let headers = crate::http::build_security_headers(&config.security_headers);
        app = app
            .layer(middleware::from_fn(security_headers_middleware))
            .layer(Extension(headers));
    } else {
        tracing::info!("Security headers disabled");
    }

    app
}
