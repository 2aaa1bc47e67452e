//! CORS middleware.
//!
//! Header values come from [`cw_web::build_cors_headers`], so the server and
//! the browser-side helpers agree on what a given policy emits. Headers are
//! only attached to requests that carry an `Origin`.

use std::sync::Arc;

use axum::{
    extract::Request,
    http::{
        header::{ACCESS_CONTROL_REQUEST_METHOD, ORIGIN},
        HeaderMap, HeaderName, HeaderValue, Method, StatusCode,
    },
    middleware::Next,
    response::{IntoResponse, Response},
    Extension,
};
use cw_web::{build_cors_headers, CorsOptions};

/// Whether the request is a CORS preflight.
#[must_use]
pub fn is_preflight(method: &Method, headers: &HeaderMap) -> bool {
    method == Method::OPTIONS
        && headers.contains_key(ORIGIN)
        && headers.contains_key(ACCESS_CONTROL_REQUEST_METHOD)
}

fn apply(options: &CorsOptions, origin: &str, target: &mut HeaderMap) {
    for (name, value) in build_cors_headers(Some(options), Some(origin)) {
        let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(&value),
        ) else {
            tracing::warn!(header = name, "Skipping invalid CORS header");
            continue;
        };
        if name == axum::http::header::VARY {
            target.append(name, value);
        } else {
            target.insert(name, value);
        }
    }
}

/// Answer preflights and add CORS headers to cross-origin responses.
///
/// Preflights are answered here with `204 No Content` and never reach the
/// router.
pub async fn cors_middleware(
    Extension(options): Extension<Arc<CorsOptions>>,
    request: Request,
    next: Next,
) -> Response {
    let origin = request
        .headers()
        .get(ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(ToString::to_string);

    let Some(origin) = origin else {
        return next.run(request).await;
    };

    if is_preflight(request.method(), request.headers()) {
        tracing::debug!(origin = %origin, "Answering CORS preflight");
        let mut response = StatusCode::NO_CONTENT.into_response();
        apply(&options, &origin, response.headers_mut());
        return response;
    }

    let mut response = next.run(request).await;
    apply(&options, &origin, response.headers_mut());
    response
}
