//! Security headers middleware for HTTP responses.
//!
//! Static headers (HSTS, X-Frame-Options and friends) are built once from
//! configuration. The Content-Security-Policy is rendered per request so each
//! response can carry a fresh script nonce; handlers that render HTML read it
//! from the [`CspNonce`] request extension.

use std::sync::Arc;

use axum::{
    extract::Request,
    http::{
        header::{
            CONTENT_SECURITY_POLICY, REFERRER_POLICY, STRICT_TRANSPORT_SECURITY,
            X_CONTENT_TYPE_OPTIONS, X_FRAME_OPTIONS, X_XSS_PROTECTION,
        },
        HeaderMap, HeaderValue,
    },
    middleware::Next,
    response::Response,
    Extension,
};
use cw_web::{generate_nonce, ContentSecurityPolicy};

use crate::config::SecurityHeadersConfig;

/// Script nonce for the current request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CspNonce(pub String);

/// Security headers shared across requests.
#[derive(Debug, Clone)]
pub struct SecurityHeaders {
    fixed: HeaderMap,
    csp: Option<CspTemplate>,
}

#[derive(Debug, Clone)]
struct CspTemplate {
    connect_src: Vec<String>,
    report_uri: Option<String>,
    upgrade_insecure: bool,
    nonce: bool,
}

impl CspTemplate {
    fn render(&self, nonce: Option<&str>) -> String {
        let mut policy = ContentSecurityPolicy::baseline(nonce);
        for source in &self.connect_src {
            policy = policy.with_source("connect-src", source);
        }
        if self.upgrade_insecure {
            policy = policy.upgrade_insecure_requests();
        }
        if let Some(uri) = &self.report_uri {
            policy = policy.with_report_uri(uri);
        }
        policy.to_string()
    }
}

impl SecurityHeaders {
    /// Headers that do not change between requests.
    #[must_use]
    pub const fn fixed(&self) -> &HeaderMap {
        &self.fixed
    }

    /// Render the Content-Security-Policy for one response.
    ///
    /// Returns the header value and the nonce embedded in it, if any.
    #[must_use]
    pub fn content_security_policy(&self) -> Option<(String, Option<String>)> {
        let template = self.csp.as_ref()?;
        let nonce = template.nonce.then(generate_nonce);
        Some((template.render(nonce.as_deref()), nonce))
    }
}

/// Build security headers from configuration.
///
/// Returns an `Arc`-wrapped [`SecurityHeaders`] that can be shared across
/// requests via Axum's `Extension` layer.
#[must_use]
pub fn build_security_headers(config: &SecurityHeadersConfig) -> Arc<SecurityHeaders> {
    let mut headers = HeaderMap::new();

    // X-Content-Type-Options: nosniff (always)
    headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));

    if let Ok(value) = HeaderValue::from_str(&config.frame_options.to_uppercase()) {
        headers.insert(X_FRAME_OPTIONS, value);
    }

    // X-XSS-Protection (legacy but still useful for older browsers)
    headers.insert(X_XSS_PROTECTION, HeaderValue::from_static("1; mode=block"));

    if let Ok(value) = HeaderValue::from_str(&config.referrer_policy) {
        headers.insert(REFERRER_POLICY, value);
    }

    // HSTS (only if enabled - should only be used with HTTPS)
    if config.hsts_enabled {
        let hsts_value = if config.hsts_include_subdomains {
            format!("max-age={}; includeSubDomains", config.hsts_max_age)
        } else {
            format!("max-age={}", config.hsts_max_age)
        };
        if let Ok(value) = HeaderValue::from_str(&hsts_value) {
            headers.insert(STRICT_TRANSPORT_SECURITY, value);
        }
    }

    let csp = config.csp_enabled.then(|| CspTemplate {
        connect_src: config.csp_connect_src.clone(),
        report_uri: config.csp_report_uri.clone(),
        upgrade_insecure: config.hsts_enabled,
        nonce: config.csp_nonce,
    });

    Arc::new(SecurityHeaders {
        fixed: headers,
        csp,
    })
}

/// Middleware to add security headers to all responses.
///
/// Reads the shared [`SecurityHeaders`] from an `Extension`, attaches a
/// [`CspNonce`] to the request when nonces are enabled, and extends every
/// response with the headers. It should be added as the outermost layer so
/// headers are applied to all routes.
///
/// # Example
///
/// ```ignore
/// use axum::{middleware, Router, Extension};
/// use chatwire_api::http::security::{build_security_headers, security_headers_middleware};
/// use chatwire_api::config::SecurityHeadersConfig;
///
/// let headers = build_security_headers(&SecurityHeadersConfig::default());
///
/// let app = Router::new()
///     // ... routes ...
///     .layer(middleware::from_fn(security_headers_middleware))
///     .layer(Extension(headers));
/// ```
pub async fn security_headers_middleware(
    Extension(headers): Extension<Arc<SecurityHeaders>>,
    mut request: Request,
    next: Next,
) -> Response {
    let csp = headers.content_security_policy();
    if let Some((_, Some(nonce))) = &csp {
        request.extensions_mut().insert(CspNonce(nonce.clone()));
    }

    let mut response = next.run(request).await;
    let response_headers = response.headers_mut();
    for (k, v) in headers.fixed() {
        response_headers.insert(k.clone(), v.clone());
    }
    if let Some((policy, _)) = csp {
        match HeaderValue::from_str(&policy) {
            Ok(value) => {
                response_headers.insert(CONTENT_SECURITY_POLICY, value);
            }
            Err(e) => tracing::warn!(error = %e, "Skipping invalid Content-Security-Policy"),
        }
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_security_headers_default() {
        let config = SecurityHeadersConfig::default();
        let headers = build_security_headers(&config);

        // Should have at least the mandatory headers
        assert!(headers.fixed().contains_key(X_CONTENT_TYPE_OPTIONS));
        assert!(headers.fixed().contains_key(X_FRAME_OPTIONS));
        assert!(headers.fixed().contains_key(X_XSS_PROTECTION));
        assert!(headers.fixed().contains_key(REFERRER_POLICY));
        assert!(!headers.fixed().contains_key(STRICT_TRANSPORT_SECURITY));
        assert!(headers.content_security_policy().is_some());
    }

    #[test]
    fn test_build_security_headers_with_hsts() {
        let mut config = SecurityHeadersConfig::default();
        config.hsts_enabled = true;
        config.hsts_max_age = 31_536_000;
        config.hsts_include_subdomains = true;

        let headers = build_security_headers(&config);

        let hsts = headers
            .fixed()
            .get(STRICT_TRANSPORT_SECURITY)
            .map(|v| v.to_str().unwrap_or_default());

        assert!(hsts.is_some());
        assert!(hsts.unwrap().contains("max-age=31536000"));
        assert!(hsts.unwrap().contains("includeSubDomains"));

        let (policy, _) = headers.content_security_policy().unwrap();
        assert!(policy.ends_with("upgrade-insecure-requests"));
    }

    #[test]
    fn test_build_security_headers_custom_frame_options() {
        let mut config = SecurityHeadersConfig::default();
        config.frame_options = "sameorigin".to_string();

        let headers = build_security_headers(&config);

        let frame_options = headers
            .fixed()
            .get(X_FRAME_OPTIONS)
            .map(|v| v.to_str().unwrap_or_default());

        assert_eq!(frame_options, Some("SAMEORIGIN"));
    }

    #[test]
    fn test_csp_nonce_changes_per_render() {
        let headers = build_security_headers(&SecurityHeadersConfig::default());

        let (first_policy, first_nonce) = headers.content_security_policy().unwrap();
        let (second_policy, second_nonce) = headers.content_security_policy().unwrap();

        let first_nonce = first_nonce.unwrap();
        assert_ne!(Some(first_nonce.clone()), second_nonce);
        assert!(first_policy.contains(&format!("'nonce-{first_nonce}'")));
        assert_ne!(first_policy, second_policy);
    }

    #[test]
    fn test_csp_without_nonce_is_stable() {
        let mut config = SecurityHeadersConfig::default();
        config.csp_nonce = false;
        let headers = build_security_headers(&config);

        let (policy, nonce) = headers.content_security_policy().unwrap();
        assert!(nonce.is_none());
        assert_eq!(policy, cw_web::build_csp_header(None));
    }

    #[test]
    fn test_csp_extra_sources() {
        let mut config = SecurityHeadersConfig::default();
        config.csp_nonce = false;
        config.csp_connect_src = vec!["https://api.example.com".to_string()];
        config.csp_report_uri = Some("/csp-report".to_string());
        let headers = build_security_headers(&config);

        let (policy, _) = headers.content_security_policy().unwrap();
        assert!(policy.contains("connect-src 'self' https://api.example.com"));
        assert!(policy.ends_with("report-uri /csp-report"));
    }

    #[tokio::test]
    async fn test_middleware_exposes_nonce_to_handlers() {
        use axum::{body::Body, middleware, routing::get, Router};
        use tower::ServiceExt;

        async fn echo_nonce(Extension(nonce): Extension<CspNonce>) -> String {
            nonce.0
        }

        let app = Router::new()
            .route("/", get(echo_nonce))
            .layer(middleware::from_fn(security_headers_middleware))
            .layer(Extension(build_security_headers(
                &SecurityHeadersConfig::default(),
            )));

        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let policy = response
            .headers()
            .get(CONTENT_SECURITY_POLICY)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string)
            .unwrap();
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        let nonce = String::from_utf8(body.to_vec()).unwrap();

        assert!(!nonce.is_empty());
        assert!(policy.contains(&format!("'nonce-{nonce}'")));
    }

    #[test]
    fn test_csp_disabled() {
        let mut config = SecurityHeadersConfig::default();
        config.csp_enabled = false;
        let headers = build_security_headers(&config);
        assert!(headers.content_security_policy().is_none());
    }
}
