//! Shared web security helpers for `ChatWire`
//!
//! This crate provides the header builders, sanitization helpers and
//! environment guards used by both the Rust service (as a native library)
//! and the browser frontend (compiled to WASM).
//!
//! The modules are independent of each other:
//!
//! - [`cors`] - CORS response header construction
//! - [`csp`] - Content-Security-Policy header construction
//! - [`sanitize`] / [`validation`] - HTML escaping, script stripping, input denylist
//! - [`token`] - random tokens and CSP nonces
//! - [`env`] - server/browser capability injection for storage and window access

#![deny(
    clippy::expect_used,
    clippy::panic,
    clippy::print_stdout,
    clippy::todo,
    clippy::unimplemented,
    clippy::unwrap_used
)]

use wasm_bindgen::prelude::*;

pub mod cors;
pub mod csp;
pub mod env;
pub mod sanitize;
pub mod token;
pub mod validation;

pub use cors::{build_cors_headers, origin_allowed, CorsHeaders, CorsOptions, OriginPolicy};
pub use csp::{build_csp_header, ContentSecurityPolicy};
pub use env::{
    BrowserCapabilities, Environment, MemoryStorage, NoopStorage, NoopWindow, Storage,
    StorageError, Window,
};
pub use sanitize::{escape_html, sanitize_html, strip_script_tags, HtmlSanitizer, ScriptStripper};
pub use token::{generate_nonce, generate_token};
pub use validation::{check_input, validate_input, InputError, DEFAULT_MAX_LENGTH};

/// Escape text for safe insertion into HTML (WASM binding).
#[wasm_bindgen(js_name = "escapeHtml")]
#[must_use]
pub fn escape_html_js(input: &str) -> String {
    escape_html(input)
}

/// Remove script blocks, inline handlers and `javascript:` URLs (WASM binding).
#[wasm_bindgen(js_name = "stripScriptTags")]
#[must_use]
pub fn strip_script_tags_js(input: &str) -> String {
    strip_script_tags(input)
}

/// Check user input against the length limit and denylist (WASM binding).
///
/// A `max_length` of `None` uses [`DEFAULT_MAX_LENGTH`].
#[wasm_bindgen(js_name = "validateInput")]
#[must_use]
pub fn validate_input_js(input: &str, max_length: Option<u32>) -> bool {
    let max = max_length.map_or(DEFAULT_MAX_LENGTH, |m| m as usize);
    validate_input(input, max)
}

/// Build the Content-Security-Policy header value (WASM binding).
#[wasm_bindgen(js_name = "buildCspHeader")]
#[must_use]
pub fn build_csp_header_js(nonce: Option<String>) -> String {
    build_csp_header(nonce.as_deref())
}

/// Generate a fresh CSP nonce (WASM binding).
#[wasm_bindgen(js_name = "generateNonce")]
#[must_use]
pub fn generate_nonce_js() -> String {
    generate_nonce()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wasm_validate_uses_default_limit() {
        let long = "a".repeat(DEFAULT_MAX_LENGTH + 1);
        assert!(!validate_input_js(&long, None));
        assert!(validate_input_js(&long, Some(5000)));
    }

    #[test]
    fn wasm_csp_passes_nonce_through() {
        let header = build_csp_header_js(Some("abc".to_string()));
        assert!(header.contains("'nonce-abc'"));
    }
}
