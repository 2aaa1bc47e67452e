//! HTML escaping and sanitization.
//!
//! Rich sanitization is a capability of the [`Environment`]: a browser host
//! can inject a full DOM-based sanitizer. Without one (server rendering),
//! [`sanitize_html`] escapes the input so nothing is ever interpreted as markup.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::env::Environment;

/// Turns untrusted HTML into HTML that is safe to render.
pub trait HtmlSanitizer: Send + Sync {
    fn sanitize(&self, html: &str) -> String;
}

/// Built-in sanitizer backed by [`strip_script_tags`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ScriptStripper;

impl HtmlSanitizer for ScriptStripper {
    fn sanitize(&self, html: &str) -> String {
        strip_script_tags(html)
    }
}

#[allow(clippy::unwrap_used)] // static patterns
static SCRIPT_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<\s*script\b[^>]*>.*?<\s*/\s*script\s*>").unwrap());

#[allow(clippy::unwrap_used)]
static SCRIPT_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<\s*/?\s*script\b[^>]*>").unwrap());

#[allow(clippy::unwrap_used)]
static HANDLER_ATTR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\s+on[a-z]+\s*=\s*(?:"[^"]*"|'[^']*'|[^\s>]+)"#).unwrap()
});

#[allow(clippy::unwrap_used)]
static SCRIPT_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:javascript|vbscript)\s*:").unwrap());

/// Escape `& < > " ' /` so `input` renders as text.
#[must_use]
pub fn escape_html(input: &str) -> String {
    html_escape::encode_safe(input).into_owned()
}

/// Remove `<script>` blocks, inline `on*=` handlers and script URLs.
///
/// Everything else is left as-is, including other markup.
#[must_use]
pub fn strip_script_tags(input: &str) -> String {
    let without_blocks = SCRIPT_BLOCK.replace_all(input, "");
    let without_tags = SCRIPT_TAG.replace_all(&without_blocks, "");
    let without_handlers = HANDLER_ATTR.replace_all(&without_tags, "");
    SCRIPT_URL.replace_all(&without_handlers, "").into_owned()
}

/// Sanitize `input` with the environment's sanitizer, or escape it when the
/// environment has none.
#[must_use]
pub fn sanitize_html(input: &str, env: &Environment) -> String {
    match env.sanitizer() {
        Some(sanitizer) => sanitizer.sanitize(input),
        None => escape_html(input),
    }
}
