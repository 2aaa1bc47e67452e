//! CORS response header construction.
//!
//! [`build_cors_headers`] turns a [`CorsOptions`] into the set of
//! `Access-Control-*` headers a response should carry. It is a pure function:
//! the caller decides how the map is written onto its response type.

use std::collections::BTreeMap;

pub const ALLOW_ORIGIN: &str = "Access-Control-Allow-Origin";
pub const ALLOW_METHODS: &str = "Access-Control-Allow-Methods";
pub const ALLOW_HEADERS: &str = "Access-Control-Allow-Headers";
pub const ALLOW_CREDENTIALS: &str = "Access-Control-Allow-Credentials";
pub const MAX_AGE: &str = "Access-Control-Max-Age";
pub const VARY: &str = "Vary";

/// Header name to value mapping produced by [`build_cors_headers`].
pub type CorsHeaders = BTreeMap<&'static str, String>;

/// Which origins may make cross-origin requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OriginPolicy {
    /// Any origin (`*`).
    Any,
    /// A single literal origin.
    Exact(String),
    /// A set of origins; the request origin is reflected when it is a member.
    List(Vec<String>),
}

/// Options consumed once per response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorsOptions {
    pub origin: OriginPolicy,
    pub methods: Vec<String>,
    pub headers: Vec<String>,
    pub credentials: bool,
    /// Preflight cache lifetime in seconds.
    pub max_age: Option<u64>,
}

impl Default for CorsOptions {
    fn default() -> Self {
        Self {
            origin: OriginPolicy::Any,
            methods: ["GET", "POST", "PUT", "DELETE", "OPTIONS"]
                .into_iter()
                .map(String::from)
                .collect(),
            headers: ["Content-Type", "Authorization"]
                .into_iter()
                .map(String::from)
                .collect(),
            credentials: false,
            max_age: None,
        }
    }
}

impl CorsOptions {
    /// Options allowing exactly one origin, otherwise defaults.
    #[must_use]
    pub fn exact(origin: impl Into<String>) -> Self {
        Self {
            origin: OriginPolicy::Exact(origin.into()),
            ..Self::default()
        }
    }

    /// Options allowing a list of origins, otherwise defaults.
    #[must_use]
    pub fn list<I, S>(origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            origin: OriginPolicy::List(origins.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn with_credentials(mut self, credentials: bool) -> Self {
        self.credentials = credentials;
        self
    }

    #[must_use]
    pub const fn with_max_age(mut self, seconds: u64) -> Self {
        self.max_age = Some(seconds);
        self
    }
}

/// Whether `origin` is permitted by the options.
#[must_use]
pub fn origin_allowed(options: &CorsOptions, origin: &str) -> bool {
    match &options.origin {
        OriginPolicy::Any => true,
        OriginPolicy::Exact(allowed) => allowed == origin,
        OriginPolicy::List(allowed) => allowed.iter().any(|o| o == origin),
    }
}

/// Build the CORS headers for a response.
///
/// `None` options use [`CorsOptions::default`]. `request_origin` is the
/// request's `Origin` header, if any; it is only echoed back when the policy
/// allows it.
#[must_use]
pub fn build_cors_headers(options: Option<&CorsOptions>, request_origin: Option<&str>) -> CorsHeaders {
    let defaults;
    let options = match options {
        Some(options) => options,
        None => {
            defaults = CorsOptions::default();
            &defaults
        }
    };

    let mut headers = CorsHeaders::new();

    match (&options.origin, request_origin) {
        // Browsers reject `*` on credentialed requests, so reflect the caller instead
        (OriginPolicy::Any, Some(origin)) if options.credentials => {
            headers.insert(ALLOW_ORIGIN, origin.to_string());
            headers.insert(VARY, "Origin".to_string());
        }
        (OriginPolicy::Any, _) => {
            headers.insert(ALLOW_ORIGIN, "*".to_string());
        }
        (OriginPolicy::Exact(allowed), _) => {
            headers.insert(ALLOW_ORIGIN, allowed.clone());
        }
        (OriginPolicy::List(allowed), Some(origin)) => {
            if allowed.iter().any(|o| o == origin) {
                headers.insert(ALLOW_ORIGIN, origin.to_string());
            }
            headers.insert(VARY, "Origin".to_string());
        }
        (OriginPolicy::List(_), None) => {
            headers.insert(VARY, "Origin".to_string());
        }
    }

    if !options.methods.is_empty() {
        headers.insert(ALLOW_METHODS, options.methods.join(", "));
    }
    if !options.headers.is_empty() {
        headers.insert(ALLOW_HEADERS, options.headers.join(", "));
    }
    if options.credentials {
        headers.insert(ALLOW_CREDENTIALS, "true".to_string());
    }
    if let Some(max_age) = options.max_age {
        headers.insert(MAX_AGE, max_age.to_string());
    }

    headers
}
