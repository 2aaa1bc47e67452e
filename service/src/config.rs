use std::time::Duration;

use cw_web::{CorsOptions, OriginPolicy};
use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Deserializer, Serialize};
use serde_aux::prelude::deserialize_vec_from_string_or_vec;

use crate::stream::{BackoffPolicy, PayloadFormat, ProviderConfig};

/// Application configuration loaded from multiple sources.
///
/// Configuration is loaded in priority order (lowest to highest):
/// 1. Struct defaults
/// 2. config.yaml file (if exists)
/// 3. Environment variables with CW_ prefix (always wins)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    #[serde(default)]
    pub cors: CorsConfig,
    #[serde(default)]
    pub security_headers: SecurityHeadersConfig,
    pub chat: ChatConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// HTTP server port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// HTTP server bind address.
    #[serde(default = "default_host")]
    pub host: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level filter (debug, info, warn, error). `RUST_LOG` takes precedence.
    #[serde(default = "default_log_level")]
    pub level: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CorsConfig {
    /// Allowed origins for CORS requests.
    /// Use `"*"` to allow any origin (not recommended for production).
    /// Accepts either an array or comma-separated string.
    /// Example: `["http://localhost:5173"]` or `"http://localhost:5173,https://app.example.com"`
    #[serde(
        default = "default_allowed_origins",
        deserialize_with = "deserialize_non_empty"
    )]
    pub allowed_origins: Vec<String>,

    /// Allowed request methods (array or comma-separated string).
    #[serde(
        default = "default_allowed_methods",
        deserialize_with = "deserialize_non_empty"
    )]
    pub allowed_methods: Vec<String>,

    /// Allowed request headers (array or comma-separated string).
    #[serde(
        default = "default_allowed_headers",
        deserialize_with = "deserialize_non_empty"
    )]
    pub allowed_headers: Vec<String>,

    /// Send `Access-Control-Allow-Credentials: true` (default: false).
    #[serde(default)]
    pub allow_credentials: bool,

    /// Preflight cache lifetime in seconds.
    #[serde(default)]
    pub max_age_secs: Option<u64>,
}

/// Deserialize a list from comma-separated string or array, trimming and filtering empty values.
fn deserialize_non_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let values: Vec<String> = deserialize_vec_from_string_or_vec(deserializer)?;
    Ok(values
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect())
}

impl CorsConfig {
    /// CORS options for the middleware, or `None` when no origins are configured.
    #[must_use]
    pub fn options(&self) -> Option<CorsOptions> {
        let origin = if self.allowed_origins.iter().any(|o| o == "*") {
            OriginPolicy::Any
        } else {
            match self.allowed_origins.as_slice() {
                [] => return None,
                [single] => OriginPolicy::Exact(single.clone()),
                many => OriginPolicy::List(many.to_vec()),
            }
        };

        Some(CorsOptions {
            origin,
            methods: self.allowed_methods.clone(),
            headers: self.allowed_headers.clone(),
            credentials: self.allow_credentials,
            max_age: self.max_age_secs,
        })
    }
}

// These functions cannot be const because serde uses function pointers for defaults
#[allow(clippy::missing_const_for_fn)]
fn default_port() -> u16 {
    8080
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

#[allow(clippy::missing_const_for_fn)]
fn default_allowed_origins() -> Vec<String> {
    // Default to empty (no cross-origin requests allowed) - safe for production
    // Configure explicitly via CW_CORS__ALLOWED_ORIGINS or config.yaml
    vec![]
}

fn default_allowed_methods() -> Vec<String> {
    CorsOptions::default().methods
}

fn default_allowed_headers() -> Vec<String> {
    CorsOptions::default().headers
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: default_allowed_origins(),
            allowed_methods: default_allowed_methods(),
            allowed_headers: default_allowed_headers(),
            allow_credentials: false,
            max_age_secs: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SecurityHeadersConfig {
    /// Enable security headers (default: true).
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Enable HSTS header (default: false, enable in production with HTTPS).
    #[serde(default)]
    pub hsts_enabled: bool,

    /// HSTS max-age in seconds (default: 31536000 = 1 year).
    #[serde(default = "default_hsts_max_age")]
    pub hsts_max_age: u64,

    /// Include subdomains in HSTS (default: true).
    #[serde(default = "default_true")]
    pub hsts_include_subdomains: bool,

    /// X-Frame-Options value: "DENY" or "SAMEORIGIN" (default: "DENY").
    #[serde(default = "default_frame_options")]
    pub frame_options: String,

    /// Referrer-Policy header value (default: "strict-origin-when-cross-origin").
    #[serde(default = "default_referrer_policy")]
    pub referrer_policy: String,

    /// Send a Content-Security-Policy header (default: true).
    #[serde(default = "default_true")]
    pub csp_enabled: bool,

    /// Generate a fresh script nonce for every response (default: true).
    #[serde(default = "default_true")]
    pub csp_nonce: bool,

    /// Extra `connect-src` sources, e.g. the chat backend's origin.
    #[serde(default, deserialize_with = "deserialize_non_empty")]
    pub csp_connect_src: Vec<String>,

    /// Optional `report-uri` for CSP violation reports.
    #[serde(default)]
    pub csp_report_uri: Option<String>,
}

#[allow(clippy::missing_const_for_fn)]
fn default_true() -> bool {
    true
}

#[allow(clippy::missing_const_for_fn)]
fn default_hsts_max_age() -> u64 {
    31_536_000 // 1 year
}

fn default_frame_options() -> String {
    "DENY".to_string()
}

fn default_referrer_policy() -> String {
    "strict-origin-when-cross-origin".to_string()
}

impl Default for SecurityHeadersConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            hsts_enabled: false,
            hsts_max_age: default_hsts_max_age(),
            hsts_include_subdomains: default_true(),
            frame_options: default_frame_options(),
            referrer_policy: default_referrer_policy(),
            csp_enabled: default_true(),
            csp_nonce: default_true(),
            csp_connect_src: Vec::new(),
            csp_report_uri: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatConfig {
    /// The backend chat service.
    #[serde(default = "default_primary")]
    pub primary: ProviderConfig,

    /// Secondary AI provider used once the primary gives up.
    #[serde(default)]
    pub fallback: Option<ProviderConfig>,

    #[serde(default)]
    pub reconnect: ReconnectConfig,

    /// Maximum prompt length in characters.
    #[serde(default = "default_max_input_length")]
    pub max_input_length: usize,

    /// Updates buffered per session before the stream driver waits for the
    /// consumer (default: 64).
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_primary() -> ProviderConfig {
    ProviderConfig {
        name: "backend".to_string(),
        url: "http://localhost:8000/api/chat/stream".to_string(),
        api_key: None,
        format: PayloadFormat::Native,
        model: None,
        connect_timeout_ms: 10_000,
    }
}

#[allow(clippy::missing_const_for_fn)]
fn default_max_input_length() -> usize {
    cw_web::DEFAULT_MAX_LENGTH
}

const fn default_channel_capacity() -> usize {
    64
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            primary: default_primary(),
            fallback: None,
            reconnect: ReconnectConfig::default(),
            max_input_length: default_max_input_length(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReconnectConfig {
    /// Delay before the first retry (default: 1000ms).
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Upper bound on any retry delay (default: 30000ms).
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Retries per provider before giving up on it (default: 5).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Maximum random jitter added to each delay (default: 1000ms).
    #[serde(default = "default_max_jitter_ms")]
    pub max_jitter_ms: u64,
}

#[allow(clippy::missing_const_for_fn)]
fn default_base_delay_ms() -> u64 {
    1_000
}

#[allow(clippy::missing_const_for_fn)]
fn default_max_delay_ms() -> u64 {
    30_000
}

#[allow(clippy::missing_const_for_fn)]
fn default_max_attempts() -> u32 {
    5
}

#[allow(clippy::missing_const_for_fn)]
fn default_max_jitter_ms() -> u64 {
    1_000
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            max_attempts: default_max_attempts(),
            max_jitter_ms: default_max_jitter_ms(),
        }
    }
}

impl ReconnectConfig {
    #[must_use]
    pub const fn policy(&self) -> BackoffPolicy {
        BackoffPolicy {
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            max_attempts: self.max_attempts,
            max_jitter: Duration::from_millis(self.max_jitter_ms),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                port: default_port(),
                host: default_host(),
            },
            logging: LoggingConfig {
                level: default_log_level(),
            },
            cors: CorsConfig::default(),
            security_headers: SecurityHeadersConfig::default(),
            chat: ChatConfig::default(),
        }
    }
}

/// Configuration loading and validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration error: {0}")]
    Figment(#[from] Box<figment::Error>),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// Sources are merged in priority order:
    /// 1. Struct defaults (lowest)
    /// 2. The YAML file at `yaml_path` (if it exists)
    /// 3. Environment variables with CW_ prefix (highest)
    ///
    /// # Errors
    /// Returns an error if configuration cannot be loaded or is invalid.
    pub fn load_from(yaml_path: &str) -> Result<Self, ConfigError> {
        let config: Self = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Yaml::file(yaml_path))
            .merge(Env::prefixed("CW_").split("__"))
            .extract()?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    /// Returns an error if any configuration value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Port must be non-zero
        if self.server.port == 0 {
            return Err(ConfigError::Validation("server.port cannot be 0".into()));
        }

        // CORS origins must be valid URLs or "*"
        for origin in &self.cors.allowed_origins {
            if origin != "*" && !is_http_url(origin) {
                return Err(ConfigError::Validation(format!(
                    "cors.allowed_origins contains invalid origin '{origin}'. Must be '*' or start with http:// or https://"
                )));
            }
        }

        let wildcard = self.cors.allowed_origins.iter().any(|o| o == "*");
        if wildcard && self.cors.allow_credentials {
            return Err(ConfigError::Validation(
                "cors.allow_credentials cannot be combined with wildcard origin '*'".into(),
            ));
        }

        // X-Frame-Options must be DENY or SAMEORIGIN
        let frame_opts = self.security_headers.frame_options.to_uppercase();
        if frame_opts != "DENY" && frame_opts != "SAMEORIGIN" {
            return Err(ConfigError::Validation(format!(
                "security_headers.frame_options must be 'DENY' or 'SAMEORIGIN', got: '{}'",
                self.security_headers.frame_options
            )));
        }

        if !is_http_url(&self.chat.primary.url) {
            return Err(ConfigError::Validation(format!(
                "chat.primary.url must start with http:// or https://, got: '{}'",
                self.chat.primary.url
            )));
        }

        if let Some(fallback) = &self.chat.fallback {
            if !is_http_url(&fallback.url) {
                return Err(ConfigError::Validation(format!(
                    "chat.fallback.url must start with http:// or https://, got: '{}'",
                    fallback.url
                )));
            }
            if fallback.name == self.chat.primary.name {
                return Err(ConfigError::Validation(
                    "chat.fallback.name must differ from chat.primary.name".into(),
                ));
            }
        }

        let reconnect = &self.chat.reconnect;
        if reconnect.base_delay_ms == 0 {
            return Err(ConfigError::Validation(
                "chat.reconnect.base_delay_ms cannot be 0".into(),
            ));
        }
        if reconnect.max_delay_ms < reconnect.base_delay_ms {
            return Err(ConfigError::Validation(
                "chat.reconnect.max_delay_ms cannot be less than base_delay_ms".into(),
            ));
        }

        if self.chat.max_input_length == 0 {
            return Err(ConfigError::Validation(
                "chat.max_input_length cannot be 0".into(),
            ));
        }

        if self.chat.channel_capacity == 0 {
            return Err(ConfigError::Validation(
                "chat.channel_capacity cannot be 0".into(),
            ));
        }

        Ok(())
    }
}
