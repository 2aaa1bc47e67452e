//! Test app builder that mirrors main.rs wiring with injectable providers.
//!
//! # Preset Builders
//!
//! - [`TestAppBuilder::minimal()`] - Defaults, no CORS, security headers on
//! - [`TestAppBuilder::with_mocks()`] - CORS for the dev frontend plus a
//!   scripted primary provider

use std::sync::Arc;

use axum::Router;
use chatwire_api::{
    app::build_router,
    config::{Config, SecurityHeadersConfig},
    stream::{fast_policy, provider::mock::MockChatProvider, ChatStreamClient},
};

/// Builder for test applications.
pub struct TestAppBuilder {
    config: Config,
    primary: Arc<MockChatProvider>,
    fallback: Option<Arc<MockChatProvider>>,
    max_attempts: u32,
}

impl Default for TestAppBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestAppBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: Config::default(),
            primary: Arc::new(MockChatProvider::new("backend")),
            fallback: None,
            max_attempts: 2,
        }
    }

    #[must_use]
    pub fn minimal() -> Self {
        Self::new()
    }

    #[must_use]
    pub fn with_mocks() -> Self {
        Self::new().with_cors(&["http://localhost:5173"])
    }

    #[must_use]
    pub fn with_cors(mut self, origins: &[&str]) -> Self {
        self.config.cors.allowed_origins = origins.iter().map(ToString::to_string).collect();
        self
    }

    #[must_use]
    pub fn with_cors_credentials(mut self) -> Self {
        self.config.cors.allow_credentials = true;
        self
    }

    #[must_use]
    pub fn with_security_headers(mut self, config: SecurityHeadersConfig) -> Self {
        self.config.security_headers = config;
        self
    }

    #[must_use]
    pub fn without_security_headers(mut self) -> Self {
        self.config.security_headers.enabled = false;
        self
    }

    #[must_use]
    pub fn with_max_input_length(mut self, max: usize) -> Self {
        self.config.chat.max_input_length = max;
        self
    }

    #[must_use]
    pub fn with_primary(mut self, provider: Arc<MockChatProvider>) -> Self {
        self.primary = provider;
        self
    }

    #[must_use]
    pub fn with_fallback(mut self, provider: Arc<MockChatProvider>) -> Self {
        self.fallback = Some(provider);
        self
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Build the router.
    pub fn build(self) -> Router {
        let mut client = ChatStreamClient::new(self.primary, fast_policy(self.max_attempts));
        if let Some(fallback) = self.fallback {
            client = client.with_fallback(fallback);
        }
        build_router(&self.config, client)
    }
}
