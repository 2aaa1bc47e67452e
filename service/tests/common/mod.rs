//! Common test utilities for integration tests.
//!
//! This module provides:
//!
//! - [`app_builder::TestAppBuilder`] - Build test Axum apps through the same
//!   `build_router` wiring main.rs uses, with scripted chat providers
//! - [`http_mock`] - wiremock helpers for chat backends
//!
//! # App Builder Usage
//!
//! ```ignore
//! use crate::common::app_builder::TestAppBuilder;
//!
//! #[tokio::test]
//! async fn test_with_app() {
//!     let app = TestAppBuilder::minimal().build();
//!     // Use app.oneshot(...) to send requests
//! }
//! ```

#![allow(dead_code)]

pub mod app_builder;
pub mod http_mock;
