//! HTTP surface: routes and middleware.

pub mod chat;
pub mod cors;
pub mod problem;
pub mod security;

pub use chat::ChatState;
pub use cors::cors_middleware;
pub use problem::ProblemDetails;
pub use security::{build_security_headers, security_headers_middleware, CspNonce};
