//! HTTP middleware stack for storefront.
//!
//! # Middleware Order (bottom to top in Router)
//!
//! 1. Sentry layer (capture errors)
//! 2. `TraceLayer` (request tracing)
//! 3. Request ID (add unique ID to each request)
//! 4. Security headers (CSP, framing, isolation)
//!
//! Route gating is done per handler with the [`RequireSession`] extractor.

pub mod auth;
pub mod request_id;
pub mod security_headers;

pub use auth::{RequireSession, SessionRejection};
pub use request_id::request_id_middleware;
pub use security_headers::{content_security_policy, security_headers_middleware};
