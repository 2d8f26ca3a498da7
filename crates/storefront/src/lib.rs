//! eshop storefront library.
//!
//! A server-rendered client for the eshop commerce backend. The backend owns
//! the catalog, carts, and payments; this crate holds one visitor's session
//! and cart view, keeps them in step with the backend, and renders pages.
//!
//! # Modules
//!
//! - [`api`] - HTTP client for the commerce backend
//! - [`session`] - Token, claims, and durable token storage
//! - [`cart`] - Client cart kept consistent by re-reading after every write
//! - [`checkout`] - Payment and the one-time confirmation handoff
//! - [`routes`] - Pages and form actions

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::time::Duration;

use axum::{
    Router,
    http::{HeaderValue, Request, Response},
    middleware::{from_fn, from_fn_with_state},
};
use tower_http::{
    services::ServeDir,
    trace::{DefaultOnResponse, OnResponse, TraceLayer},
};
use tracing::Span;

pub mod api;
pub mod cart;
pub mod checkout;
pub mod config;
pub mod error;
pub mod filters;
pub mod handoff;
pub mod images;
pub mod middleware;
pub mod routes;
pub mod session;
pub mod state;

#[cfg(test)]
mod testing;

use state::AppState;

/// Build the storefront router over `state`, with static files, request
/// tracing, security headers, and Sentry layers.
///
/// # Errors
///
/// Returns an error if the Content-Security-Policy built from the backend
/// origin is not a valid header value.
pub fn app(state: AppState) -> Result<Router, axum::http::header::InvalidHeaderValue> {
    let csp = HeaderValue::from_str(&middleware::content_security_policy(state.api().origin()))?;
    let static_dir = ServeDir::new(&state.config().static_dir);

    Ok(Router::new()
        .merge(routes::routes())
        .nest_service("/static", static_dir)
        .layer(from_fn_with_state(csp, middleware::security_headers_middleware))
        .layer(from_fn(middleware::request_id_middleware))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        uri = %request.uri(),
                        request_id = tracing::field::Empty,
                        status = tracing::field::Empty,
                        latency_ms = tracing::field::Empty,
                    )
                })
                .on_response(|response: &Response<_>, latency: Duration, span: &Span| {
                    span.record("status", response.status().as_u16());
                    span.record(
                        "latency_ms",
                        u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
                    );
                    DefaultOnResponse::default().on_response(response, latency, span);
                }),
        )
        .with_state(state)
        // Sentry layers (outermost for full request coverage)
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction()))
}
