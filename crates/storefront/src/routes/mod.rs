//! HTTP route handlers for storefront.
//!
//! # Route Structure
//!
//! ```text
//! GET  /                       - Catalog (?q= name search)
//! GET  /health                 - Liveness check
//! GET  /health/ready           - Backend reachability check
//!
//! # Auth
//! GET  /login                  - Login page
//! POST /login                  - Login action
//! GET  /register               - Register page
//! POST /register               - Register action
//! POST /logout                 - Logout action
//!
//! # Cart
//! POST /cart/add               - Add to cart (sends anonymous visitors to /login)
//! GET  /cart                   - Cart page (requires session)
//! POST /cart/update            - Set a line's quantity (requires session)
//! POST /cart/remove            - Remove a line (requires session)
//! POST /cart/clear             - Empty the cart (requires session)
//!
//! # Checkout (requires session)
//! GET  /checkout               - Order summary and card form
//! POST /checkout               - Pay
//! GET  /confirmation/{ticket}  - One-time order confirmation
//! ```
//!
//! Outcomes of form posts travel as `?error=` / `?success=` codes on the
//! redirect; [`Flash`] turns them back into messages.

pub mod auth;
pub mod cart;
pub mod checkout;
pub mod confirmation;
pub mod home;

use axum::{
    Router,
    extract::{Request, State},
    http::StatusCode,
    routing::{get, post},
};
use serde::Deserialize;

use crate::api::CommerceBackend;
use crate::error::AppError;
use crate::state::AppState;

// =============================================================================
// Shared View Data
// =============================================================================

/// Navigation bar data, present on every page.
#[derive(Debug, Clone, Default)]
pub struct NavView {
    pub authenticated: bool,
    pub display_name: Option<String>,
    pub cart_count: u32,
}

impl NavView {
    /// Navigation for the current session and cart.
    #[must_use]
    pub fn current(state: &AppState) -> Self {
        let session = state.session().snapshot();
        Self {
            authenticated: session.is_authenticated(),
            display_name: session.claims().map(|c| c.display_name().to_string()),
            cart_count: state.cart().snapshot().item_count(),
        }
    }
}

/// Query parameters carrying a message code after a redirect.
#[derive(Debug, Default, Deserialize)]
pub struct MessageQuery {
    pub error: Option<String>,
    pub success: Option<String>,
    /// Backend-provided detail accompanying `error=rejected`.
    pub detail: Option<String>,
}

/// Messages to show at the top of a page.
#[derive(Debug, Clone, Default)]
pub struct Flash {
    pub error: Option<String>,
    pub success: Option<String>,
}

impl Flash {
    /// An error message only.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            success: None,
        }
    }
}

impl From<MessageQuery> for Flash {
    fn from(query: MessageQuery) -> Self {
        let detail = query.detail.filter(|d| !d.trim().is_empty());
        Self {
            error: query.error.map(|code| match (code.as_str(), detail) {
                ("rejected", Some(detail)) => detail,
                (code, _) => error_message(code).to_string(),
            }),
            success: query.success.map(|code| success_message(&code).to_string()),
        }
    }
}

fn error_message(code: &str) -> &'static str {
    match code {
        "credentials" => "Could not sign in. Check your credentials.",
        "invalid_email" => "Enter a valid email address.",
        "login_required" => "Sign in to add products to your cart.",
        "session_expired" => "Your session has expired. Please sign in again.",
        "add_failed" => "Could not add the product to the cart.",
        "quantity" => "Quantity must be at least 1.",
        "update_failed" => "Could not update the cart. Please try again.",
        "rejected" => "The store declined the request.",
        _ => "Something went wrong. Please try again.",
    }
}

fn success_message(code: &str) -> &'static str {
    match code {
        "added" => "Product added to cart.",
        "registered" => "Registration successful. You can sign in now.",
        "cleared" => "Your cart is empty now.",
        "logged_out" => "You have been signed out.",
        _ => "Done.",
    }
}

/// Redirect target carrying an error code and optional backend detail.
fn error_redirect(path: &str, code: &str, detail: Option<&str>) -> String {
    match detail {
        Some(detail) => format!(
            "{path}?error={code}&detail={}",
            urlencoding::encode(detail)
        ),
        None => format!("{path}?error={code}"),
    }
}

// =============================================================================
// Router
// =============================================================================

/// Create the auth routes router.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/login", get(auth::login_page).post(auth::login))
        .route("/register", get(auth::register_page).post(auth::register))
        .route("/logout", post(auth::logout))
}

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::show))
        .route("/add", post(cart::add))
        .route("/update", post(cart::update))
        .route("/remove", post(cart::remove))
        .route("/clear", post(cart::clear))
}

/// Create all routes for the storefront.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(home::home))
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .nest("/cart", cart_routes())
        .route("/checkout", get(checkout::show).post(checkout::submit))
        .route("/confirmation/{ticket}", get(confirmation::show))
        .merge(auth_routes())
        .fallback(not_found)
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
async fn health() -> &'static str {
    "ok"
}

/// Readiness health check endpoint.
///
/// Returns 503 Service Unavailable if the catalog cannot be read from the
/// commerce backend.
async fn readiness(State(state): State<AppState>) -> StatusCode {
    match state.api().list_products().await {
        Ok(_) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

async fn not_found(request: Request) -> AppError {
    AppError::NotFound(request.uri().path().to_string())
}
