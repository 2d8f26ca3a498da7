//! Cart route handlers.
//!
//! Every mutation is a form post that redirects back with a message code.
//! The cart store re-reads the cart after each write, so the page that
//! follows always shows the backend's state.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
};
use eshop_core::{CartLine, ProductId};
use serde::Deserialize;
use tracing::instrument;

use super::{Flash, MessageQuery, NavView, error_redirect};
use crate::cart::CartError;
use crate::error::add_breadcrumb;
use crate::filters;
use crate::images::ImageResolver;
use crate::middleware::RequireSession;
use crate::state::AppState;

/// Cart line display data for templates.
#[derive(Clone)]
pub struct LineView {
    pub product_id: String,
    pub name: String,
    pub unit_price: String,
    pub quantity: u32,
    pub subtotal: String,
    pub image_url: String,
}

impl LineView {
    pub(crate) fn new(line: &CartLine, images: &ImageResolver) -> Self {
        Self {
            product_id: line.product_id().to_string(),
            name: line.name().to_string(),
            unit_price: line.unit_price().to_string(),
            quantity: line.quantity(),
            subtotal: line.subtotal().to_string(),
            image_url: images.resolve(line.image()),
        }
    }

    /// The minus control is disabled at one; removing is a separate action.
    #[must_use]
    pub const fn can_decrement(&self) -> bool {
        self.quantity > 1
    }
}

// =============================================================================
// Form Types
// =============================================================================

/// Add to cart form data.
#[derive(Debug, Deserialize)]
pub struct AddToCartForm {
    pub product_id: String,
    pub quantity: Option<u32>,
}

/// Update cart form data.
///
/// Signed so that a crafted zero or negative quantity reaches the handler
/// and is refused there rather than failing deserialization.
#[derive(Debug, Deserialize)]
pub struct UpdateCartForm {
    pub product_id: String,
    pub quantity: i64,
}

/// Remove from cart form data.
#[derive(Debug, Deserialize)]
pub struct RemoveFromCartForm {
    pub product_id: String,
}

/// Cart page template.
#[derive(Template, WebTemplate)]
#[template(path = "cart/show.html")]
pub struct CartShowTemplate {
    pub nav: NavView,
    pub flash: Flash,
    pub lines: Vec<LineView>,
    pub total: String,
}

/// Where a failed cart write sends the visitor.
fn failure_redirect(back: &str, fallback_code: &str, err: &CartError) -> Response {
    let target = match err {
        CartError::NotAuthenticated => "/login?error=login_required".to_string(),
        CartError::AuthorizationDenied => "/login?error=session_expired".to_string(),
        CartError::Rejected(Some(detail)) => {
            error_redirect(back, "rejected", Some(detail.as_str()))
        }
        CartError::Rejected(None) | CartError::Backend(_) => {
            error_redirect(back, fallback_code, None)
        }
    };
    Redirect::to(&target).into_response()
}

/// Display cart page.
///
/// The cart is re-read first; if that fails the last known cart is shown.
#[instrument(skip(state, query))]
pub async fn show(
    State(state): State<AppState>,
    RequireSession(_): RequireSession,
    Query(query): Query<MessageQuery>,
) -> Response {
    match state.cart().fetch().await {
        Ok(()) => {}
        Err(CartError::AuthorizationDenied) => {
            return Redirect::to("/login?error=session_expired").into_response();
        }
        Err(e) => tracing::warn!(error = %e, "Showing last known cart"),
    }

    let cart = state.cart().snapshot();
    CartShowTemplate {
        nav: NavView::current(&state),
        flash: query.into(),
        lines: cart
            .lines()
            .iter()
            .map(|line| LineView::new(line, state.images()))
            .collect(),
        total: cart.total().to_string(),
    }
    .into_response()
}

/// Add a product to the cart from the catalog.
///
/// Visitors without a session are sent to the login page instead.
#[instrument(skip(state))]
pub async fn add(State(state): State<AppState>, Form(form): Form<AddToCartForm>) -> Response {
    let product_id = ProductId::new(form.product_id);
    let quantity = form.quantity.unwrap_or(1);

    add_breadcrumb(
        "cart",
        "Add to cart",
        Some(&[("product_id", product_id.as_str())]),
    );

    match state.cart().add(&product_id, quantity).await {
        Ok(()) => Redirect::to("/?success=added").into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to add to cart");
            failure_redirect("/", "add_failed", &e)
        }
    }
}

/// Set a line's quantity.
#[instrument(skip(state))]
pub async fn update(
    State(state): State<AppState>,
    RequireSession(_): RequireSession,
    Form(form): Form<UpdateCartForm>,
) -> Response {
    let quantity = match u32::try_from(form.quantity) {
        Ok(quantity) if quantity >= 1 => quantity,
        _ => return Redirect::to("/cart?error=quantity").into_response(),
    };
    let product_id = ProductId::new(form.product_id);

    add_breadcrumb(
        "cart",
        "Update quantity",
        Some(&[("product_id", product_id.as_str())]),
    );

    match state.cart().update_quantity(&product_id, quantity).await {
        Ok(()) => Redirect::to("/cart").into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to update cart line");
            failure_redirect("/cart", "update_failed", &e)
        }
    }
}

/// Remove a line from the cart.
#[instrument(skip(state))]
pub async fn remove(
    State(state): State<AppState>,
    RequireSession(_): RequireSession,
    Form(form): Form<RemoveFromCartForm>,
) -> Response {
    let product_id = ProductId::new(form.product_id);

    add_breadcrumb(
        "cart",
        "Remove from cart",
        Some(&[("product_id", product_id.as_str())]),
    );

    match state.cart().remove(&product_id).await {
        Ok(()) => Redirect::to("/cart").into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to remove cart line");
            failure_redirect("/cart", "update_failed", &e)
        }
    }
}

/// Empty the cart.
#[instrument(skip(state))]
pub async fn clear(State(state): State<AppState>, RequireSession(_): RequireSession) -> Response {
    add_breadcrumb("cart", "Empty cart", None);

    match state.cart().clear().await {
        Ok(()) => Redirect::to("/cart?success=cleared").into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to empty cart");
            failure_redirect("/cart", "update_failed", &e)
        }
    }
}
