//! Checkout route handlers.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
};
use secrecy::SecretString;
use serde::Deserialize;
use tracing::instrument;

use super::cart::LineView;
use super::{Flash, MessageQuery, NavView};
use crate::cart::CartError;
use crate::checkout::{CardInput, CheckoutError};
use crate::error::add_breadcrumb;
use crate::filters;
use crate::middleware::RequireSession;
use crate::state::AppState;

/// Card form data.
#[derive(Deserialize)]
pub struct CheckoutForm {
    pub card_number: String,
    pub holder_name: String,
    pub expiration_date: String,
    pub cvv: String,
}

/// Checkout page template.
///
/// Card number and CVV are never echoed back into the form.
#[derive(Template, WebTemplate)]
#[template(path = "checkout/show.html")]
pub struct CheckoutTemplate {
    pub nav: NavView,
    pub flash: Flash,
    pub lines: Vec<LineView>,
    pub total: String,
    pub holder_name: String,
    pub expiration_date: String,
}

impl CheckoutTemplate {
    fn current(state: &AppState, flash: Flash) -> Self {
        let cart = state.cart().snapshot();
        Self {
            nav: NavView::current(state),
            flash,
            lines: cart
                .lines()
                .iter()
                .map(|line| LineView::new(line, state.images()))
                .collect(),
            total: cart.total().to_string(),
            holder_name: String::new(),
            expiration_date: String::new(),
        }
    }
}

/// Display the order summary and card form.
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
        Err(e) => tracing::warn!(error = %e, "Showing last known cart at checkout"),
    }

    CheckoutTemplate::current(&state, query.into()).into_response()
}

/// Pay for the cart.
///
/// Success hands the confirmation over to `/confirmation/{ticket}`; the
/// ticket works once.
#[instrument(skip(state, form))]
pub async fn submit(
    State(state): State<AppState>,
    RequireSession(_): RequireSession,
    Form(form): Form<CheckoutForm>,
) -> Response {
    add_breadcrumb("checkout", "Submit payment", None);

    let holder_name = form.holder_name;
    let expiration_date = form.expiration_date;
    let card = CardInput {
        number: SecretString::from(form.card_number),
        holder_name: holder_name.clone(),
        expiry: expiration_date.clone(),
        cvv: SecretString::from(form.cvv),
    };

    let message = match state.checkout().submit(card).await {
        Ok(ticket) => return Redirect::to(&format!("/confirmation/{ticket}")).into_response(),
        Err(CheckoutError::NotAuthenticated) => {
            return Redirect::to("/login?error=login_required").into_response();
        }
        Err(CheckoutError::AuthorizationDenied) => {
            return Redirect::to("/login?error=session_expired").into_response();
        }
        Err(CheckoutError::Backend(e)) => {
            tracing::warn!(error = %e, "Payment failed");
            "Could not reach the payment service".to_string()
        }
        Err(e) => {
            tracing::info!(error = %e, "Payment not accepted");
            e.to_string()
        }
    };

    CheckoutTemplate {
        holder_name,
        expiration_date,
        ..CheckoutTemplate::current(
            &state,
            Flash::error(format!("Error processing payment: {message}")),
        )
    }
    .into_response()
}
