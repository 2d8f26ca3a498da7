//! Order confirmation route handler.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::{Path, State},
    response::IntoResponse,
};
use eshop_core::{OrderConfirmation, PurchasedItem};
use tracing::instrument;
use uuid::Uuid;

use super::NavView;
use crate::filters;
use crate::handoff::HandoffState;
use crate::images::ImageResolver;
use crate::middleware::RequireSession;
use crate::state::AppState;

/// Purchased item display data for templates.
#[derive(Clone)]
pub struct PurchasedView {
    pub name: String,
    pub quantity: u32,
    pub price: String,
    pub subtotal: String,
    pub image_url: String,
}

impl PurchasedView {
    fn new(item: &PurchasedItem, images: &ImageResolver) -> Self {
        Self {
            name: item.name.clone(),
            quantity: item.quantity,
            price: item.price.to_string(),
            subtotal: item.subtotal.to_string(),
            image_url: images.resolve(&item.image),
        }
    }
}

/// Confirmation display data for templates.
#[derive(Clone)]
pub struct ConfirmationView {
    pub message: String,
    pub total: String,
    pub items: Vec<PurchasedView>,
}

impl ConfirmationView {
    fn new(confirmation: &OrderConfirmation, images: &ImageResolver) -> Self {
        Self {
            message: confirmation.message.clone(),
            total: confirmation.total.to_string(),
            items: confirmation
                .items
                .iter()
                .map(|item| PurchasedView::new(item, images))
                .collect(),
        }
    }
}

/// Confirmation page template. `order` is `None` once the ticket is spent.
#[derive(Template, WebTemplate)]
#[template(path = "confirmation/show.html")]
pub struct ConfirmationTemplate {
    pub nav: NavView,
    pub order: Option<ConfirmationView>,
}

/// Show the confirmation for `ticket`, once.
///
/// Reloading, an unknown ticket, or a ticket past its lifetime all render
/// the "no order data" state.
#[instrument(skip(state))]
pub async fn show(
    State(state): State<AppState>,
    RequireSession(_): RequireSession,
    Path(ticket): Path<String>,
) -> impl IntoResponse {
    let order = match Uuid::parse_str(&ticket) {
        Ok(ticket) => match state.checkout().handoff().claim(ticket).await {
            HandoffState::Ready(confirmation) => {
                Some(ConfirmationView::new(&confirmation, state.images()))
            }
            HandoffState::Expired => None,
        },
        Err(_) => None,
    };

    if order.is_none() {
        tracing::debug!(%ticket, "No confirmation for ticket");
    }

    ConfirmationTemplate {
        nav: NavView::current(&state),
        order,
    }
}
