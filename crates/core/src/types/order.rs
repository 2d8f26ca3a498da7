//! Order confirmation returned by a successful payment.

use serde::Serialize;

use crate::{Price, ProductId};

/// The backend's answer to a successful payment.
///
/// Handed once to the confirmation screen and never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderConfirmation {
    pub message: String,
    pub total: Price,
    pub items: Vec<PurchasedItem>,
}

/// A purchased line as echoed back by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PurchasedItem {
    pub product_id: ProductId,
    pub name: String,
    pub quantity: u32,
    pub price: Price,
    pub subtotal: Price,
    pub image: String,
}
