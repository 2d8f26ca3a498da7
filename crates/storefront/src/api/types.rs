//! Wire types for the commerce backend's JSON API.
//!
//! These mirror the backend payloads field for field. Conversion into the
//! domain types in `eshop_core` happens in `conversions`.

use eshop_core::Price;
use serde::{Deserialize, Serialize};

// =============================================================================
// Auth
// =============================================================================

/// `POST /auth/login` request body.
#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

/// `POST /auth/login` response body.
#[derive(Debug, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
}

/// `POST /auth/register` request body.
///
/// Accounts created from the storefront are never admins.
#[derive(Debug, Serialize)]
pub struct RegisterRequest<'a> {
    pub email: &'a str,
    pub full_name: &'a str,
    pub password: &'a str,
    pub is_admin: bool,
}

// =============================================================================
// Catalog
// =============================================================================

/// An entry of `GET /products/`.
#[derive(Debug, Clone, Deserialize)]
pub struct ProductItem {
    #[serde(alias = "uuid")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub price: Price,
    #[serde(default)]
    pub stock: i64,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub image_small: Option<String>,
    #[serde(default)]
    pub image_thumbnail: Option<String>,
    #[serde(default)]
    pub image_medium: Option<String>,
}

const fn default_true() -> bool {
    true
}

// =============================================================================
// Cart
// =============================================================================

/// An entry of `GET /cart/list`.
///
/// `subtotal` is informational; the client recomputes it from price and
/// quantity.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CartItem {
    #[serde(alias = "product_uuid")]
    pub product_id: String,
    pub name: String,
    pub price: Price,
    pub quantity: i64,
    #[serde(default)]
    pub subtotal: Option<Price>,
    #[serde(default)]
    pub image_url: Option<String>,
}

/// `GET /cart/total` response body.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct CartTotal {
    pub total: Price,
}

/// `POST /cart/add` request body.
#[derive(Debug, Serialize)]
pub struct AddToCartRequest<'a> {
    pub product_id: &'a str,
    pub quantity: u32,
}

// =============================================================================
// Checkout
// =============================================================================

/// `POST /checkout/payment` request body.
///
/// Borrowed from the card input only for the duration of the request.
#[derive(Serialize)]
pub struct PaymentRequest<'a> {
    pub card_number: &'a str,
    pub holder_name: &'a str,
    pub expiration_date: &'a str,
    pub cvv: &'a str,
}

impl std::fmt::Debug for PaymentRequest<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentRequest")
            .field("card_number", &"[REDACTED]")
            .field("holder_name", &self.holder_name)
            .field("expiration_date", &"[REDACTED]")
            .field("cvv", &"[REDACTED]")
            .finish()
    }
}

/// `POST /checkout/payment` response body.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentReceipt {
    #[serde(default)]
    pub message: String,
    pub total: Price,
    #[serde(default)]
    pub items: Vec<PurchasedItem>,
}

/// A purchased line inside a [`PaymentReceipt`].
#[derive(Debug, Clone, Deserialize)]
pub struct PurchasedItem {
    pub product_id: String,
    #[serde(alias = "name")]
    pub product_name: String,
    pub quantity: u32,
    pub price: Price,
    pub subtotal: Price,
    #[serde(default)]
    pub image_url: Option<String>,
}

// =============================================================================
// Errors
// =============================================================================

/// Error body shape used by the backend for rejected requests.
///
/// `detail` is either a message string or a list of validation errors.
#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    pub detail: ErrorDetail,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ErrorDetail {
    Message(String),
    Validation(Vec<ValidationIssue>),
}

#[derive(Debug, Deserialize)]
pub struct ValidationIssue {
    pub msg: String,
}

impl ErrorBody {
    /// The first human-readable message in the body, if any.
    #[must_use]
    pub fn into_message(self) -> Option<String> {
        match self.detail {
            ErrorDetail::Message(message) => Some(message),
            ErrorDetail::Validation(issues) => issues.into_iter().next().map(|issue| issue.msg),
        }
        .filter(|message| !message.trim().is_empty())
    }
}
