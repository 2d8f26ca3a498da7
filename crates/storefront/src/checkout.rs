//! Checkout: pay for the current cart once and hand the confirmation on.

use std::fmt;
use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::api::{ApiClient, ApiError, CommerceBackend, types::PaymentRequest};
use crate::cart::CartStore;
use crate::handoff::ConfirmationHandoff;

/// A card form field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardField {
    Number,
    HolderName,
    Expiry,
    Cvv,
}

impl fmt::Display for CardField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Number => "card number",
            Self::HolderName => "cardholder name",
            Self::Expiry => "expiration date",
            Self::Cvv => "CVV",
        })
    }
}

/// Errors surfaced by [`Checkout::submit`].
#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("The cart is empty")]
    EmptyCart,

    #[error("Missing {0}")]
    InvalidCard(CardField),

    /// The backend refused the token; the session has been cleared.
    #[error("Authorization denied")]
    AuthorizationDenied,

    #[error("{}", .0.as_deref().unwrap_or("Payment rejected"))]
    Rejected(Option<String>),

    #[error("Payment service error: {0}")]
    Backend(#[source] ApiError),
}

/// Card details as typed into the checkout form.
///
/// Lives for one submission. Number and CVV are redacted from `Debug` and
/// zeroized on drop.
#[derive(Debug)]
pub struct CardInput {
    pub number: SecretString,
    pub holder_name: String,
    pub expiry: String,
    pub cvv: SecretString,
}

impl CardInput {
    /// Every field must be non-blank.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::InvalidCard` naming the first blank field.
    pub fn validate(&self) -> Result<(), CheckoutError> {
        let fields = [
            (CardField::Number, self.number.expose_secret()),
            (CardField::HolderName, self.holder_name.as_str()),
            (CardField::Expiry, self.expiry.as_str()),
            (CardField::Cvv, self.cvv.expose_secret()),
        ];

        match fields.into_iter().find(|(_, value)| value.trim().is_empty()) {
            Some((field, _)) => Err(CheckoutError::InvalidCard(field)),
            None => Ok(()),
        }
    }

    fn as_request(&self) -> PaymentRequest<'_> {
        PaymentRequest {
            card_number: self.number.expose_secret().trim(),
            holder_name: self.holder_name.trim(),
            expiration_date: self.expiry.trim(),
            cvv: self.cvv.expose_secret().trim(),
        }
    }
}

/// The payment workflow over the cart and session stores.
pub struct Checkout<B = ApiClient> {
    cart: Arc<CartStore<B>>,
    handoff: ConfirmationHandoff,
}

impl<B: CommerceBackend> Checkout<B> {
    #[must_use]
    pub const fn new(cart: Arc<CartStore<B>>, handoff: ConfirmationHandoff) -> Self {
        Self { cart, handoff }
    }

    #[must_use]
    pub const fn handoff(&self) -> &ConfirmationHandoff {
        &self.handoff
    }

    /// Pay for the current cart.
    ///
    /// On success the cart is emptied and the confirmation is deposited in
    /// the handoff; the returned ticket claims it once.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::NotAuthenticated` or `CheckoutError::EmptyCart`
    /// before contacting the backend, `CheckoutError::InvalidCard` for blank
    /// fields, and the backend outcome otherwise. A 401 clears the session
    /// and cart.
    ///
    /// A 401 from the cart clear that follows an accepted payment still
    /// cascades, and the ticket is still returned. The confirmation page is
    /// gated on the session, so in that case the visitor is sent to log in
    /// and the confirmation is not shown; it expires with the handoff TTL.
    #[instrument(skip(self, card))]
    pub async fn submit(&self, card: CardInput) -> Result<Uuid, CheckoutError> {
        let session = self.cart.session();
        let token = session.token().ok_or(CheckoutError::NotAuthenticated)?;
        if self.cart.snapshot().is_empty() {
            return Err(CheckoutError::EmptyCart);
        }
        card.validate()?;

        let result = self
            .cart
            .backend()
            .submit_payment(&token, &card.as_request())
            .await;
        drop(card);

        let confirmation = match result {
            Ok(confirmation) => confirmation,
            Err(ApiError::Unauthorized) => {
                self.cart.invalidate();
                return Err(CheckoutError::AuthorizationDenied);
            }
            Err(ApiError::Rejected { detail, .. }) => {
                info!(detail = detail.as_deref(), "Payment rejected");
                return Err(CheckoutError::Rejected(detail));
            }
            Err(e) => {
                error!(error = %e, "Payment request failed");
                return Err(CheckoutError::Backend(e));
            }
        };

        info!(
            total = %confirmation.total,
            items = confirmation.items.len(),
            "Payment accepted"
        );

        // The payment went through, so the local cart is emptied even if the
        // backend clear fails.
        if let Err(e) = self.cart.clear().await {
            warn!(error = %e, "Failed to clear cart after payment");
            self.cart.reset();
        }

        Ok(self.handoff.deposit(confirmation).await)
    }
}
