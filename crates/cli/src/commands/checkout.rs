//! Checkout command.

use eshop_storefront::checkout::CardInput;
use eshop_storefront::handoff::HandoffState;
use secrecy::SecretString;

use super::{CliError, Context};
use crate::output;

/// Pay for the current cart and print the confirmation.
///
/// # Errors
///
/// Returns an error without a session, for an empty cart or blank card
/// fields, and when the payment is declined.
pub async fn pay(
    ctx: &Context,
    card_number: String,
    holder_name: String,
    expiry: String,
    cvv: String,
) -> Result<(), CliError> {
    ctx.require_session()?;
    // A fresh process starts with an empty local cart.
    ctx.cart.fetch().await?;

    let card = CardInput {
        number: SecretString::from(card_number),
        holder_name,
        expiry,
        cvv: SecretString::from(cvv),
    };

    let ticket = ctx.checkout.submit(card).await?;
    match ctx.checkout.handoff().claim(ticket).await {
        HandoffState::Ready(confirmation) => {
            output::confirmation(&confirmation);
            Ok(())
        }
        HandoffState::Expired => Err(CliError::ConfirmationLost),
    }
}
