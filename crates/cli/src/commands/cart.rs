//! Cart commands. Every write is followed by a re-read, so the printed cart
//! is the backend's.

use eshop_core::ProductId;

use super::{CliError, Context};
use crate::output;

/// Print the cart.
///
/// # Errors
///
/// Returns an error without a session or when the cart cannot be read.
pub async fn show(ctx: &Context) -> Result<(), CliError> {
    ctx.require_session()?;
    ctx.cart.fetch().await?;
    output::cart(&ctx.cart.snapshot());
    Ok(())
}

/// Add `quantity` units of a product.
///
/// # Errors
///
/// Returns an error without a session or when the backend declines.
pub async fn add(ctx: &Context, product_id: &str, quantity: u32) -> Result<(), CliError> {
    ctx.require_session()?;
    ctx.cart.add(&ProductId::new(product_id), quantity).await?;
    output::cart(&ctx.cart.snapshot());
    Ok(())
}

/// Set a line's quantity.
///
/// # Errors
///
/// Returns an error without a session, for a quantity below 1, or when the
/// backend declines.
pub async fn update(ctx: &Context, product_id: &str, quantity: u32) -> Result<(), CliError> {
    ctx.require_session()?;
    ctx.cart
        .update_quantity(&ProductId::new(product_id), quantity)
        .await?;
    output::cart(&ctx.cart.snapshot());
    Ok(())
}

/// Remove a line.
///
/// # Errors
///
/// Returns an error without a session or when the backend declines.
pub async fn remove(ctx: &Context, product_id: &str) -> Result<(), CliError> {
    ctx.require_session()?;
    ctx.cart.remove(&ProductId::new(product_id)).await?;
    output::cart(&ctx.cart.snapshot());
    Ok(())
}

/// Empty the cart.
///
/// # Errors
///
/// Returns an error without a session or when the backend declines.
pub async fn clear(ctx: &Context) -> Result<(), CliError> {
    ctx.require_session()?;
    ctx.cart.clear().await?;
    output::line("Your cart is empty");
    Ok(())
}
