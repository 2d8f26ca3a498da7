//! Catalog commands.

use eshop_storefront::api::CommerceBackend;

use super::{CliError, Context};
use crate::output;

/// List products whose name contains `query`.
///
/// # Errors
///
/// Returns an error if the catalog cannot be read.
pub async fn list(ctx: &Context, query: &str) -> Result<(), CliError> {
    let catalog = ctx.api.list_products().await?;
    let products: Vec<_> = catalog.iter().filter(|p| p.matches(query)).collect();

    if catalog.is_empty() {
        output::line("No products available.");
    } else if products.is_empty() {
        output::line("No products match that name.");
    } else {
        output::products(&products);
    }
    Ok(())
}
