//! Conversions from wire types into `eshop_core` domain types.

use eshop_core::{OrderConfirmation, Price, Product, ProductId, PurchasedItem};
use tracing::warn;

use super::types;

/// Convert a catalog entry. Negative stock is reported as zero.
pub fn convert_product(item: types::ProductItem) -> Product {
    let stock = u32::try_from(item.stock.max(0)).unwrap_or(u32::MAX);

    Product {
        id: ProductId::new(item.id),
        name: item.name,
        description: item.description.unwrap_or_default(),
        price: item.price,
        stock,
        is_active: item.is_active,
        image_small: item.image_small.unwrap_or_default(),
        image_thumbnail: item.image_thumbnail.unwrap_or_default(),
        image_medium: item.image_medium.unwrap_or_default(),
    }
}

/// Convert a payment receipt into the confirmation shown to the buyer.
pub fn convert_receipt(receipt: types::PaymentReceipt) -> OrderConfirmation {
    let items: Vec<PurchasedItem> = receipt
        .items
        .into_iter()
        .map(|item| PurchasedItem {
            product_id: ProductId::new(item.product_id),
            name: item.product_name,
            quantity: item.quantity,
            price: item.price,
            subtotal: item.subtotal,
            image: item.image_url.unwrap_or_default(),
        })
        .collect();

    let computed: Price = items.iter().map(|item| item.subtotal).sum();
    if !items.is_empty() && computed != receipt.total {
        warn!(
            reported = %receipt.total,
            computed = %computed,
            "Payment receipt total differs from its items"
        );
    }

    OrderConfirmation {
        message: receipt.message,
        total: receipt.total,
        items,
    }
}
