//! Catalog items as listed by the backend.

use serde::{Deserialize, Serialize};

use crate::{Price, ProductId};

/// Stock level at or below which a product is flagged as running out.
pub const LOW_STOCK_THRESHOLD: u32 = 5;

/// A product in the catalog.
///
/// Image fields are backend-relative paths (or absolute URLs); resolving them
/// against the backend origin is the storefront's job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub description: String,
    pub price: Price,
    pub stock: u32,
    pub is_active: bool,
    pub image_small: String,
    pub image_thumbnail: String,
    pub image_medium: String,
}

impl Product {
    /// Whether the product should carry the "only a few left" badge.
    #[must_use]
    pub const fn is_low_stock(&self) -> bool {
        self.stock <= LOW_STOCK_THRESHOLD
    }

    /// Case-insensitive name search. An empty query matches everything.
    #[must_use]
    pub fn matches(&self, query: &str) -> bool {
        let query = query.trim();
        query.is_empty() || self.name.to_lowercase().contains(&query.to_lowercase())
    }
}
