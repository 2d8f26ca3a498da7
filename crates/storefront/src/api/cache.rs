//! Cache types for catalog responses.

use std::sync::Arc;

use eshop_core::Product;

/// Cache key for catalog reads.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum CacheKey {
    Products,
}

/// Cached value types.
#[derive(Debug, Clone)]
pub enum CacheValue {
    Products(Arc<Vec<Product>>),
}
