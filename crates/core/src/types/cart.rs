//! The client's view of the shopping cart.
//!
//! A [`Cart`] is rebuilt wholesale from the backend on every refresh. Line
//! subtotals and the cart total are always derived, so
//! `total == Σ line.subtotal` and `subtotal == unit price × quantity` hold by
//! construction.

use core::num::NonZeroU32;

use serde::Serialize;

use crate::{Price, ProductId};

/// One product line in the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartLine {
    product_id: ProductId,
    name: String,
    unit_price: Price,
    quantity: NonZeroU32,
    image: String,
}

impl CartLine {
    /// Create a cart line. The image is a path or URL the view can render.
    #[must_use]
    pub fn new(
        product_id: ProductId,
        name: impl Into<String>,
        unit_price: Price,
        quantity: NonZeroU32,
        image: impl Into<String>,
    ) -> Self {
        Self {
            product_id,
            name: name.into(),
            unit_price,
            quantity,
            image: image.into(),
        }
    }

    #[must_use]
    pub const fn product_id(&self) -> &ProductId {
        &self.product_id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn unit_price(&self) -> Price {
        self.unit_price
    }

    #[must_use]
    pub const fn quantity(&self) -> u32 {
        self.quantity.get()
    }

    #[must_use]
    pub fn image(&self) -> &str {
        &self.image
    }

    /// `unit price × quantity`, saturating. Use
    /// [`CartLine::checked_subtotal`] to reject lines that overflow.
    #[must_use]
    pub fn subtotal(&self) -> Price {
        self.unit_price.times(self.quantity.get())
    }

    /// `unit price × quantity`, or `None` if it is not representable.
    #[must_use]
    pub fn checked_subtotal(&self) -> Option<Price> {
        self.unit_price.checked_times(self.quantity.get())
    }
}

/// Whether the cart holds anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CartPhase {
    Empty,
    Populated,
}

/// Ordered cart lines with a derived total.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Cart {
    lines: Vec<CartLine>,
}

impl Cart {
    /// An empty cart.
    #[must_use]
    pub const fn empty() -> Self {
        Self { lines: Vec::new() }
    }

    /// Build a cart from lines in backend order.
    #[must_use]
    pub const fn from_lines(lines: Vec<CartLine>) -> Self {
        Self { lines }
    }

    #[must_use]
    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    /// Sum of line subtotals, saturating at the largest representable amount.
    #[must_use]
    pub fn total(&self) -> Price {
        self.lines.iter().map(CartLine::subtotal).sum()
    }

    /// Total number of units across all lines, saturating at `u32::MAX`.
    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.lines
            .iter()
            .fold(0u32, |count, line| count.saturating_add(line.quantity()))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    #[must_use]
    pub fn phase(&self) -> CartPhase {
        if self.is_empty() {
            CartPhase::Empty
        } else {
            CartPhase::Populated
        }
    }

    /// Find the line for a product.
    #[must_use]
    pub fn line(&self, product_id: &ProductId) -> Option<&CartLine> {
        self.lines.iter().find(|line| line.product_id == *product_id)
    }
}
