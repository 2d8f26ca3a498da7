//! Core types for eshop.
//!
//! This module provides type-safe wrappers for the storefront's domain concepts.

pub mod cart;
pub mod catalog;
pub mod email;
pub mod id;
pub mod order;
pub mod price;

pub use cart::{Cart, CartLine, CartPhase};
pub use catalog::Product;
pub use email::{Email, EmailError};
pub use id::*;
pub use order::{OrderConfirmation, PurchasedItem};
pub use price::Price;
