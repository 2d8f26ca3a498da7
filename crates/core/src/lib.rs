//! eshop core - shared domain types.
//!
//! This crate provides the types shared by every eshop component:
//! - `storefront` - Server-rendered storefront client over the commerce backend
//! - `cli` - Terminal front-end over the same session and cart stores
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no HTTP clients, no storage.
//! The commerce backend owns pricing, inventory, and payment; these types only
//! describe what the client renders and sends back.
//!
//! # Modules
//!
//! - [`types`] - IDs, emails, prices, catalog items, cart lines, and order confirmations

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
