//! Terminal rendering of catalog, cart, and confirmation.

#![allow(clippy::print_stdout)]

use eshop_core::{Cart, OrderConfirmation, Product};
use eshop_storefront::session::Claims;

/// Print a single message.
pub fn line(message: &str) {
    println!("{message}");
}

pub fn products(products: &[&Product]) {
    for product in products {
        let badge = if product.is_low_stock() {
            "  Only a few left!"
        } else {
            ""
        };
        println!(
            "{:<12} {:<32} {:>12}  stock {:>4}{badge}",
            product.id.as_str(),
            product.name,
            product.price.to_string(),
            product.stock
        );
    }
}

pub fn cart(cart: &Cart) {
    if cart.is_empty() {
        println!("Your cart is empty");
        return;
    }

    for line in cart.lines() {
        println!(
            "{:<12} {:<32} {:>4} x {:>12} = {:>12}",
            line.product_id().as_str(),
            line.name(),
            line.quantity(),
            line.unit_price().to_string(),
            line.subtotal().to_string()
        );
    }
    println!("{:>80}", format!("Total: {}", cart.total()));
}

pub fn claims(claims: &Claims) {
    println!("Signed in as {}", claims.display_name());
    if !claims.email.is_empty() {
        println!("Email:   {}", claims.email);
    }
    println!("Subject: {}", claims.sub);
    if let Some(expires_at) = claims.expires_at() {
        println!("Expires: {}", expires_at.to_rfc3339());
    }
}

pub fn confirmation(confirmation: &OrderConfirmation) {
    println!("Payment successful!");
    println!("{}", confirmation.message);
    for item in &confirmation.items {
        println!(
            "  {:<32} {:>4} x {:>12} = {:>12}",
            item.name,
            item.quantity,
            item.price.to_string(),
            item.subtotal.to_string()
        );
    }
    println!("Total paid: {}", confirmation.total);
}
