//! In-memory commerce backend and fixtures for unit tests.

#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use eshop_core::{Email, OrderConfirmation, Price, Product, ProductId, PurchasedItem};
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::Semaphore;

use crate::api::{ApiError, CartItem, CommerceBackend, Registration, types::PaymentRequest};
use crate::cart::CartStore;
use crate::session::{MemoryTokenStorage, SessionStore};

/// An unsigned `header.payload.signature` token with the given claims.
pub fn token_for(sub: &str, email: &str, full_name: Option<&str>) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let claims = serde_json::json!({
        "sub": sub,
        "email": email,
        "full_name": full_name,
        "exp": 4_102_444_800_i64,
    });
    let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims).unwrap());
    format!("{header}.{payload}.fake-signature")
}

#[derive(Default)]
struct FakeState {
    /// Ordered by insertion, like the real backend.
    lines: Vec<(String, u32)>,
    reported_total: Option<Price>,
    offline: bool,
    reads_fail: bool,
    revoked: bool,
    revoke_after_payment: bool,
    opaque_tokens: bool,
    read_gate: Option<Arc<Semaphore>>,
    calls: Vec<String>,
}

/// Commerce backend that keeps one account and one cart in memory.
pub struct FakeBackend {
    catalog: BTreeMap<String, Product>,
    state: Mutex<FakeState>,
}

impl FakeBackend {
    pub const EMAIL: &'static str = "ana@example.com";
    pub const PASSWORD: &'static str = "correct-horse";
    pub const SUBJECT: &'static str = "user-1";

    pub fn new() -> Self {
        let catalog = [("p1", "Mug", 1000, 10), ("p2", "Sticker", 250, 3)]
            .into_iter()
            .map(|(id, name, price, stock)| {
                (
                    id.to_string(),
                    Product {
                        id: ProductId::new(id),
                        name: name.to_string(),
                        description: String::new(),
                        price: Price::from_units(price),
                        stock,
                        is_active: true,
                        image_small: String::new(),
                        image_thumbnail: format!("/static/products/{id}_thumb.webp"),
                        image_medium: String::new(),
                    },
                )
            })
            .collect();

        Self {
            catalog,
            state: Mutex::new(FakeState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn issued_token(&self) -> String {
        if self.state().opaque_tokens {
            "opaque-session-token".to_string()
        } else {
            token_for(Self::SUBJECT, Self::EMAIL, Some("Ana Pérez"))
        }
    }

    /// Put a catalog product in the cart with the given quantity.
    pub fn put_line(&self, product_id: &str, quantity: u32) {
        assert!(self.catalog.contains_key(product_id), "unknown product {product_id}");
        self.put_raw_line(product_id, quantity);
    }

    /// Put any entry in the cart, bypassing catalog checks.
    pub fn put_raw_line(&self, product_id: &str, quantity: u32) {
        let mut state = self.state();
        state.lines.retain(|(id, _)| id != product_id);
        state.lines.push((product_id.to_string(), quantity));
    }

    pub fn line_quantity(&self, product_id: &str) -> Option<u32> {
        self.state()
            .lines
            .iter()
            .find(|(id, _)| id == product_id)
            .map(|(_, q)| *q)
    }

    /// Report this total from `/cart/total` regardless of the lines.
    pub fn report_total(&self, total: Price) {
        self.state().reported_total = Some(total);
    }

    /// Fail every call with a 503.
    pub fn go_offline(&self) {
        self.state().offline = true;
    }

    /// Fail cart reads with a 503 while writes keep working.
    pub fn fail_reads(&self) {
        self.state().reads_fail = true;
    }

    /// Answer 401 to every authenticated call.
    pub fn revoke_tokens(&self) {
        self.state().revoked = true;
    }

    /// Accept the next payment, then answer 401 to every authenticated call.
    pub fn revoke_tokens_after_payment(&self) {
        self.state().revoke_after_payment = true;
    }

    /// Issue tokens without a decodable payload.
    pub fn issue_opaque_tokens(&self) {
        self.state().opaque_tokens = true;
    }

    /// Block cart list reads until permits are added to the returned gate.
    pub fn hold_reads(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        self.state().read_gate = Some(Arc::clone(&gate));
        gate
    }

    pub fn call_count(&self) -> usize {
        self.state().calls.len()
    }

    /// Calls from the most recent one starting with `prefix` onwards.
    pub fn calls_since(&self, prefix: &str) -> Vec<String> {
        let state = self.state();
        let start = state
            .calls
            .iter()
            .rposition(|call| call.starts_with(prefix))
            .unwrap_or(state.calls.len());
        state.calls[start..].to_vec()
    }

    fn record(&self, call: impl Into<String>) -> Result<(), ApiError> {
        let mut state = self.state();
        state.calls.push(call.into());
        if state.offline {
            return Err(unavailable());
        }
        Ok(())
    }

    fn authorize(&self, token: &SecretString) -> Result<(), ApiError> {
        let revoked = self.state().revoked;
        if revoked || token.expose_secret() != self.issued_token() {
            return Err(ApiError::Unauthorized);
        }
        Ok(())
    }

    fn items(&self) -> Vec<CartItem> {
        self.state()
            .lines
            .iter()
            .map(|(id, quantity)| {
                let (name, price) = self
                    .catalog
                    .get(id)
                    .map_or(("Unknown".to_string(), Price::from_units(1)), |p| {
                        (p.name.clone(), p.price)
                    });
                CartItem {
                    product_id: id.clone(),
                    name,
                    price,
                    quantity: i64::from(*quantity),
                    subtotal: Some(price.times(*quantity)),
                    image_url: None,
                }
            })
            .collect()
    }

    fn check_reads(&self) -> Result<(), ApiError> {
        if self.state().reads_fail {
            return Err(unavailable());
        }
        Ok(())
    }
}

fn unavailable() -> ApiError {
    ApiError::Status {
        status: StatusCode::SERVICE_UNAVAILABLE,
        body: "down".to_string(),
    }
}

fn rejected(detail: &str) -> ApiError {
    ApiError::Rejected {
        status: StatusCode::BAD_REQUEST,
        detail: Some(detail.to_string()),
    }
}

impl CommerceBackend for FakeBackend {
    async fn login(&self, email: &Email, password: &SecretString) -> Result<SecretString, ApiError> {
        self.record("login")?;
        if email.as_str() == Self::EMAIL && password.expose_secret() == Self::PASSWORD {
            Ok(SecretString::from(self.issued_token()))
        } else {
            Err(ApiError::Unauthorized)
        }
    }

    async fn register(&self, registration: &Registration) -> Result<(), ApiError> {
        self.record("register")?;
        if registration.email.as_str() == Self::EMAIL {
            return Err(rejected("Email already registered"));
        }
        Ok(())
    }

    async fn list_products(&self) -> Result<Arc<Vec<Product>>, ApiError> {
        self.record("products")?;
        Ok(Arc::new(self.catalog.values().cloned().collect()))
    }

    async fn list_cart(&self, token: &SecretString) -> Result<Vec<CartItem>, ApiError> {
        self.record("list")?;
        self.authorize(token)?;

        let gate = self.state().read_gate.clone();
        if let Some(gate) = gate {
            gate.acquire().await.unwrap().forget();
        }

        self.check_reads()?;
        Ok(self.items())
    }

    async fn cart_total(&self, token: &SecretString) -> Result<Price, ApiError> {
        self.record("total")?;
        self.authorize(token)?;
        self.check_reads()?;

        let reported = self.state().reported_total;
        Ok(reported.unwrap_or_else(|| {
            self.items()
                .iter()
                .map(|item| item.price.times(u32::try_from(item.quantity).unwrap()))
                .sum()
        }))
    }

    async fn add_to_cart(
        &self,
        token: &SecretString,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<(), ApiError> {
        self.record(format!("add:{product_id}:{quantity}"))?;
        self.authorize(token)?;
        if !self.catalog.contains_key(product_id.as_str()) {
            return Err(rejected("Product not found"));
        }

        let mut state = self.state();
        match state.lines.iter_mut().find(|(id, _)| id == product_id.as_str()) {
            Some(line) => line.1 += quantity,
            None => state.lines.push((product_id.to_string(), quantity)),
        }
        Ok(())
    }

    async fn update_cart_line(
        &self,
        token: &SecretString,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<(), ApiError> {
        self.record(format!("update:{product_id}:{quantity}"))?;
        self.authorize(token)?;

        let mut state = self.state();
        let line = state
            .lines
            .iter_mut()
            .find(|(id, _)| id == product_id.as_str())
            .ok_or_else(|| rejected("Product not in cart"))?;
        line.1 = quantity;
        Ok(())
    }

    async fn remove_from_cart(
        &self,
        token: &SecretString,
        product_id: &ProductId,
    ) -> Result<(), ApiError> {
        self.record(format!("remove:{product_id}"))?;
        self.authorize(token)?;
        self.state().lines.retain(|(id, _)| id != product_id.as_str());
        Ok(())
    }

    async fn clear_cart(&self, token: &SecretString) -> Result<(), ApiError> {
        self.record("clear")?;
        self.authorize(token)?;
        self.state().lines.clear();
        Ok(())
    }

    async fn submit_payment(
        &self,
        token: &SecretString,
        payment: &PaymentRequest<'_>,
    ) -> Result<OrderConfirmation, ApiError> {
        self.record("payment")?;
        self.authorize(token)?;
        if payment.card_number.starts_with("4000") {
            return Err(rejected("Card declined"));
        }

        let items: Vec<PurchasedItem> = self
            .items()
            .into_iter()
            .map(|item| {
                let quantity = u32::try_from(item.quantity).unwrap();
                PurchasedItem {
                    product_id: ProductId::new(item.product_id),
                    name: item.name,
                    quantity,
                    price: item.price,
                    subtotal: item.price.times(quantity),
                    image: String::new(),
                }
            })
            .collect();
        if items.is_empty() {
            return Err(rejected("Cart is empty"));
        }

        let mut state = self.state();
        if state.revoke_after_payment {
            state.revoked = true;
        }
        drop(state);

        Ok(OrderConfirmation {
            message: "Payment successful".to_string(),
            total: items.iter().map(|item| item.subtotal).sum(),
            items,
        })
    }
}

pub type Stores = (
    Arc<FakeBackend>,
    Arc<SessionStore<FakeBackend>>,
    Arc<CartStore<FakeBackend>>,
);

/// Stores over a fresh fake backend, nobody signed in.
pub fn signed_out() -> Stores {
    let backend = Arc::new(FakeBackend::new());
    let session = Arc::new(SessionStore::new(
        Arc::clone(&backend),
        Arc::new(MemoryTokenStorage::new()),
    ));
    let cart = Arc::new(CartStore::new(Arc::clone(&backend), Arc::clone(&session)));
    (backend, session, cart)
}

/// Stores over a fresh fake backend with the fake account signed in.
pub async fn signed_in() -> Stores {
    let stores = signed_out();
    login(&stores.1).await;
    stores
}

pub async fn login(session: &SessionStore<FakeBackend>) {
    session
        .login(
            &Email::parse(FakeBackend::EMAIL).unwrap(),
            &SecretString::from(FakeBackend::PASSWORD.to_string()),
        )
        .await
        .unwrap();
}

/// Poll `condition` until it holds, failing after a second.
pub async fn eventually(condition: impl Fn() -> bool) {
    let waited = tokio::time::timeout(Duration::from_secs(1), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "condition not reached in time");
}
