//! Integration tests for the eshop storefront.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p eshop-integration-tests
//! ```
//!
//! Nothing external is needed: [`FakeCommerce`] serves the commerce
//! backend's JSON API from inside the test process, and [`Storefront`] runs
//! the real storefront router against it.
//!
//! # Test Categories
//!
//! - `api_client` - The HTTP client against the backend's wire format
//! - `stores` - Session, cart, and checkout over real HTTP
//! - `storefront_pages` - Rendered pages, form posts, and gating

#![allow(clippy::missing_panics_doc, clippy::unwrap_used)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use axum::{
    Json, Router,
    extract::{Path as UrlPath, Query, State},
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use eshop_storefront::api::ApiClient;
use eshop_storefront::config::{ApiConfig, StorefrontConfig};
use eshop_storefront::session::FileTokenStorage;
use eshop_storefront::state::AppState;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use url::Url;

/// Account that exists in every fresh [`FakeCommerce`].
pub const DEMO_EMAIL: &str = "ana@example.com";
pub const DEMO_PASSWORD: &str = "correct-horse";
pub const DEMO_NAME: &str = "Ana Perez";

/// Card numbers starting with this are declined.
pub const DECLINED_CARD_PREFIX: &str = "4000";

// =============================================================================
// Fake Commerce Backend
// =============================================================================

#[derive(Clone)]
struct FakeProduct {
    id: &'static str,
    name: &'static str,
    price: f64,
    stock: i64,
}

struct Account {
    full_name: String,
    password: String,
}

struct Store {
    products: Vec<FakeProduct>,
    accounts: HashMap<String, Account>,
    /// token -> email
    tokens: HashMap<String, String>,
    /// email -> lines in insertion order
    carts: HashMap<String, Vec<(String, u32)>>,
    issued: u64,
    requests: Vec<String>,
}

type Shared = Arc<Mutex<Store>>;

fn lock(store: &Shared) -> MutexGuard<'_, Store> {
    store.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The commerce backend's JSON API, served in-process on a random port.
///
/// Holds a small catalog, the demo account, and one cart per account.
/// Tokens look like JWTs (unsigned) so the storefront can decode claims.
pub struct FakeCommerce {
    addr: SocketAddr,
    store: Shared,
    server: JoinHandle<()>,
}

impl FakeCommerce {
    /// Start the backend.
    pub async fn start() -> Self {
        let mut accounts = HashMap::new();
        accounts.insert(
            DEMO_EMAIL.to_string(),
            Account {
                full_name: DEMO_NAME.to_string(),
                password: DEMO_PASSWORD.to_string(),
            },
        );

        let store = Arc::new(Mutex::new(Store {
            products: vec![
                FakeProduct {
                    id: "p1",
                    name: "Ceramic Mug",
                    price: 12.5,
                    stock: 10,
                },
                FakeProduct {
                    id: "p2",
                    name: "Sticker Pack",
                    price: 3.0,
                    stock: 2,
                },
                FakeProduct {
                    id: "p3",
                    name: "Canvas Tote",
                    price: 18.0,
                    stock: 25,
                },
            ],
            accounts,
            tokens: HashMap::new(),
            carts: HashMap::new(),
            issued: 0,
            requests: Vec::new(),
        }));

        let app = Router::new()
            .route("/auth/login", post(login))
            .route("/auth/register", post(register))
            .route("/products/", get(products))
            .route("/cart/list", get(cart_list))
            .route("/cart/total", get(cart_total))
            .route("/cart/add", post(cart_add))
            .route("/cart/update/{product_id}", put(cart_update))
            .route("/cart/remove/{product_id}", delete(cart_remove))
            .route("/cart/clear", delete(cart_clear))
            .route("/checkout/payment", post(payment))
            .with_state(Arc::clone(&store));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            store,
            server,
        }
    }

    #[must_use]
    pub fn url(&self) -> Url {
        Url::parse(&format!("http://{}", self.addr)).unwrap()
    }

    /// An API client configured for this backend, catalog cache disabled.
    #[must_use]
    pub fn api_client(&self) -> ApiClient {
        let mut config = ApiConfig::new(self.url());
        config.catalog_cache_ttl = std::time::Duration::ZERO;
        ApiClient::new(&config).unwrap()
    }

    /// Invalidate every issued token; later calls with them get 401.
    pub fn revoke_tokens(&self) {
        lock(&self.store).tokens.clear();
    }

    /// The server-side cart of `email`.
    #[must_use]
    pub fn cart_of(&self, email: &str) -> Vec<(String, u32)> {
        lock(&self.store).carts.get(email).cloned().unwrap_or_default()
    }

    /// Put a line straight into the server-side cart of `email`.
    pub fn put_in_cart(&self, email: &str, product_id: &str, quantity: u32) {
        lock(&self.store)
            .carts
            .entry(email.to_string())
            .or_default()
            .push((product_id.to_string(), quantity));
    }

    #[must_use]
    pub fn stock_of(&self, product_id: &str) -> i64 {
        lock(&self.store)
            .products
            .iter()
            .find(|p| p.id == product_id)
            .map_or(0, |p| p.stock)
    }

    /// Requests received so far, as `METHOD /path`.
    #[must_use]
    pub fn requests(&self) -> Vec<String> {
        lock(&self.store).requests.clone()
    }

    /// Number of received requests whose `METHOD /path` starts with `prefix`.
    #[must_use]
    pub fn count(&self, prefix: &str) -> usize {
        lock(&self.store)
            .requests
            .iter()
            .filter(|r| r.starts_with(prefix))
            .count()
    }
}

impl Drop for FakeCommerce {
    fn drop(&mut self) {
        self.server.abort();
    }
}

fn detail(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "detail": message }))).into_response()
}

fn token_for(store: &mut Store, email: &str) -> String {
    store.issued += 1;
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let full_name = store.accounts.get(email).map(|a| a.full_name.clone());
    let claims = json!({
        "sub": format!("user-{email}"),
        "email": email,
        "full_name": full_name,
        "exp": 4_102_444_800_i64,
        "is_admin": false,
    });
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    let token = format!("{header}.{payload}.sig{}", store.issued);
    store.tokens.insert(token.clone(), email.to_string());
    token
}

/// The account behind the bearer token, or a 401 response.
fn authorize(store: &Store, headers: &HeaderMap) -> Result<String, Response> {
    headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .and_then(|token| store.tokens.get(token))
        .cloned()
        .ok_or_else(|| detail(StatusCode::UNAUTHORIZED, "Could not validate credentials"))
}

fn price_of(store: &Store, product_id: &str) -> Option<FakeProduct> {
    store.products.iter().find(|p| p.id == product_id).cloned()
}

fn cart_lines(store: &Store, email: &str) -> Vec<Value> {
    store
        .carts
        .get(email)
        .map(|lines| {
            lines
                .iter()
                .filter_map(|(id, quantity)| {
                    let product = price_of(store, id)?;
                    Some(json!({
                        "product_id": id,
                        "name": product.name,
                        "price": product.price,
                        "quantity": quantity,
                        "subtotal": product.price * f64::from(*quantity),
                        "image_url": format!("/static/products/{id}_small.webp"),
                    }))
                })
                .collect()
        })
        .unwrap_or_default()
}

fn cart_sum(store: &Store, email: &str) -> f64 {
    store.carts.get(email).map_or(0.0, |lines| {
        lines
            .iter()
            .filter_map(|(id, quantity)| {
                price_of(store, id).map(|p| p.price * f64::from(*quantity))
            })
            .sum()
    })
}

#[derive(Deserialize)]
struct LoginBody {
    email: String,
    password: String,
}

async fn login(State(store): State<Shared>, Json(body): Json<LoginBody>) -> Response {
    let mut store = lock(&store);
    store.requests.push("POST /auth/login".to_string());

    let valid = store
        .accounts
        .get(&body.email)
        .is_some_and(|account| account.password == body.password);
    if !valid {
        return detail(StatusCode::UNAUTHORIZED, "Incorrect email or password");
    }

    let token = token_for(&mut store, &body.email);
    Json(json!({ "access_token": token, "token_type": "bearer" })).into_response()
}

#[derive(Deserialize)]
struct RegisterBody {
    email: String,
    full_name: String,
    password: String,
    is_admin: bool,
}

async fn register(State(store): State<Shared>, Json(body): Json<RegisterBody>) -> Response {
    let mut store = lock(&store);
    store.requests.push("POST /auth/register".to_string());

    if body.is_admin {
        return detail(StatusCode::BAD_REQUEST, "Cannot self-register as admin");
    }
    if store.accounts.contains_key(&body.email) {
        return detail(StatusCode::BAD_REQUEST, "Email already registered");
    }
    if body.password.len() < 8 {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "detail": [{ "loc": ["body", "password"], "msg": "Password too short", "type": "value_error" }] })),
        )
            .into_response();
    }

    store.accounts.insert(
        body.email.clone(),
        Account {
            full_name: body.full_name,
            password: body.password,
        },
    );
    (StatusCode::CREATED, Json(json!({ "email": body.email }))).into_response()
}

async fn products(State(store): State<Shared>) -> Response {
    let mut store = lock(&store);
    store.requests.push("GET /products/".to_string());

    let items: Vec<Value> = store
        .products
        .iter()
        .map(|p| {
            json!({
                "id": p.id,
                "name": p.name,
                "description": format!("A fine {}", p.name.to_lowercase()),
                "price": p.price,
                "stock": p.stock,
                "is_active": true,
                "image_small": format!("/static/products/{}_small.webp", p.id),
                "image_thumbnail": format!("/static/products/{}_thumb.webp", p.id),
                "image_medium": null,
            })
        })
        .collect();
    Json(items).into_response()
}

async fn cart_list(State(store): State<Shared>, headers: HeaderMap) -> Response {
    let mut store = lock(&store);
    store.requests.push("GET /cart/list".to_string());

    match authorize(&store, &headers) {
        Ok(email) => Json(cart_lines(&store, &email)).into_response(),
        Err(denied) => denied,
    }
}

async fn cart_total(State(store): State<Shared>, headers: HeaderMap) -> Response {
    let mut store = lock(&store);
    store.requests.push("GET /cart/total".to_string());

    match authorize(&store, &headers) {
        Ok(email) => Json(json!({ "total": cart_sum(&store, &email) })).into_response(),
        Err(denied) => denied,
    }
}

#[derive(Deserialize)]
struct AddBody {
    product_id: String,
    quantity: u32,
}

async fn cart_add(
    State(store): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<AddBody>,
) -> Response {
    let mut store = lock(&store);
    store
        .requests
        .push(format!("POST /cart/add {} {}", body.product_id, body.quantity));

    let email = match authorize(&store, &headers) {
        Ok(email) => email,
        Err(denied) => return denied,
    };
    let Some(product) = price_of(&store, &body.product_id) else {
        return detail(StatusCode::BAD_REQUEST, "Product not found");
    };

    let lines = store.carts.entry(email).or_default();
    let in_cart = lines
        .iter()
        .find(|(id, _)| *id == body.product_id)
        .map_or(0, |(_, q)| *q);
    if i64::from(in_cart + body.quantity) > product.stock {
        return detail(StatusCode::BAD_REQUEST, "Insufficient stock");
    }

    match lines.iter_mut().find(|(id, _)| *id == body.product_id) {
        Some(line) => line.1 += body.quantity,
        None => lines.push((body.product_id, body.quantity)),
    }
    Json(json!({ "message": "Product added to cart" })).into_response()
}

#[derive(Deserialize)]
struct QuantityQuery {
    quantity: i64,
}

async fn cart_update(
    State(store): State<Shared>,
    headers: HeaderMap,
    UrlPath(product_id): UrlPath<String>,
    Query(query): Query<QuantityQuery>,
) -> Response {
    let mut store = lock(&store);
    store
        .requests
        .push(format!("PUT /cart/update {product_id} {}", query.quantity));

    let email = match authorize(&store, &headers) {
        Ok(email) => email,
        Err(denied) => return denied,
    };
    let Ok(quantity) = u32::try_from(query.quantity) else {
        return detail(StatusCode::BAD_REQUEST, "Quantity must be positive");
    };

    let lines = store.carts.entry(email).or_default();
    match lines.iter_mut().find(|(id, _)| *id == product_id) {
        Some(line) => {
            line.1 = quantity;
            Json(json!({ "message": "Cart updated" })).into_response()
        }
        None => detail(StatusCode::BAD_REQUEST, "Product not in cart"),
    }
}

async fn cart_remove(
    State(store): State<Shared>,
    headers: HeaderMap,
    UrlPath(product_id): UrlPath<String>,
) -> Response {
    let mut store = lock(&store);
    store.requests.push(format!("DELETE /cart/remove {product_id}"));

    let email = match authorize(&store, &headers) {
        Ok(email) => email,
        Err(denied) => return denied,
    };
    store
        .carts
        .entry(email)
        .or_default()
        .retain(|(id, _)| *id != product_id);
    Json(json!({ "message": "Product removed" })).into_response()
}

async fn cart_clear(State(store): State<Shared>, headers: HeaderMap) -> Response {
    let mut store = lock(&store);
    store.requests.push("DELETE /cart/clear".to_string());

    let email = match authorize(&store, &headers) {
        Ok(email) => email,
        Err(denied) => return denied,
    };
    store.carts.remove(&email);
    Json(json!({ "message": "Cart cleared" })).into_response()
}

#[derive(Deserialize)]
struct PaymentBody {
    card_number: String,
    holder_name: String,
    expiration_date: String,
    cvv: String,
}

async fn payment(
    State(store): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<PaymentBody>,
) -> Response {
    let mut store = lock(&store);
    store.requests.push("POST /checkout/payment".to_string());

    let email = match authorize(&store, &headers) {
        Ok(email) => email,
        Err(denied) => return denied,
    };
    if [&body.card_number, &body.holder_name, &body.expiration_date, &body.cvv]
        .iter()
        .any(|field| field.is_empty())
    {
        return detail(StatusCode::UNPROCESSABLE_ENTITY, "Card details incomplete");
    }
    if body.card_number.starts_with(DECLINED_CARD_PREFIX) {
        return detail(StatusCode::BAD_REQUEST, "Card declined");
    }

    let items = cart_lines(&store, &email);
    if items.is_empty() {
        return detail(StatusCode::BAD_REQUEST, "Cart is empty");
    }
    let total = cart_sum(&store, &email);

    // The real backend empties the cart on payment; the client clears it
    // again afterwards, which must be harmless.
    let lines = store.carts.remove(&email).unwrap_or_default();
    for (id, quantity) in lines {
        if let Some(product) = store.products.iter_mut().find(|p| p.id == id) {
            product.stock -= i64::from(quantity);
        }
    }

    Json(json!({
        "message": "Payment processed successfully",
        "total": total,
        "items": items,
    }))
    .into_response()
}

// =============================================================================
// Storefront Under Test
// =============================================================================

/// The storefront router served on a random port against a [`FakeCommerce`].
pub struct Storefront {
    pub base_url: String,
    pub state: AppState,
    server: JoinHandle<()>,
}

impl Storefront {
    /// Start a storefront whose token lives under `data_dir`.
    pub async fn start(backend: &FakeCommerce, data_dir: &Path) -> Self {
        let vars: HashMap<&str, String> = HashMap::from([
            ("ESHOP_API_URL", backend.url().to_string()),
            ("ESHOP_CATALOG_CACHE_SECS", "0".to_string()),
            ("STOREFRONT_DATA_DIR", data_dir.display().to_string()),
            (
                "STOREFRONT_STATIC_DIR",
                concat!(env!("CARGO_MANIFEST_DIR"), "/../storefront/static").to_string(),
            ),
        ]);
        let config = StorefrontConfig::from_lookup(|key| vars.get(key).cloned()).unwrap();

        let api = ApiClient::new(&config.api).unwrap();
        let storage = Arc::new(FileTokenStorage::new(&config.data_dir));
        let state = AppState::with_parts(config, api, storage);
        let app = eshop_storefront::app(state.clone()).unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{addr}"),
            state,
            server,
        }
    }

    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// A browser-like client that does not follow redirects, so tests can
    /// assert where a form post sends the visitor.
    #[must_use]
    pub fn client() -> reqwest::Client {
        reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap()
    }
}

impl Drop for Storefront {
    fn drop(&mut self) {
        self.server.abort();
        self.state.teardown();
    }
}

/// Poll `condition` until it holds, for up to two seconds.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}
