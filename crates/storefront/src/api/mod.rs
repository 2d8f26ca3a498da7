//! HTTP client for the commerce backend.
//!
//! # Architecture
//!
//! - The backend is the source of truth for catalog, cart, and payment - no
//!   local sync, every read goes over the wire
//! - Bearer token on every cart and checkout call; login, registration, and
//!   catalog reads are anonymous
//! - Every request is bounded by the configured timeout, so a hung backend
//!   surfaces as an error instead of an endless loading state
//! - Catalog listings are cached in memory via `moka`; cart and checkout
//!   responses never are
//!
//! # Endpoints
//!
//! ```text
//! POST   /auth/login                          - exchange credentials for a token
//! POST   /auth/register                       - create an account
//! GET    /products/                           - list catalog items
//! GET    /cart/list                           - list cart lines
//! GET    /cart/total                          - cart total
//! POST   /cart/add                            - add or increment a line
//! PUT    /cart/update/{product_id}?quantity=N - set a line's quantity
//! DELETE /cart/remove/{product_id}            - remove a line
//! DELETE /cart/clear                          - empty the cart
//! POST   /checkout/payment                    - pay, receive the order confirmation
//! ```

mod cache;
pub mod conversions;
pub mod types;

use std::future::Future;
use std::sync::Arc;

use eshop_core::{Email, OrderConfirmation, Price, Product, ProductId};
use moka::future::Cache;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::config::ApiConfig;

use cache::{CacheKey, CacheValue};
pub use types::CartItem;

/// Maximum number of response body characters kept for diagnostics.
const BODY_SNIPPET_LEN: usize = 500;

/// Errors that can occur when talking to the commerce backend.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Transport failure, including timeouts and connection errors.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend refused the bearer token (HTTP 401).
    #[error("Authorization denied")]
    Unauthorized,

    /// The backend declined the request body.
    #[error("Request rejected ({status}): {}", .detail.as_deref().unwrap_or("no detail"))]
    Rejected {
        status: StatusCode,
        detail: Option<String>,
    },

    /// Any other non-success status.
    #[error("Unexpected status {status}: {body}")]
    Status { status: StatusCode, body: String },

    /// The response body was not the JSON we expected.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

impl ApiError {
    /// Whether this is an authorization-denied response.
    #[must_use]
    pub const fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }

    /// Whether the request timed out.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Http(e) if e.is_timeout())
    }

    /// Backend-provided detail for rejected requests.
    #[must_use]
    pub fn detail(&self) -> Option<&str> {
        match self {
            Self::Rejected { detail, .. } => detail.as_deref(),
            _ => None,
        }
    }
}

/// Account details submitted by the registration form.
#[derive(Debug, Clone)]
pub struct Registration {
    pub email: Email,
    pub full_name: String,
    pub password: SecretString,
}

/// Operations the stores need from the commerce backend.
///
/// [`ApiClient`] is the production implementation; tests substitute
/// in-memory fakes.
pub trait CommerceBackend: Send + Sync + 'static {
    /// Exchange credentials for a bearer token.
    fn login(
        &self,
        email: &Email,
        password: &SecretString,
    ) -> impl Future<Output = Result<SecretString, ApiError>> + Send;

    /// Create an account.
    fn register(&self, registration: &Registration)
    -> impl Future<Output = Result<(), ApiError>> + Send;

    /// List catalog items.
    fn list_products(&self) -> impl Future<Output = Result<Arc<Vec<Product>>, ApiError>> + Send;

    /// List the current cart lines as reported by the backend.
    fn list_cart(
        &self,
        token: &SecretString,
    ) -> impl Future<Output = Result<Vec<CartItem>, ApiError>> + Send;

    /// The backend's cart total.
    fn cart_total(&self, token: &SecretString)
    -> impl Future<Output = Result<Price, ApiError>> + Send;

    /// Add `quantity` units of a product.
    fn add_to_cart(
        &self,
        token: &SecretString,
        product_id: &ProductId,
        quantity: u32,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;

    /// Set a line's quantity.
    fn update_cart_line(
        &self,
        token: &SecretString,
        product_id: &ProductId,
        quantity: u32,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;

    /// Remove a line.
    fn remove_from_cart(
        &self,
        token: &SecretString,
        product_id: &ProductId,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;

    /// Empty the cart.
    fn clear_cart(&self, token: &SecretString) -> impl Future<Output = Result<(), ApiError>> + Send;

    /// Submit card data and receive the order confirmation.
    fn submit_payment(
        &self,
        token: &SecretString,
        payment: &types::PaymentRequest<'_>,
    ) -> impl Future<Output = Result<OrderConfirmation, ApiError>> + Send;
}

// =============================================================================
// ApiClient
// =============================================================================

/// Client for the commerce backend's REST API.
///
/// Cheap to clone; all clones share one connection pool and catalog cache.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ApiClientInner>,
}

struct ApiClientInner {
    client: reqwest::Client,
    origin: String,
    catalog: Option<Cache<CacheKey, CacheValue>>,
}

impl ApiClient {
    /// Create a new API client.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(config: &ApiConfig) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("eshop-storefront/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let catalog = (!config.catalog_cache_ttl.is_zero()).then(|| {
            Cache::builder()
                .max_capacity(16)
                .time_to_live(config.catalog_cache_ttl)
                .build()
        });

        Ok(Self {
            inner: Arc::new(ApiClientInner {
                client,
                origin: config.origin().to_string(),
                catalog,
            }),
        })
    }

    /// The backend origin requests are sent to.
    #[must_use]
    pub fn origin(&self) -> &str {
        &self.inner.origin
    }

    /// Drop cached catalog listings.
    pub fn invalidate_catalog(&self) {
        if let Some(cache) = &self.inner.catalog {
            cache.invalidate_all();
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.inner.origin)
    }

    /// Send a request and classify non-success statuses.
    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, ApiError> {
        let response = request.send().await?;
        let status = response.status();

        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(classify_failure(status, &body))
    }

    /// Send a request and decode its JSON body.
    async fn send_json<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, ApiError> {
        let response = self.send(request).await?;
        let text = response.text().await?;

        serde_json::from_str(&text).map_err(|e| {
            tracing::error!(
                error = %e,
                body = %snippet(&text),
                "Failed to parse backend response"
            );
            ApiError::Parse(e)
        })
    }
}

/// Map a non-success response onto the error taxonomy.
fn classify_failure(status: StatusCode, body: &str) -> ApiError {
    match status {
        StatusCode::UNAUTHORIZED => ApiError::Unauthorized,
        StatusCode::BAD_REQUEST | StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => {
            let detail = serde_json::from_str::<types::ErrorBody>(body)
                .ok()
                .and_then(types::ErrorBody::into_message);
            ApiError::Rejected { status, detail }
        }
        _ => {
            tracing::error!(
                status = %status,
                body = %snippet(body),
                "Backend returned non-success status"
            );
            ApiError::Status {
                status,
                body: snippet(body),
            }
        }
    }
}

fn snippet(body: &str) -> String {
    body.chars().take(BODY_SNIPPET_LEN).collect()
}

fn product_path(prefix: &str, product_id: &ProductId) -> String {
    format!("{prefix}/{}", urlencoding::encode(product_id.as_str()))
}

impl CommerceBackend for ApiClient {
    #[instrument(skip(self, password), fields(email = %email))]
    async fn login(&self, email: &Email, password: &SecretString) -> Result<SecretString, ApiError> {
        let body = types::LoginRequest {
            email: email.as_str(),
            password: password.expose_secret(),
        };

        let response: types::LoginResponse = self
            .send_json(self.inner.client.post(self.url("/auth/login")).json(&body))
            .await?;

        Ok(SecretString::from(response.access_token))
    }

    #[instrument(skip(self, registration), fields(email = %registration.email))]
    async fn register(&self, registration: &Registration) -> Result<(), ApiError> {
        let body = types::RegisterRequest {
            email: registration.email.as_str(),
            full_name: registration.full_name.trim(),
            password: registration.password.expose_secret(),
            is_admin: false,
        };

        self.send(self.inner.client.post(self.url("/auth/register")).json(&body))
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_products(&self) -> Result<Arc<Vec<Product>>, ApiError> {
        if let Some(cache) = &self.inner.catalog
            && let Some(CacheValue::Products(products)) = cache.get(&CacheKey::Products).await
        {
            debug!("Cache hit for product listing");
            return Ok(products);
        }

        let items: Vec<types::ProductItem> = self
            .send_json(self.inner.client.get(self.url("/products/")))
            .await?;
        let products = Arc::new(
            items
                .into_iter()
                .map(conversions::convert_product)
                .collect::<Vec<_>>(),
        );

        if let Some(cache) = &self.inner.catalog {
            cache
                .insert(CacheKey::Products, CacheValue::Products(Arc::clone(&products)))
                .await;
        }

        Ok(products)
    }

    #[instrument(skip(self, token))]
    async fn list_cart(&self, token: &SecretString) -> Result<Vec<CartItem>, ApiError> {
        self.send_json(
            self.inner
                .client
                .get(self.url("/cart/list"))
                .bearer_auth(token.expose_secret()),
        )
        .await
    }

    #[instrument(skip(self, token))]
    async fn cart_total(&self, token: &SecretString) -> Result<Price, ApiError> {
        let total: types::CartTotal = self
            .send_json(
                self.inner
                    .client
                    .get(self.url("/cart/total"))
                    .bearer_auth(token.expose_secret()),
            )
            .await?;
        Ok(total.total)
    }

    #[instrument(skip(self, token), fields(product_id = %product_id))]
    async fn add_to_cart(
        &self,
        token: &SecretString,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<(), ApiError> {
        let body = types::AddToCartRequest {
            product_id: product_id.as_str(),
            quantity,
        };

        self.send(
            self.inner
                .client
                .post(self.url("/cart/add"))
                .bearer_auth(token.expose_secret())
                .json(&body),
        )
        .await?;
        Ok(())
    }

    #[instrument(skip(self, token), fields(product_id = %product_id))]
    async fn update_cart_line(
        &self,
        token: &SecretString,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<(), ApiError> {
        let path = format!("{}?quantity={quantity}", product_path("/cart/update", product_id));

        self.send(
            self.inner
                .client
                .put(self.url(&path))
                .bearer_auth(token.expose_secret()),
        )
        .await?;
        Ok(())
    }

    #[instrument(skip(self, token), fields(product_id = %product_id))]
    async fn remove_from_cart(
        &self,
        token: &SecretString,
        product_id: &ProductId,
    ) -> Result<(), ApiError> {
        self.send(
            self.inner
                .client
                .delete(self.url(&product_path("/cart/remove", product_id)))
                .bearer_auth(token.expose_secret()),
        )
        .await?;
        Ok(())
    }

    #[instrument(skip(self, token))]
    async fn clear_cart(&self, token: &SecretString) -> Result<(), ApiError> {
        self.send(
            self.inner
                .client
                .delete(self.url("/cart/clear"))
                .bearer_auth(token.expose_secret()),
        )
        .await?;
        Ok(())
    }

    #[instrument(skip(self, token, payment))]
    async fn submit_payment(
        &self,
        token: &SecretString,
        payment: &types::PaymentRequest<'_>,
    ) -> Result<OrderConfirmation, ApiError> {
        let receipt: types::PaymentReceipt = self
            .send_json(
                self.inner
                    .client
                    .post(self.url("/checkout/payment"))
                    .bearer_auth(token.expose_secret())
                    .json(payment),
            )
            .await?;

        // Stock levels changed; the next catalog read should see them.
        self.invalidate_catalog();

        Ok(conversions::convert_receipt(receipt))
    }
}
