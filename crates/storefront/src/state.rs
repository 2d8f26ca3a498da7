//! Application state shared across handlers.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::task::JoinHandle;
use tracing::info;

use crate::api::{ApiClient, ApiError};
use crate::cart::CartStore;
use crate::checkout::Checkout;
use crate::config::StorefrontConfig;
use crate::handoff::ConfirmationHandoff;
use crate::images::ImageResolver;
use crate::session::{FileTokenStorage, SessionStore, TokenStorage};

/// Error creating the application state.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("failed to build API client: {0}")]
    Api(#[from] ApiError),
}

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc`. It owns the single session
/// and cart of this storefront process; build it with [`AppState::create`]
/// and release it with [`AppState::teardown`].
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    api: ApiClient,
    session: Arc<SessionStore>,
    cart: Arc<CartStore>,
    checkout: Checkout,
    images: ImageResolver,
    follower: Mutex<Option<JoinHandle<()>>>,
}

impl AppState {
    /// Build the stores, restore a persisted session, and start keeping the
    /// cart in step with it.
    ///
    /// The token is persisted under `config.data_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the API client cannot be built.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn create(config: StorefrontConfig) -> Result<Self, StateError> {
        let storage = Arc::new(FileTokenStorage::new(&config.data_dir));
        let api = ApiClient::new(&config.api)?;
        Ok(Self::with_parts(config, api, storage))
    }

    /// Like [`AppState::create`], with the API client and token storage
    /// supplied by the caller.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    #[must_use]
    pub fn with_parts(
        config: StorefrontConfig,
        api: ApiClient,
        storage: Arc<dyn TokenStorage>,
    ) -> Self {
        let backend = Arc::new(api.clone());
        let session = Arc::new(SessionStore::new(Arc::clone(&backend), storage));
        let cart = Arc::new(CartStore::new(backend, Arc::clone(&session)));
        let checkout = Checkout::new(
            Arc::clone(&cart),
            ConfirmationHandoff::new(config.confirmation_ttl),
        );
        let images = ImageResolver::new(api.origin());

        session.restore();
        let follower = cart.follow_session();

        info!(
            backend = %api.origin(),
            authenticated = session.is_authenticated(),
            "Storefront state created"
        );

        Self {
            inner: Arc::new(AppStateInner {
                config,
                api,
                session,
                cart,
                checkout,
                images,
                follower: Mutex::new(Some(follower)),
            }),
        }
    }

    /// Stop the cart follower and drop pending confirmations.
    ///
    /// The persisted token is kept for the next start. Idempotent.
    pub fn teardown(&self) {
        let follower = self
            .inner
            .follower
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(follower) = follower {
            follower.abort();
        }
        self.inner.checkout.handoff().clear();
        info!("Storefront state torn down");
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Get a reference to the commerce backend client.
    #[must_use]
    pub fn api(&self) -> &ApiClient {
        &self.inner.api
    }

    #[must_use]
    pub fn session(&self) -> &SessionStore {
        &self.inner.session
    }

    #[must_use]
    pub fn cart(&self) -> &CartStore {
        &self.inner.cart
    }

    #[must_use]
    pub fn checkout(&self) -> &Checkout {
        &self.inner.checkout
    }

    #[must_use]
    pub fn images(&self) -> &ImageResolver {
        &self.inner.images
    }
}
