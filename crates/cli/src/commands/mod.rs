//! CLI command implementations.
//!
//! Each command builds the same stores the storefront uses, restores the
//! persisted session, and runs one operation.

pub mod account;
pub mod cart;
pub mod catalog;
pub mod checkout;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use eshop_core::EmailError;
use eshop_storefront::api::{ApiClient, ApiError};
use eshop_storefront::cart::{CartError, CartStore};
use eshop_storefront::checkout::{Checkout, CheckoutError};
use eshop_storefront::config::{ApiConfig, ConfigError, parse_backend_url};
use eshop_storefront::handoff::ConfirmationHandoff;
use eshop_storefront::session::{FileTokenStorage, SessionError, SessionStore};
use thiserror::Error;

/// A confirmation only needs to outlive the command that paid.
const CONFIRMATION_TTL: Duration = Duration::from_secs(60);

/// Errors that can occur while running a command.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("Invalid email: {0}")]
    InvalidEmail(#[from] EmailError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Cart(#[from] CartError),

    #[error(transparent)]
    Checkout(#[from] CheckoutError),

    #[error("Not signed in. Run `eshop login` first.")]
    NotSignedIn,

    #[error("Payment went through but the confirmation was lost")]
    ConfirmationLost,
}

/// The stores one command works with.
pub struct Context {
    pub api: ApiClient,
    pub session: Arc<SessionStore>,
    pub cart: Arc<CartStore>,
    pub checkout: Checkout,
}

impl Context {
    /// Build the stores against `api_url` and restore the session persisted
    /// under `data_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is not a valid backend origin or the HTTP
    /// client cannot be built.
    pub fn new(api_url: &str, data_dir: &Path) -> Result<Self, CliError> {
        let base_url = parse_backend_url("ESHOP_API_URL", api_url)?;
        let api = ApiClient::new(&ApiConfig::new(base_url))?;

        let backend = Arc::new(api.clone());
        let storage = Arc::new(FileTokenStorage::new(data_dir));
        let session = Arc::new(SessionStore::new(Arc::clone(&backend), storage));
        session.restore();

        let cart = Arc::new(CartStore::new(backend, Arc::clone(&session)));
        let checkout = Checkout::new(
            Arc::clone(&cart),
            ConfirmationHandoff::new(CONFIRMATION_TTL),
        );

        Ok(Self {
            api,
            session,
            cart,
            checkout,
        })
    }

    /// Fail early when no session was restored.
    ///
    /// # Errors
    ///
    /// Returns `CliError::NotSignedIn` without a persisted token.
    pub fn require_session(&self) -> Result<(), CliError> {
        if self.session.is_authenticated() {
            Ok(())
        } else {
            Err(CliError::NotSignedIn)
        }
    }
}
