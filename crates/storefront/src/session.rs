//! Session store: the bearer token, its decoded claims, and durable storage.
//!
//! The token is the only piece of client state that survives a restart. It is
//! written under the fixed key [`TOKEN_KEY`] on login, read back by
//! [`SessionStore::restore`], and removed on logout.
//!
//! # Claims are advisory
//!
//! Claims are decoded from the token payload without verifying the signature.
//! They exist for display (the signed-in name, the Sentry user) and must never
//! gate anything. The backend validates the token on every authenticated call
//! and remains the only authority on who the user is.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use chrono::{DateTime, Utc};
use eshop_core::Email;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{info, instrument, warn};

use crate::api::{ApiClient, ApiError, CommerceBackend, Registration};
use crate::error::{clear_sentry_user, set_sentry_user};

/// Storage key of the persisted token.
pub const TOKEN_KEY: &str = "authToken";

/// Base64url that accepts payloads with or without padding.
const TOKEN_PAYLOAD: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

// =============================================================================
// Errors
// =============================================================================

/// Errors surfaced by session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Login failed. Deliberately carries no backend detail.
    #[error("Authentication failed")]
    AuthenticationFailed,

    /// The backend declined a registration.
    #[error("Registration rejected: {}", .0.as_deref().unwrap_or("no detail"))]
    ValidationRejected(Option<String>),

    /// The backend could not be reached or answered unexpectedly.
    #[error("Backend unavailable: {0}")]
    Network(#[source] ApiError),
}

/// Durable token storage failures.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Token storage I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Errors decoding a token payload.
#[derive(Debug, Error)]
pub enum ClaimsError {
    #[error("Token is not three dot-separated segments")]
    Malformed,
    #[error("Token payload is not base64url: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("Token payload is not a claims object: {0}")]
    Json(#[from] serde_json::Error),
}

// =============================================================================
// Claims
// =============================================================================

/// Identity attributes decoded from the token payload. Display only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user) identifier.
    pub sub: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub full_name: Option<String>,
    /// Expiry as seconds since the Unix epoch.
    #[serde(default)]
    pub exp: Option<i64>,
    /// Any other claims the backend includes.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Claims {
    /// Name to greet the user with.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.full_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .or_else(|| Some(self.email.as_str()).filter(|email| !email.is_empty()))
            .unwrap_or(&self.sub)
    }

    /// Expiry time, if present and representable.
    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.exp.and_then(|exp| DateTime::from_timestamp(exp, 0))
    }
}

/// Decode the payload segment of a `header.payload.signature` token.
///
/// The signature is not checked. See the module docs.
///
/// # Errors
///
/// Returns `ClaimsError` if the token does not have three segments or the
/// payload is not base64url-encoded JSON with a `sub` claim.
pub fn decode_claims(token: &str) -> Result<Claims, ClaimsError> {
    let mut segments = token.trim().split('.');
    let (Some(_header), Some(payload), Some(_signature), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return Err(ClaimsError::Malformed);
    };

    let bytes = TOKEN_PAYLOAD.decode(payload)?;
    Ok(serde_json::from_slice(&bytes)?)
}

// =============================================================================
// Token Storage
// =============================================================================

/// Durable client storage for the token.
pub trait TokenStorage: Send + Sync {
    /// Read the persisted token, if any.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backing store cannot be read.
    fn load(&self) -> Result<Option<String>, StorageError>;

    /// Persist a token, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backing store cannot be written.
    fn store(&self, token: &str) -> Result<(), StorageError>;

    /// Remove the persisted token. Succeeds if there is none.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backing store cannot be written.
    fn clear(&self) -> Result<(), StorageError>;
}

/// Token kept in a file named [`TOKEN_KEY`] inside a data directory.
#[derive(Debug, Clone)]
pub struct FileTokenStorage {
    path: PathBuf,
}

impl FileTokenStorage {
    /// Storage rooted at `data_dir`. The directory is created on first write.
    #[must_use]
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            path: data_dir.as_ref().join(TOKEN_KEY),
        }
    }

    /// Path of the token file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: io::Error) -> StorageError {
        StorageError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl TokenStorage for FileTokenStorage {
    fn load(&self) -> Result<Option<String>, StorageError> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => {
                let token = contents.trim();
                Ok((!token.is_empty()).then(|| token.to_string()))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(self.io_error(e)),
        }
    }

    fn store(&self, token: &str) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }
        fs::write(&self.path, token).map_err(|e| self.io_error(e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600))
                .map_err(|e| self.io_error(e))?;
        }

        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_error(e)),
        }
    }
}

/// In-process token storage for tests and throwaway sessions.
#[derive(Debug, Default)]
pub struct MemoryTokenStorage {
    slot: Mutex<Option<String>>,
}

impl MemoryTokenStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage that already holds `token`, as if persisted by an earlier run.
    #[must_use]
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            slot: Mutex::new(Some(token.into())),
        }
    }

    /// The currently stored token.
    #[must_use]
    pub fn current(&self) -> Option<String> {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl TokenStorage for MemoryTokenStorage {
    fn load(&self) -> Result<Option<String>, StorageError> {
        Ok(self.current())
    }

    fn store(&self, token: &str) -> Result<(), StorageError> {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(token.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

// =============================================================================
// Session Store
// =============================================================================

/// A point-in-time view of the session. Claims are present exactly when a
/// token is.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    token: Option<SecretString>,
    claims: Option<Claims>,
}

impl SessionState {
    fn signed_in(token: SecretString, claims: Claims) -> Self {
        Self {
            token: Some(token),
            claims: Some(claims),
        }
    }

    /// Whether a token is present.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    #[must_use]
    pub const fn token(&self) -> Option<&SecretString> {
        self.token.as_ref()
    }

    #[must_use]
    pub const fn claims(&self) -> Option<&Claims> {
        self.claims.as_ref()
    }
}

/// Holds the current token and claims and keeps durable storage in step.
///
/// Changes are published on a `watch` channel; see [`SessionStore::subscribe`].
pub struct SessionStore<B = ApiClient> {
    backend: Arc<B>,
    storage: Arc<dyn TokenStorage>,
    state: watch::Sender<SessionState>,
}

impl<B: CommerceBackend> SessionStore<B> {
    /// Create an empty session. Call [`SessionStore::restore`] to pick up a
    /// token persisted by an earlier run.
    #[must_use]
    pub fn new(backend: Arc<B>, storage: Arc<dyn TokenStorage>) -> Self {
        Self {
            backend,
            storage,
            state: watch::Sender::new(SessionState::default()),
        }
    }

    /// Load a persisted token, if any.
    ///
    /// A token whose claims cannot be decoded is removed from storage and
    /// the session stays empty. Nothing is returned to the caller either way.
    #[instrument(skip(self))]
    pub fn restore(&self) {
        let token = match self.storage.load() {
            Ok(Some(token)) => token,
            Ok(None) => return,
            Err(e) => {
                warn!(error = %e, "Failed to read persisted token");
                return;
            }
        };

        match decode_claims(&token) {
            Ok(claims) => {
                info!(sub = %claims.sub, "Restored session");
                set_sentry_user(&claims.sub, Some(&claims.email));
                self.state
                    .send_replace(SessionState::signed_in(SecretString::from(token), claims));
            }
            Err(e) => {
                warn!(error = %e, "Discarding undecodable persisted token");
                self.logout();
            }
        }
    }

    /// Exchange credentials for a token and start a session.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::AuthenticationFailed` for any failure, rejected
    /// credentials and unreachable backend alike. The prior session is left
    /// untouched in that case, except when the backend hands back a token
    /// whose payload cannot be decoded: that clears the session.
    #[instrument(skip(self, password), fields(email = %email))]
    pub async fn login(&self, email: &Email, password: &SecretString) -> Result<(), SessionError> {
        let token = self.backend.login(email, password).await.map_err(|e| {
            if e.is_unauthorized() || matches!(e, ApiError::Rejected { .. }) {
                info!("Login rejected");
            } else {
                warn!(error = %e, "Login request failed");
            }
            SessionError::AuthenticationFailed
        })?;

        // A session never holds a token whose payload cannot be read.
        let claims = match decode_claims(token.expose_secret()) {
            Ok(claims) => claims,
            Err(e) => {
                warn!(error = %e, "Login token payload could not be decoded; clearing session");
                self.logout();
                return Err(SessionError::AuthenticationFailed);
            }
        };

        if let Err(e) = self.storage.store(token.expose_secret()) {
            warn!(error = %e, "Failed to persist token; session will not survive a restart");
        }

        set_sentry_user(&claims.sub, Some(&claims.email));
        info!(sub = %claims.sub, "Logged in");
        self.state
            .send_replace(SessionState::signed_in(token, claims));
        Ok(())
    }

    /// Create an account. Does not sign in.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::ValidationRejected` with the backend's detail
    /// when the account is declined, and `SessionError::Network` otherwise.
    #[instrument(skip(self, registration), fields(email = %registration.email))]
    pub async fn register(&self, registration: &Registration) -> Result<(), SessionError> {
        match self.backend.register(registration).await {
            Ok(()) => {
                info!("Account registered");
                Ok(())
            }
            Err(ApiError::Rejected { detail, .. }) => {
                info!(detail = detail.as_deref(), "Registration rejected");
                Err(SessionError::ValidationRejected(detail))
            }
            Err(e) => {
                warn!(error = %e, "Registration request failed");
                Err(SessionError::Network(e))
            }
        }
    }
}

impl<B> SessionStore<B> {
    /// Clear the token and claims from memory and durable storage.
    ///
    /// Idempotent.
    pub fn logout(&self) {
        if let Err(e) = self.storage.clear() {
            warn!(error = %e, "Failed to clear persisted token");
        }

        let was_signed_in = self.state.send_if_modified(|state| {
            let had_token = state.is_authenticated();
            *state = SessionState::default();
            had_token
        });

        if was_signed_in {
            clear_sentry_user();
            info!("Logged out");
        }
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_authenticated()
    }

    /// The current bearer token.
    #[must_use]
    pub fn token(&self) -> Option<SecretString> {
        self.state.borrow().token.clone()
    }

    /// The current decoded claims. Display only.
    #[must_use]
    pub fn claims(&self) -> Option<Claims> {
        self.state.borrow().claims.clone()
    }

    /// Copy of the whole session state.
    #[must_use]
    pub fn snapshot(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Observe session changes. Every login, restore, and effective logout
    /// notifies subscribers.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }
}
