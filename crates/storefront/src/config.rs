//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `ESHOP_API_URL` - Origin of the commerce backend (e.g., `https://api.example.com`)
//!
//! ## Optional
//! - `STOREFRONT_HOST` - Bind address (default: 127.0.0.1)
//! - `STOREFRONT_PORT` - Listen port (default: 5173)
//! - `STOREFRONT_DATA_DIR` - Directory holding the persisted auth token (default: `.eshop`)
//! - `STOREFRONT_STATIC_DIR` - Stylesheet and placeholder image (default: `crates/storefront/static`)
//! - `STOREFRONT_CONFIRMATION_TTL_SECS` - Lifetime of an unclaimed order confirmation (default: 600)
//! - `ESHOP_API_TIMEOUT_SECS` - Per-request timeout against the backend (default: 15)
//! - `ESHOP_CATALOG_CACHE_SECS` - Catalog cache lifetime, 0 disables (default: 60)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name
//! - `SENTRY_SAMPLE_RATE` - Error event sample rate (default: 1.0)
//! - `SENTRY_TRACES_SAMPLE_RATE` - Transaction sample rate (default: 0.0)

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use url::Url;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Storefront application configuration.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Commerce backend configuration
    pub api: ApiConfig,
    /// Directory for durable client state (the auth token)
    pub data_dir: PathBuf,
    /// Directory served under `/static`
    pub static_dir: PathBuf,
    /// How long an order confirmation waits to be viewed
    pub confirmation_ttl: Duration,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
    /// Error event sample rate
    pub sentry_sample_rate: f32,
    /// Performance transaction sample rate
    pub sentry_traces_sample_rate: f32,
}

/// Commerce backend API configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Backend origin all requests are issued against
    pub base_url: Url,
    /// Upper bound for a single request
    pub timeout: Duration,
    /// Catalog cache lifetime (zero disables caching)
    pub catalog_cache_ttl: Duration,
}

impl ApiConfig {
    /// Default per-request timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

    /// Configuration for a backend at `base_url` with default limits.
    #[must_use]
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            timeout: Self::DEFAULT_TIMEOUT,
            catalog_cache_ttl: Duration::from_secs(60),
        }
    }

    /// The backend origin without a trailing slash, for building URLs.
    #[must_use]
    pub fn origin(&self) -> &str {
        self.base_url.as_str().trim_end_matches('/')
    }
}

impl StorefrontConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env(&lookup);

        Ok(Self {
            host: env.parse_or("STOREFRONT_HOST", "127.0.0.1")?,
            port: env.parse_or("STOREFRONT_PORT", "5173")?,
            api: ApiConfig::from_env(&env)?,
            data_dir: PathBuf::from(env.or_default("STOREFRONT_DATA_DIR", ".eshop")),
            static_dir: PathBuf::from(
                env.or_default("STOREFRONT_STATIC_DIR", "crates/storefront/static"),
            ),
            confirmation_ttl: Duration::from_secs(
                env.parse_or("STOREFRONT_CONFIRMATION_TTL_SECS", "600")?,
            ),
            sentry_dsn: env.optional("SENTRY_DSN"),
            sentry_environment: env.optional("SENTRY_ENVIRONMENT"),
            sentry_sample_rate: env.parse_or("SENTRY_SAMPLE_RATE", "1.0")?,
            sentry_traces_sample_rate: env.parse_or("SENTRY_TRACES_SAMPLE_RATE", "0.0")?,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl ApiConfig {
    fn from_env(env: &Env<'_>) -> Result<Self, ConfigError> {
        let raw = env.required("ESHOP_API_URL")?;
        let base_url = parse_backend_url("ESHOP_API_URL", &raw)?;

        let timeout_secs: u64 = env.parse_or("ESHOP_API_TIMEOUT_SECS", "15")?;
        if timeout_secs == 0 {
            return Err(ConfigError::InvalidEnvVar(
                "ESHOP_API_TIMEOUT_SECS".to_string(),
                "must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            base_url,
            timeout: Duration::from_secs(timeout_secs),
            catalog_cache_ttl: Duration::from_secs(env.parse_or("ESHOP_CATALOG_CACHE_SECS", "60")?),
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Parse and validate the backend origin.
///
/// # Errors
///
/// Returns `ConfigError::InvalidEnvVar` unless the value is an absolute
/// `http` or `https` URL with a host.
pub fn parse_backend_url(var_name: &str, raw: &str) -> Result<Url, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidEnvVar(var_name.to_string(), reason);

    let url = Url::parse(raw.trim()).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
    }
    if url.host_str().is_none() {
        return Err(invalid("must have a host".to_string()));
    }
    Ok(url)
}

/// Variable lookup with the storefront's defaulting rules.
struct Env<'a>(&'a dyn Fn(&str) -> Option<String>);

impl Env<'_> {
    /// Get a required variable. Blank values count as missing.
    fn required(&self, key: &str) -> Result<String, ConfigError> {
        self.optional(key)
            .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
    }

    /// Get an optional variable, treating blank values as unset.
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|value| !value.trim().is_empty())
    }

    /// Get a variable with a default value.
    fn or_default(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_string())
    }

    /// Parse a variable, falling back to `default` when unset.
    fn parse_or<T>(&self, key: &str, default: &str) -> Result<T, ConfigError>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        self.or_default(key, default)
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<StorefrontConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        StorefrontConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[("ESHOP_API_URL", "https://api.example.com/")]).unwrap();

        assert_eq!(config.socket_addr().to_string(), "127.0.0.1:5173");
        assert_eq!(config.api.origin(), "https://api.example.com");
        assert_eq!(config.api.timeout, Duration::from_secs(15));
        assert_eq!(config.api.catalog_cache_ttl, Duration::from_secs(60));
        assert_eq!(config.data_dir, PathBuf::from(".eshop"));
        assert_eq!(config.static_dir, PathBuf::from("crates/storefront/static"));
        assert_eq!(config.confirmation_ttl, Duration::from_secs(600));
        assert!(config.sentry_dsn.is_none());
    }

    #[test]
    fn test_missing_api_url() {
        let err = load(&[]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref key) if key == "ESHOP_API_URL"));
    }

    #[test]
    fn test_blank_api_url_counts_as_missing() {
        let err = load(&[("ESHOP_API_URL", "  ")]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(_)));
    }

    #[test]
    fn test_rejects_non_http_backend() {
        let err = load(&[("ESHOP_API_URL", "ftp://files.example.com")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar(_, _)));

        let err = load(&[("ESHOP_API_URL", "not a url")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar(_, _)));
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("ESHOP_API_URL", "http://127.0.0.1:8000"),
            ("STOREFRONT_HOST", "0.0.0.0"),
            ("STOREFRONT_PORT", "8080"),
            ("ESHOP_API_TIMEOUT_SECS", "3"),
            ("ESHOP_CATALOG_CACHE_SECS", "0"),
            ("STOREFRONT_DATA_DIR", "/var/lib/eshop"),
            ("SENTRY_DSN", "https://key@sentry.example.com/1"),
        ])
        .unwrap();

        assert_eq!(config.socket_addr().to_string(), "0.0.0.0:8080");
        assert_eq!(config.api.timeout, Duration::from_secs(3));
        assert_eq!(config.api.catalog_cache_ttl, Duration::ZERO);
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/eshop"));
        assert!(config.sentry_dsn.is_some());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let err = load(&[
            ("ESHOP_API_URL", "http://127.0.0.1:8000"),
            ("ESHOP_API_TIMEOUT_SECS", "0"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar(ref key, _) if key == "ESHOP_API_TIMEOUT_SECS"));
    }

    #[test]
    fn test_invalid_port() {
        let err = load(&[
            ("ESHOP_API_URL", "http://127.0.0.1:8000"),
            ("STOREFRONT_PORT", "99999"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar(ref key, _) if key == "STOREFRONT_PORT"));
    }
}
