//! Resolve image references from the backend into URLs the browser can load.

/// Turns backend image paths into absolute URLs.
#[derive(Debug, Clone)]
pub struct ImageResolver {
    origin: String,
    placeholder: String,
}

impl ImageResolver {
    /// Served from this storefront's own static files.
    pub const PLACEHOLDER: &'static str = "/static/placeholder.svg";

    /// Resolver for a backend at `origin` (no trailing slash needed).
    #[must_use]
    pub fn new(origin: &str) -> Self {
        Self {
            origin: origin.trim_end_matches('/').to_string(),
            placeholder: Self::PLACEHOLDER.to_string(),
        }
    }

    /// Empty paths get the placeholder, absolute URLs pass through, and
    /// anything else is served by the backend.
    #[must_use]
    pub fn resolve(&self, path: &str) -> String {
        let path = path.trim();
        if path.is_empty() {
            return self.placeholder.clone();
        }
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        if path.starts_with('/') {
            format!("{}{path}", self.origin)
        } else {
            format!("{}/{path}", self.origin)
        }
    }

    #[must_use]
    pub fn placeholder(&self) -> &str {
        &self.placeholder
    }
}
