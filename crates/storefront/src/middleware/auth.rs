//! Route gating on the storefront session.
//!
//! Provides the extractor that keeps unauthenticated visitors out of the
//! cart, checkout, and confirmation pages.

use axum::{
    extract::FromRequestParts,
    http::request::Parts,
    response::{IntoResponse, Redirect, Response},
};

use crate::session::Claims;
use crate::state::AppState;

/// Path unauthenticated visitors are sent to.
pub const LOGIN_PATH: &str = "/login";

/// Extractor that requires a signed-in session.
///
/// If nobody is signed in, the request is redirected to the login page.
/// Only the presence of a token is checked here; the backend decides
/// whether the token is still good when the handler uses it.
///
/// # Example
///
/// ```rust,ignore
/// async fn protected_handler(RequireSession(claims): RequireSession) -> impl IntoResponse {
///     format!("Hello, {}!", claims.display_name())
/// }
/// ```
pub struct RequireSession(pub Claims);

/// Rejection for [`RequireSession`].
#[derive(Debug)]
pub struct SessionRejection;

impl IntoResponse for SessionRejection {
    fn into_response(self) -> Response {
        Redirect::to(LOGIN_PATH).into_response()
    }
}

impl FromRequestParts<AppState> for RequireSession {
    type Rejection = SessionRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(claims) = state.session().claims() else {
            tracing::debug!(path = %parts.uri.path(), "Redirecting unauthenticated request to login");
            return Err(SessionRejection);
        };

        Ok(Self(claims))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use axum::{Router, body::Body, http::Request, http::StatusCode, http::header, routing::get};
    use tower::ServiceExt;

    use super::*;
    use crate::api::ApiClient;
    use crate::config::StorefrontConfig;
    use crate::session::{MemoryTokenStorage, TokenStorage};
    use crate::testing::token_for;

    fn app(storage: MemoryTokenStorage) -> (Router, AppState) {
        let config = StorefrontConfig::from_lookup(|key| {
            (key == "ESHOP_API_URL").then(|| "http://127.0.0.1:9".to_string())
        })
        .unwrap();
        let api = ApiClient::new(&config.api).unwrap();
        let storage: Arc<dyn TokenStorage> = Arc::new(storage);
        let state = AppState::with_parts(config, api, storage);

        let router = Router::new()
            .route(
                "/private",
                get(|RequireSession(claims): RequireSession| async move {
                    claims.display_name().to_string()
                }),
            )
            .with_state(state.clone());
        (router, state)
    }

    async fn get_private(router: Router) -> axum::response::Response {
        router
            .oneshot(Request::get("/private").body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_redirects_without_session() {
        let (router, state) = app(MemoryTokenStorage::new());

        let response = get_private(router).await;

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], LOGIN_PATH);
        state.teardown();
    }

    #[tokio::test]
    async fn test_passes_claims_through() {
        let token = token_for("user-1", "ana@example.com", Some("Ana Perez"));
        let (router, state) = app(MemoryTokenStorage::with_token(token));

        let response = get_private(router).await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"Ana Perez");
        state.teardown();
    }

    #[tokio::test]
    async fn test_undecodable_token_is_not_a_session() {
        let (router, state) = app(MemoryTokenStorage::with_token("opaque"));

        let response = get_private(router).await;

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        state.teardown();
    }
}
