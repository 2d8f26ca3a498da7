//! Authentication route handlers.
//!
//! Handles login, registration, and logout against the commerce backend.
//! The resulting session belongs to the storefront process, not to a cookie.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
};
use eshop_core::Email;
use secrecy::SecretString;
use serde::Deserialize;
use tracing::instrument;

use super::{Flash, MessageQuery, NavView};
use crate::api::Registration;
use crate::filters;
use crate::session::SessionError;
use crate::state::AppState;

// =============================================================================
// Form Types
// =============================================================================

/// Login form data.
#[derive(Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

/// Registration form data.
#[derive(Deserialize)]
pub struct RegisterForm {
    pub email: String,
    pub full_name: String,
    pub password: String,
}

// =============================================================================
// Templates
// =============================================================================

/// Login page template.
#[derive(Template, WebTemplate)]
#[template(path = "auth/login.html")]
pub struct LoginTemplate {
    pub nav: NavView,
    pub flash: Flash,
}

/// Register page template.
#[derive(Template, WebTemplate)]
#[template(path = "auth/register.html")]
pub struct RegisterTemplate {
    pub nav: NavView,
    pub flash: Flash,
    pub email: String,
    pub full_name: String,
}

// =============================================================================
// Login Routes
// =============================================================================

/// Display the login page.
pub async fn login_page(
    State(state): State<AppState>,
    Query(query): Query<MessageQuery>,
) -> impl IntoResponse {
    LoginTemplate {
        nav: NavView::current(&state),
        flash: query.into(),
    }
}

/// Handle login form submission.
///
/// Every failure gets the same message; the backend's reason is only logged.
#[instrument(skip(state, form))]
pub async fn login(State(state): State<AppState>, Form(form): Form<LoginForm>) -> Response {
    let Ok(email) = Email::parse(&form.email) else {
        return Redirect::to("/login?error=invalid_email").into_response();
    };

    let password = SecretString::from(form.password);
    match state.session().login(&email, &password).await {
        Ok(()) => Redirect::to("/").into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "Login failed");
            Redirect::to("/login?error=credentials").into_response()
        }
    }
}

/// Handle logout.
#[instrument(skip(state))]
pub async fn logout(State(state): State<AppState>) -> Response {
    state.session().logout();
    Redirect::to("/?success=logged_out").into_response()
}

// =============================================================================
// Registration Routes
// =============================================================================

/// Display the registration page.
pub async fn register_page(
    State(state): State<AppState>,
    Query(query): Query<MessageQuery>,
) -> impl IntoResponse {
    RegisterTemplate {
        nav: NavView::current(&state),
        flash: query.into(),
        email: String::new(),
        full_name: String::new(),
    }
}

/// Handle registration form submission.
///
/// Registration does not sign in; on success the visitor is sent to the
/// login page. Failures re-render the form with what was typed, minus the
/// password.
#[instrument(skip(state, form))]
pub async fn register(State(state): State<AppState>, Form(form): Form<RegisterForm>) -> Response {
    let rerender = |message: &str| {
        RegisterTemplate {
            nav: NavView::current(&state),
            flash: Flash::error(message),
            email: form.email.clone(),
            full_name: form.full_name.clone(),
        }
        .into_response()
    };

    let Ok(email) = Email::parse(&form.email) else {
        return rerender("Enter a valid email address.");
    };

    let registration = Registration {
        email,
        full_name: form.full_name.trim().to_string(),
        password: SecretString::from(form.password.clone()),
    };

    match state.session().register(&registration).await {
        Ok(()) => Redirect::to("/login?success=registered").into_response(),
        Err(SessionError::ValidationRejected(detail)) => {
            rerender(detail.as_deref().unwrap_or("Registration was rejected."))
        }
        Err(e) => {
            tracing::warn!(error = %e, "Registration failed");
            rerender("Could not reach the server. Please try again.")
        }
    }
}
