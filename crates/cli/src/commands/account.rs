//! Account and session commands.
//!
//! The token is persisted by the session store, so `login` once and later
//! commands pick the session up again.

use eshop_core::Email;
use eshop_storefront::api::Registration;
use secrecy::SecretString;

use super::{CliError, Context};
use crate::output;

/// Create an account. Does not sign in.
///
/// # Errors
///
/// Returns an error for an invalid email or when the backend declines.
pub async fn register(
    ctx: &Context,
    email: &str,
    full_name: &str,
    password: String,
) -> Result<(), CliError> {
    let registration = Registration {
        email: Email::parse(email)?,
        full_name: full_name.trim().to_string(),
        password: SecretString::from(password),
    };

    ctx.session.register(&registration).await?;
    output::line("Registration successful. You can sign in now.");
    Ok(())
}

/// Sign in and persist the token.
///
/// # Errors
///
/// Returns an error for an invalid email or failed authentication.
pub async fn login(ctx: &Context, email: &str, password: String) -> Result<(), CliError> {
    let email = Email::parse(email)?;
    ctx.session
        .login(&email, &SecretString::from(password))
        .await?;

    let name = ctx
        .session
        .claims()
        .map_or_else(|| email.to_string(), |c| c.display_name().to_string());
    output::line(&format!("Signed in as {name}"));
    Ok(())
}

/// Sign out. Signing out twice is fine.
pub fn logout(ctx: &Context) {
    ctx.session.logout();
    output::line("Signed out");
}

/// Show the decoded claims of the current session.
///
/// The claims are read from the token without verifying it; the backend
/// remains the judge of whether the session is still valid.
pub fn whoami(ctx: &Context) {
    match ctx.session.claims() {
        Some(claims) => output::claims(&claims),
        None => output::line("Not signed in"),
    }
}
