//! Session commands.

use secrecy::SecretString;

use petstore_core::{Email, UserId};
use petstore_storefront::models::UserSession;

use super::{CliError, Context};

/// Build a session from command-line arguments.
///
/// # Errors
///
/// Returns an error if the user id or email is malformed, or the token is
/// blank.
pub fn build(
    user_id: &str,
    token: &str,
    name: String,
    email: Option<&str>,
    is_admin: bool,
) -> Result<UserSession, CliError> {
    let id = UserId::parse(user_id)
        .map_err(|e| CliError::InvalidArgument("--user-id", e.to_string()))?;
    let email = email
        .map(Email::parse)
        .transpose()
        .map_err(|e| CliError::InvalidArgument("--email", e.to_string()))?;
    if token.trim().is_empty() {
        return Err(CliError::InvalidArgument(
            "--token",
            "must not be blank".to_string(),
        ));
    }

    Ok(UserSession {
        id,
        name,
        email,
        is_admin,
        token: SecretString::from(token.trim()),
    })
}

/// Store `session` and source the cart of the new identity.
///
/// # Errors
///
/// Returns an error if the session cannot be saved or the cart cannot be
/// loaded.
pub async fn login(ctx: &Context, session: UserSession) -> Result<(), CliError> {
    ctx.auth.login(session)?;
    ctx.attach().await
}

/// Forget the session and source the guest cart.
///
/// The guest mirror is left as the last guest activity wrote it.
///
/// # Errors
///
/// Returns an error if the session cannot be removed or the guest cart
/// cannot be read.
pub async fn logout(ctx: &Context) -> Result<(), CliError> {
    ctx.auth.logout()?;
    ctx.attach().await
}
