//! Remote cart service.
//!
//! # Architecture
//!
//! - [`RemoteCartService`] is the transport-agnostic contract the cart engine
//!   consumes; every call names the user it is made for and fails with
//!   [`ServiceError::IdentityChanged`] if someone else is signed in
//! - [`CartApiClient`] implements it over the storefront REST API with
//!   `reqwest`
//! - Wire lines are normalised here so the rest of the crate only sees one
//!   canonical item identity
//!
//! # Endpoints
//!
//! | Operation              | Request                                   |
//! |------------------------|-------------------------------------------|
//! | `get_cart`             | `GET /cart`                               |
//! | `add_or_update_line`   | `POST /cart` `{productId, quantity}`      |
//! | `remove_line`          | `DELETE /cart/{productId}`                |
//! | `clear`                | `DELETE /cart`                            |

mod client;
mod types;

pub use client::CartApiClient;
pub use types::{CartResponse, ProductRef, RemoteLine};

use async_trait::async_trait;
use secrecy::SecretString;
use thiserror::Error;

use petstore_core::{ItemId, UserId};

use crate::cart::CartLine;
use crate::models::AuthState;

/// Errors returned by a [`RemoteCartService`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    /// Network failure, timeout, rate limit, or server error.
    #[error("transport error: {0}")]
    Transport(String),

    /// The service refused the request (unknown product, bad quantity).
    #[error("request rejected ({status}): {message}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Message from the service.
        message: String,
    },

    /// No session, or the session token was refused.
    #[error("not authorized")]
    Unauthorized,

    /// The signed-in user is not the one the call was made for.
    #[error("signed-in user changed")]
    IdentityChanged,
}

/// Per-user cart persisted by the storefront backend.
///
/// `user` is the identity the caller sourced its cart for. Implementations
/// must not act on another user's cart on its behalf.
#[async_trait]
pub trait RemoteCartService: Send + Sync {
    /// Fetch every line of `user`'s cart.
    async fn get_cart(&self, user: &UserId) -> Result<Vec<CartLine>, ServiceError>;

    /// Set the quantity of `product_id`, creating the line if needed.
    async fn add_or_update_line(
        &self,
        user: &UserId,
        product_id: &ItemId,
        quantity: u32,
    ) -> Result<(), ServiceError>;

    /// Remove the line for `product_id`.
    async fn remove_line(&self, user: &UserId, product_id: &ItemId) -> Result<(), ServiceError>;

    /// Remove every line.
    async fn clear(&self, user: &UserId) -> Result<(), ServiceError>;
}

/// Token to send on behalf of `user`.
///
/// Fails with [`ServiceError::Unauthorized`] when nobody is signed in and
/// with [`ServiceError::IdentityChanged`] when someone else is.
pub(crate) fn token_for(auth: &AuthState, user: &UserId) -> Result<SecretString, ServiceError> {
    match auth {
        AuthState::Guest => Err(ServiceError::Unauthorized),
        AuthState::Authenticated(session) if session.id != *user => {
            Err(ServiceError::IdentityChanged)
        }
        AuthState::Authenticated(session) => Ok(session.token.clone()),
    }
}

/// Map a non-success HTTP status and body to a [`ServiceError`].
///
/// The storefront API reports failures as `{"message": "..."}`; when the body
/// has no message the status reason is used instead.
#[must_use]
pub fn classify_status(status: u16, body: &str) -> ServiceError {
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(String::from))
        .unwrap_or_else(|| format!("HTTP {status}"));

    match status {
        401 | 403 => ServiceError::Unauthorized,
        400 | 404 | 409 | 422 => ServiceError::Rejected { status, message },
        _ => ServiceError::Transport(message),
    }
}
