//! Command implementations.
//!
//! # Commands
//!
//! - `session` - Login and logout
//! - `cart` - Cart display and mutations
//! - `checkout` - Order summary

pub mod cart;
pub mod checkout;
pub mod session;

use std::sync::Arc;

use thiserror::Error;

use petstore_storefront::api::{CartApiClient, RemoteCartService, ServiceError};
use petstore_storefront::cart::CartEngine;
use petstore_storefront::checkout::CheckoutError;
use petstore_storefront::config::StorefrontConfig;
use petstore_storefront::error::CartError;
use petstore_storefront::services::auth::{AuthError, AuthSession};
use petstore_storefront::storage::{FileStore, LocalStore};

pub use cart::CartAction;

/// Errors that can occur while running a command.
#[derive(Debug, Error)]
pub enum CliError {
    /// An argument could not be turned into a domain value.
    #[error("Invalid argument {0}: {1}")]
    InvalidArgument(&'static str, String),

    /// The session could not be restored or saved.
    #[error("Session error: {0}")]
    Auth(#[from] AuthError),

    /// The API client could not be built.
    #[error("API client error: {0}")]
    Service(#[from] ServiceError),

    /// A cart operation failed.
    #[error("Cart error: {0}")]
    Cart(#[from] CartError),

    /// Checkout is not possible.
    #[error("Checkout error: {0}")]
    Checkout(#[from] CheckoutError),

    /// Output could not be encoded.
    #[error("Output error: {0}")]
    Output(#[from] serde_json::Error),
}

/// Everything a command needs: the restored session and a cart engine.
pub struct Context {
    /// Signed-in session of the profile.
    pub auth: AuthSession,
    /// Cart engine for this invocation.
    pub engine: CartEngine,
}

impl Context {
    /// Open the profile and restore its session. The cart is not sourced yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored session cannot be read or the API
    /// client cannot be built.
    pub fn open(config: &StorefrontConfig) -> Result<Self, CliError> {
        let profile = FileStore::new(config.profile_dir.clone());
        tracing::debug!(profile = %profile.dir().display(), "Opening profile");

        let store: Arc<dyn LocalStore> = Arc::new(profile);
        let auth = AuthSession::restore(Arc::clone(&store))?;
        let remote: Arc<dyn RemoteCartService> =
            Arc::new(CartApiClient::new(&config.api, auth.subscribe())?);

        Ok(Self {
            auth,
            engine: CartEngine::new(store, remote),
        })
    }

    /// Source the cart for the current session.
    ///
    /// # Errors
    ///
    /// Returns an error if the cart cannot be loaded.
    pub async fn attach(&self) -> Result<(), CliError> {
        self.engine.attach(&self.auth.current()).await?;
        Ok(())
    }
}
