//! Authentication session provider.
//!
//! Tokens are issued by the storefront API; this service only keeps the
//! resulting session, persists it in the local store, and broadcasts identity
//! transitions to observers such as the cart engine.

mod error;

pub use error::AuthError;

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, warn};

use crate::models::session::{StoredUserInfo, keys};
use crate::models::{AuthState, UserSession};
use crate::storage::LocalStore;

/// Owner of the current [`AuthState`].
///
/// Observers receive a notification only when the identity changes; a token
/// refresh for the same user updates the state silently.
pub struct AuthSession {
    store: Arc<dyn LocalStore>,
    tx: watch::Sender<AuthState>,
}

impl AuthSession {
    /// Start a guest session.
    #[must_use]
    pub fn new(store: Arc<dyn LocalStore>) -> Self {
        let (tx, _rx) = watch::channel(AuthState::Guest);
        Self { store, tx }
    }

    /// Restore the session persisted in `store`.
    ///
    /// An unreadable session entry is discarded and the visitor starts as a
    /// guest.
    ///
    /// # Errors
    ///
    /// Returns an error if the store itself cannot be read.
    pub fn restore(store: Arc<dyn LocalStore>) -> Result<Self, AuthError> {
        let state = match store.read(keys::USER_INFO)? {
            None => AuthState::Guest,
            Some(raw) => match serde_json::from_str::<StoredUserInfo>(&raw) {
                Ok(stored) => AuthState::Authenticated(UserSession::from(stored)),
                Err(e) => {
                    warn!(error = %e, "Discarding unreadable stored session");
                    store.remove(keys::USER_INFO)?;
                    AuthState::Guest
                }
            },
        };

        let (tx, _rx) = watch::channel(state);
        Ok(Self { store, tx })
    }

    /// Record a successful login.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be persisted; the in-memory
    /// state is left unchanged in that case.
    pub fn login(&self, session: UserSession) -> Result<(), AuthError> {
        let payload = serde_json::to_string(&StoredUserInfo::from(&session))?;
        self.store.write(keys::USER_INFO, &payload)?;

        info!(user_id = %session.id, "User signed in");
        let next = AuthState::Authenticated(session);
        self.tx.send_if_modified(|state| {
            let changed = !state.same_identity(&next);
            *state = next;
            changed
        });
        Ok(())
    }

    /// Sign out and forget the stored session.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored session cannot be removed.
    pub fn logout(&self) -> Result<(), AuthError> {
        self.store.remove(keys::USER_INFO)?;

        self.tx.send_if_modified(|state| {
            if let Some(user_id) = state.user_id() {
                info!(%user_id, "User signed out");
            }
            let changed = state.is_authenticated();
            *state = AuthState::Guest;
            changed
        });
        Ok(())
    }

    /// Snapshot of the current state.
    #[must_use]
    pub fn current(&self) -> AuthState {
        self.tx.borrow().clone()
    }

    /// Subscribe to identity transitions.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.tx.subscribe()
    }
}
