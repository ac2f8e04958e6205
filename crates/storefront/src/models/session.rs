//! Session-related types.
//!
//! Types describing who is browsing: a guest or a signed-in user.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use petstore_core::{Email, UserId};

/// Signed-in user identity plus the API token issued at login.
///
/// Implements `Debug` manually to redact the token.
#[derive(Clone)]
pub struct UserSession {
    /// User's id.
    pub id: UserId,
    /// Display name.
    pub name: String,
    /// User's email address.
    pub email: Option<Email>,
    /// Whether the user may open the back-office.
    pub is_admin: bool,
    /// Bearer token for the storefront API.
    pub token: SecretString,
}

impl std::fmt::Debug for UserSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserSession")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("email", &self.email)
            .field("is_admin", &self.is_admin)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

/// Authentication state observed by the cart.
#[derive(Debug, Clone, Default)]
pub enum AuthState {
    /// Nobody is signed in.
    #[default]
    Guest,
    /// A user is signed in.
    Authenticated(UserSession),
}

impl AuthState {
    /// Whether a user is signed in.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }

    /// Current user's id, if signed in.
    #[must_use]
    pub const fn user_id(&self) -> Option<&UserId> {
        match self {
            Self::Guest => None,
            Self::Authenticated(session) => Some(&session.id),
        }
    }

    /// Current API token, if signed in.
    #[must_use]
    pub fn token(&self) -> Option<SecretString> {
        match self {
            Self::Guest => None,
            Self::Authenticated(session) => Some(session.token.clone()),
        }
    }

    /// Whether `other` belongs to the same identity (token changes ignored).
    #[must_use]
    pub fn same_identity(&self, other: &Self) -> bool {
        self.user_id() == other.user_id()
    }
}

/// Persisted form of [`UserSession`] under [`keys::USER_INFO`].
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StoredUserInfo {
    #[serde(rename = "_id")]
    pub id: UserId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: Option<Email>,
    #[serde(default)]
    pub is_admin: bool,
    pub token: String,
}

impl From<&UserSession> for StoredUserInfo {
    fn from(session: &UserSession) -> Self {
        Self {
            id: session.id.clone(),
            name: session.name.clone(),
            email: session.email.clone(),
            is_admin: session.is_admin,
            token: session.token.expose_secret().to_string(),
        }
    }
}

impl From<StoredUserInfo> for UserSession {
    fn from(stored: StoredUserInfo) -> Self {
        Self {
            id: stored.id,
            name: stored.name,
            email: stored.email,
            is_admin: stored.is_admin,
            token: SecretString::from(stored.token),
        }
    }
}

/// Local store keys owned by the session.
pub mod keys {
    /// Key for storing the current signed-in user.
    pub const USER_INFO: &str = "userInfo";
}
