//! Unified cart error handling with Sentry integration.
//!
//! Every cart operation returns `Result<T, CartError>`. Failures never escape
//! as panics: the engine records a user-facing [`CartNotice`] on the snapshot
//! and reports server-side faults to Sentry before handing the error back.

use serde::Serialize;
use thiserror::Error;

use crate::api::ServiceError;
use crate::cart::LineError;
use crate::storage::StoreError;

/// Error category used for reporting and user messaging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The remote call failed (network, timeout, 5xx).
    Transport,
    /// The request was rejected before any state change.
    Validation,
    /// The session is no longer accepted by the API.
    Unauthorized,
    /// The local store could not be read or written.
    Storage,
    /// The result belonged to an identity that is no longer current.
    Stale,
}

/// Cart operation error.
#[derive(Debug, Error)]
pub enum CartError {
    /// Remote cart service could not be reached or failed.
    #[error("cart service unavailable: {0}")]
    Transport(String),

    /// Request rejected (quantity, stock, unknown product).
    #[error("{0}")]
    Validation(String),

    /// Authentication no longer accepted by the cart service.
    #[error("session expired, please sign in again")]
    Unauthorized,

    /// Guest cart could not be persisted.
    #[error("local storage error: {0}")]
    Store(#[from] StoreError),

    /// Guest cart could not be encoded.
    #[error("cart encoding error: {0}")]
    Encode(#[from] serde_json::Error),

    /// The signed-in identity changed while the request was in flight.
    #[error("cart owner changed before the request completed")]
    StaleSource,

    /// The cart has not finished sourcing for the current identity.
    #[error("cart is still loading")]
    Loading,
}

impl CartError {
    /// Reporting category.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport(_) => ErrorKind::Transport,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Unauthorized => ErrorKind::Unauthorized,
            Self::Store(_) | Self::Encode(_) => ErrorKind::Storage,
            Self::StaleSource | Self::Loading => ErrorKind::Stale,
        }
    }

    /// Message suitable for a transient notification.
    ///
    /// `action` describes the failed operation ("add item to cart").
    /// Internal details are only exposed for validation failures.
    #[must_use]
    pub fn user_message(&self, action: &str) -> String {
        match self {
            Self::Validation(msg) => msg.clone(),
            Self::Unauthorized => "Your session has expired. Please sign in again".to_string(),
            Self::StaleSource => "Your cart changed while updating, please retry".to_string(),
            Self::Loading => "Your cart is still loading, please retry".to_string(),
            _ => format!("Failed to {action}"),
        }
    }
}

impl From<LineError> for CartError {
    fn from(err: LineError) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<ServiceError> for CartError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Transport(msg) => Self::Transport(msg),
            ServiceError::Rejected { message, .. } => Self::Validation(message),
            ServiceError::Unauthorized => Self::Unauthorized,
            ServiceError::IdentityChanged => Self::StaleSource,
        }
    }
}

/// A failure surfaced to the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartNotice {
    /// Failure category.
    pub kind: ErrorKind,
    /// Text to show the user.
    pub message: String,
}

impl CartNotice {
    /// Notice for `err` raised while trying to `action`.
    #[must_use]
    pub fn from_error(err: &CartError, action: &str) -> Self {
        Self {
            kind: err.kind(),
            message: err.user_message(action),
        }
    }
}

/// Result type alias for `CartError`.
pub type Result<T> = std::result::Result<T, CartError>;

/// Log and report a failed cart operation.
///
/// Transport and storage faults go to Sentry as events; validation and
/// session problems are expected and only leave a breadcrumb.
pub fn report(err: &CartError, action: &str) {
    match err.kind() {
        ErrorKind::Transport | ErrorKind::Storage => {
            let event_id = sentry::capture_error(err);
            tracing::error!(
                error = %err,
                action,
                sentry_event_id = %event_id,
                "Cart operation failed"
            );
        }
        ErrorKind::Validation | ErrorKind::Unauthorized | ErrorKind::Stale => {
            tracing::warn!(error = %err, action, "Cart operation rejected");
            add_breadcrumb("cart", &format!("{action} rejected"), Some(&[("error", &err.to_string())]));
        }
    }
}

/// Add a breadcrumb for user actions.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of cart
/// actions leading up to an error.
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}
