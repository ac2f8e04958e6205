//! Authentication error types.

use thiserror::Error;

use crate::storage::StoreError;

/// Errors that can occur while persisting or restoring the session.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Local store read/write failed.
    #[error("session storage error: {0}")]
    Store(#[from] StoreError),

    /// Session could not be encoded.
    #[error("session encoding error: {0}")]
    Encode(#[from] serde_json::Error),
}
