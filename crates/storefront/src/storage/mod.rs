//! Local persistent store.
//!
//! A synchronous key-value store scoped to one browser profile. The guest
//! cart mirror and the signed-in session both live here. Every tab of the
//! same profile shares the store and concurrent writers overwrite each other:
//! last writer wins.
//!
//! # Backends
//!
//! - [`MemoryStore`] - shared in-memory map (tests, embedded use)
//! - [`FileStore`] - one file per key under a profile directory

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use thiserror::Error;

/// Errors that can occur when reading or writing the local store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The key is not usable by this backend.
    #[error("invalid store key {0:?}")]
    InvalidKey(String),

    /// Underlying I/O failed.
    #[error("store I/O error for key {key:?}: {source}")]
    Io {
        /// Key being accessed.
        key: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The store's internal lock was poisoned by a panicking writer.
    #[error("store is unavailable")]
    Unavailable,
}

/// Synchronous key-value storage scoped to a browser profile.
pub trait LocalStore: Send + Sync {
    /// Read the value stored under `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn read(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Store `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be written.
    fn write(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Delete `key`. Removing a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be written.
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// Reject keys that would escape a flat namespace.
pub(crate) fn validate_key(key: &str) -> Result<(), StoreError> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
        && !key.starts_with('.');
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidKey(key.to_string()))
    }
}
