//! In-memory local store.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::{LocalStore, StoreError, validate_key};

/// In-memory [`LocalStore`].
///
/// Clones share the same map, which models several tabs of one browser
/// profile writing to the same storage.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl LocalStore for MemoryStore {
    fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
        validate_key(key)?;
        let entries = self.entries.read().map_err(|_| StoreError::Unavailable)?;
        Ok(entries.get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StoreError> {
        validate_key(key)?;
        let mut entries = self.entries.write().map_err(|_| StoreError::Unavailable)?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        validate_key(key)?;
        let mut entries = self.entries.write().map_err(|_| StoreError::Unavailable)?;
        entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_read_missing_key() {
        let store = MemoryStore::new();
        assert_eq!(store.read("cart").unwrap(), None);
    }

    #[test]
    fn test_write_then_read() {
        let store = MemoryStore::new();
        store.write("cart", "[]").unwrap();
        assert_eq!(store.read("cart").unwrap().as_deref(), Some("[]"));
    }

    #[test]
    fn test_clones_share_entries() {
        let tab_a = MemoryStore::new();
        let tab_b = tab_a.clone();

        tab_a.write("cart", "[1]").unwrap();
        tab_b.write("cart", "[2]").unwrap();

        // Last writer wins across tabs.
        assert_eq!(tab_a.read("cart").unwrap().as_deref(), Some("[2]"));
    }

    #[test]
    fn test_remove() {
        let store = MemoryStore::new();
        store.write("userInfo", "{}").unwrap();
        store.remove("userInfo").unwrap();
        store.remove("userInfo").unwrap();
        assert_eq!(store.read("userInfo").unwrap(), None);
    }

    #[test]
    fn test_invalid_key() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.write("../cart", "[]"),
            Err(StoreError::InvalidKey(_))
        ));
    }
}
