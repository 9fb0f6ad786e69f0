//! In-Memory Key-Value Storage
//!
//! Backs the `SessionScoped` and `InMemory` store scopes on desktop, where a
//! "session" is the lifetime of the process. The auth core keeps PKCE
//! transaction state and callback idempotency markers here; nothing outlives
//! the process.

use async_trait::async_trait;
use bridge_traits::{error::Result, kv::KeyValueStore};
use std::collections::HashMap;
use tokio::sync::Mutex;

/// HashMap-backed key-value store.
#[derive(Default)]
pub struct MemoryKeyValueStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        self.entries
            .lock()
            .await
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.lock().await.remove(key);
        Ok(())
    }

    async fn has(&self, key: &str) -> Result<bool> {
        Ok(self.entries.lock().await.contains_key(key))
    }

    async fn list_keys(&self) -> Result<Vec<String>> {
        Ok(self.entries.lock().await.keys().cloned().collect())
    }

    async fn clear(&self) -> Result<()> {
        self.entries.lock().await.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_round_trip() {
        let store = MemoryKeyValueStore::new();

        store.set("key", b"value").await.unwrap();
        assert_eq!(
            store.get("key").await.unwrap().as_deref(),
            Some(b"value".as_ref())
        );
        assert!(store.has("key").await.unwrap());

        store.delete("key").await.unwrap();
        assert!(store.get("key").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_clear_removes_everything() {
        let store = MemoryKeyValueStore::new();
        store.set("a", b"1").await.unwrap();
        store.set("b", b"2").await.unwrap();

        store.clear().await.unwrap();
        assert!(store.list_keys().await.unwrap().is_empty());
    }
}
