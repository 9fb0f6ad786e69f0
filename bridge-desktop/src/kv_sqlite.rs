//! Durable Key-Value Storage using SQLite
//!
//! Backs the `Durable` credential store scope. Values are opaque byte blobs;
//! the auth core encrypts credential material before it reaches this layer,
//! so nothing sensitive is stored in the clear.

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    kv::KeyValueStore,
};
use sqlx::{sqlite::SqlitePool, Row};
use std::path::PathBuf;
use tracing::debug;

/// SQLite-backed durable key-value store
///
/// - Single `kv` table with BLOB values and an updated-at timestamp
/// - Upsert semantics on `set`
/// - Async operations via sqlx
pub struct SqliteKeyValueStore {
    pool: SqlitePool,
}

impl SqliteKeyValueStore {
    /// Open (or create) a store at the given database path.
    pub async fn new(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(BridgeError::Io)?;
        }

        // SQLite URLs want forward slashes, also on Windows.
        let path_str = db_path.to_string_lossy().replace('\\', "/");
        let db_url = format!("sqlite://{}?mode=rwc", path_str);

        let pool = SqlitePool::connect(&db_url)
            .await
            .map_err(|e| BridgeError::StorageError(format!("Failed to connect to DB: {}", e)))?;

        Self::create_table(&pool).await?;

        debug!(path = ?db_path, "Initialized durable key-value store");

        Ok(Self { pool })
    }

    /// Create an in-memory store (for testing).
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePool::connect("sqlite::memory:")
            .await
            .map_err(|e| BridgeError::StorageError(format!("Failed to connect to DB: {}", e)))?;

        Self::create_table(&pool).await?;

        Ok(Self { pool })
    }

    async fn create_table(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value BLOB NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await
        .map_err(|e| BridgeError::StorageError(format!("Failed to create table: {}", e)))?;
        Ok(())
    }

    fn now() -> i64 {
        core_async::time::now_secs() as i64
    }
}

#[async_trait]
impl KeyValueStore for SqliteKeyValueStore {
    async fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO kv (key, value, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(Self::now())
        .execute(&self.pool)
        .await
        .map_err(|e| BridgeError::StorageError(format!("Failed to set key: {}", e)))?;

        debug!(key = key, "Stored value");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let row = sqlx::query("SELECT value FROM kv WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| BridgeError::StorageError(format!("Failed to get key: {}", e)))?;

        Ok(row.map(|r| r.get::<Vec<u8>, _>(0)))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM kv WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(|e| BridgeError::StorageError(format!("Failed to delete key: {}", e)))?;
        Ok(())
    }

    async fn has(&self, key: &str) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM kv WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| BridgeError::StorageError(format!("Failed to check key: {}", e)))?;
        Ok(row.is_some())
    }

    async fn list_keys(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT key FROM kv ORDER BY key")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| BridgeError::StorageError(format!("Failed to list keys: {}", e)))?;

        Ok(rows.iter().map(|r| r.get::<String, _>(0)).collect())
    }

    async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM kv")
            .execute(&self.pool)
            .await
            .map_err(|e| BridgeError::StorageError(format!("Failed to clear store: {}", e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_round_trip() {
        let store = SqliteKeyValueStore::in_memory().await.unwrap();

        store.set("alpha", b"value-1").await.unwrap();
        let value = store.get("alpha").await.unwrap();
        assert_eq!(value.as_deref(), Some(b"value-1".as_ref()));
    }

    #[tokio::test]
    async fn test_get_missing_key() {
        let store = SqliteKeyValueStore::in_memory().await.unwrap();
        assert!(store.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_set_overwrites() {
        let store = SqliteKeyValueStore::in_memory().await.unwrap();

        store.set("key", b"first").await.unwrap();
        store.set("key", b"second").await.unwrap();

        let value = store.get("key").await.unwrap();
        assert_eq!(value.as_deref(), Some(b"second".as_ref()));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = SqliteKeyValueStore::in_memory().await.unwrap();

        store.set("key", b"value").await.unwrap();
        store.delete("key").await.unwrap();
        assert!(!store.has("key").await.unwrap());

        // Deleting again succeeds.
        store.delete("key").await.unwrap();
    }

    #[tokio::test]
    async fn test_list_keys_and_clear() {
        let store = SqliteKeyValueStore::in_memory().await.unwrap();

        store.set("b", b"2").await.unwrap();
        store.set("a", b"1").await.unwrap();

        let keys = store.list_keys().await.unwrap();
        assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);

        store.clear().await.unwrap();
        assert!(store.list_keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_binary_values_survive() {
        let store = SqliteKeyValueStore::in_memory().await.unwrap();

        let blob: Vec<u8> = (0..=255).collect();
        store.set("blob", &blob).await.unwrap();

        let value = store.get("blob").await.unwrap().unwrap();
        assert_eq!(value, blob);
    }
}
