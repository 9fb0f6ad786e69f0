//! Key-Value Storage Abstraction
//!
//! Provides a platform-agnostic trait for namespaced byte storage. The auth
//! core persists its encrypted credential blob and short-lived OAuth
//! transaction state through this interface and never touches a concrete
//! store directly.
//!
//! Hosts are expected to supply up to three implementations, selected by
//! configuration:
//!
//! - **Durable**: survives process restarts (SQLite file, config dir, ...)
//! - **Session-scoped**: lives for one host session (browser
//!   `sessionStorage`, process-lifetime memory on desktop)
//! - **In-memory**: never leaves the process; for tests and ephemeral setups
//!
//! # Security Requirements
//!
//! The core encrypts credential material before it reaches a store, so
//! implementations do not need to encrypt at rest themselves. They MUST
//! never log stored values.
//!
//! # Example
//!
//! ```ignore
//! use bridge_traits::kv::KeyValueStore;
//!
//! async fn remember(store: &dyn KeyValueStore, blob: &[u8]) -> Result<()> {
//!     store.set("workbench:credential", blob).await?;
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;

use crate::error::Result;

/// Namespaced asynchronous key-value storage.
///
/// All operations are idempotent where that is meaningful: deleting a missing
/// key succeeds, overwriting an existing key replaces its value.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Store a value under a key, replacing any previous value.
    async fn set(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Retrieve the value for a key.
    ///
    /// Returns `Ok(None)` if the key does not exist.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Delete a key. Succeeds even if the key does not exist.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Check whether a key exists without retrieving its value.
    async fn has(&self, key: &str) -> Result<bool> {
        Ok(self.get(key).await?.is_some())
    }

    /// List all keys currently present (without values).
    async fn list_keys(&self) -> Result<Vec<String>>;

    /// Remove every key. Use with caution.
    async fn clear(&self) -> Result<()>;
}
