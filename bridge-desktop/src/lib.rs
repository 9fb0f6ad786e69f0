//! # Desktop Bridge Implementations
//!
//! Desktop implementations of the [`bridge_traits`] capabilities:
//!
//! - [`ReqwestHttpClient`] - HTTP via reqwest with retry support
//! - [`SqliteKeyValueStore`] - durable key-value storage in a SQLite file
//! - [`MemoryKeyValueStore`] - session-scoped / in-memory key-value storage
//! - [`SystemNavigator`] - opens URLs with the platform browser opener
//!
//! These are the adapters a desktop shell wires into
//! `core_runtime::config::CoreConfig`.

pub mod http;
pub mod kv_memory;
pub mod kv_sqlite;
pub mod navigation;

pub use http::ReqwestHttpClient;
pub use kv_memory::MemoryKeyValueStore;
pub use kv_sqlite::SqliteKeyValueStore;
pub use navigation::SystemNavigator;
