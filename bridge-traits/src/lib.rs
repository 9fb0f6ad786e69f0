//! # Host Bridge Traits
//!
//! Platform abstraction traits that must be implemented by each host shell.
//!
//! ## Overview
//!
//! This crate defines the contract between the authentication core and the
//! host environment. Each trait represents a capability the core requires but
//! that must be implemented differently per host (desktop shell, browser
//! shell, test harness).
//!
//! ## Traits
//!
//! - [`HttpClient`](http::HttpClient) - Async HTTP operations for the OAuth
//!   token and profile endpoints
//! - [`KeyValueStore`](kv::KeyValueStore) - Namespaced byte storage; hosts
//!   provide durable, session-scoped, and in-memory implementations
//! - [`Navigator`](navigation::Navigator) - Fire-and-forget browser
//!   navigation for authorization redirects, and URL scrubbing after OAuth
//!   callbacks
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//!
//! ## Fail-Fast Strategy
//!
//! The core fails fast with descriptive errors when a required capability is
//! missing; see `core_runtime::config`.
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Host
//! implementations should convert platform-specific errors into it and keep
//! messages actionable.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so they can be shared across async
//! tasks behind `Arc`.

pub mod error;
pub mod http;
pub mod kv;
pub mod navigation;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
pub use kv::KeyValueStore;
pub use navigation::Navigator;
pub use time::{Clock, SystemClock};
