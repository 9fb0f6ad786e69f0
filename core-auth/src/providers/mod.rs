//! Concrete provider variants.
//!
//! `oauth2` holds the shared authorization-code engine; `azure` and `google`
//! parameterize it for their identity backends; `mock` short-circuits the
//! whole dance for development and tests.

pub mod azure;
pub mod google;
pub mod mock;
pub mod oauth2;

pub use azure::{AzureConfig, AzureProvider};
pub use google::{BackendExchangeConfig, GoogleConfig, GoogleProvider};
pub use mock::{MockConfig, MockProvider};
