//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the workbench auth core:
//! - Logging and tracing infrastructure
//! - Configuration management
//! - Event bus system
//!
//! ## Overview
//!
//! This crate contains the runtime utilities the auth core depends on. It
//! establishes the logging conventions, the configuration contract between
//! host shell and core, and the event broadcasting mechanism the UI shell
//! subscribes to.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use config::{CoreConfig, CoreConfigBuilder, CredentialStoreScope};
pub use error::{Error, Result};
pub use events::{AuthEvent, CoreEvent, EventBus};
