//! Shared configuration, error types, and identifiers for NVQ crates.
//!
//! Architecture role:
//! - defines bridge/session configuration passed across layers
//! - provides common [`NvqError`] / [`Result`] contracts
//! - hosts the typed handle/id vocabulary used at the native boundary
//!
//! Key modules:
//! - [`config`]
//! - [`error`]
//! - [`ids`]

pub mod config;
pub mod error;
pub mod ids;

pub use config::{BridgeConfig, SessionConfig, NATIVE_CONF_PREFIXES};
pub use error::{NvqError, Result};
pub use ids::*;
