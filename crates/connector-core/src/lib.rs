//! Connector Core Library
//!
//! Shared functionality for connector components:
//! - Immutable connector options with TOML and environment layering
//! - Bind address parsing and validation
//! - Common error types
//! - Tracing initialisation

pub mod addr;
pub mod config;
pub mod error;
pub mod tracing_init;

pub use addr::{BindAddr, LOOPBACK_NAME};
pub use config::ConnectorOptions;
pub use error::{Error, Result};
