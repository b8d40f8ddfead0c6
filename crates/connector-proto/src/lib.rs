//! Connector Protocol Buffers
//!
//! Generated protobuf code for the connector daemon's control API.
//!
//! This crate contains:
//! - `RemoteConnection` service (client and server) for exposing, listing
//!   and destroying service tunnels

#![allow(clippy::derive_partial_eq_without_eq)]

/// Connector v1 API definitions.
pub mod v1 {
    tonic::include_proto!("connector.v1");
}

// Re-export v1 as the default API version for convenience
pub use v1::*;

pub mod methods;
