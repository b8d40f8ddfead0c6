//! Connector
//!
//! Drives a connector daemon from a host process:
//!
//! - **Supervisor**: start and stop the daemon as a detached process tracked
//!   by a PID file
//! - **Certificates**: bootstrap the local CA and (re)issue leaves
//! - **Control client**: expose, remove and list services over gRPC with
//!   mutual TLS
//!
//! [`Connector`] bundles all three behind one set of immutable options.

pub mod client;
mod connector;
pub mod error;
pub mod supervisor;
mod tls;

pub use client::{ControlPlane, Direction, ExposedService, RpcError, ServiceSpec, TlsControlClient};
pub use connector::Connector;
pub use connector_core::ConnectorOptions;
pub use connector_crypto::{BundleArtifact, BundleError, CertBundle, CertError};
pub use error::ConnectorError;
pub use supervisor::{DaemonCommand, ProcessError, ProcessSupervisor};
