//! Facade error type.

use connector_crypto::{BundleError, CertError};

use crate::client::RpcError;
use crate::supervisor::ProcessError;

/// Any failure surfaced by [`crate::Connector`].
///
/// Each variant wraps the component error unchanged, so callers can match
/// on the precise kind (e.g. which bundle artifact is missing).
#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    #[error(transparent)]
    Config(#[from] connector_core::Error),

    #[error(transparent)]
    Certificate(#[from] CertError),

    #[error(transparent)]
    Bundle(#[from] BundleError),

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error(transparent)]
    Rpc(#[from] RpcError),
}
