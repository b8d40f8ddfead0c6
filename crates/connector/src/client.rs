//! mTLS control client for the connector daemon.
//!
//! Every call resolves the certificate bundle, dials a fresh channel and
//! issues one RPC. Nothing is cached between calls, so a regenerated leaf
//! is picked up immediately.

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use connector_core::{BindAddr, ConnectorOptions};
use connector_crypto::{BundleError, get_local_cert_bundle};
use connector_proto::methods::{METHOD_DESTROY_SERVICE, METHOD_EXPOSE_SERVICE, METHOD_LIST_SERVICES};
use connector_proto::remote_connection_client::RemoteConnectionClient;
use connector_proto::{DestroyRequest, ExposeRequest, NullMessage, Service, ServiceType};
use tonic::transport::Channel;
use tracing::{debug, info, warn};

use crate::tls::client_tls_config;

/// Which side of the tunnel serves the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    /// Destination is local; the remote connector reaches it through us.
    #[default]
    Local,
    /// Destination sits behind the remote connector.
    Remote,
}

/// Only the exact string `remote` selects [`Direction::Remote`].
impl From<&str> for Direction {
    fn from(raw: &str) -> Self {
        if raw == "remote" {
            Self::Remote
        } else {
            Self::Local
        }
    }
}

impl From<Direction> for ServiceType {
    fn from(direction: Direction) -> Self {
        match direction {
            Direction::Local => Self::Local,
            Direction::Remote => Self::Remote,
        }
    }
}

impl From<ServiceType> for Direction {
    fn from(kind: ServiceType) -> Self {
        match kind {
            ServiceType::Local => Self::Local,
            ServiceType::Remote => Self::Remote,
        }
    }
}

/// A service to register with the daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSpec {
    pub name: String,
    pub source_port: u16,
    pub remote_connector_addr: String,
    pub destination_addr: String,
    pub direction: Direction,
}

/// A service the daemon currently has registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExposedService {
    pub id: String,
    pub name: String,
    pub remote_connector_addr: String,
    pub destination_addr: String,
    pub source_port: u16,
    pub direction: Direction,
}

impl TryFrom<Service> for ExposedService {
    type Error = RpcError;

    fn try_from(service: Service) -> Result<Self, RpcError> {
        let source_port = u16::try_from(service.source_port).map_err(|_| {
            RpcError::Malformed(format!(
                "service {} has out-of-range source port {}",
                service.id, service.source_port
            ))
        })?;
        let kind = ServiceType::try_from(service.r#type).map_err(|_| {
            RpcError::Malformed(format!(
                "service {} has unknown type {}",
                service.id, service.r#type
            ))
        })?;
        Ok(Self {
            id: service.id,
            name: service.name,
            remote_connector_addr: service.remote_connector_addr,
            destination_addr: service.destination_addr,
            source_port,
            direction: kind.into(),
        })
    }
}

/// Errors from control RPCs.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("Invalid control endpoint {url}: {reason}")]
    Endpoint { url: String, reason: String },

    #[error("TLS setup failed: {0}")]
    Tls(String),

    #[error("Failed to connect to {addr}: {reason}")]
    Connect { addr: String, reason: String },

    /// The daemon answered with a non-OK status, passed through unchanged.
    #[error("Daemon returned {}: {}", .0.code(), .0.message())]
    Status(Box<tonic::Status>),

    #[error(transparent)]
    Credentials(#[from] BundleError),

    #[error("Malformed daemon response: {0}")]
    Malformed(String),
}

impl From<tonic::Status> for RpcError {
    fn from(status: tonic::Status) -> Self {
        Self::Status(Box::new(status))
    }
}

/// Control operations on a connector daemon.
pub trait ControlPlane: Send + Sync {
    /// Register `spec`; returns the daemon-assigned id.
    fn expose_service(
        &self,
        spec: ServiceSpec,
    ) -> impl Future<Output = Result<String, RpcError>> + Send;

    fn destroy_service(&self, id: &str) -> impl Future<Output = Result<(), RpcError>> + Send;

    fn list_services(&self) -> impl Future<Output = Result<Vec<ExposedService>, RpcError>> + Send;
}

/// [`ControlPlane`] over a fresh mTLS channel per call.
#[derive(Debug, Clone)]
pub struct TlsControlClient {
    certs_dir: PathBuf,
    grpc_bind: BindAddr,
    connect_timeout: Duration,
    rpc_timeout: Duration,
}

impl TlsControlClient {
    pub fn new(
        certs_dir: PathBuf,
        grpc_bind: BindAddr,
        connect_timeout: Duration,
        rpc_timeout: Duration,
    ) -> Self {
        // Both tonic and rustls may try to pick a provider; pin ring.
        let _ = rustls::crypto::ring::default_provider().install_default();
        Self {
            certs_dir,
            grpc_bind,
            connect_timeout,
            rpc_timeout,
        }
    }

    pub fn from_options(options: &ConnectorOptions) -> connector_core::Result<Self> {
        Ok(Self::new(
            options.certs_dir.clone(),
            options.grpc_addr()?,
            options.connect_timeout(),
            options.rpc_timeout(),
        ))
    }

    /// URL dialled for every call.
    pub fn endpoint_url(&self) -> String {
        format!("https://{}", self.grpc_bind.dial_authority())
    }

    /// Name the daemon's certificate must present.
    pub fn server_name(&self) -> &str {
        self.grpc_bind.dial_host()
    }

    async fn connect(&self) -> Result<RemoteConnectionClient<Channel>, RpcError> {
        let bundle = get_local_cert_bundle(&self.certs_dir)?;
        let tls = client_tls_config(&bundle, self.server_name())?;

        let url = self.endpoint_url();
        let endpoint = Channel::from_shared(url.clone())
            .map_err(|e| RpcError::Endpoint {
                url: url.clone(),
                reason: e.to_string(),
            })?
            .tls_config(tls)
            .map_err(|e| RpcError::Tls(e.to_string()))?
            .connect_timeout(self.connect_timeout)
            .timeout(self.rpc_timeout);

        let channel = endpoint.connect().await.map_err(|e| {
            debug!(error = ?e, "connection error details");
            RpcError::Connect {
                addr: url.clone(),
                reason: format!("{e}: {}", error_chain(&e)),
            }
        })?;
        debug!(endpoint = %url, server_name = self.server_name(), "Control channel established");
        Ok(RemoteConnectionClient::new(channel))
    }
}

impl ControlPlane for TlsControlClient {
    async fn expose_service(&self, spec: ServiceSpec) -> Result<String, RpcError> {
        let mut client = self.connect().await?;
        let name = spec.name.clone();
        let request = ExposeRequest {
            service: Some(Service {
                id: String::new(),
                name: spec.name,
                remote_connector_addr: spec.remote_connector_addr,
                destination_addr: spec.destination_addr,
                source_port: i32::from(spec.source_port),
                r#type: ServiceType::from(spec.direction).into(),
            }),
        };

        let id = client
            .expose_service(request)
            .await
            .inspect_err(|status| warn!(method = METHOD_EXPOSE_SERVICE, %status, "RPC failed"))?
            .into_inner()
            .id;
        info!(method = METHOD_EXPOSE_SERVICE, service = %name, id = %id, "Exposed service");
        Ok(id)
    }

    async fn destroy_service(&self, id: &str) -> Result<(), RpcError> {
        let mut client = self.connect().await?;
        client
            .destroy_service(DestroyRequest { id: id.to_string() })
            .await
            .inspect_err(|status| warn!(method = METHOD_DESTROY_SERVICE, %status, "RPC failed"))?;
        info!(method = METHOD_DESTROY_SERVICE, id, "Removed service");
        Ok(())
    }

    async fn list_services(&self) -> Result<Vec<ExposedService>, RpcError> {
        let mut client = self.connect().await?;
        let services = client
            .list_services(NullMessage {})
            .await
            .inspect_err(|status| warn!(method = METHOD_LIST_SERVICES, %status, "RPC failed"))?
            .into_inner()
            .services;
        debug!(method = METHOD_LIST_SERVICES, count = services.len(), "Listed services");
        services.into_iter().map(ExposedService::try_from).collect()
    }
}

/// Walk the source chain of an error into a single line.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut chain = Vec::new();
    let mut current = err.source();
    while let Some(e) = current {
        chain.push(e.to_string());
        current = e.source();
    }
    if chain.is_empty() {
        String::from("(no further details)")
    } else {
        chain.join(" -> ")
    }
}
