//! The connector facade.

use std::net::IpAddr;
use std::path::{Path, PathBuf};

use connector_core::ConnectorOptions;
use connector_crypto::{CertBundle, CertificateAuthority};

use crate::client::{ControlPlane, Direction, ExposedService, ServiceSpec, TlsControlClient};
use crate::error::ConnectorError;
use crate::supervisor::ProcessSupervisor;

/// One connector endpoint: its daemon, its certificates and its control API.
///
/// Options are validated once at construction and never change afterwards.
#[derive(Debug)]
pub struct Connector<C = TlsControlClient> {
    options: ConnectorOptions,
    supervisor: ProcessSupervisor,
    authority: CertificateAuthority,
    control: C,
}

impl Connector<TlsControlClient> {
    /// Build a connector that talks to its daemon over mTLS using the
    /// bundle in `options.certs_dir`.
    pub fn new(options: ConnectorOptions) -> Result<Self, ConnectorError> {
        let control = TlsControlClient::from_options(&options)?;
        Self::with_control_plane(options, control)
    }
}

impl<C: ControlPlane> Connector<C> {
    /// Build a connector over a caller-supplied control plane.
    pub fn with_control_plane(options: ConnectorOptions, control: C) -> Result<Self, ConnectorError> {
        options.validate()?;
        Ok(Self {
            supervisor: ProcessSupervisor::new(&options),
            authority: CertificateAuthority::from_options(&options)?,
            options,
            control,
        })
    }

    pub const fn options(&self) -> &ConnectorOptions {
        &self.options
    }

    /// Launch the daemon with `bundle`; returns the PID file path.
    pub fn start(&self, bundle: &CertBundle) -> Result<PathBuf, ConnectorError> {
        Ok(self.supervisor.start(bundle)?)
    }

    pub fn stop(&self) -> Result<(), ConnectorError> {
        Ok(self.supervisor.stop()?)
    }

    pub fn is_running(&self) -> bool {
        self.supervisor.is_running()
    }

    /// Bootstrap a new root CA and leaf in `out_dir`, replacing any
    /// existing bundle.
    pub fn generate_local_cert_bundle(&self, out_dir: &Path) -> Result<CertBundle, ConnectorError> {
        Ok(self.authority.generate_local_cert_bundle(out_dir)?)
    }

    pub fn get_local_cert_bundle(&self, dir: &Path) -> Result<CertBundle, ConnectorError> {
        Ok(connector_crypto::get_local_cert_bundle(dir)?)
    }

    /// Issue a fresh leaf from an existing root.
    pub fn generate_leaf_cert(
        &self,
        root_key: &Path,
        root_cert: &Path,
        hosts: &[String],
        ips: &[IpAddr],
        out_dir: &Path,
    ) -> Result<CertBundle, ConnectorError> {
        Ok(self
            .authority
            .generate_leaf_cert(root_key, root_cert, hosts, ips, out_dir)?)
    }

    /// Ask the daemon to expose a service; returns its id.
    pub async fn expose_service(
        &self,
        name: &str,
        port: u16,
        remote_addr: &str,
        dest_addr: &str,
        direction: impl Into<Direction>,
    ) -> Result<String, ConnectorError> {
        let spec = ServiceSpec {
            name: name.to_string(),
            source_port: port,
            remote_connector_addr: remote_addr.to_string(),
            destination_addr: dest_addr.to_string(),
            direction: direction.into(),
        };
        Ok(self.control.expose_service(spec).await?)
    }

    pub async fn remove_service(&self, id: &str) -> Result<(), ConnectorError> {
        Ok(self.control.destroy_service(id).await?)
    }

    pub async fn list_services(&self) -> Result<Vec<ExposedService>, ConnectorError> {
        Ok(self.control.list_services().await?)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::client::RpcError;

    /// In-memory daemon registry.
    #[derive(Default)]
    struct FakeControl {
        services: Mutex<Vec<ExposedService>>,
    }

    impl ControlPlane for FakeControl {
        async fn expose_service(&self, spec: ServiceSpec) -> Result<String, RpcError> {
            let mut services = self.services.lock().unwrap();
            let id = format!("svc-{}", services.len() + 1);
            services.push(ExposedService {
                id: id.clone(),
                name: spec.name,
                remote_connector_addr: spec.remote_connector_addr,
                destination_addr: spec.destination_addr,
                source_port: spec.source_port,
                direction: spec.direction,
            });
            Ok(id)
        }

        async fn destroy_service(&self, id: &str) -> Result<(), RpcError> {
            let mut services = self.services.lock().unwrap();
            let before = services.len();
            services.retain(|s| s.id != id);
            if services.len() == before {
                return Err(tonic::Status::not_found(format!("no service {id}")).into());
            }
            Ok(())
        }

        async fn list_services(&self) -> Result<Vec<ExposedService>, RpcError> {
            Ok(self.services.lock().unwrap().clone())
        }
    }

    fn options(dir: &Path) -> ConnectorOptions {
        ConnectorOptions {
            certs_dir: dir.join("certs"),
            pid_file: dir.join("connector.pid"),
            log_directory: dir.join("logs"),
            ..Default::default()
        }
    }

    #[test]
    fn invalid_options_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let options = ConnectorOptions {
            grpc_bind: "bogus".into(),
            ..options(dir.path())
        };
        let err = Connector::new(options).unwrap_err();
        assert!(matches!(err, ConnectorError::Config(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn facade_delegates_to_control_plane() {
        let dir = tempfile::tempdir().unwrap();
        let connector =
            Connector::with_control_plane(options(dir.path()), FakeControl::default()).unwrap();

        let id = connector
            .expose_service("web", 8080, "", "http://localhost:8080", "")
            .await
            .unwrap();
        let remote = connector
            .expose_service("db", 5432, "peer:30001", "db:5432", "remote")
            .await
            .unwrap();

        let listed = connector.list_services().await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].direction, Direction::Local);
        assert_eq!(listed[1].direction, Direction::Remote);

        connector.remove_service(&id).await.unwrap();
        let listed = connector.list_services().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, remote);
    }

    #[tokio::test]
    async fn daemon_errors_pass_through() {
        let dir = tempfile::tempdir().unwrap();
        let connector =
            Connector::with_control_plane(options(dir.path()), FakeControl::default()).unwrap();

        match connector.remove_service("unknown").await.unwrap_err() {
            ConnectorError::Rpc(RpcError::Status(status)) => {
                assert_eq!(status.code(), tonic::Code::NotFound);
                assert_eq!(status.message(), "no service unknown");
            }
            other => panic!("expected daemon status, got {other:?}"),
        }
    }

    #[test]
    fn certificate_operations_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let connector =
            Connector::with_control_plane(options(dir.path()), FakeControl::default()).unwrap();
        let certs = dir.path().join("certs");

        let generated = connector.generate_local_cert_bundle(&certs).unwrap();
        assert_eq!(connector.get_local_cert_bundle(&certs).unwrap(), generated);

        let reissued = connector
            .generate_leaf_cert(
                &generated.root_key,
                &generated.root_cert,
                &[],
                &[],
                &certs,
            )
            .unwrap();
        assert_eq!(reissued, generated);
    }

    #[test]
    fn missing_bundle_names_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let connector =
            Connector::with_control_plane(options(dir.path()), FakeControl::default()).unwrap();
        let err = connector.get_local_cert_bundle(dir.path()).unwrap_err();
        assert_eq!(err.to_string(), "unable to find root certificate");
    }

    #[test]
    fn nothing_running_without_pid_file() {
        let dir = tempfile::tempdir().unwrap();
        let connector =
            Connector::with_control_plane(options(dir.path()), FakeControl::default()).unwrap();
        assert!(!connector.is_running());
        assert!(matches!(
            connector.stop(),
            Err(ConnectorError::Process(crate::ProcessError::PidFileMissing { .. }))
        ));
    }
}
