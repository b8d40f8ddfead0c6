//! Client-side TLS material for the control channel.

use connector_crypto::{CertBundle, read_pem};
use tonic::transport::{Certificate, ClientTlsConfig, Identity};

use crate::client::RpcError;

/// mTLS config presenting the bundle's leaf and trusting only its root.
///
/// `server_name` is the name the daemon's leaf must carry. PEM buffers are
/// wiped when this returns.
pub(crate) fn client_tls_config(
    bundle: &CertBundle,
    server_name: &str,
) -> Result<ClientTlsConfig, RpcError> {
    let read = |path: &std::path::Path, what: &str| {
        read_pem(path)
            .map_err(|e| RpcError::Tls(format!("Failed to read {what} {}: {e}", path.display())))
    };
    let root_cert = read(bundle.root_cert.as_path(), "root certificate")?;
    let leaf_cert = read(bundle.leaf_cert.as_path(), "leaf certificate")?;
    let leaf_key = read(bundle.leaf_key.as_path(), "leaf key")?;

    Ok(ClientTlsConfig::new()
        .ca_certificate(Certificate::from_pem(root_cert.as_bytes()))
        .identity(Identity::from_pem(leaf_cert.as_bytes(), leaf_key.as_bytes()))
        .domain_name(server_name))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn unreadable_bundle_is_tls_error() {
        let dir = tempfile::tempdir().unwrap();
        let bundle = CertBundle::in_dir(dir.path());
        let err = client_tls_config(&bundle, "localhost").unwrap_err();
        assert!(matches!(err, RpcError::Tls(ref msg) if msg.contains("root certificate")), "got {err:?}");
    }
}
