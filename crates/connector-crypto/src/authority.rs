//! Local certificate authority.
//!
//! Bootstraps a self-signed root and issues short-lived leaves from it. The
//! same leaf serves as server identity for the daemon and client identity
//! for the facade, so it carries both `serverAuth` and `clientAuth`.

use std::fs;
use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

use connector_core::{BindAddr, ConnectorOptions, LOOPBACK_NAME};
use rcgen::{
    BasicConstraints, CertificateParams, DnType, ExtendedKeyUsagePurpose, IsCa, Issuer, KeyPair,
    KeyUsagePurpose,
};
use time::OffsetDateTime;
use tracing::info;

use crate::bundle::{
    CertBundle, LEAF_CERT_FILENAME, LEAF_KEY_FILENAME, ROOT_CERT_FILENAME, ROOT_KEY_FILENAME,
};
use crate::error::CertError;
use crate::files::{Sensitivity, read_pem, write_pem_file};
use crate::host::{local_hostname, local_ip_addresses};
use crate::names::SubjectNames;

/// Lifetime of a freshly bootstrapped root.
pub const DEFAULT_ROOT_VALIDITY: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);

const ORGANIZATION: &str = "Connector";
const ROOT_COMMON_NAME: &str = "Connector Root CA";
const LEAF_COMMON_NAME: &str = "Connector Leaf";

/// Backdating applied to `notBefore` to tolerate clock skew between peers.
const CLOCK_SKEW: time::Duration = time::Duration::minutes(5);

/// Extra hosts and IP addresses to put on a leaf.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeafSubjects {
    /// Names, IP literals or `host:port` addresses.
    pub hosts: Vec<String>,
    pub ips: Vec<IpAddr>,
}

impl LeafSubjects {
    /// Append caller-supplied entries.
    pub fn extend(&mut self, hosts: &[String], ips: &[IpAddr]) {
        self.hosts.extend_from_slice(hosts);
        self.ips.extend_from_slice(ips);
    }
}

/// Issues the root and leaf certificates for one connector endpoint.
#[derive(Debug, Clone)]
pub struct CertificateAuthority {
    grpc_bind: BindAddr,
    http_bind: BindAddr,
    local_domain: String,
    leaf_validity: Duration,
}

impl CertificateAuthority {
    pub fn new(
        grpc_bind: BindAddr,
        http_bind: BindAddr,
        local_domain: impl Into<String>,
        leaf_validity: Duration,
    ) -> Self {
        Self {
            grpc_bind,
            http_bind,
            local_domain: local_domain.into(),
            leaf_validity,
        }
    }

    pub fn from_options(options: &ConnectorOptions) -> connector_core::Result<Self> {
        Ok(Self::new(
            options.grpc_addr()?,
            options.http_addr()?,
            options.local_domain.clone(),
            options.leaf_validity(),
        ))
    }

    /// Create a new root CA and a leaf signed by it in `out_dir`.
    ///
    /// The leaf covers this machine's hostname, every local interface
    /// address and the host parts of the gRPC and HTTP binds. Existing
    /// bundle files are replaced.
    pub fn generate_local_cert_bundle(&self, out_dir: &Path) -> Result<CertBundle, CertError> {
        fs::create_dir_all(out_dir).map_err(|e| {
            CertError::Generation(format!(
                "Failed to create certs directory {}: {e}",
                out_dir.display()
            ))
        })?;

        let root_key = KeyPair::generate().map_err(|e| CertError::Generation(e.to_string()))?;
        let root_cert = root_params()
            .self_signed(&root_key)
            .map_err(|e| CertError::Generation(e.to_string()))?;

        let root_key_path = out_dir.join(ROOT_KEY_FILENAME);
        let root_cert_path = out_dir.join(ROOT_CERT_FILENAME);
        let root_key_pem = zeroize::Zeroizing::new(root_key.serialize_pem());
        write_pem_file(&root_key_path, &root_key_pem, "root key", Sensitivity::Secret)?;
        write_pem_file(&root_cert_path, &root_cert.pem(), "root certificate", Sensitivity::Public)?;
        info!(dir = %out_dir.display(), "Generated connector root CA");

        let subjects = self.local_subjects();
        self.generate_leaf_cert(
            &root_key_path,
            &root_cert_path,
            &subjects.hosts,
            &subjects.ips,
            out_dir,
        )
    }

    /// Names and addresses a leaf for this machine should cover: the
    /// hostname, the gRPC and HTTP bind hosts and every interface address.
    ///
    /// Bootstrap uses exactly this set, so passing it to
    /// [`Self::generate_leaf_cert`] renews a leaf without narrowing it.
    pub fn local_subjects(&self) -> LeafSubjects {
        let mut hosts: Vec<String> = local_hostname()
            .filter(|h| h.is_ascii())
            .into_iter()
            .collect();
        hosts.push(self.grpc_bind.host().to_string());
        hosts.push(self.http_bind.host().to_string());
        LeafSubjects {
            hosts,
            ips: local_ip_addresses(),
        }
    }

    /// Sign a new leaf with the root at the given paths and write it to
    /// `out_dir`.
    ///
    /// `hosts` may be names, IP literals or `host:port` addresses. The leaf
    /// always also covers `localhost`, `*.local.<domain>` and the gRPC bind
    /// host. The root files are only read.
    pub fn generate_leaf_cert(
        &self,
        root_key_path: &Path,
        root_cert_path: &Path,
        hosts: &[String],
        ips: &[IpAddr],
        out_dir: &Path,
    ) -> Result<CertBundle, CertError> {
        let root_key_pem = read_pem(root_key_path).map_err(|e| {
            CertError::Generation(format!(
                "Failed to read root key {}: {e}",
                root_key_path.display()
            ))
        })?;
        let root_cert_pem = read_pem(root_cert_path).map_err(|e| {
            CertError::Generation(format!(
                "Failed to read root certificate {}: {e}",
                root_cert_path.display()
            ))
        })?;

        let root_key = KeyPair::from_pem(&root_key_pem)
            .map_err(|e| CertError::Generation(format!("invalid root key: {e}")))?;
        let issuer = Issuer::from_ca_cert_pem(&root_cert_pem, &root_key)
            .map_err(|e| CertError::Generation(format!("invalid root certificate: {e}")))?;

        let names = self.leaf_names(hosts, ips);
        let mut params = CertificateParams::default();
        params
            .distinguished_name
            .push(DnType::CommonName, LEAF_COMMON_NAME);
        params
            .distinguished_name
            .push(DnType::OrganizationName, ORGANIZATION);
        params.subject_alt_names = names.to_san_types()?;
        params.key_usages.push(KeyUsagePurpose::DigitalSignature);
        params.key_usages.push(KeyUsagePurpose::KeyEncipherment);
        params
            .extended_key_usages
            .push(ExtendedKeyUsagePurpose::ServerAuth);
        params
            .extended_key_usages
            .push(ExtendedKeyUsagePurpose::ClientAuth);
        let now = OffsetDateTime::now_utc();
        params.not_before = now - CLOCK_SKEW;
        params.not_after = now + self.leaf_validity;

        let leaf_key = KeyPair::generate().map_err(|e| CertError::Generation(e.to_string()))?;
        let leaf_cert = params
            .signed_by(&leaf_key, &issuer)
            .map_err(|e| CertError::Generation(e.to_string()))?;

        fs::create_dir_all(out_dir).map_err(|e| {
            CertError::Generation(format!(
                "Failed to create certs directory {}: {e}",
                out_dir.display()
            ))
        })?;
        let leaf_key_path = out_dir.join(LEAF_KEY_FILENAME);
        let leaf_cert_path = out_dir.join(LEAF_CERT_FILENAME);
        let leaf_key_pem = zeroize::Zeroizing::new(leaf_key.serialize_pem());
        write_pem_file(&leaf_key_path, &leaf_key_pem, "leaf key", Sensitivity::Secret)?;
        write_pem_file(&leaf_cert_path, &leaf_cert.pem(), "leaf certificate", Sensitivity::Public)?;

        info!(
            dir = %out_dir.display(),
            dns_names = ?names.dns_names(),
            ip_addresses = names.ip_addresses().len(),
            valid_for_secs = self.leaf_validity.as_secs(),
            "Issued connector leaf certificate"
        );

        Ok(CertBundle {
            root_cert: root_cert_path.to_path_buf(),
            root_key: root_key_path.to_path_buf(),
            leaf_cert: leaf_cert_path,
            leaf_key: leaf_key_path,
        })
    }

    fn leaf_names(&self, hosts: &[String], ips: &[IpAddr]) -> SubjectNames {
        let mut names = SubjectNames::default();
        names.add_host(LOOPBACK_NAME);
        names.add_host(&format!("*.local.{}", self.local_domain));
        names.add_host(self.grpc_bind.host());
        for host in hosts {
            names.add_host(host);
        }
        for ip in ips {
            names.add_ip(*ip);
        }
        names
    }
}

fn root_params() -> CertificateParams {
    let mut params = CertificateParams::default();
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params
        .distinguished_name
        .push(DnType::CommonName, ROOT_COMMON_NAME);
    params
        .distinguished_name
        .push(DnType::OrganizationName, ORGANIZATION);
    params.key_usages.push(KeyUsagePurpose::KeyCertSign);
    params.key_usages.push(KeyUsagePurpose::CrlSign);
    params.key_usages.push(KeyUsagePurpose::DigitalSignature);
    let now = OffsetDateTime::now_utc();
    params.not_before = now - CLOCK_SKEW;
    params.not_after = now + DEFAULT_ROOT_VALIDITY;
    params
}
