//! Subcommand definitions and handlers.

use std::net::IpAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, warn};

use connector::{
    BundleArtifact, BundleError, CertBundle, Connector, ConnectorError, ControlPlane, Direction,
};
use connector_crypto::{CertificateAuthority, leaf_not_after};

#[derive(clap::Subcommand, Debug)]
pub enum Command {
    /// Start the daemon, bootstrapping or renewing certificates as needed.
    Start,

    /// Stop the daemon named by the PID file.
    Stop,

    /// Report whether the daemon is running.
    Status,

    /// Manage the certificate bundle.
    #[command(subcommand)]
    Certs(CertsAction),

    /// Expose a service through the daemon.
    Expose {
        /// Service name
        #[arg(long)]
        name: String,

        /// Port the tunnel listens on
        #[arg(long)]
        port: u16,

        /// Address where the service is reached
        #[arg(long)]
        dest: String,

        /// Control address of the peer connector
        #[arg(long, default_value = "")]
        remote_addr: String,

        /// `remote` if the destination sits behind the peer; anything else
        /// is local
        #[arg(long, default_value = "local")]
        direction: String,
    },

    /// Remove an exposed service by id.
    Remove {
        /// Service id returned by `expose`
        id: String,
    },

    /// List services the daemon currently exposes.
    List,
}

#[derive(clap::Subcommand, Debug)]
pub enum CertsAction {
    /// Create a new root CA and leaf, replacing any existing bundle.
    Generate {
        /// Output directory (default: configured certs dir)
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Issue a fresh leaf from the existing root.
    Leaf {
        /// DNS name or host:port to cover on top of the local names (repeatable)
        #[arg(long = "host")]
        hosts: Vec<String>,

        /// Extra IP address to cover (repeatable)
        #[arg(long = "ip")]
        ips: Vec<IpAddr>,

        /// Bundle directory holding the root (default: configured certs dir)
        #[arg(long)]
        dir: Option<PathBuf>,
    },

    /// Check that the bundle is complete and the leaf is not expiring.
    Check {
        /// Bundle directory (default: configured certs dir)
        #[arg(long)]
        dir: Option<PathBuf>,
    },
}

#[allow(clippy::print_stdout)]
pub async fn run<C: ControlPlane>(connector: &Connector<C>, command: Command) -> Result<()> {
    let certs_dir = connector.options().certs_dir.clone();

    match command {
        Command::Start => {
            let bundle = ensure_bundle(connector, &certs_dir)?;
            let pid_file = connector.start(&bundle)?;
            println!("connector started (PID file {})", pid_file.display());
        }
        Command::Stop => {
            connector.stop()?;
            println!("connector stopped");
        }
        Command::Status => {
            if connector.is_running() {
                println!("running");
            } else {
                println!("not running");
            }
        }
        Command::Certs(action) => run_certs(connector, &certs_dir, action)?,
        Command::Expose {
            name,
            port,
            dest,
            remote_addr,
            direction,
        } => {
            let id = connector
                .expose_service(&name, port, &remote_addr, &dest, direction.as_str())
                .await?;
            println!("{id}");
        }
        Command::Remove { id } => {
            connector.remove_service(&id).await?;
            println!("removed {id}");
        }
        Command::List => {
            let services = connector.list_services().await?;
            if services.is_empty() {
                println!("no services exposed");
            }
            for service in services {
                println!(
                    "{}\t{}\t{}\t{}\t{}\t{}",
                    service.id,
                    service.name,
                    direction_label(service.direction),
                    service.source_port,
                    service.destination_addr,
                    service.remote_connector_addr,
                );
            }
        }
    }
    Ok(())
}

#[allow(clippy::print_stdout)]
fn run_certs<C: ControlPlane>(
    connector: &Connector<C>,
    certs_dir: &Path,
    action: CertsAction,
) -> Result<()> {
    match action {
        CertsAction::Generate { out } => {
            let out = out.unwrap_or_else(|| certs_dir.to_path_buf());
            let bundle = connector.generate_local_cert_bundle(&out)?;
            println!("generated bundle in {}", out.display());
            print_expiry(&bundle)?;
        }
        CertsAction::Leaf { hosts, ips, dir } => {
            let dir = dir.unwrap_or_else(|| certs_dir.to_path_buf());
            let bundle = renew_leaf(connector, &dir, &hosts, &ips)?;
            println!("issued leaf in {}", dir.display());
            print_expiry(&bundle)?;
        }
        CertsAction::Check { dir } => {
            let dir = dir.unwrap_or_else(|| certs_dir.to_path_buf());
            let bundle = connector.get_local_cert_bundle(&dir)?;
            println!("bundle in {} is valid", dir.display());
            print_expiry(&bundle)?;
        }
    }
    Ok(())
}

/// Resolve the bundle for a daemon start, repairing what can be repaired.
///
/// Only a missing root triggers a fresh bootstrap. A missing or expiring
/// leaf is reissued from the existing root so peers trusting it keep
/// working.
fn ensure_bundle<C: ControlPlane>(connector: &Connector<C>, certs_dir: &Path) -> Result<CertBundle> {
    match connector.get_local_cert_bundle(certs_dir) {
        Ok(bundle) => Ok(bundle),
        Err(ConnectorError::Bundle(BundleError::Missing(
            artifact @ (BundleArtifact::RootCert | BundleArtifact::RootKey),
        ))) => {
            info!(%artifact, dir = %certs_dir.display(), "Bootstrapping certificate bundle");
            Ok(connector.generate_local_cert_bundle(certs_dir)?)
        }
        Err(ConnectorError::Bundle(BundleError::Missing(artifact))) => {
            info!(%artifact, dir = %certs_dir.display(), "Reissuing leaf from existing root");
            renew_leaf(connector, certs_dir, &[], &[])
        }
        Err(ConnectorError::Bundle(BundleError::Expiring { remaining_secs, .. })) => {
            warn!(remaining_secs, "Leaf certificate expiring, reissuing");
            renew_leaf(connector, certs_dir, &[], &[])
        }
        Err(e) => Err(e).context("Failed to resolve certificate bundle"),
    }
}

/// Issue a leaf from the root in `dir` covering everything the bootstrap
/// leaf covers, plus the given extras.
fn renew_leaf<C: ControlPlane>(
    connector: &Connector<C>,
    dir: &Path,
    extra_hosts: &[String],
    extra_ips: &[IpAddr],
) -> Result<CertBundle> {
    let authority = CertificateAuthority::from_options(connector.options())?;
    let mut subjects = authority.local_subjects();
    subjects.extend(extra_hosts, extra_ips);

    let root = CertBundle::in_dir(dir);
    Ok(connector.generate_leaf_cert(
        &root.root_key,
        &root.root_cert,
        &subjects.hosts,
        &subjects.ips,
        dir,
    )?)
}

#[allow(clippy::print_stdout)]
fn print_expiry(bundle: &CertBundle) -> Result<()> {
    let not_after = leaf_not_after(&bundle.leaf_cert)?;
    println!("leaf expires at unix time {not_after}");
    Ok(())
}

const fn direction_label(direction: Direction) -> &'static str {
    match direction {
        Direction::Local => "local",
        Direction::Remote => "remote",
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use connector::{ConnectorOptions, TlsControlClient};
    use x509_parser::extensions::{GeneralName, ParsedExtension};

    use super::*;

    fn sorted_sans(path: &Path) -> Vec<String> {
        let pem = std::fs::read(path).unwrap();
        let (_, pem) = x509_parser::pem::parse_x509_pem(&pem).unwrap();
        let cert = pem.parse_x509().unwrap();
        let mut out = Vec::new();
        for ext in cert.extensions() {
            if let ParsedExtension::SubjectAlternativeName(san) = ext.parsed_extension() {
                for name in &san.general_names {
                    match name {
                        GeneralName::DNSName(dns) => out.push((*dns).to_string()),
                        GeneralName::IPAddress(bytes) => out.push(format!("{bytes:?}")),
                        _ => {}
                    }
                }
            }
        }
        out.sort();
        out
    }

    fn connector(dir: &Path) -> Connector<TlsControlClient> {
        Connector::new(ConnectorOptions {
            certs_dir: dir.join("certs"),
            pid_file: dir.join("connector.pid"),
            log_directory: dir.join("logs"),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn ensure_bundle_bootstraps_missing_bundle() {
        let dir = tempfile::tempdir().unwrap();
        let connector = connector(dir.path());
        let certs = dir.path().join("certs");

        let bundle = ensure_bundle(&connector, &certs).unwrap();
        assert_eq!(bundle, CertBundle::in_dir(&certs));
        assert!(bundle.leaf_key.is_file());
    }

    #[test]
    fn ensure_bundle_reuses_valid_bundle() {
        let dir = tempfile::tempdir().unwrap();
        let connector = connector(dir.path());
        let certs = dir.path().join("certs");
        let first = connector.generate_local_cert_bundle(&certs).unwrap();
        let root_before = std::fs::read(&first.root_cert).unwrap();
        let leaf_before = std::fs::read(&first.leaf_cert).unwrap();

        ensure_bundle(&connector, &certs).unwrap();
        assert_eq!(std::fs::read(&first.root_cert).unwrap(), root_before);
        assert_eq!(std::fs::read(&first.leaf_cert).unwrap(), leaf_before);
    }

    #[test]
    fn ensure_bundle_reissues_missing_leaf_from_existing_root() {
        let dir = tempfile::tempdir().unwrap();
        let connector = connector(dir.path());
        let certs = dir.path().join("certs");
        let first = connector.generate_local_cert_bundle(&certs).unwrap();
        let root_cert_before = std::fs::read(&first.root_cert).unwrap();
        let root_key_before = std::fs::read(&first.root_key).unwrap();
        let sans_before = sorted_sans(&first.leaf_cert);

        for missing in [&first.leaf_key, &first.leaf_cert] {
            std::fs::remove_file(missing).unwrap();

            let bundle = ensure_bundle(&connector, &certs).unwrap();
            assert!(bundle.leaf_key.is_file());
            assert!(bundle.leaf_cert.is_file());
            assert_eq!(std::fs::read(&first.root_cert).unwrap(), root_cert_before);
            assert_eq!(std::fs::read(&first.root_key).unwrap(), root_key_before);
            assert_eq!(sorted_sans(&bundle.leaf_cert), sans_before);
        }
    }

    #[test]
    fn ensure_bundle_bootstraps_when_root_is_missing() {
        let dir = tempfile::tempdir().unwrap();
        let connector = connector(dir.path());
        let certs = dir.path().join("certs");
        let first = connector.generate_local_cert_bundle(&certs).unwrap();
        let root_before = std::fs::read(&first.root_cert).unwrap();
        std::fs::remove_file(&first.root_key).unwrap();

        let bundle = ensure_bundle(&connector, &certs).unwrap();
        assert!(bundle.root_key.is_file());
        assert_ne!(std::fs::read(&bundle.root_cert).unwrap(), root_before);
    }

    #[test]
    fn ensure_bundle_renews_expiring_leaf_with_bootstrap_sans() {
        let dir = tempfile::tempdir().unwrap();
        let connector = connector(dir.path());
        let certs = dir.path().join("certs");
        let first = connector.generate_local_cert_bundle(&certs).unwrap();
        let root_before = std::fs::read(&first.root_cert).unwrap();
        let sans_before = sorted_sans(&first.leaf_cert);

        // Replace the leaf with a one-hour leaf carrying only the fixed names.
        let options = connector.options();
        CertificateAuthority::new(
            options.grpc_addr().unwrap(),
            options.http_addr().unwrap(),
            options.local_domain.clone(),
            Duration::from_secs(3600),
        )
        .generate_leaf_cert(&first.root_key, &first.root_cert, &[], &[], &certs)
        .unwrap();
        assert!(matches!(
            connector.get_local_cert_bundle(&certs),
            Err(ConnectorError::Bundle(BundleError::Expiring { .. }))
        ));

        let bundle = ensure_bundle(&connector, &certs).unwrap();
        connector.get_local_cert_bundle(&certs).unwrap();
        assert_eq!(std::fs::read(&bundle.root_cert).unwrap(), root_before);
        assert_eq!(sorted_sans(&bundle.leaf_cert), sans_before);
    }

    #[test]
    fn direction_labels() {
        assert_eq!(direction_label(Direction::from("remote")), "remote");
        assert_eq!(direction_label(Direction::from("")), "local");
    }
}
