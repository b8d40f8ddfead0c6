//! Certificate bundle store.
//!
//! Resolves the four bundle files in a directory and refuses to hand out a
//! bundle whose leaf is about to expire. Key material is never loaded here;
//! the TLS layer reads it at dial time.

use std::fmt;
use std::fs::File;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::debug;

use crate::error::BundleError;

pub const ROOT_CERT_FILENAME: &str = "root.cert";
pub const ROOT_KEY_FILENAME: &str = "root.key";
pub const LEAF_CERT_FILENAME: &str = "leaf.cert";
pub const LEAF_KEY_FILENAME: &str = "leaf.key";

/// A leaf with less than this left is treated as unusable.
pub const EXPIRY_MARGIN: Duration = Duration::from_secs(24 * 60 * 60);

/// One of the four files making up a bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BundleArtifact {
    RootCert,
    RootKey,
    LeafCert,
    LeafKey,
}

impl BundleArtifact {
    /// Every artifact, in the order they are checked.
    pub const ALL: [Self; 4] = [Self::RootCert, Self::RootKey, Self::LeafCert, Self::LeafKey];

    pub const fn file_name(self) -> &'static str {
        match self {
            Self::RootCert => ROOT_CERT_FILENAME,
            Self::RootKey => ROOT_KEY_FILENAME,
            Self::LeafCert => LEAF_CERT_FILENAME,
            Self::LeafKey => LEAF_KEY_FILENAME,
        }
    }

    pub const fn description(self) -> &'static str {
        match self {
            Self::RootCert => "root certificate",
            Self::RootKey => "root key",
            Self::LeafCert => "leaf certificate",
            Self::LeafKey => "leaf key",
        }
    }
}

impl fmt::Display for BundleArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Paths of a root CA and a leaf it signed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertBundle {
    pub root_cert: PathBuf,
    pub root_key: PathBuf,
    pub leaf_cert: PathBuf,
    pub leaf_key: PathBuf,
}

impl CertBundle {
    /// Standard bundle paths in `dir`, without checking existence.
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            root_cert: dir.join(ROOT_CERT_FILENAME),
            root_key: dir.join(ROOT_KEY_FILENAME),
            leaf_cert: dir.join(LEAF_CERT_FILENAME),
            leaf_key: dir.join(LEAF_KEY_FILENAME),
        }
    }

    pub fn path_of(&self, artifact: BundleArtifact) -> &Path {
        match artifact {
            BundleArtifact::RootCert => &self.root_cert,
            BundleArtifact::RootKey => &self.root_key,
            BundleArtifact::LeafCert => &self.leaf_cert,
            BundleArtifact::LeafKey => &self.leaf_key,
        }
    }
}

/// Resolve the bundle in `dir`, checking the leaf against the current time.
pub fn get_local_cert_bundle(dir: &Path) -> Result<CertBundle, BundleError> {
    get_local_cert_bundle_at(dir, SystemTime::now())
}

/// Resolve the bundle in `dir` as of `now`.
///
/// All four files must exist and be readable, and the leaf must stay valid
/// for more than [`EXPIRY_MARGIN`] past `now`. The root's own expiry is not
/// checked.
pub fn get_local_cert_bundle_at(dir: &Path, now: SystemTime) -> Result<CertBundle, BundleError> {
    let bundle = CertBundle::in_dir(dir);

    for artifact in BundleArtifact::ALL {
        if let Err(e) = File::open(bundle.path_of(artifact)) {
            return Err(match e.kind() {
                ErrorKind::NotFound => BundleError::Missing(artifact),
                _ => BundleError::Unreadable {
                    artifact,
                    reason: e.to_string(),
                },
            });
        }
    }

    let not_after = leaf_not_after(&bundle.leaf_cert)?;
    let remaining_secs = not_after.saturating_sub(unix_secs(now));
    let margin = i64::try_from(EXPIRY_MARGIN.as_secs()).unwrap_or(i64::MAX);
    if remaining_secs < margin {
        return Err(BundleError::Expiring {
            not_after,
            remaining_secs,
        });
    }

    debug!(dir = %dir.display(), remaining_secs, "Resolved certificate bundle");
    Ok(bundle)
}

/// `notAfter` of the PEM certificate at `path`, as unix seconds.
pub fn leaf_not_after(path: &Path) -> Result<i64, BundleError> {
    let artifact = BundleArtifact::LeafCert;
    let pem = crate::files::read_pem(path).map_err(|e| BundleError::Unreadable {
        artifact,
        reason: e.to_string(),
    })?;
    let invalid = |reason: String| BundleError::Invalid { artifact, reason };

    let (_, pem) = x509_parser::pem::parse_x509_pem(pem.as_bytes())
        .map_err(|e| invalid(format!("not PEM: {e}")))?;
    let cert = pem
        .parse_x509()
        .map_err(|e| invalid(format!("not an X.509 certificate: {e}")))?;
    Ok(cert.validity().not_after.timestamp())
}

fn unix_secs(t: SystemTime) -> i64 {
    t.duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn in_dir_uses_standard_names() {
        let bundle = CertBundle::in_dir(Path::new("/srv/certs"));
        assert_eq!(bundle.root_cert, Path::new("/srv/certs/root.cert"));
        assert_eq!(bundle.root_key, Path::new("/srv/certs/root.key"));
        assert_eq!(bundle.leaf_cert, Path::new("/srv/certs/leaf.cert"));
        assert_eq!(bundle.leaf_key, Path::new("/srv/certs/leaf.key"));
    }

    #[test]
    fn empty_dir_reports_root_certificate_first() {
        let dir = tempfile::tempdir().unwrap();
        let err = get_local_cert_bundle(dir.path()).unwrap_err();
        assert!(matches!(err, BundleError::Missing(BundleArtifact::RootCert)));
        assert_eq!(err.to_string(), "unable to find root certificate");
    }

    #[test]
    fn garbage_leaf_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        for artifact in BundleArtifact::ALL {
            fs::write(dir.path().join(artifact.file_name()), "not a pem").unwrap();
        }
        match get_local_cert_bundle(dir.path()).unwrap_err() {
            BundleError::Invalid { artifact, .. } => assert_eq!(artifact, BundleArtifact::LeafCert),
            other => panic!("expected invalid leaf, got {other:?}"),
        }
    }

    #[test]
    fn artifact_display_names() {
        let names: Vec<String> = BundleArtifact::ALL.iter().map(ToString::to_string).collect();
        assert_eq!(
            names,
            ["root certificate", "root key", "leaf certificate", "leaf key"]
        );
    }
}
