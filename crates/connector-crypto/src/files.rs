//! PEM file IO.

use std::fs;
use std::io::Write;
use std::path::Path;

use zeroize::Zeroizing;

use crate::error::CertError;

/// Whether a PEM holds key material.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Sensitivity {
    Public,
    Secret,
}

/// Write a PEM file atomically.
///
/// Content lands in a temporary file in the target directory and is renamed
/// over `path`, so readers never see a partial file. Secret files are
/// owner-only (0600) on unix.
pub(crate) fn write_pem_file(
    path: &Path,
    content: &str,
    description: &str,
    sensitivity: Sensitivity,
) -> Result<(), CertError> {
    let failed = |e: std::io::Error| {
        CertError::Generation(format!("Failed to write {description} {}: {e}", path.display()))
    };

    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(failed)?;
    tmp.write_all(content.as_bytes()).map_err(failed)?;
    tmp.as_file().sync_all().map_err(failed)?;

    #[cfg(unix)]
    set_mode(tmp.path(), sensitivity).map_err(failed)?;
    #[cfg(not(unix))]
    let _ = sensitivity;

    tmp.persist(path).map_err(|e| failed(e.error))?;
    Ok(())
}

#[cfg(unix)]
fn set_mode(path: &Path, sensitivity: Sensitivity) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mode = match sensitivity {
        Sensitivity::Secret => 0o600,
        Sensitivity::Public => 0o644,
    };
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

/// Read a PEM file into memory that is wiped on drop.
pub fn read_pem(path: &Path) -> std::io::Result<Zeroizing<String>> {
    fs::read_to_string(path).map(Zeroizing::new)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn write_replaces_existing_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("leaf.cert");
        fs::write(&path, "stale").unwrap();

        write_pem_file(&path, "fresh", "leaf certificate", Sensitivity::Public).unwrap();

        assert_eq!(*read_pem(&path).unwrap(), "fresh");
        // No temp files left behind
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn secret_files_are_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let key = dir.path().join("leaf.key");
        let cert = dir.path().join("leaf.cert");
        write_pem_file(&key, "k", "leaf key", Sensitivity::Secret).unwrap();
        write_pem_file(&cert, "c", "leaf certificate", Sensitivity::Public).unwrap();

        let key_mode = fs::metadata(&key).unwrap().permissions().mode() & 0o777;
        let cert_mode = fs::metadata(&cert).unwrap().permissions().mode() & 0o777;
        assert_eq!(key_mode, 0o600);
        assert_eq!(cert_mode, 0o644);
    }

    #[test]
    fn missing_directory_is_generation_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent").join("root.key");
        let err = write_pem_file(&path, "k", "root key", Sensitivity::Secret).unwrap_err();
        assert!(err.to_string().contains("root key"), "got: {err}");
    }
}
