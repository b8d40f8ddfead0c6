//! Connector options.
//!
//! Resolution order (lowest to highest priority):
//! 1. Built-in defaults rooted at `$HOME/.connector/`
//! 2. TOML config file (explicit path, or `$HOME/.connector/connector.toml`)
//! 3. `CONNECTOR_<FIELD>` environment variables, one per field; durations
//!    use the `_SECS` field names and `log_directory` is `CONNECTOR_LOG_DIR`
//! 4. CLI flags, applied by the binary before construction
//!
//! Once handed to the facade the options are validated and never mutated.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::addr::BindAddr;
use crate::error::{Error, Result};

/// Directory under `$HOME` holding connector state.
pub const CONNECTOR_HOME_SUBDIR: &str = ".connector";
/// Default config file name inside the connector home.
pub const CONFIG_FILENAME: &str = "connector.toml";

/// Shortest leaf lifetime accepted. The bundle store refuses leaves with
/// less than this remaining, so a shorter validity could never be used.
pub const MIN_LEAF_VALIDITY: Duration = Duration::from_secs(24 * 60 * 60);

/// Process and network configuration for one connector endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectorOptions {
    /// Directory receiving the daemon's `connector.log`.
    pub log_directory: PathBuf,
    /// Daemon executable, optionally followed by space-separated arguments.
    pub binary_path: String,
    /// Control API listen address; also the pinned TLS server name.
    pub grpc_bind: String,
    pub http_bind: String,
    pub api_bind: String,
    /// Daemon log level unless `CONNECTOR_LOG_LEVEL` is set at start time.
    pub log_level: String,
    pub pid_file: PathBuf,
    /// Directory the control client resolves its certificate bundle from.
    pub certs_dir: PathBuf,
    /// Domain for the `*.local.<domain>` wildcard SAN on every leaf.
    pub local_domain: String,
    pub leaf_validity_secs: u64,
    pub connect_timeout_secs: u64,
    /// Deadline applied to every control RPC.
    pub rpc_timeout_secs: u64,
    /// Grace period between SIGTERM and SIGKILL when stopping the daemon.
    pub stop_timeout_secs: u64,
}

impl Default for ConnectorOptions {
    fn default() -> Self {
        let home = connector_home();
        Self {
            log_directory: home.join("logs"),
            binary_path: default_binary_path(),
            grpc_bind: ":30001".to_string(),
            http_bind: ":30002".to_string(),
            api_bind: ":30003".to_string(),
            log_level: "info".to_string(),
            pid_file: home.join("connector.pid"),
            certs_dir: home.join("certs"),
            local_domain: "connector.dev".to_string(),
            leaf_validity_secs: 72 * 60 * 60,
            connect_timeout_secs: 5,
            rpc_timeout_secs: 30,
            stop_timeout_secs: 5,
        }
    }
}

impl ConnectorOptions {
    /// Check every field that can be malformed.
    pub fn validate(&self) -> Result<()> {
        if self.binary_path.trim().is_empty() {
            return Err(Error::Config("binary path is empty".to_string()));
        }
        for (name, raw) in [
            ("grpc_bind", &self.grpc_bind),
            ("http_bind", &self.http_bind),
            ("api_bind", &self.api_bind),
        ] {
            BindAddr::parse(raw)
                .map_err(|Error::Config(reason)| Error::Config(format!("{name}: {reason}")))?;
        }
        if self.log_level.trim().is_empty() {
            return Err(Error::Config("log level is empty".to_string()));
        }
        if self.leaf_validity() <= MIN_LEAF_VALIDITY {
            return Err(Error::Config(format!(
                "leaf validity of {}s must exceed {}s",
                self.leaf_validity_secs,
                MIN_LEAF_VALIDITY.as_secs()
            )));
        }
        if self.rpc_timeout_secs == 0 || self.connect_timeout_secs == 0 {
            return Err(Error::Config("RPC timeouts must be non-zero".to_string()));
        }
        Ok(())
    }

    /// Parsed gRPC bind address.
    pub fn grpc_addr(&self) -> Result<BindAddr> {
        BindAddr::parse(&self.grpc_bind)
    }

    /// Parsed HTTP bind address.
    pub fn http_addr(&self) -> Result<BindAddr> {
        BindAddr::parse(&self.http_bind)
    }

    pub const fn leaf_validity(&self) -> Duration {
        Duration::from_secs(self.leaf_validity_secs)
    }

    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub const fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_secs)
    }

    pub const fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }

    /// Path of the daemon log file inside the log directory.
    pub fn log_file(&self) -> PathBuf {
        self.log_directory.join("connector.log")
    }
}

/// Load options with layered resolution.
///
/// An explicit `path` must exist; the default config file is optional.
pub fn load_options(path: Option<&Path>) -> Result<ConnectorOptions> {
    let mut options = match path {
        Some(path) => load_options_file(path)?,
        None => {
            let default_path = connector_home().join(CONFIG_FILENAME);
            if default_path.exists() {
                load_options_file(&default_path)?
            } else {
                debug!(path = %default_path.display(), "No config file, using defaults");
                ConnectorOptions::default()
            }
        }
    };

    let applied = apply_env_overrides(&mut options, |key| std::env::var(key).ok());
    if !applied.is_empty() {
        debug!(vars = ?applied, "Applied environment overrides");
    }

    Ok(options)
}

/// Root of connector state, falling back to the temp dir without `$HOME`.
pub fn connector_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(CONNECTOR_HOME_SUBDIR)
}

fn default_binary_path() -> String {
    std::env::current_exe()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "connector".to_string())
}

fn load_options_file(path: &Path) -> Result<ConnectorOptions> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    let options = toml::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })?;
    debug!(path = %path.display(), "Loaded config file");
    Ok(options)
}

/// Apply `CONNECTOR_*` overrides, returning the names that took effect.
///
/// Empty values and unparseable numbers are ignored.
fn apply_env_overrides(
    options: &mut ConnectorOptions,
    var: impl Fn(&str) -> Option<String>,
) -> Vec<&'static str> {
    let mut applied = Vec::new();
    let mut lookup = |key: &'static str| {
        let val = var(key).filter(|v| !v.trim().is_empty())?;
        applied.push(key);
        Some(val)
    };

    if let Some(val) = lookup("CONNECTOR_LOG_DIR") {
        options.log_directory = PathBuf::from(val);
    }
    if let Some(val) = lookup("CONNECTOR_BINARY_PATH") {
        options.binary_path = val;
    }
    if let Some(val) = lookup("CONNECTOR_GRPC_BIND") {
        options.grpc_bind = val;
    }
    if let Some(val) = lookup("CONNECTOR_HTTP_BIND") {
        options.http_bind = val;
    }
    if let Some(val) = lookup("CONNECTOR_API_BIND") {
        options.api_bind = val;
    }
    if let Some(val) = lookup("CONNECTOR_LOG_LEVEL") {
        options.log_level = val;
    }
    if let Some(val) = lookup("CONNECTOR_PID_FILE") {
        options.pid_file = PathBuf::from(val);
    }
    if let Some(val) = lookup("CONNECTOR_CERTS_DIR") {
        options.certs_dir = PathBuf::from(val);
    }
    if let Some(val) = lookup("CONNECTOR_LOCAL_DOMAIN") {
        options.local_domain = val;
    }

    let secs_fields: [(&'static str, &mut u64); 4] = [
        ("CONNECTOR_LEAF_VALIDITY_SECS", &mut options.leaf_validity_secs),
        ("CONNECTOR_CONNECT_TIMEOUT_SECS", &mut options.connect_timeout_secs),
        ("CONNECTOR_RPC_TIMEOUT_SECS", &mut options.rpc_timeout_secs),
        ("CONNECTOR_STOP_TIMEOUT_SECS", &mut options.stop_timeout_secs),
    ];
    for (key, field) in secs_fields {
        if let Some(n) = var(key).and_then(|v| v.trim().parse().ok()) {
            *field = n;
            applied.push(key);
        }
    }

    applied
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_connector_conventions() {
        let options = ConnectorOptions::default();
        assert_eq!(options.grpc_bind, ":30001");
        assert_eq!(options.http_bind, ":30002");
        assert_eq!(options.api_bind, ":30003");
        assert_eq!(options.log_level, "info");
        assert_eq!(options.leaf_validity(), Duration::from_secs(72 * 3600));
        assert!(options.pid_file.ends_with(".connector/connector.pid"));
        assert!(options.log_file().ends_with("logs/connector.log"));
        options.validate().unwrap();
    }

    #[test]
    fn validate_rejects_malformed_bind() {
        let options = ConnectorOptions {
            http_bind: "no-port".into(),
            ..Default::default()
        };
        let err = options.validate().unwrap_err();
        assert!(err.to_string().contains("http_bind"), "got: {err}");
    }

    #[test]
    fn validate_rejects_empty_binary() {
        let options = ConnectorOptions {
            binary_path: "   ".into(),
            ..Default::default()
        };
        assert!(matches!(options.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn validate_rejects_leaf_validity_inside_expiry_margin() {
        let options = ConnectorOptions {
            leaf_validity_secs: 24 * 3600,
            ..Default::default()
        };
        assert!(options.validate().is_err());

        let options = ConnectorOptions {
            leaf_validity_secs: 25 * 3600,
            ..Default::default()
        };
        options.validate().unwrap();
    }

    #[test]
    fn toml_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("connector.toml");
        std::fs::write(
            &path,
            "grpc_bind = \"127.0.0.1:40001\"\nlog_level = \"debug\"\nleaf_validity_secs = 172800\n",
        )
        .unwrap();

        let options = load_options_file(&path).unwrap();
        assert_eq!(options.grpc_bind, "127.0.0.1:40001");
        assert_eq!(options.log_level, "debug");
        assert_eq!(options.leaf_validity_secs, 172_800);
        // Unset keys keep their defaults
        assert_eq!(options.http_bind, ":30002");
    }

    #[test]
    fn missing_explicit_file_is_config_error() {
        let err = load_options(Some(Path::new("/nonexistent/connector.toml"))).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn invalid_toml_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "grpc_bind = [").unwrap();
        assert!(matches!(load_options_file(&path), Err(Error::Config(_))));
    }

    #[test]
    fn env_overrides_apply_on_top() {
        let mut options = ConnectorOptions::default();
        apply_env_overrides(&mut options, |key| match key {
            "CONNECTOR_GRPC_BIND" => Some("10.0.0.1:1234".into()),
            "CONNECTOR_CERTS_DIR" => Some("/srv/certs".into()),
            "CONNECTOR_RPC_TIMEOUT_SECS" => Some("not-a-number".into()),
            _ => None,
        });
        assert_eq!(options.grpc_bind, "10.0.0.1:1234");
        assert_eq!(options.certs_dir, PathBuf::from("/srv/certs"));
        assert_eq!(options.rpc_timeout_secs, 30);
    }

    #[test]
    fn every_option_has_an_env_override() {
        let mut options = ConnectorOptions::default();
        let applied = apply_env_overrides(&mut options, |key| {
            let val = match key {
                "CONNECTOR_LOG_DIR" => "/var/log/connector",
                "CONNECTOR_BINARY_PATH" => "/usr/bin/connectord --verbose",
                "CONNECTOR_GRPC_BIND" => "127.0.0.1:41001",
                "CONNECTOR_HTTP_BIND" => "127.0.0.1:41002",
                "CONNECTOR_API_BIND" => "127.0.0.1:41003",
                "CONNECTOR_LOG_LEVEL" => "trace",
                "CONNECTOR_PID_FILE" => "/run/connector.pid",
                "CONNECTOR_CERTS_DIR" => "/etc/connector/certs",
                "CONNECTOR_LOCAL_DOMAIN" => "example.test",
                "CONNECTOR_LEAF_VALIDITY_SECS" => "259200",
                "CONNECTOR_CONNECT_TIMEOUT_SECS" => "7",
                "CONNECTOR_RPC_TIMEOUT_SECS" => " 45 ",
                "CONNECTOR_STOP_TIMEOUT_SECS" => "12",
                _ => return None,
            };
            Some(val.to_string())
        });

        let expected = ConnectorOptions {
            log_directory: PathBuf::from("/var/log/connector"),
            binary_path: "/usr/bin/connectord --verbose".into(),
            grpc_bind: "127.0.0.1:41001".into(),
            http_bind: "127.0.0.1:41002".into(),
            api_bind: "127.0.0.1:41003".into(),
            log_level: "trace".into(),
            pid_file: PathBuf::from("/run/connector.pid"),
            certs_dir: PathBuf::from("/etc/connector/certs"),
            local_domain: "example.test".into(),
            leaf_validity_secs: 259_200,
            connect_timeout_secs: 7,
            rpc_timeout_secs: 45,
            stop_timeout_secs: 12,
        };
        assert_eq!(options, expected);
        assert_eq!(applied.len(), 13);
    }

    #[test]
    fn empty_env_values_are_ignored() {
        let mut options = ConnectorOptions::default();
        let applied = apply_env_overrides(&mut options, |key| match key {
            "CONNECTOR_LOG_LEVEL" | "CONNECTOR_LOCAL_DOMAIN" => Some("  ".into()),
            _ => None,
        });
        assert!(applied.is_empty());
        assert_eq!(options, ConnectorOptions::default());
    }
}
