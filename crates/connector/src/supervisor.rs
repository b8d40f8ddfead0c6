//! Daemon process supervision.
//!
//! The daemon runs detached in its own process group with its output
//! appended to `<log_dir>/connector.log`. The PID file is the only link
//! between a supervisor and the daemon it started, so a later process with
//! the same options can stop it.

use std::ffi::OsString;
use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use connector_core::ConnectorOptions;
use connector_crypto::CertBundle;
use tracing::{debug, info, warn};

/// Environment variable overriding the daemon log level at start time.
pub const LOG_LEVEL_ENV: &str = "CONNECTOR_LOG_LEVEL";
/// Level used when neither the environment nor the options set one.
pub const DEFAULT_LOG_LEVEL: &str = "info";

const POLL_INTERVAL: Duration = Duration::from_millis(50);
/// How long to wait for the process to vanish after SIGKILL.
const KILL_WAIT: Duration = Duration::from_secs(2);

/// Errors from starting or stopping the daemon.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("Daemon binary path is empty")]
    EmptyBinary,

    #[error("Failed to open daemon log {}: {reason}", .path.display())]
    LogFile { path: PathBuf, reason: String },

    #[error("Failed to spawn {program}: {reason}")]
    SpawnFailed { program: String, reason: String },

    #[error("Failed to write PID file {}: {reason}", .path.display())]
    PidFileWrite { path: PathBuf, reason: String },

    #[error("PID file {} not found", .path.display())]
    PidFileMissing { path: PathBuf },

    #[error("Failed to read PID file {}: {reason}", .path.display())]
    PidFileRead { path: PathBuf, reason: String },

    #[error("PID file {} does not hold a valid PID: {content:?}", .path.display())]
    PidFileMalformed { path: PathBuf, content: String },

    #[error("Failed to signal process {pid}: {reason}")]
    SignalFailed { pid: i32, reason: String },

    #[error("Process signalling is not supported on this platform")]
    Unsupported,
}

/// Resolved executable and argument list for one daemon launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonCommand {
    pub program: String,
    pub args: Vec<OsString>,
}

/// Starts, stops and probes the daemon named by one set of options.
#[derive(Debug, Clone)]
pub struct ProcessSupervisor {
    binary_path: String,
    grpc_bind: String,
    http_bind: String,
    api_bind: String,
    log_level: String,
    log_file: PathBuf,
    pid_file: PathBuf,
    stop_timeout: Duration,
}

impl ProcessSupervisor {
    pub fn new(options: &ConnectorOptions) -> Self {
        Self {
            binary_path: options.binary_path.clone(),
            grpc_bind: options.grpc_bind.clone(),
            http_bind: options.http_bind.clone(),
            api_bind: options.api_bind.clone(),
            log_level: options.log_level.clone(),
            log_file: options.log_file(),
            pid_file: options.pid_file.clone(),
            stop_timeout: options.stop_timeout(),
        }
    }

    pub fn pid_file(&self) -> &Path {
        &self.pid_file
    }

    /// Build the daemon invocation for `bundle` at the given log level.
    ///
    /// Extra whitespace-separated tokens in the binary path are passed to
    /// the executable ahead of the daemon arguments.
    pub fn daemon_command(
        &self,
        bundle: &CertBundle,
        log_level: &str,
    ) -> Result<DaemonCommand, ProcessError> {
        let mut tokens = self.binary_path.split_whitespace();
        let program = tokens.next().ok_or(ProcessError::EmptyBinary)?.to_string();

        let mut args: Vec<OsString> = tokens.map(OsString::from).collect();
        args.extend(
            ["--non-interactive", "connector", "run"]
                .into_iter()
                .map(OsString::from),
        );
        for (flag, value) in [
            ("--grpc-bind", OsString::from(&self.grpc_bind)),
            ("--http-bind", OsString::from(&self.http_bind)),
            ("--api-bind", OsString::from(&self.api_bind)),
            ("--root-cert-path", bundle.root_cert.clone().into_os_string()),
            ("--server-cert-path", bundle.leaf_cert.clone().into_os_string()),
            ("--server-key-path", bundle.leaf_key.clone().into_os_string()),
            ("--log-level", OsString::from(log_level)),
        ] {
            args.push(OsString::from(flag));
            args.push(value);
        }

        Ok(DaemonCommand { program, args })
    }

    /// Launch the daemon and record its PID.
    ///
    /// Returns the PID file path. Does not check for an already running
    /// daemon; a second start overwrites the PID file.
    pub fn start(&self, bundle: &CertBundle) -> Result<PathBuf, ProcessError> {
        let log_level = resolve_log_level(std::env::var(LOG_LEVEL_ENV).ok(), &self.log_level);
        let command = self.daemon_command(bundle, &log_level)?;

        let log = self.open_log()?;
        let log_err = log.try_clone().map_err(|e| ProcessError::LogFile {
            path: self.log_file.clone(),
            reason: e.to_string(),
        })?;

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err));
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        let mut child = cmd.spawn().map_err(|e| ProcessError::SpawnFailed {
            program: command.program.clone(),
            reason: e.to_string(),
        })?;
        let pid = child.id();

        if let Err(e) = write_pid_file(&self.pid_file, pid) {
            warn!(pid, error = %e, "Failed to record daemon PID, killing daemon");
            child.kill().ok();
            child.wait().ok();
            return Err(e);
        }

        // Reap the child if it exits while this process is still alive, so a
        // stopped daemon never lingers as a zombie that looks alive.
        let reaper = std::thread::Builder::new()
            .name("connector-reaper".into())
            .spawn(move || match child.wait() {
                Ok(status) => debug!(pid, %status, "Connector daemon exited"),
                Err(e) => warn!(pid, error = %e, "Failed to wait for connector daemon"),
            });
        if let Err(e) = reaper {
            warn!(pid, error = %e, "Failed to spawn reaper thread");
        }

        info!(
            pid,
            program = %command.program,
            grpc_bind = %self.grpc_bind,
            log_level = %log_level,
            log_file = %self.log_file.display(),
            pid_file = %self.pid_file.display(),
            "Started connector daemon"
        );
        Ok(self.pid_file.clone())
    }

    /// Terminate the daemon named by the PID file.
    ///
    /// Sends SIGTERM, waits up to the stop timeout, then SIGKILLs. The PID
    /// file is removed once the process is gone. A PID file naming a dead
    /// process is removed and reported as a signal failure.
    pub fn stop(&self) -> Result<(), ProcessError> {
        let pid = read_pid_file(&self.pid_file)?;

        if let Err(e) = signal::terminate(pid) {
            if !signal::is_alive(pid) {
                self.remove_pid_file();
            }
            return Err(e);
        }
        info!(pid, "Sent SIGTERM to connector daemon");

        if !wait_for_exit(pid, self.stop_timeout) {
            warn!(
                pid,
                timeout_secs = self.stop_timeout.as_secs(),
                "Connector daemon ignored SIGTERM, killing"
            );
            signal::kill(pid)?;
            if !wait_for_exit(pid, KILL_WAIT) {
                warn!(pid, "Connector daemon still present after SIGKILL");
            }
        }

        self.remove_pid_file();
        info!(pid, "Stopped connector daemon");
        Ok(())
    }

    /// Whether the process named by the PID file is alive. Never fails.
    pub fn is_running(&self) -> bool {
        match read_pid_file(&self.pid_file) {
            Ok(pid) => signal::is_alive(pid),
            Err(e) => {
                debug!(error = %e, "No running connector daemon");
                false
            }
        }
    }

    fn open_log(&self) -> Result<fs::File, ProcessError> {
        let failed = |e: std::io::Error| ProcessError::LogFile {
            path: self.log_file.clone(),
            reason: e.to_string(),
        };
        if let Some(dir) = self.log_file.parent() {
            fs::create_dir_all(dir).map_err(failed)?;
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_file)
            .map_err(failed)
    }

    fn remove_pid_file(&self) {
        match fs::remove_file(&self.pid_file) {
            Ok(()) => debug!(pid_file = %self.pid_file.display(), "Removed PID file"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(pid_file = %self.pid_file.display(), error = %e, "Failed to remove PID file"),
        }
    }
}

/// Daemon log level: environment override, then configured, then `info`.
pub fn resolve_log_level(env: Option<String>, configured: &str) -> String {
    if let Some(level) = env.filter(|level| !level.trim().is_empty()) {
        return level;
    }
    if configured.trim().is_empty() {
        DEFAULT_LOG_LEVEL.to_string()
    } else {
        configured.to_string()
    }
}

fn write_pid_file(path: &Path, pid: u32) -> Result<(), ProcessError> {
    let failed = |e: std::io::Error| ProcessError::PidFileWrite {
        path: path.to_path_buf(),
        reason: e.to_string(),
    };
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(failed)?;
    }
    fs::write(path, format!("{pid}\n")).map_err(failed)
}

fn read_pid_file(path: &Path) -> Result<i32, ProcessError> {
    let content = fs::read_to_string(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => ProcessError::PidFileMissing {
            path: path.to_path_buf(),
        },
        _ => ProcessError::PidFileRead {
            path: path.to_path_buf(),
            reason: e.to_string(),
        },
    })?;
    // Zero and negative values address process groups when signalled.
    match content.trim().parse::<i32>() {
        Ok(pid) if pid > 0 => Ok(pid),
        _ => Err(ProcessError::PidFileMalformed {
            path: path.to_path_buf(),
            content: content.trim().to_string(),
        }),
    }
}

fn wait_for_exit(pid: i32, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if !signal::is_alive(pid) {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

#[cfg(unix)]
mod signal {
    use nix::errno::Errno;
    use nix::sys::signal::{self as nix_signal, Signal};
    use nix::unistd::Pid;

    use super::ProcessError;

    fn send(pid: i32, signal: Signal) -> Result<(), ProcessError> {
        nix_signal::kill(Pid::from_raw(pid), signal).map_err(|e| ProcessError::SignalFailed {
            pid,
            reason: e.to_string(),
        })
    }

    pub(super) fn terminate(pid: i32) -> Result<(), ProcessError> {
        send(pid, Signal::SIGTERM)
    }

    pub(super) fn kill(pid: i32) -> Result<(), ProcessError> {
        match send(pid, Signal::SIGKILL) {
            Err(_) if !is_alive(pid) => Ok(()),
            other => other,
        }
    }

    /// Null-signal probe. EPERM means the process exists under another user.
    pub(super) fn is_alive(pid: i32) -> bool {
        match nix_signal::kill(Pid::from_raw(pid), None) {
            Ok(()) | Err(Errno::EPERM) => true,
            Err(_) => false,
        }
    }
}

#[cfg(not(unix))]
mod signal {
    use super::ProcessError;

    pub(super) fn terminate(_pid: i32) -> Result<(), ProcessError> {
        Err(ProcessError::Unsupported)
    }

    pub(super) fn kill(_pid: i32) -> Result<(), ProcessError> {
        Err(ProcessError::Unsupported)
    }

    pub(super) fn is_alive(_pid: i32) -> bool {
        false
    }
}
