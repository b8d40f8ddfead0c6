//! Connector CLI
//!
//! Starts and stops the connector daemon, manages its certificate bundle
//! and drives its control API.

use std::path::PathBuf;

use clap::Parser;
use tracing::info;

use connector::{Connector, ConnectorOptions};

mod commands;

use commands::Command;

#[derive(Parser, Debug)]
#[command(name = "connector")]
#[command(version, about = "Connector daemon and service tunnel manager", long_about = None)]
struct Cli {
    /// Config file (default: `$HOME/.connector/connector.toml` if present)
    #[arg(long, global = true, env = "CONNECTOR_CONFIG")]
    config: Option<PathBuf>,

    /// Control API address of the daemon
    #[arg(long, global = true)]
    grpc_bind: Option<String>,

    /// Certificate bundle directory
    #[arg(long, global = true)]
    certs_dir: Option<PathBuf>,

    /// Daemon executable, optionally followed by arguments
    #[arg(long, global = true)]
    binary_path: Option<String>,

    /// PID file tracking the daemon
    #[arg(long, global = true)]
    pid_file: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

impl Cli {
    /// Apply flag overrides on top of file and environment settings.
    fn options(&self) -> anyhow::Result<ConnectorOptions> {
        let mut options = connector_core::config::load_options(self.config.as_deref())?;
        if let Some(bind) = &self.grpc_bind {
            options.grpc_bind.clone_from(bind);
        }
        if let Some(dir) = &self.certs_dir {
            options.certs_dir.clone_from(dir);
        }
        if let Some(binary) = &self.binary_path {
            options.binary_path.clone_from(binary);
        }
        if let Some(pid_file) = &self.pid_file {
            options.pid_file.clone_from(pid_file);
        }
        Ok(options)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    connector_core::tracing_init::init_tracing("connector=info", cli.log_json);

    let options = cli.options()?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        grpc_bind = %options.grpc_bind,
        certs_dir = %options.certs_dir.display(),
        "Starting connector CLI"
    );

    let connector = Connector::new(options)?;
    commands::run(&connector, cli.command).await
}
