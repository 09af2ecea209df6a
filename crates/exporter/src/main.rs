//! swanmon - Prometheus exporter for strongSwan and Libreswan
//!
//! Usage:
//!   swanmon --collector vici --vici.address unix:///var/run/charon.vici
//!   swanmon --collector ipsec --ipsec.command "ipsec statusall"
//!
//! Metrics are served on `--web.listen-address` (default `:9903`) under
//! `--web.telemetry-path` (default `/metrics`). Logs go to stderr, as text or
//! as JSON with `--log.format json`.

mod cli;
mod server;

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use swanmon_platform::SwanmonResult;
use swanmon_proto::{logging, Emitter, Exporter, ExporterConfig};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, LogFormat};
use crate::server::Server;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    match cli.log_format {
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
        LogFormat::Logfmt => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }

    let config = match cli.into_config() {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(error = %err, "Invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "Exporter stopped");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: ExporterConfig) -> SwanmonResult<()> {
    let collector = config.build_collector()?;
    let exporter = Exporter::new(collector, Emitter::default());

    let listener = TcpListener::bind(config.listen_address).await?;
    logging::log_listening(
        &config.listen_address.to_string(),
        &config.telemetry_path,
        config.collector.as_str(),
    );

    Arc::new(Server::new(exporter, config.telemetry_path)).serve(listener).await
}
