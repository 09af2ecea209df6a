//! Exporter configuration
//!
//! Provides [`ExporterConfig`] and its builder. The binary fills the builder
//! from the command line; tests build configurations directly.

use std::net::SocketAddr;
use std::time::Duration;

use swanmon_platform::{SwanmonError, SwanmonResult};

use crate::collector::{Collector, CollectorKind, Source};
use crate::command::{CommandRunner, DEFAULT_COMMAND};
use crate::vici::{Endpoint, ViciPoller, DEFAULT_TIMEOUT};

/// Default listen address
pub const DEFAULT_LISTEN_ADDRESS: &str = "0.0.0.0:9903";

/// Default telemetry path
pub const DEFAULT_TELEMETRY_PATH: &str = "/metrics";

/// Exporter configuration
#[derive(Clone, Debug)]
pub struct ExporterConfig {
    /// Acquisition path
    pub collector: CollectorKind,

    /// VICI socket
    pub vici_endpoint: Endpoint,

    /// VICI connect timeout
    pub vici_timeout: Duration,

    /// Status command and its arguments
    pub command: Vec<String>,

    /// Keep the output of unsuccessful status commands
    pub allow_nonzero_exit: bool,

    /// Status command timeout (unbounded if `None`)
    pub command_timeout: Option<Duration>,

    /// HTTP listen address
    pub listen_address: SocketAddr,

    /// Path serving the metrics
    pub telemetry_path: String,
}

impl ExporterConfig {
    /// Create builder for exporter configuration
    pub fn builder() -> ExporterBuilder {
        ExporterBuilder::new()
    }

    /// Validate configuration
    pub fn validate(&self) -> SwanmonResult<()> {
        if self.command.first().map_or(true, |program| program.is_empty()) {
            return Err(SwanmonError::Config("status command cannot be empty".into()));
        }
        if self.vici_timeout.is_zero() {
            return Err(SwanmonError::Config("VICI timeout must be positive".into()));
        }
        if self.command_timeout.is_some_and(|timeout| timeout.is_zero()) {
            return Err(SwanmonError::Config("command timeout must be positive".into()));
        }
        if !self.telemetry_path.starts_with('/') {
            return Err(SwanmonError::Config(format!(
                "telemetry path '{}' must start with '/'",
                self.telemetry_path
            )));
        }
        if self.telemetry_path == "/" {
            return Err(SwanmonError::Config(
                "telemetry path cannot be the landing page".into(),
            ));
        }
        Ok(())
    }

    /// Build the collector for the configured acquisition path
    ///
    /// # Errors
    ///
    /// Returns `SwanmonError::Config` if the status command is empty.
    pub fn build_collector(&self) -> SwanmonResult<Collector> {
        let source = match self.collector {
            CollectorKind::Vici => Source::Vici(ViciPoller::new(
                self.vici_endpoint.clone(),
                self.vici_timeout,
            )),
            CollectorKind::Ipsec => Source::Command(
                CommandRunner::new(self.command.clone())?
                    .allow_nonzero_exit(self.allow_nonzero_exit)
                    .with_timeout(self.command_timeout),
            ),
        };
        Ok(Collector::new(source))
    }
}

/// Builder for ExporterConfig
#[derive(Default)]
pub struct ExporterBuilder {
    collector: Option<CollectorKind>,
    vici_endpoint: Option<Endpoint>,
    vici_timeout: Option<Duration>,
    command: Option<Vec<String>>,
    allow_nonzero_exit: bool,
    command_timeout: Option<Duration>,
    listen_address: Option<SocketAddr>,
    telemetry_path: Option<String>,
}

impl ExporterBuilder {
    /// Create new exporter builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set acquisition path
    pub fn with_collector(mut self, collector: CollectorKind) -> Self {
        self.collector = Some(collector);
        self
    }

    /// Set VICI socket
    pub fn with_vici_endpoint(mut self, endpoint: Endpoint) -> Self {
        self.vici_endpoint = Some(endpoint);
        self
    }

    /// Set VICI connect timeout
    pub fn with_vici_timeout(mut self, timeout: Duration) -> Self {
        self.vici_timeout = Some(timeout);
        self
    }

    /// Set status command
    pub fn with_command(mut self, argv: Vec<String>) -> Self {
        self.command = Some(argv);
        self
    }

    /// Keep the output of unsuccessful status commands
    pub fn with_allow_nonzero_exit(mut self, allow: bool) -> Self {
        self.allow_nonzero_exit = allow;
        self
    }

    /// Set status command timeout
    pub fn with_command_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Set HTTP listen address
    pub fn with_listen_address(mut self, address: SocketAddr) -> Self {
        self.listen_address = Some(address);
        self
    }

    /// Set telemetry path
    pub fn with_telemetry_path(mut self, path: impl Into<String>) -> Self {
        self.telemetry_path = Some(path.into());
        self
    }

    /// Build ExporterConfig with validation
    pub fn build(self) -> SwanmonResult<ExporterConfig> {
        let listen_address = match self.listen_address {
            Some(address) => address,
            None => DEFAULT_LISTEN_ADDRESS.parse().map_err(|_| {
                SwanmonError::Config(format!(
                    "invalid listen address '{}'",
                    DEFAULT_LISTEN_ADDRESS
                ))
            })?,
        };

        let config = ExporterConfig {
            collector: self.collector.unwrap_or_default(),
            vici_endpoint: self.vici_endpoint.unwrap_or_default(),
            vici_timeout: self.vici_timeout.unwrap_or(DEFAULT_TIMEOUT),
            command: self.command.unwrap_or_else(|| {
                DEFAULT_COMMAND
                    .split_whitespace()
                    .map(str::to_string)
                    .collect()
            }),
            allow_nonzero_exit: self.allow_nonzero_exit,
            command_timeout: self.command_timeout,
            listen_address,
            telemetry_path: self
                .telemetry_path
                .unwrap_or_else(|| DEFAULT_TELEMETRY_PATH.to_string()),
        };

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ExporterConfig::builder().build().unwrap();
        assert_eq!(config.collector, CollectorKind::Vici);
        assert_eq!(config.vici_endpoint, Endpoint::default());
        assert_eq!(config.vici_timeout, Duration::from_secs(1));
        assert_eq!(config.command, vec!["ipsec", "statusall"]);
        assert!(!config.allow_nonzero_exit);
        assert!(config.command_timeout.is_none());
        assert_eq!(config.listen_address.port(), 9903);
        assert_eq!(config.telemetry_path, "/metrics");
    }

    #[test]
    fn test_builder_overrides() {
        let config = ExporterConfig::builder()
            .with_collector(CollectorKind::Ipsec)
            .with_command(vec!["ipsec".into(), "status".into()])
            .with_allow_nonzero_exit(true)
            .with_command_timeout(Some(Duration::from_secs(5)))
            .with_listen_address("127.0.0.1:9000".parse().unwrap())
            .with_telemetry_path("/probe")
            .build()
            .unwrap();

        assert_eq!(config.collector, CollectorKind::Ipsec);
        assert_eq!(config.command, vec!["ipsec", "status"]);
        assert!(config.allow_nonzero_exit);
        assert_eq!(config.command_timeout, Some(Duration::from_secs(5)));
        assert_eq!(config.telemetry_path, "/probe");

        let collector = config.build_collector().unwrap();
        assert_eq!(collector.kind(), CollectorKind::Ipsec);
    }

    #[test]
    fn test_validation() {
        assert!(matches!(
            ExporterConfig::builder().with_command(vec![]).build(),
            Err(SwanmonError::Config(_))
        ));
        assert!(matches!(
            ExporterConfig::builder()
                .with_vici_timeout(Duration::ZERO)
                .build(),
            Err(SwanmonError::Config(_))
        ));
        assert!(matches!(
            ExporterConfig::builder()
                .with_command_timeout(Some(Duration::ZERO))
                .build(),
            Err(SwanmonError::Config(_))
        ));
        assert!(matches!(
            ExporterConfig::builder().with_telemetry_path("metrics").build(),
            Err(SwanmonError::Config(_))
        ));
        assert!(matches!(
            ExporterConfig::builder().with_telemetry_path("/").build(),
            Err(SwanmonError::Config(_))
        ));
    }
}
