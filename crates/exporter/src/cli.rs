//! Command line interface

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use clap::{Parser, ValueEnum};
use swanmon_platform::{SwanmonError, SwanmonResult};
use swanmon_proto::collector::CollectorKind;
use swanmon_proto::command::DEFAULT_COMMAND;
use swanmon_proto::config::{ExporterConfig, DEFAULT_LISTEN_ADDRESS, DEFAULT_TELEMETRY_PATH};
use swanmon_proto::vici::{Endpoint, DEFAULT_ENDPOINT};

/// Log line encoding
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human readable `key=value` lines
    Logfmt,
    /// One JSON object per line
    Json,
}

#[derive(Parser, Debug)]
#[command(
    name = "swanmon",
    version,
    about = "Prometheus exporter for strongSwan and Libreswan IPsec daemons"
)]
pub struct Cli {
    /// Acquisition path: "vici" or "ipsec"
    #[arg(long = "collector", default_value = "vici")]
    pub collector: String,

    /// VICI socket, unix:///path or tcp://host:port
    #[arg(long = "vici.address", default_value = DEFAULT_ENDPOINT)]
    pub vici_address: String,

    /// VICI connect timeout (e.g. "1s", "500ms")
    #[arg(long = "vici.timeout", default_value = "1s", value_parser = parse_duration)]
    pub vici_timeout: Duration,

    /// Status command, split like a shell would
    #[arg(long = "ipsec.command", default_value = DEFAULT_COMMAND)]
    pub ipsec_command: String,

    /// Parse the output of status commands that exit unsuccessfully
    #[arg(long = "ipsec.allow-nonzero-exit")]
    pub allow_nonzero_exit: bool,

    /// Kill the status command after this long (unbounded if unset)
    #[arg(long = "ipsec.command-timeout", value_parser = parse_duration)]
    pub command_timeout: Option<Duration>,

    /// Address to listen on, ":port" binds all interfaces
    #[arg(long = "web.listen-address", default_value = ":9903")]
    pub listen_address: String,

    /// Path under which metrics are served
    #[arg(long = "web.telemetry-path", default_value = DEFAULT_TELEMETRY_PATH)]
    pub telemetry_path: String,

    /// Log level, overridden by RUST_LOG
    #[arg(long = "log.level", default_value = "info")]
    pub log_level: String,

    /// Log line encoding: "logfmt" or "json"
    #[arg(long = "log.format", value_enum, default_value = "logfmt")]
    pub log_format: LogFormat,
}

impl Cli {
    /// Turn the parsed flags into a validated configuration
    pub fn into_config(self) -> SwanmonResult<ExporterConfig> {
        let command = shlex::split(&self.ipsec_command).ok_or_else(|| {
            SwanmonError::Config(format!("cannot split command '{}'", self.ipsec_command))
        })?;

        ExporterConfig::builder()
            .with_collector(self.collector.parse::<CollectorKind>()?)
            .with_vici_endpoint(self.vici_address.parse::<Endpoint>()?)
            .with_vici_timeout(self.vici_timeout)
            .with_command(command)
            .with_allow_nonzero_exit(self.allow_nonzero_exit)
            .with_command_timeout(self.command_timeout)
            .with_listen_address(parse_listen_address(&self.listen_address)?)
            .with_telemetry_path(self.telemetry_path)
            .build()
    }
}

/// Parse a listen address, accepting the ":port" shorthand
pub fn parse_listen_address(s: &str) -> SwanmonResult<SocketAddr> {
    if let Some(port) = s.strip_prefix(':') {
        let port = port.parse::<u16>().map_err(|_| {
            SwanmonError::Config(format!("invalid listen address '{}'", s))
        })?;
        return Ok(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port));
    }
    s.parse().map_err(|_| {
        SwanmonError::Config(format!(
            "invalid listen address '{}', expected host:port like {}",
            s, DEFAULT_LISTEN_ADDRESS
        ))
    })
}

/// Parse durations such as "1s", "500ms", "1m30s" or a bare number of seconds
///
/// Each component is a decimal number followed by one of `ns`, `us` (`µs`),
/// `ms`, `s`, `m` or `h`.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if let Ok(seconds) = s.parse::<f64>() {
        return Duration::try_from_secs_f64(seconds)
            .map_err(|err| format!("invalid duration '{}': {}", s, err));
    }
    if s.is_empty() {
        return Err("empty duration".to_string());
    }

    let mut rest = s;
    let mut nanos = 0.0_f64;
    while !rest.is_empty() {
        let split = rest
            .find(|c: char| !c.is_ascii_digit() && c != '.')
            .unwrap_or(rest.len());
        let (value, tail) = rest.split_at(split);
        let value: f64 = value
            .parse()
            .map_err(|_| format!("invalid duration '{}'", s))?;

        let split = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(split);
        let scale = match unit {
            "ns" => 1.0,
            "us" | "µs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3_600e9,
            "" => return Err(format!("missing unit in duration '{}'", s)),
            other => return Err(format!("unknown duration unit '{}'", other)),
        };
        nanos += value * scale;
        rest = tail;
    }

    if !nanos.is_finite() || nanos > u64::MAX as f64 {
        return Err(format!("duration '{}' out of range", s));
    }
    Ok(Duration::from_nanos(nanos.round() as u64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::parse_from(["swanmon"]);
        assert_eq!(cli.collector, "vici");
        assert_eq!(cli.vici_timeout, Duration::from_secs(1));
        assert!(cli.command_timeout.is_none());
        assert_eq!(cli.log_format, LogFormat::Logfmt);

        let config = cli.into_config().unwrap();
        assert_eq!(config.collector, CollectorKind::Vici);
        assert_eq!(config.command, vec!["ipsec", "statusall"]);
        assert_eq!(config.listen_address, "0.0.0.0:9903".parse().unwrap());
        assert_eq!(config.telemetry_path, "/metrics");
    }

    #[test]
    fn test_flags() {
        let cli = Cli::parse_from([
            "swanmon",
            "--collector",
            "ipsec",
            "--ipsec.command",
            "sudo ipsec 'status all'",
            "--ipsec.allow-nonzero-exit",
            "--ipsec.command-timeout",
            "250ms",
            "--web.listen-address",
            "127.0.0.1:9100",
            "--vici.address",
            "tcp://127.0.0.1:4502",
        ]);
        let config = cli.into_config().unwrap();
        assert_eq!(config.collector, CollectorKind::Ipsec);
        assert_eq!(config.command, vec!["sudo", "ipsec", "status all"]);
        assert!(config.allow_nonzero_exit);
        assert_eq!(config.command_timeout, Some(Duration::from_millis(250)));
        assert_eq!(config.listen_address.port(), 9100);
        assert_eq!(config.vici_endpoint, Endpoint::Tcp("127.0.0.1:4502".into()));
    }

    #[test]
    fn test_invalid_flags() {
        let cli = Cli::parse_from(["swanmon", "--collector", "snmp"]);
        assert!(matches!(cli.into_config(), Err(SwanmonError::Config(_))));

        let cli = Cli::parse_from(["swanmon", "--ipsec.command", "ipsec 'unterminated"]);
        assert!(matches!(cli.into_config(), Err(SwanmonError::Config(_))));

        assert!(Cli::try_parse_from(["swanmon", "--vici.timeout", "soon"]).is_err());
    }

    #[test]
    fn test_parse_listen_address() {
        assert_eq!(parse_listen_address(":9903").unwrap(), "0.0.0.0:9903".parse().unwrap());
        assert_eq!(parse_listen_address("[::1]:80").unwrap(), "[::1]:80".parse().unwrap());
        assert!(parse_listen_address(":http").is_err());
        assert!(parse_listen_address("localhost").is_err());
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("1s").unwrap(), Duration::from_secs(1));
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration("1.5").unwrap(), Duration::from_millis(1500));
        assert!(parse_duration("5d").is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn test_parse_compound_duration() {
        assert_eq!(parse_duration("1m30s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("1h2m").unwrap(), Duration::from_secs(3_720));
        assert_eq!(parse_duration("2s250ms").unwrap(), Duration::from_millis(2_250));
        assert_eq!(parse_duration("1.5h").unwrap(), Duration::from_secs(5_400));
        assert_eq!(parse_duration("10us").unwrap(), Duration::from_micros(10));
        assert_eq!(parse_duration("10µs").unwrap(), Duration::from_micros(10));
        assert_eq!(parse_duration("7ns").unwrap(), Duration::from_nanos(7));
        assert!(parse_duration("1m30").is_err());
        assert!(parse_duration("m30s").is_err());
        assert!(parse_duration("-1s").is_err());
        assert!(parse_duration("1m 30s").is_err());
    }

    #[test]
    fn test_log_format() {
        let cli = Cli::parse_from(["swanmon", "--log.format", "json"]);
        assert_eq!(cli.log_format, LogFormat::Json);

        let cli = Cli::parse_from(["swanmon", "--log.format", "logfmt"]);
        assert_eq!(cli.log_format, LogFormat::Logfmt);

        assert!(Cli::try_parse_from(["swanmon", "--log.format", "xml"]).is_err());
    }
}
