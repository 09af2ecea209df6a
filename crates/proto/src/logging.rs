//! Structured logging for scrape operations
//!
//! Provides structured, contextual logging using the `tracing` framework.
//! All log messages include relevant context fields for debugging.
//!
//! # Log Levels
//!
//! - **TRACE**: VICI packets and raw frame sizes
//! - **DEBUG**: Dialect detection, command execution, request round-trips
//! - **INFO**: Exporter start-up
//! - **WARN**: Unusual but recoverable conditions
//! - **ERROR**: Failed scrapes
//!
//! # Example
//!
//! ```no_run
//! use swanmon_proto::logging;
//!
//! tracing_subscriber::fmt()
//!     .with_env_filter("swanmon_proto=debug")
//!     .init();
//!
//! logging::log_scrape_started("vici");
//! logging::log_scrape_completed("vici", 2, 3, 12);
//! ```

use tracing::{debug, error, info, trace, warn};

/// Log the start of a scrape
///
/// # Arguments
///
/// * `collector` - Acquisition path ("vici" or "ipsec")
pub fn log_scrape_started(collector: &str) {
    debug!(collector = collector, "Scrape started");
}

/// Log a successful scrape
///
/// # Arguments
///
/// * `collector` - Acquisition path
/// * `ike_sas` - Number of IKE SAs in the snapshot
/// * `child_sas` - Number of Child SAs in the snapshot
/// * `duration_ms` - Acquisition time in milliseconds
pub fn log_scrape_completed(collector: &str, ike_sas: usize, child_sas: usize, duration_ms: u64) {
    debug!(
        collector = collector,
        ike_sas = ike_sas,
        child_sas = child_sas,
        duration_ms = duration_ms,
        "Scrape completed"
    );
}

/// Log a failed scrape
///
/// # Arguments
///
/// * `collector` - Acquisition path
/// * `error` - Error message
pub fn log_scrape_failed(collector: &str, error: &str) {
    error!(collector = collector, error = error, "Scrape failed");
}

/// Log a snapshot that could not be converted into metrics
///
/// # Arguments
///
/// * `error` - Error message
pub fn log_emit_failed(error: &str) {
    error!(error = error, "Failed to process snapshot");
}

/// Log a label set that occurs twice for one metric
///
/// # Arguments
///
/// * `metric` - Metric name
/// * `labels` - Repeated label values
pub fn log_duplicate_series(metric: &str, labels: &[String]) {
    warn!(metric = metric, labels = ?labels, "Duplicate series, keeping the last value");
}

/// Log the detected status dialect
///
/// # Arguments
///
/// * `dialect` - Dialect name
/// * `size_bytes` - Size of the parsed output
pub fn log_dialect_detected(dialect: &str, size_bytes: usize) {
    debug!(
        dialect = dialect,
        size_bytes = size_bytes,
        "Status dialect detected"
    );
}

/// Log execution of the status command
///
/// # Arguments
///
/// * `program` - Executable
/// * `args` - Arguments
pub fn log_command_exec(program: &str, args: &[String]) {
    debug!(program = program, args = ?args, "Executing status command");
}

/// Log an unsuccessful command exit
///
/// # Arguments
///
/// * `program` - Executable
/// * `code` - Exit code, `None` when killed by a signal
/// * `tolerated` - Whether the exit status is ignored
pub fn log_command_exit(program: &str, code: Option<i32>, tolerated: bool) {
    if tolerated {
        debug!(
            program = program,
            code = ?code,
            "Status command exited unsuccessfully, output kept"
        );
    } else {
        warn!(program = program, code = ?code, "Status command exited unsuccessfully");
    }
}

/// Log a VICI connection
///
/// # Arguments
///
/// * `endpoint` - Socket endpoint
pub fn log_vici_connect(endpoint: &str) {
    debug!(endpoint = endpoint, "Connected to VICI socket");
}

/// Log a VICI request round-trip
///
/// # Arguments
///
/// * `command` - Command name
/// * `events` - Number of streamed events received
pub fn log_vici_request(command: &str, events: usize) {
    debug!(command = command, events = events, "VICI request completed");
}

/// Log a VICI packet send
///
/// # Arguments
///
/// * `packet_type` - Packet type name
/// * `name` - Command or event name, if any
/// * `size_bytes` - Encoded packet size
pub fn log_packet_send(packet_type: &str, name: Option<&str>, size_bytes: usize) {
    trace!(
        packet_type = packet_type,
        name = ?name,
        size_bytes = size_bytes,
        "Sending VICI packet"
    );
}

/// Log a VICI packet receive
///
/// # Arguments
///
/// * `packet_type` - Packet type name
/// * `name` - Command or event name, if any
/// * `size_bytes` - Encoded packet size
pub fn log_packet_recv(packet_type: &str, name: Option<&str>, size_bytes: usize) {
    trace!(
        packet_type = packet_type,
        name = ?name,
        size_bytes = size_bytes,
        "Received VICI packet"
    );
}

/// Log exporter start-up
///
/// # Arguments
///
/// * `listen` - Listen address
/// * `path` - Telemetry path
/// * `collector` - Configured acquisition path
pub fn log_listening(listen: &str, path: &str, collector: &str) {
    info!(
        listen = listen,
        path = path,
        collector = collector,
        "Exporter listening"
    );
}

/// Log an HTTP connection error
///
/// # Arguments
///
/// * `peer_addr` - Remote address
/// * `error` - Error message
pub fn log_connection_error(peer_addr: &str, error: &str) {
    warn!(peer = peer_addr, error = error, "HTTP connection error");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logging_functions() {
        log_scrape_started("vici");
        log_scrape_completed("vici", 1, 2, 5);
        log_scrape_failed("ipsec", "Failed to recognize output type");

        log_emit_failed("Invalid uptime: 'yesterday'");
        log_duplicate_series("pool_ips_total", &["".to_string(), "10.0.0.0/24".to_string()]);
        log_dialect_detected("strongswan", 1024);

        log_command_exec("ipsec", &["statusall".to_string()]);
        log_command_exit("ipsec", Some(3), true);
        log_command_exit("ipsec", None, false);

        log_vici_connect("unix:///var/run/charon.vici");
        log_vici_request("list-sas", 4);
        log_packet_send("CMD_REQUEST", Some("stats"), 10);
        log_packet_recv("CMD_RESPONSE", None, 200);

        log_listening("0.0.0.0:9903", "/metrics", "vici");
        log_connection_error("127.0.0.1:40000", "connection reset");
    }
}
