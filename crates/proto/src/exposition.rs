//! Prometheus text exposition
//!
//! Every scrape renders into a fresh [`Registry`], so series that vanished
//! from the daemon never linger in the output.

use std::collections::HashSet;

use prometheus::{Encoder, Gauge, GaugeVec, IntCounter, IntGaugeVec, Opts, Registry, TextEncoder};
use swanmon_platform::{SwanmonError, SwanmonResult};

use crate::emitter::{Emission, Metric, NAMESPACE};
use crate::logging;
use crate::metrics::ScrapeMetricsSnapshot;

/// Content type of the rendered text
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

fn encode_error(err: prometheus::Error) -> SwanmonError {
    SwanmonError::Encode(err.to_string())
}

fn opts(name: &str, help: &str) -> Opts {
    Opts::new(name, help).namespace(NAMESPACE)
}

/// Render one emission plus the exporter's own metrics
///
/// # Errors
///
/// Returns `SwanmonError::Encode` if a sample does not fit its gauge or the
/// text encoder fails.
pub fn render(emission: &Emission, scrape: &ScrapeMetricsSnapshot) -> SwanmonResult<String> {
    let registry = Registry::new();

    for metric in Metric::ALL {
        let mut samples = emission
            .samples
            .iter()
            .filter(|sample| sample.metric == metric)
            .peekable();
        if samples.peek().is_none() {
            continue;
        }

        if metric.label_names().is_empty() {
            let gauge = Gauge::with_opts(opts(metric.name(), metric.help())).map_err(encode_error)?;
            for sample in samples {
                gauge.set(sample.value);
            }
            registry.register(Box::new(gauge)).map_err(encode_error)?;
        } else {
            let gauges = GaugeVec::new(opts(metric.name(), metric.help()), metric.label_names())
                .map_err(encode_error)?;
            let mut seen = HashSet::new();
            for sample in samples {
                if !seen.insert(sample.labels.as_slice()) {
                    logging::log_duplicate_series(metric.name(), &sample.labels);
                }
                let values: Vec<&str> = sample.labels.iter().map(String::as_str).collect();
                gauges
                    .get_metric_with_label_values(&values)
                    .map_err(encode_error)?
                    .set(sample.value);
            }
            registry.register(Box::new(gauges)).map_err(encode_error)?;
        }
    }

    register_self_metrics(&registry, scrape)?;

    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(&registry.gather(), &mut buffer)
        .map_err(encode_error)?;
    String::from_utf8(buffer).map_err(|err| SwanmonError::Encode(err.to_string()))
}

fn register_self_metrics(registry: &Registry, scrape: &ScrapeMetricsSnapshot) -> SwanmonResult<()> {
    let scrapes = IntCounter::with_opts(opts(
        "exporter_scrapes_total",
        "Total number of scrapes of the IPsec daemon.",
    ))
    .map_err(encode_error)?;
    scrapes.inc_by(scrape.scrapes_total);

    let failures = IntCounter::with_opts(opts(
        "exporter_scrape_failures_total",
        "Total number of scrapes that ended with ipsec_up 0.",
    ))
    .map_err(encode_error)?;
    failures.inc_by(scrape.scrape_failures_total);

    let duration = Gauge::with_opts(opts(
        "exporter_last_scrape_duration_seconds",
        "Duration of the last scrape in seconds.",
    ))
    .map_err(encode_error)?;
    duration.set(scrape.last_scrape_duration_seconds());

    let build_info = IntGaugeVec::new(
        opts("exporter_build_info", "Exporter build information."),
        &["version"],
    )
    .map_err(encode_error)?;
    build_info.with_label_values(&[crate::VERSION]).set(1);

    registry.register(Box::new(scrapes)).map_err(encode_error)?;
    registry.register(Box::new(failures)).map_err(encode_error)?;
    registry.register(Box::new(duration)).map_err(encode_error)?;
    registry.register(Box::new(build_info)).map_err(encode_error)?;
    Ok(())
}
