//! Scrape pipeline
//!
//! An [`Exporter`] runs one acquisition per HTTP scrape, converts the outcome
//! into samples, and renders them together with its own counters.

use std::time::Instant;

use swanmon_platform::SwanmonResult;

use crate::collector::Collector;
use crate::emitter::{Emission, Emitter};
use crate::exposition;
use crate::metrics::ScrapeMetrics;

/// Collector, emitter and self-metrics for one exporter instance
#[derive(Debug)]
pub struct Exporter {
    collector: Collector,
    emitter: Emitter,
    metrics: ScrapeMetrics,
}

impl Exporter {
    /// Create an exporter around `collector`
    pub fn new(collector: Collector, emitter: Emitter) -> Self {
        Self {
            collector,
            emitter,
            metrics: ScrapeMetrics::new(),
        }
    }

    /// Configured collector
    pub fn collector(&self) -> &Collector {
        &self.collector
    }

    /// Exporter self-metrics
    pub fn metrics(&self) -> &ScrapeMetrics {
        &self.metrics
    }

    /// Run one scrape and return its samples
    ///
    /// Failures never propagate: they end up as `ipsec_up 0`.
    pub async fn scrape(&self) -> Emission {
        let started = Instant::now();
        let outcome = self.collector.collect().await;
        let emission = self.emitter.emit(&outcome);
        self.metrics.record_scrape(started.elapsed(), emission.up);
        emission
    }

    /// Run one scrape and render the exposition text
    ///
    /// # Errors
    ///
    /// Returns `SwanmonError::Encode` if the samples cannot be rendered.
    pub async fn scrape_text(&self) -> SwanmonResult<String> {
        let emission = self.scrape().await;
        exposition::render(&emission, &self.metrics.snapshot())
    }
}
