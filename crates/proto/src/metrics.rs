//! Exporter self-metrics
//!
//! Counts scrapes and failures and remembers the duration of the most recent
//! scrape. All counters use atomic operations, so one instance can be shared
//! by concurrent HTTP handlers.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use swanmon_proto::metrics::ScrapeMetrics;
//!
//! let metrics = ScrapeMetrics::new();
//! metrics.record_scrape(Duration::from_millis(250), true);
//!
//! let snapshot = metrics.snapshot();
//! assert_eq!(snapshot.scrapes_total, 1);
//! assert_eq!(snapshot.last_scrape_duration_seconds(), 0.25);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Scrape counters shared between clones
#[derive(Debug, Clone)]
pub struct ScrapeMetrics {
    /// Scrapes performed
    pub scrapes_total: Arc<AtomicU64>,

    /// Scrapes that ended with `ipsec_up 0`
    pub scrape_failures_total: Arc<AtomicU64>,

    /// Duration of the last scrape, in microseconds
    pub last_scrape_micros: Arc<AtomicU64>,
}

impl ScrapeMetrics {
    /// Create new metrics instance
    pub fn new() -> Self {
        Self {
            scrapes_total: Arc::new(AtomicU64::new(0)),
            scrape_failures_total: Arc::new(AtomicU64::new(0)),
            last_scrape_micros: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Record a finished scrape
    ///
    /// # Arguments
    ///
    /// * `duration` - Wall-clock time spent acquiring and emitting
    /// * `success` - Whether the scrape reported `ipsec_up 1`
    pub fn record_scrape(&self, duration: Duration, success: bool) {
        self.scrapes_total.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.scrape_failures_total.fetch_add(1, Ordering::Relaxed);
        }
        let micros = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);
        self.last_scrape_micros.store(micros, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    ///
    /// Values may be slightly inconsistent across fields under concurrent
    /// updates.
    pub fn snapshot(&self) -> ScrapeMetricsSnapshot {
        ScrapeMetricsSnapshot {
            scrapes_total: self.scrapes_total.load(Ordering::Relaxed),
            scrape_failures_total: self.scrape_failures_total.load(Ordering::Relaxed),
            last_scrape_micros: self.last_scrape_micros.load(Ordering::Relaxed),
        }
    }
}

impl Default for ScrapeMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time view of [`ScrapeMetrics`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScrapeMetricsSnapshot {
    /// Scrapes performed
    pub scrapes_total: u64,

    /// Failed scrapes
    pub scrape_failures_total: u64,

    /// Duration of the last scrape, in microseconds
    pub last_scrape_micros: u64,
}

impl ScrapeMetricsSnapshot {
    /// Duration of the last scrape in seconds
    pub fn last_scrape_duration_seconds(&self) -> f64 {
        self.last_scrape_micros as f64 / 1_000_000.0
    }
}
