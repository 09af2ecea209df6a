//! Acquisition path selection and serialization
//!
//! A [`Collector`] owns exactly one acquisition path and guarantees that at
//! most one acquisition is in flight: concurrent scrapes queue on an async
//! mutex held for the whole acquisition.

use std::fmt;
use std::str::FromStr;
use std::time::Instant;

use async_trait::async_trait;
use swanmon_platform::{Scraper, SwanmonError, SwanmonResult};
use tokio::sync::Mutex;

use crate::command::CommandRunner;
use crate::logging;
use crate::model::Snapshot;
use crate::status;
use crate::vici::ViciPoller;

/// Configured acquisition path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CollectorKind {
    /// strongSwan VICI socket
    #[default]
    Vici,
    /// `ipsec` status command
    Ipsec,
}

impl CollectorKind {
    /// Name as used on the command line
    pub fn as_str(self) -> &'static str {
        match self {
            CollectorKind::Vici => "vici",
            CollectorKind::Ipsec => "ipsec",
        }
    }
}

impl FromStr for CollectorKind {
    type Err = SwanmonError;

    fn from_str(s: &str) -> SwanmonResult<Self> {
        match s {
            "vici" => Ok(CollectorKind::Vici),
            "ipsec" => Ok(CollectorKind::Ipsec),
            other => Err(SwanmonError::Config(format!(
                "unknown collector type '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for CollectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Acquisition path with its settings
#[derive(Debug, Clone)]
pub enum Source {
    /// Poll the daemon over VICI
    Vici(ViciPoller),
    /// Run the status command and parse its output
    Command(CommandRunner),
}

/// Serialized snapshot acquisition
#[derive(Debug)]
pub struct Collector {
    source: Source,
    lock: Mutex<()>,
}

impl Collector {
    /// Create a collector for `source`
    pub fn new(source: Source) -> Self {
        Self {
            source,
            lock: Mutex::new(()),
        }
    }

    /// Kind of the configured path
    pub fn kind(&self) -> CollectorKind {
        match self.source {
            Source::Vici(_) => CollectorKind::Vici,
            Source::Command(_) => CollectorKind::Ipsec,
        }
    }

    /// Acquire one snapshot
    ///
    /// # Errors
    ///
    /// Propagates the failure of the configured path.
    pub async fn collect(&self) -> SwanmonResult<Snapshot> {
        let _guard = self.lock.lock().await;
        let collector = self.kind().as_str();
        logging::log_scrape_started(collector);
        let started = Instant::now();

        let result = match &self.source {
            Source::Vici(poller) => poller.poll().await,
            Source::Command(runner) => match runner.run().await {
                Ok(output) => status::parse(&output),
                Err(err) => Err(err),
            },
        };

        match &result {
            Ok(snapshot) => logging::log_scrape_completed(
                collector,
                snapshot.ike_sas.len(),
                snapshot.child_sa_count(),
                started.elapsed().as_millis() as u64,
            ),
            Err(err) => logging::log_scrape_failed(collector, &err.to_string()),
        }
        result
    }
}

#[async_trait]
impl Scraper for Collector {
    type Output = Snapshot;

    fn id(&self) -> &'static str {
        self.kind().as_str()
    }

    async fn scrape(&self) -> SwanmonResult<Snapshot> {
        self.collect().await
    }
}
