//! Snapshot to metric sample conversion
//!
//! The [`Emitter`] turns the outcome of one scrape into an ordered list of
//! gauge [`Sample`]s. A failed scrape yields a single `ipsec_up 0`; a
//! successful one yields the daemon, pool and SA gauges followed by
//! `ipsec_up 1`.
//!
//! State gauges are only produced for states listed in the [`StateTables`];
//! unknown states are skipped without affecting the other gauges.

use std::collections::HashMap;

use chrono::{DateTime, FixedOffset, Local, NaiveDateTime, SubsecRound, TimeZone};
use swanmon_platform::{SwanmonError, SwanmonResult};

use crate::logging;
use crate::model::{ChildSa, IkeSa, Snapshot};

/// Metric namespace
pub const NAMESPACE: &str = "ipsec";

/// Layout of the daemon start timestamp, after whitespace normalization
const UPTIME_LAYOUT: &str = "%b %d %H:%M:%S %Y";

const IKE_SA_LABELS: &[&str] = &[
    "name",
    "uid",
    "version",
    "local_host",
    "local_id",
    "remote_host",
    "remote_id",
    "remote_identity",
    "vips",
];

const CHILD_SA_LABELS: &[&str] = &[
    "ike_sa_name",
    "ike_sa_uid",
    "ike_sa_version",
    "ike_sa_local_host",
    "ike_sa_local_id",
    "ike_sa_remote_host",
    "ike_sa_remote_id",
    "ike_sa_remote_identity",
    "ike_sa_vips",
    "name",
    "uid",
    "mode",
    "protocol",
    "reqid",
    "local_ts",
    "remote_ts",
];

const POOL_LABELS: &[&str] = &["name", "address"];

/// Gauges produced by the emitter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Metric {
    /// `ipsec_up`
    Up,
    /// `ipsec_uptime_seconds`
    UptimeSeconds,
    /// `ipsec_workers_total`
    WorkersTotal,
    /// `ipsec_idle_workers`
    IdleWorkers,
    /// `ipsec_active_workers`
    ActiveWorkers,
    /// `ipsec_queues`
    Queues,
    /// `ipsec_ike_sas`
    IkeSas,
    /// `ipsec_half_open_ike_sas`
    HalfOpenIkeSas,
    /// `ipsec_pool_ips_total`
    PoolIpsTotal,
    /// `ipsec_online_pool_ips`
    OnlinePoolIps,
    /// `ipsec_offline_pool_ips`
    OfflinePoolIps,
    /// `ipsec_ike_sa_state`
    IkeSaState,
    /// `ipsec_ike_sa_established_seconds`
    IkeSaEstablishedSeconds,
    /// `ipsec_child_sa_state`
    ChildSaState,
    /// `ipsec_child_sa_bytes_in`
    ChildSaBytesIn,
    /// `ipsec_child_sa_packets_in`
    ChildSaPacketsIn,
    /// `ipsec_child_sa_bytes_out`
    ChildSaBytesOut,
    /// `ipsec_child_sa_packets_out`
    ChildSaPacketsOut,
    /// `ipsec_child_sa_installed_seconds`
    ChildSaInstalledSeconds,
}

impl Metric {
    /// Every metric, in description order
    pub const ALL: [Metric; 19] = [
        Metric::Up,
        Metric::UptimeSeconds,
        Metric::WorkersTotal,
        Metric::IdleWorkers,
        Metric::ActiveWorkers,
        Metric::Queues,
        Metric::IkeSas,
        Metric::HalfOpenIkeSas,
        Metric::PoolIpsTotal,
        Metric::OnlinePoolIps,
        Metric::OfflinePoolIps,
        Metric::IkeSaState,
        Metric::IkeSaEstablishedSeconds,
        Metric::ChildSaState,
        Metric::ChildSaBytesIn,
        Metric::ChildSaPacketsIn,
        Metric::ChildSaBytesOut,
        Metric::ChildSaPacketsOut,
        Metric::ChildSaInstalledSeconds,
    ];

    /// Name without the namespace
    pub fn name(self) -> &'static str {
        match self {
            Metric::Up => "up",
            Metric::UptimeSeconds => "uptime_seconds",
            Metric::WorkersTotal => "workers_total",
            Metric::IdleWorkers => "idle_workers",
            Metric::ActiveWorkers => "active_workers",
            Metric::Queues => "queues",
            Metric::IkeSas => "ike_sas",
            Metric::HalfOpenIkeSas => "half_open_ike_sas",
            Metric::PoolIpsTotal => "pool_ips_total",
            Metric::OnlinePoolIps => "online_pool_ips",
            Metric::OfflinePoolIps => "offline_pool_ips",
            Metric::IkeSaState => "ike_sa_state",
            Metric::IkeSaEstablishedSeconds => "ike_sa_established_seconds",
            Metric::ChildSaState => "child_sa_state",
            Metric::ChildSaBytesIn => "child_sa_bytes_in",
            Metric::ChildSaPacketsIn => "child_sa_packets_in",
            Metric::ChildSaBytesOut => "child_sa_bytes_out",
            Metric::ChildSaPacketsOut => "child_sa_packets_out",
            Metric::ChildSaInstalledSeconds => "child_sa_installed_seconds",
        }
    }

    /// Fully qualified name
    pub fn fq_name(self) -> String {
        format!("{}_{}", NAMESPACE, self.name())
    }

    /// Help text
    pub fn help(self) -> &'static str {
        match self {
            Metric::Up => "Was the last scrape successful.",
            Metric::UptimeSeconds => "Number of seconds since the daemon started.",
            Metric::WorkersTotal => "Number of worker threads.",
            Metric::IdleWorkers => "Number of idle worker threads.",
            Metric::ActiveWorkers => "Number of threads processing jobs.",
            Metric::Queues => "Number of queued jobs.",
            Metric::IkeSas => "Number of currently registered IKE SAs.",
            Metric::HalfOpenIkeSas => "Number of IKE SAs in half-open state.",
            Metric::PoolIpsTotal => "Number of addresses in the pool.",
            Metric::OnlinePoolIps => "Number of leases online.",
            Metric::OfflinePoolIps => "Number of leases offline.",
            Metric::IkeSaState => "IKE SA state.",
            Metric::IkeSaEstablishedSeconds => {
                "Number of seconds since the IKE SA has been established."
            }
            Metric::ChildSaState => "Child SA state.",
            Metric::ChildSaBytesIn => "Number of input bytes processed.",
            Metric::ChildSaPacketsIn => "Number of input packets processed.",
            Metric::ChildSaBytesOut => "Number of output bytes processed.",
            Metric::ChildSaPacketsOut => "Number of output packets processed.",
            Metric::ChildSaInstalledSeconds => {
                "Number of seconds since the child SA has been installed."
            }
        }
    }

    /// Label names, in label value order
    pub fn label_names(self) -> &'static [&'static str] {
        match self {
            Metric::Queues => &["priority"],
            Metric::PoolIpsTotal | Metric::OnlinePoolIps | Metric::OfflinePoolIps => POOL_LABELS,
            Metric::IkeSaState | Metric::IkeSaEstablishedSeconds => IKE_SA_LABELS,
            Metric::ChildSaState
            | Metric::ChildSaBytesIn
            | Metric::ChildSaPacketsIn
            | Metric::ChildSaBytesOut
            | Metric::ChildSaPacketsOut
            | Metric::ChildSaInstalledSeconds => CHILD_SA_LABELS,
            _ => &[],
        }
    }
}

/// One gauge observation
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Gauge
    pub metric: Metric,
    /// Label values matching [`Metric::label_names`]
    pub labels: Vec<String>,
    /// Observed value
    pub value: f64,
}

impl Sample {
    fn new(metric: Metric, labels: Vec<String>, value: f64) -> Self {
        Self {
            metric,
            labels,
            value,
        }
    }

    fn plain(metric: Metric, value: f64) -> Self {
        Self::new(metric, Vec::new(), value)
    }
}

const STRONGSWAN_IKE_STATES: &[(&str, u32)] = &[
    ("CREATED", 0),
    ("CONNECTING", 1),
    ("ESTABLISHED", 2),
    ("PASSIVE", 3),
    ("REKEYING", 4),
    ("REKEYED", 5),
    ("DELETING", 6),
    ("DESTROYING", 7),
];

const STRONGSWAN_CHILD_STATES: &[(&str, u32)] = &[
    ("CREATED", 0),
    ("ROUTED", 1),
    ("INSTALLING", 2),
    ("INSTALLED", 3),
    ("UPDATING", 4),
    ("REKEYING", 5),
    ("REKEYED", 6),
    ("RETRYING", 7),
    ("DELETING", 8),
    ("DELETED", 9),
    ("DESTROYING", 10),
];

const LIBRESWAN_STATES: &[(&str, u32)] = &[
    ("STATE_MAIN_R0", 0),
    ("STATE_MAIN_I1", 1),
    ("STATE_MAIN_R1", 2),
    ("STATE_MAIN_I2", 3),
    ("STATE_MAIN_R2", 4),
    ("STATE_MAIN_I3", 5),
    ("STATE_MAIN_R3", 6),
    ("STATE_MAIN_I4", 7),
    ("STATE_AGGR_R0", 8),
    ("STATE_AGGR_I1", 9),
    ("STATE_AGGR_R1", 10),
    ("STATE_AGGR_I2", 11),
    ("STATE_AGGR_R2", 12),
    ("STATE_QUICK_R0", 13),
    ("STATE_QUICK_I1", 14),
    ("STATE_QUICK_R1", 15),
    ("STATE_QUICK_I2", 16),
    ("STATE_QUICK_R2", 17),
    ("STATE_INFO", 18),
    ("STATE_INFO_PROTECTED", 19),
    ("STATE_XAUTH_R0", 20),
    ("STATE_XAUTH_R1", 21),
    ("STATE_MODE_CFG_R0", 22),
    ("STATE_MODE_CFG_R1", 23),
    ("STATE_MODE_CFG_R2", 24),
    ("STATE_MODE_CFG_I1", 25),
    ("STATE_XAUTH_I0", 26),
    ("STATE_XAUTH_I1", 27),
    ("STATE_V2_PARENT_I0", 29),
    ("STATE_V2_PARENT_I1", 30),
    ("STATE_V2_PARENT_I2", 31),
    ("STATE_V2_PARENT_R0", 32),
    ("STATE_V2_PARENT_R1", 33),
    ("STATE_V2_IKE_AUTH_CHILD_I0", 34),
    ("STATE_V2_IKE_AUTH_CHILD_R0", 35),
    ("STATE_V2_NEW_CHILD_I0", 36),
    ("STATE_V2_NEW_CHILD_I1", 37),
    ("STATE_V2_REKEY_IKE_I0", 38),
    ("STATE_V2_REKEY_IKE_I1", 39),
    ("STATE_V2_REKEY_CHILD_I0", 40),
    ("STATE_V2_REKEY_CHILD_I1", 41),
    ("STATE_V2_NEW_CHILD_R0", 42),
    ("STATE_V2_REKEY_IKE_R0", 43),
    ("STATE_V2_REKEY_CHILD_R0", 44),
    ("STATE_V2_ESTABLISHED_IKE_SA", 45),
    ("STATE_V2_ESTABLISHED_CHILD_SA", 46),
    ("STATE_V2_IKE_SA_DELETE", 47),
    ("STATE_V2_CHILD_SA_DELETE", 48),
];

/// State name to gauge value lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateTables {
    ike: HashMap<String, u32>,
    child: HashMap<String, u32>,
}

impl StateTables {
    /// Build tables from explicit entries
    pub fn new<'a, I, C>(ike: I, child: C) -> Self
    where
        I: IntoIterator<Item = (&'a str, u32)>,
        C: IntoIterator<Item = (&'a str, u32)>,
    {
        Self {
            ike: ike.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
            child: child.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
        }
    }

    /// strongSwan states plus Libreswan states, merged into both tables
    pub fn standard() -> Self {
        Self::new(
            STRONGSWAN_IKE_STATES.iter().chain(LIBRESWAN_STATES).copied(),
            STRONGSWAN_CHILD_STATES.iter().chain(LIBRESWAN_STATES).copied(),
        )
    }

    /// Gauge value of an IKE SA state
    pub fn ike_state(&self, state: &str) -> Option<u32> {
        self.ike.get(state).copied()
    }

    /// Gauge value of a Child SA state
    pub fn child_state(&self, state: &str) -> Option<u32> {
        self.child.get(state).copied()
    }
}

impl Default for StateTables {
    fn default() -> Self {
        Self::standard()
    }
}

/// Time source for the uptime gauge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Clock {
    /// Current time in the local zone
    #[default]
    System,
    /// Fixed instant; the timestamp is interpreted in the instant's offset
    Fixed(DateTime<FixedOffset>),
}

impl Clock {
    /// Seconds elapsed between `since` (local wall time) and now
    fn seconds_since(&self, since: &NaiveDateTime) -> Option<f64> {
        let elapsed = match self {
            Clock::System => {
                let since = Local.from_local_datetime(since).earliest()?;
                Local::now().round_subsecs(0) - since
            }
            Clock::Fixed(now) => {
                let since = now.offset().from_local_datetime(since).single()?;
                now.round_subsecs(0) - since
            }
        };
        Some(elapsed.num_seconds() as f64)
    }
}

/// Outcome of one emission
#[derive(Debug, Clone, PartialEq)]
pub struct Emission {
    /// Samples in emission order
    pub samples: Vec<Sample>,
    /// Value of the final `ipsec_up` sample
    pub up: bool,
}

/// Converts scrape outcomes into samples
#[derive(Debug, Clone, Default)]
pub struct Emitter {
    states: StateTables,
    clock: Clock,
}

impl Emitter {
    /// Create an emitter with the given state tables and clock
    pub fn new(states: StateTables, clock: Clock) -> Self {
        Self { states, clock }
    }

    /// Convert one scrape outcome
    pub fn emit(&self, outcome: &SwanmonResult<Snapshot>) -> Emission {
        let mut samples = Vec::new();
        let up = match outcome {
            Ok(snapshot) => match self.emit_snapshot(snapshot, &mut samples) {
                Ok(()) => true,
                Err(err) => {
                    logging::log_emit_failed(&err.to_string());
                    false
                }
            },
            Err(_) => {
                samples.push(Sample::plain(Metric::Up, 0.0));
                false
            }
        };
        Emission { samples, up }
    }

    /// Append the samples for a successful scrape
    ///
    /// # Errors
    ///
    /// Returns `SwanmonError::InvalidField` if the uptime timestamp cannot
    /// be parsed; `ipsec_up 0` has been appended in that case.
    pub fn emit_snapshot(&self, snapshot: &Snapshot, out: &mut Vec<Sample>) -> SwanmonResult<()> {
        let stats = &snapshot.stats;

        if let Some(since) = &stats.uptime_since {
            match self.uptime_seconds(since) {
                Ok(seconds) => out.push(Sample::plain(Metric::UptimeSeconds, seconds)),
                Err(err) => {
                    out.push(Sample::plain(Metric::Up, 0.0));
                    return Err(err);
                }
            }
        }

        if let Some(workers) = &stats.workers {
            out.push(Sample::plain(Metric::WorkersTotal, workers.total as f64));
            out.push(Sample::plain(Metric::IdleWorkers, workers.idle as f64));
            out.push(Sample::plain(Metric::ActiveWorkers, workers.active.total() as f64));
        }

        if let Some(queues) = &stats.queues {
            for (priority, value) in [
                ("critical", queues.critical),
                ("high", queues.high),
                ("medium", queues.medium),
                ("low", queues.low),
            ] {
                out.push(Sample::new(Metric::Queues, vec![priority.to_string()], value as f64));
            }
        }

        out.push(Sample::plain(Metric::IkeSas, stats.ike_sas.total as f64));
        out.push(Sample::plain(Metric::HalfOpenIkeSas, stats.ike_sas.half_open as f64));

        for pool in &snapshot.pools {
            let labels = vec![pool.name.clone(), pool.address.clone()];
            out.push(Sample::new(Metric::PoolIpsTotal, labels.clone(), pool.size as f64));
            out.push(Sample::new(Metric::OnlinePoolIps, labels.clone(), pool.online as f64));
            out.push(Sample::new(Metric::OfflinePoolIps, labels, pool.offline as f64));
        }

        for sa in &snapshot.ike_sas {
            self.emit_ike_sa(sa, out);
        }

        out.push(Sample::plain(Metric::Up, 1.0));
        Ok(())
    }

    fn emit_ike_sa(&self, sa: &IkeSa, out: &mut Vec<Sample>) {
        let labels = ike_sa_labels(sa);

        if let Some(state) = self.states.ike_state(&sa.state) {
            out.push(Sample::new(Metric::IkeSaState, labels.clone(), state as f64));
        }
        if sa.state == "ESTABLISHED" {
            if let Some(established) = sa.established {
                out.push(Sample::new(
                    Metric::IkeSaEstablishedSeconds,
                    labels.clone(),
                    established as f64,
                ));
            }
        }

        for child in sa.child_sas.values() {
            let labels = child_sa_labels(&labels, child);

            if let Some(state) = self.states.child_state(&child.state) {
                out.push(Sample::new(Metric::ChildSaState, labels.clone(), state as f64));
            }
            out.push(Sample::new(Metric::ChildSaBytesIn, labels.clone(), child.bytes_in as f64));
            if let Some(packets) = child.packets_in {
                out.push(Sample::new(Metric::ChildSaPacketsIn, labels.clone(), packets as f64));
            }
            out.push(Sample::new(Metric::ChildSaBytesOut, labels.clone(), child.bytes_out as f64));
            if let Some(packets) = child.packets_out {
                out.push(Sample::new(Metric::ChildSaPacketsOut, labels.clone(), packets as f64));
            }
            if let Some(installed) = child.installed {
                out.push(Sample::new(Metric::ChildSaInstalledSeconds, labels, installed as f64));
            }
        }
    }

    fn uptime_seconds(&self, since: &str) -> SwanmonResult<f64> {
        let invalid = || SwanmonError::InvalidField {
            field: "uptime",
            value: since.to_string(),
        };
        let normalized = since.split_whitespace().collect::<Vec<_>>().join(" ");
        let since_time =
            NaiveDateTime::parse_from_str(&normalized, UPTIME_LAYOUT).map_err(|_| invalid())?;
        self.clock.seconds_since(&since_time).ok_or_else(invalid)
    }
}

fn ike_sa_labels(sa: &IkeSa) -> Vec<String> {
    let vips: Vec<&str> = sa
        .local_vips
        .iter()
        .chain(&sa.remote_vips)
        .map(String::as_str)
        .collect();
    vec![
        sa.name.clone(),
        sa.uid.to_string(),
        sa.version.to_string(),
        sa.local_host.clone(),
        sa.local_id.clone(),
        sa.remote_host.clone(),
        sa.remote_id.clone(),
        format!("{}{}", sa.remote_xauth_id, sa.remote_eap_id),
        vips.join(", "),
    ]
}

fn child_sa_labels(ike_labels: &[String], child: &ChildSa) -> Vec<String> {
    let mut labels = ike_labels.to_vec();
    labels.extend([
        child.name.clone(),
        child.uid.to_string(),
        child.mode.clone(),
        child.protocol.clone(),
        child.reqid.map(|reqid| reqid.to_string()).unwrap_or_default(),
        child.local_ts.join(", "),
        child.remote_ts.join(", "),
    ]);
    labels
}
