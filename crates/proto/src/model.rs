//! Canonical snapshot of daemon and security-association state
//!
//! Every acquisition path (strongSwan `statusall`, Libreswan `status`, VICI)
//! builds one [`Snapshot`] per scrape. The emitter only ever sees this model,
//! so two paths describing the same daemon state render identical metrics.

use std::collections::BTreeMap;

/// One scrape's worth of daemon state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    /// Global daemon counters
    pub stats: DaemonStats,

    /// Virtual IP pools
    pub pools: Vec<Pool>,

    /// IKE SAs in acquisition order
    pub ike_sas: Vec<IkeSa>,
}

impl Snapshot {
    /// Drop associations that never received a unique id
    ///
    /// Parsers create placeholder records (e.g. a connection definition with
    /// no active SA); those carry a zero id and are not real associations.
    pub fn finalize(mut self) -> Self {
        self.ike_sas.retain(|sa| sa.uid > 0);
        for sa in &mut self.ike_sas {
            sa.child_sas.retain(|_, child| child.uid > 0);
        }
        self
    }

    /// Total number of Child SAs across all IKE SAs
    pub fn child_sa_count(&self) -> usize {
        self.ike_sas.iter().map(|sa| sa.child_sas.len()).sum()
    }
}

/// Global daemon counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DaemonStats {
    /// Raw "since" timestamp (`Jan _2 15:04:05 2006` layout)
    ///
    /// Parsed at emission time, not here.
    pub uptime_since: Option<String>,

    /// Worker thread counters (not reported by Libreswan)
    pub workers: Option<Workers>,

    /// Job queue depths (not reported by Libreswan)
    pub queues: Option<Queues>,

    /// Scheduled job count
    pub scheduled: Option<u64>,

    /// IKE SA totals
    pub ike_sas: IkeSaCounts,
}

/// Worker thread counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Workers {
    /// Total worker threads
    pub total: u64,
    /// Idle worker threads
    pub idle: u64,
    /// Threads processing jobs, by priority
    pub active: Queues,
}

/// Per-priority counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Queues {
    /// Critical priority
    pub critical: u64,
    /// High priority
    pub high: u64,
    /// Medium priority
    pub medium: u64,
    /// Low priority
    pub low: u64,
}

impl Queues {
    /// Sum over all priorities
    pub fn total(&self) -> u64 {
        self.critical + self.high + self.medium + self.low
    }
}

/// IKE SA totals
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IkeSaCounts {
    /// Registered IKE SAs
    pub total: u64,
    /// IKE SAs in half-open state
    pub half_open: u64,
}

/// Virtual IP address pool
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pool {
    /// Pool name (empty when the source reports only the address)
    pub name: String,
    /// Pool base address in CIDR notation
    pub address: String,
    /// Number of addresses in the pool
    pub size: u64,
    /// Leases online
    pub online: u64,
    /// Leases offline
    pub offline: u64,
}

/// IKE security association
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IkeSa {
    /// Connection name
    pub name: String,
    /// Unique id (0 means "not an active SA")
    pub uid: u32,
    /// IKE version (1 or 2, 0 when unknown)
    pub version: u8,
    /// Lifecycle state as reported by the daemon
    pub state: String,
    /// Local host address
    pub local_host: String,
    /// Local identity
    pub local_id: String,
    /// Remote host address
    pub remote_host: String,
    /// Remote identity
    pub remote_id: String,
    /// Remote XAuth identity
    pub remote_xauth_id: String,
    /// Remote EAP identity
    pub remote_eap_id: String,
    /// Seconds since the SA was established
    pub established: Option<i64>,
    /// Local virtual IPs
    pub local_vips: Vec<String>,
    /// Remote virtual IPs
    pub remote_vips: Vec<String>,
    /// Child SAs keyed by [`ChildSa::key`]
    pub child_sas: BTreeMap<String, ChildSa>,
}

impl IkeSa {
    /// Create an empty IKE SA with a name and unique id
    pub fn new(name: impl Into<String>, uid: u32) -> Self {
        Self {
            name: name.into(),
            uid,
            ..Self::default()
        }
    }

    /// Insert a Child SA under its composite key, replacing any previous one
    pub fn insert_child(&mut self, child: ChildSa) {
        self.child_sas.insert(child.key(), child);
    }

    /// Infer the IKE version from a Libreswan state name
    pub fn set_version_from_state(&mut self, state: &str) {
        self.version = if state.starts_with("STATE_V2_") { 2 } else { 1 };
    }
}

/// Child (IPsec) security association
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChildSa {
    /// Child SA name
    pub name: String,
    /// Unique id (0 means "placeholder")
    pub uid: u32,
    /// Request id
    pub reqid: Option<u32>,
    /// Lifecycle state as reported by the daemon
    pub state: String,
    /// IPsec mode (TUNNEL, TRANSPORT, ...)
    pub mode: String,
    /// IPsec protocol (AH, ESP, IPCOMP)
    pub protocol: String,
    /// Input bytes processed
    pub bytes_in: u64,
    /// Input packets processed
    pub packets_in: Option<u64>,
    /// Output bytes processed
    pub bytes_out: u64,
    /// Output packets processed
    pub packets_out: Option<u64>,
    /// Seconds since the SA was installed
    pub installed: Option<i64>,
    /// Local traffic selectors
    pub local_ts: Vec<String>,
    /// Remote traffic selectors
    pub remote_ts: Vec<String>,
}

impl ChildSa {
    /// Create an empty Child SA with a name and unique id
    pub fn new(name: impl Into<String>, uid: u32) -> Self {
        Self {
            name: name.into(),
            uid,
            ..Self::default()
        }
    }

    /// Composite map key, `name-uid`
    pub fn key(&self) -> String {
        format!("{}-{}", self.name, self.uid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_key() {
        let child = ChildSa::new("rw", 42);
        assert_eq!(child.key(), "rw-42");
    }

    #[test]
    fn test_finalize_drops_placeholders() {
        let mut live = IkeSa::new("live", 3);
        live.insert_child(ChildSa::new("live", 4));
        live.insert_child(ChildSa::new("live", 0));

        let snapshot = Snapshot {
            ike_sas: vec![IkeSa::new("template", 0), live],
            ..Snapshot::default()
        }
        .finalize();

        assert_eq!(snapshot.ike_sas.len(), 1);
        assert_eq!(snapshot.ike_sas[0].name, "live");
        assert_eq!(snapshot.child_sa_count(), 1);
        assert!(snapshot.ike_sas[0].child_sas.contains_key("live-4"));
    }

    #[test]
    fn test_version_from_state() {
        let mut sa = IkeSa::new("conn", 1);
        sa.set_version_from_state("STATE_V2_ESTABLISHED_IKE_SA");
        assert_eq!(sa.version, 2);
        sa.set_version_from_state("STATE_MAIN_I4");
        assert_eq!(sa.version, 1);
    }

    #[test]
    fn test_queues_total() {
        let queues = Queues {
            critical: 1,
            high: 2,
            medium: 3,
            low: 4,
        };
        assert_eq!(queues.total(), 10);
    }
}
