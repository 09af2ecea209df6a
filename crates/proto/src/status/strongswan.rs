//! strongSwan `ipsec statusall` parser
//!
//! The output is split into independent sections, each introduced by a
//! fixed header line:
//!
//! ```text
//! Status of IKE charon daemon (strongSwan 5.9.1, Linux 5.10.0, x86_64):
//!   uptime: 4 minutes, since Jan 21 10:50:01 2021
//!   worker threads: 11 of 16 idle, 5/0/0/0 working, job queue: 0/0/0/0, scheduled: 3
//! Virtual IP pools (size/online/offline):
//!   10.3.0.0/28: 14/1/0
//! Security Associations (1 up, 0 connecting):
//!       rw-eap[1]: ESTABLISHED 3 minutes ago, 192.168.0.1[moon]...192.168.0.100[carol]
//!       rw-eap[1]: IKEv2 SPIs: 4f1a2b3c4d5e6f70_i 1122334455667788_r*, rekeying disabled
//!       rw-eap{1}:  INSTALLED, TUNNEL, reqid 1, ESP SPIs: c1a2b3c4_i c5d6e7f8_o
//!       rw-eap{1}:  AES_CBC_128/HMAC_SHA2_256_128, 84 bytes_i (1 pkt, 2s ago), 84 bytes_o
//!       rw-eap{1}:   10.1.0.0/16 === 10.3.0.1/32
//! ```
//!
//! Inside the SA section every record is identified by the literal prefix of
//! its first line (`rw-eap[1]: ` for IKE SAs, `rw-eap{1}:  ` for Child SAs);
//! a record ends at the first line that does not repeat that prefix. Child
//! SA records belong to the IKE SA record that precedes them.

use once_cell::sync::Lazy;
use regex::Regex;
use swanmon_platform::{Parser, SwanmonResult};

use crate::model::{ChildSa, IkeSa, Pool, Queues, Snapshot, Workers};

const PREFIX_STATUS: &str = "Status of IKE charon daemon";
const PREFIX_POOLS: &str = "Virtual IP pools (size/online/offline):";
const PREFIX_SA: &str = "Security Associations";

/// SA section header; also the dialect marker
pub(crate) const SA_HEADER: &str = r"^Security Associations \((\d+) up, (\d+) connecting\):$";

static UPTIME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^  uptime: .+, since (.+)$").unwrap());
static STATS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^  worker threads: (\d+) of (\d+) idle, (\d+)/(\d+)/(\d+)/(\d+) working, job queue: (\d+)/(\d+)/(\d+)/(\d+), scheduled: (\d+)$",
    )
    .unwrap()
});
static POOL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^  (.+?): (\d+)/(\d+)/(\d+)$").unwrap());
static SA_HEADER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(SA_HEADER).unwrap());

static SA_PREFIX_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*([^\[]+)\[(\d+)\]: ").unwrap());
static SA_STATUS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([^ ]+) .+ ago, ([^\[]+)\[([^\]]+)\]\.\.\.([^\[]+)\[([^\]]+)\]$").unwrap()
});
static SA_VERSION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(.+) SPIs:").unwrap());
static SA_REMOTE_IDENTITY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^Remote (.+) identity: (.+)$").unwrap());

static CHILD_PREFIX_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*([^{]+)\{(\d+)\}:  ").unwrap());
static CHILD_STATUS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([^,]+), ([^,]+), reqid (\d+), (.+) SPIs:.+").unwrap());
static CHILD_TRAFFIC_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d+) bytes_i(?: \((\d+) pkts?[^)]*\))?, (\d+) bytes_o(?: \((\d+) pkts?[^)]*\))?")
        .unwrap()
});
static CHILD_TS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^ (.+) === (.+)$").unwrap());

/// Parser for strongSwan `statusall` output
#[derive(Debug, Clone, Copy, Default)]
pub struct Strongswan;

impl Parser for Strongswan {
    type Output = Snapshot;

    fn id(&self) -> &'static str {
        "strongswan"
    }

    fn parse(&self, input: &str) -> SwanmonResult<Snapshot> {
        Ok(parse_statusall(input))
    }
}

/// Parse `statusall` output into a snapshot
pub fn parse_statusall(input: &str) -> Snapshot {
    let lines: Vec<&str> = input.split('\n').chain(std::iter::once("")).collect();
    let mut snapshot = Snapshot::default();

    for (i, line) in lines.iter().enumerate() {
        let rest = &lines[i + 1..];
        if line.starts_with(PREFIX_STATUS) {
            scan_daemon_status(rest, &mut snapshot);
        } else if *line == PREFIX_POOLS {
            scan_pools(rest, &mut snapshot);
        } else if line.starts_with(PREFIX_SA) {
            if let Some(caps) = SA_HEADER_RE.captures(line) {
                snapshot.stats.ike_sas.total = number(&caps[1]);
                snapshot.stats.ike_sas.half_open = number(&caps[2]);
                scan_security_associations(rest, &mut snapshot);
            }
        }
    }

    snapshot.finalize()
}

fn scan_daemon_status(lines: &[&str], snapshot: &mut Snapshot) {
    for line in lines.iter().take_while(|line| line.starts_with("  ")) {
        if let Some(caps) = UPTIME_RE.captures(line) {
            snapshot.stats.uptime_since = Some(caps[1].to_string());
            continue;
        }
        if let Some(caps) = STATS_RE.captures(line) {
            snapshot.stats.workers = Some(Workers {
                idle: number(&caps[1]),
                total: number(&caps[2]),
                active: Queues {
                    critical: number(&caps[3]),
                    high: number(&caps[4]),
                    medium: number(&caps[5]),
                    low: number(&caps[6]),
                },
            });
            snapshot.stats.queues = Some(Queues {
                critical: number(&caps[7]),
                high: number(&caps[8]),
                medium: number(&caps[9]),
                low: number(&caps[10]),
            });
            snapshot.stats.scheduled = Some(number(&caps[11]));
        }
    }
}

fn scan_pools(lines: &[&str], snapshot: &mut Snapshot) {
    for line in lines {
        let Some(caps) = POOL_RE.captures(line) else {
            break;
        };
        snapshot.pools.push(Pool {
            name: String::new(),
            address: caps[1].to_string(),
            size: number(&caps[2]),
            online: number(&caps[3]),
            offline: number(&caps[4]),
        });
    }
}

/// Record currently being collected in the SA section
enum Record<'a> {
    /// IKE SA record; `index` points into `Snapshot::ike_sas`
    Ike { prefix: &'a str, index: usize },
    /// Child SA record, attached to the previous IKE SA when it ends
    Child { prefix: &'a str, child: ChildSa },
}

impl Record<'_> {
    fn prefix(&self) -> &str {
        match self {
            Record::Ike { prefix, .. } | Record::Child { prefix, .. } => *prefix,
        }
    }
}

fn scan_security_associations(lines: &[&str], snapshot: &mut Snapshot) {
    let mut open: Option<Record<'_>> = None;
    let mut previous: Option<usize> = None;

    for &line in lines {
        if open
            .as_ref()
            .is_some_and(|record| !line.starts_with(record.prefix()))
        {
            if let Some(record) = open.take() {
                previous = close_record(record, previous, snapshot);
            }
        }
        if open.is_none() {
            open = open_record(line, snapshot);
        }

        match open.as_mut() {
            Some(Record::Ike { prefix, index }) => {
                apply_ike_line(&line[prefix.len()..], &mut snapshot.ike_sas[*index]);
            }
            Some(Record::Child { prefix, child }) => {
                apply_child_line(&line[prefix.len()..], child);
            }
            None => break,
        }
    }

    if let Some(record) = open.take() {
        close_record(record, previous, snapshot);
    }
}

fn open_record<'a>(line: &'a str, snapshot: &mut Snapshot) -> Option<Record<'a>> {
    if let Some(caps) = SA_PREFIX_RE.captures(line) {
        let prefix = caps.get(0).map_or("", |m| m.as_str());
        snapshot.ike_sas.push(IkeSa::new(&caps[1], number(&caps[2])));
        return Some(Record::Ike {
            prefix,
            index: snapshot.ike_sas.len() - 1,
        });
    }
    if let Some(caps) = CHILD_PREFIX_RE.captures(line) {
        let prefix = caps.get(0).map_or("", |m| m.as_str());
        return Some(Record::Child {
            prefix,
            child: ChildSa::new(&caps[1], number(&caps[2])),
        });
    }
    None
}

/// Close a record, returning the new "previous IKE SA"
fn close_record(record: Record<'_>, previous: Option<usize>, snapshot: &mut Snapshot) -> Option<usize> {
    match record {
        Record::Ike { index, .. } => Some(index),
        Record::Child { child, .. } => {
            if let Some(sa) = previous.and_then(|index| snapshot.ike_sas.get_mut(index)) {
                sa.insert_child(child);
            }
            previous
        }
    }
}

fn apply_ike_line(line: &str, sa: &mut IkeSa) {
    if let Some(caps) = SA_STATUS_RE.captures(line) {
        sa.state = caps[1].to_string();
        sa.local_host = caps[2].to_string();
        sa.local_id = caps[3].to_string();
        sa.remote_host = caps[4].to_string();
        sa.remote_id = caps[5].to_string();
        return;
    }
    if let Some(caps) = SA_VERSION_RE.captures(line) {
        match &caps[1] {
            "IKEv1" => sa.version = 1,
            "IKEv2" => sa.version = 2,
            _ => {}
        }
        return;
    }
    if let Some(caps) = SA_REMOTE_IDENTITY_RE.captures(line) {
        if &caps[1] == "XAuth" {
            sa.remote_xauth_id = caps[2].to_string();
        } else {
            sa.remote_eap_id = caps[2].to_string();
        }
    }
}

fn apply_child_line(line: &str, child: &mut ChildSa) {
    if let Some(caps) = CHILD_STATUS_RE.captures(line) {
        child.state = caps[1].to_string();
        child.mode = caps[2].to_string();
        child.reqid = Some(number(&caps[3]));
        child.protocol = caps[4].to_string();
        return;
    }
    if let Some(caps) = CHILD_TRAFFIC_RE.captures(line) {
        child.bytes_in = number(&caps[1]);
        child.bytes_out = number(&caps[3]);
        if let (Some(packets_in), Some(packets_out)) = (caps.get(2), caps.get(4)) {
            child.packets_in = Some(number(packets_in.as_str()));
            child.packets_out = Some(number(packets_out.as_str()));
        }
        return;
    }
    if let Some(caps) = CHILD_TS_RE.captures(line) {
        child.local_ts = caps[1].split(' ').map(str::to_string).collect();
        child.remote_ts = caps[2].split(' ').map(str::to_string).collect();
    }
}

/// Parse a decimal counter, falling back to zero
fn number<T: std::str::FromStr + Default>(s: &str) -> T {
    s.parse().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    const STATUSALL: &str = "\
Status of IKE charon daemon (strongSwan 5.9.1, Linux 5.10.0-8-amd64, x86_64):
  uptime: 4 minutes, since Jan 21 10:50:01 2021
  malloc: sbrk 2842624, mmap 0, used 1075712, free 1766912
  worker threads: 11 of 16 idle, 5/0/0/0 working, job queue: 0/0/0/0, scheduled: 3
  loaded plugins: charon aes des rc2 sha2 sha1 md5 random nonce x509 openssl
Virtual IP pools (size/online/offline):
  10.3.0.0/28: 14/1/0
Listening IP addresses:
  192.168.0.1
Connections:
      rw-eap:  192.168.0.1...%any  IKEv2, dpddelay=60s
Security Associations (1 up, 0 connecting):
      rw-eap[1]: ESTABLISHED 3 minutes ago, 192.168.0.1[moon.strongswan.org]...192.168.0.100[carol@strongswan.org]
      rw-eap[1]: IKEv2 SPIs: 4f1a2b3c4d5e6f70_i 1122334455667788_r*, rekeying disabled
      rw-eap[1]: IKE proposal: AES_CBC_128/HMAC_SHA2_256_128/PRF_HMAC_SHA2_256/CURVE_25519
      rw-eap[1]: Remote EAP identity: carol
      rw-eap{1}:  INSTALLED, TUNNEL, reqid 1, ESP SPIs: c1a2b3c4_i c5d6e7f8_o
      rw-eap{1}:  AES_CBC_128/HMAC_SHA2_256_128, 84 bytes_i (1 pkt, 2s ago), 168 bytes_o (2 pkts, 2s ago), rekeying disabled
      rw-eap{1}:   10.1.0.0/16 === 10.3.0.1/32
";

    #[test]
    fn test_daemon_status() {
        let snapshot = parse_statusall(STATUSALL);
        let stats = &snapshot.stats;
        assert_eq!(stats.uptime_since.as_deref(), Some("Jan 21 10:50:01 2021"));
        let workers = stats.workers.expect("workers present");
        assert_eq!(workers.total, 16);
        assert_eq!(workers.idle, 11);
        assert_eq!(workers.active.critical, 5);
        assert_eq!(workers.active.total(), 5);
        assert_eq!(stats.queues, Some(Queues::default()));
        assert_eq!(stats.scheduled, Some(3));
        assert_eq!(stats.ike_sas.total, 1);
        assert_eq!(stats.ike_sas.half_open, 0);
    }

    #[test]
    fn test_pools() {
        let snapshot = parse_statusall(STATUSALL);
        assert_eq!(
            snapshot.pools,
            vec![Pool {
                name: String::new(),
                address: "10.3.0.0/28".to_string(),
                size: 14,
                online: 1,
                offline: 0,
            }]
        );
    }

    #[test]
    fn test_ike_and_child_sa() {
        let snapshot = parse_statusall(STATUSALL);
        assert_eq!(snapshot.ike_sas.len(), 1);

        let sa = &snapshot.ike_sas[0];
        assert_eq!(sa.name, "rw-eap");
        assert_eq!(sa.uid, 1);
        assert_eq!(sa.version, 2);
        assert_eq!(sa.state, "ESTABLISHED");
        assert_eq!(sa.local_host, "192.168.0.1");
        assert_eq!(sa.local_id, "moon.strongswan.org");
        assert_eq!(sa.remote_host, "192.168.0.100");
        assert_eq!(sa.remote_id, "carol@strongswan.org");
        assert_eq!(sa.remote_eap_id, "carol");
        assert!(sa.remote_xauth_id.is_empty());

        let child = &sa.child_sas["rw-eap-1"];
        assert_eq!(child.state, "INSTALLED");
        assert_eq!(child.mode, "TUNNEL");
        assert_eq!(child.reqid, Some(1));
        assert_eq!(child.protocol, "ESP");
        assert_eq!(child.bytes_in, 84);
        assert_eq!(child.packets_in, Some(1));
        assert_eq!(child.bytes_out, 168);
        assert_eq!(child.packets_out, Some(2));
        assert_eq!(child.local_ts, vec!["10.1.0.0/16"]);
        assert_eq!(child.remote_ts, vec!["10.3.0.1/32"]);
    }

    #[test]
    fn test_traffic_without_packets() {
        let input = "\
Security Associations (1 up, 0 connecting):
        home[7]: ESTABLISHED 10 seconds ago, 10.0.0.1[home]...10.0.0.2[peer]
        home{9}:  INSTALLED, TRANSPORT, reqid 3, AH SPIs: c0000001_i c0000002_o
        home{9}:  HMAC_SHA2_256_128, 0 bytes_i, 0 bytes_o, rekeying in 40 minutes
";
        let snapshot = parse_statusall(input);
        let child = &snapshot.ike_sas[0].child_sas["home-9"];
        assert_eq!(child.bytes_in, 0);
        assert_eq!(child.bytes_out, 0);
        assert_eq!(child.packets_in, None);
        assert_eq!(child.packets_out, None);
        assert_eq!(child.mode, "TRANSPORT");
        assert_eq!(child.protocol, "AH");
    }

    #[test]
    fn test_children_follow_their_ike_sa() {
        let input = "\
Security Associations (2 up, 0 connecting):
         a[1]: ESTABLISHED 1 minute ago, 10.0.0.1[a]...10.0.1.1[x]
         a{1}:  INSTALLED, TUNNEL, reqid 1, ESP SPIs: c1_i c2_o
         a{2}:  INSTALLED, TUNNEL, reqid 2, ESP SPIs: c3_i c4_o
         b[2]: ESTABLISHED 1 minute ago, 10.0.0.1[b]...10.0.2.1[y]
         b[2]: Remote XAuth identity: bob
         b{3}:  INSTALLED, TUNNEL, reqid 3, ESP SPIs: c5_i c6_o
";
        let snapshot = parse_statusall(input);
        assert_eq!(snapshot.ike_sas.len(), 2);
        let keys_a: Vec<_> = snapshot.ike_sas[0].child_sas.keys().cloned().collect();
        let keys_b: Vec<_> = snapshot.ike_sas[1].child_sas.keys().cloned().collect();
        assert_eq!(keys_a, vec!["a-1", "a-2"]);
        assert_eq!(keys_b, vec!["b-3"]);
        assert_eq!(snapshot.ike_sas[1].remote_xauth_id, "bob");
        assert_eq!(snapshot.ike_sas[0].version, 0);
    }

    #[test]
    fn test_scan_stops_at_foreign_line() {
        let input = "\
Security Associations (1 up, 0 connecting):
         a[1]: ESTABLISHED 1 minute ago, 10.0.0.1[a]...10.0.1.1[x]
this line ends the section
         b[2]: ESTABLISHED 1 minute ago, 10.0.0.1[b]...10.0.2.1[y]
";
        let snapshot = parse_statusall(input);
        assert_eq!(snapshot.ike_sas.len(), 1);
        assert_eq!(snapshot.ike_sas[0].name, "a");
    }

    #[test]
    fn test_orphan_child_is_dropped() {
        let input = "\
Security Associations (0 up, 1 connecting):
         a{5}:  INSTALLED, TUNNEL, reqid 1, ESP SPIs: c1_i c2_o
";
        let snapshot = parse_statusall(input);
        assert!(snapshot.ike_sas.is_empty());
        assert_eq!(snapshot.stats.ike_sas.half_open, 1);
    }
}
