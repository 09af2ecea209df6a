//! Libreswan `ipsec status` parser
//!
//! Every line carries a leading token (usually `000`). Three kinds of lines
//! are of interest:
//!
//! - connection definitions, `000 "rw"[1]: left...right; ...`, which create
//!   an IKE SA placeholder and remember the connection's traffic selectors
//! - state records, `000 #2: "rw"[1] ...`, spanning every following line
//!   that repeats the same prefix; a record mentioning `isakmp#N` describes
//!   a Child SA, otherwise it describes the IKE SA itself
//! - the `IKE SAs: total(N), half-open(M)` counter line
//!
//! Connection definitions that never receive a state record keep a zero
//! unique id and are dropped from the result.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use swanmon_platform::{Parser, SwanmonResult};

use crate::model::{ChildSa, IkeSa, Snapshot};

const LINE_PREFIX: &str = r"^[^ ]+ ";
const IP_ADDR: &str = r"[a-f0-9:.]+";
const CONN_PART: &str = r#""(?P<conname>[^"]+)"(?P<coninst>\[\d+\])?"#;

/// Dialect marker
pub(crate) const CONNECTION_LIST: &str = r"(?m)^[^ ]+ Connection list:$";

static CONN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"(?P<prefix>{LINE_PREFIX}{CONN_PART}):[ ]+")).unwrap());

static ADDR_RE: Lazy<Regex> = Lazy::new(|| {
    let net = format!(r"{IP_ADDR}/\d+");
    Regex::new(&format!(
        concat!(
            r"(?P<leftclient>{net}===)?",
            r"(?P<leftaddr>{ip})",
            r"(?P<lefthost><[^>]+?>)?",
            r"(?P<leftid>\[[^\]]+?\])?",
            r"(?P<lefthop>---{ip})?",
            r"\.\.\.",
            r"(?P<righthop>{ip}---)?",
            r"(?P<rightaddr>{ip}|%any)",
            r"(?P<righthost><[^>]+>)?",
            r"(?P<rightid>\[[^\]]+\])?",
            r"(?P<rightclient>==={net})?;",
        ),
        net = net,
        ip = IP_ADDR,
    ))
    .unwrap()
});

static STATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?P<prefix>{LINE_PREFIX}#(?P<serialno>\d+): {CONN_PART})(:\d+(\(tcp\))?)?({IP_ADDR})?(:[^ ]+)? "
    ))
    .unwrap()
});

static PARENT_ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"; isakmp#(\d+)").unwrap());
static STATE_NAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(STATE_\w+)").unwrap());
static SPI_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"([a-z]+)[?:.][a-f0-9]+@{IP_ADDR}")).unwrap());
static TRAFFIC_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(AHin|AHout|ESPin|ESPout|IPCOMPin|IPCOMPout)=(\d+)(B|KB|MB)").unwrap()
});
static USERNAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r" username=(.+)$").unwrap());
static STATS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"IKE SAs: total\((\d+)\), half-open\((\d+)\)").unwrap());

/// Parser for Libreswan `status` output
#[derive(Debug, Clone, Copy, Default)]
pub struct Libreswan;

impl Parser for Libreswan {
    type Output = Snapshot;

    fn id(&self) -> &'static str {
        "libreswan"
    }

    fn parse(&self, input: &str) -> SwanmonResult<Snapshot> {
        Ok(parse_status(input))
    }
}

/// IKE SAs keyed by connection name, in definition order
#[derive(Debug, Default)]
struct Connections {
    ike_sas: Vec<IkeSa>,
    by_name: HashMap<String, usize>,
    local_ts: HashMap<String, String>,
    remote_ts: HashMap<String, String>,
}

impl Connections {
    /// Define or redefine a connection; a redefinition keeps its position
    fn define(&mut self, sa: IkeSa) {
        match self.by_name.get(&sa.name) {
            Some(&index) => self.ike_sas[index] = sa,
            None => {
                self.by_name.insert(sa.name.clone(), self.ike_sas.len());
                self.ike_sas.push(sa);
            }
        }
    }

    fn get_mut(&mut self, name: &str) -> Option<&mut IkeSa> {
        let index = *self.by_name.get(name)?;
        self.ike_sas.get_mut(index)
    }
}

/// Parse `status` output into a snapshot
pub fn parse_status(input: &str) -> Snapshot {
    let lines: Vec<&str> = input.split('\n').chain(std::iter::once("")).collect();
    let mut snapshot = Snapshot::default();
    let mut connections = Connections::default();

    let mut i = 0;
    while i < lines.len() {
        let line = lines[i];
        if let Some(caps) = CONN_RE.captures(line) {
            define_connection(line, &caps, &mut connections);
        } else if STATE_RE.is_match(line) {
            i = collect_state(&lines, i, &mut connections);
            continue;
        } else if let Some(caps) = STATS_RE.captures(line) {
            snapshot.stats.ike_sas.total = caps[1].parse().unwrap_or_default();
            snapshot.stats.ike_sas.half_open = caps[2].parse().unwrap_or_default();
        }
        i += 1;
    }

    snapshot.ike_sas = connections.ike_sas;
    snapshot.finalize()
}

fn group<'t>(caps: &Captures<'t>, name: &str) -> &'t str {
    caps.name(name).map_or("", |m| m.as_str())
}

/// Strip `[...]` and a leading `@` from an identity
fn identity(raw: &str) -> String {
    let inner = raw
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .unwrap_or(raw);
    inner.strip_prefix('@').unwrap_or(inner).to_string()
}

fn define_connection(line: &str, caps: &Captures<'_>, connections: &mut Connections) {
    let name = format!("{}{}", group(caps, "conname"), group(caps, "coninst"));
    let rest = &line[group(caps, "prefix").len()..];
    let Some(addr) = ADDR_RE.captures(rest) else {
        return;
    };

    connections.local_ts.insert(
        name.clone(),
        group(&addr, "leftclient").trim_matches('=').to_string(),
    );
    connections.remote_ts.insert(
        name.clone(),
        group(&addr, "rightclient").trim_matches('=').to_string(),
    );

    let mut sa = IkeSa::new(name, 0);
    sa.local_host = group(&addr, "leftaddr").to_string();
    sa.local_id = identity(group(&addr, "leftid"));
    sa.remote_host = group(&addr, "rightaddr").to_string();
    sa.remote_id = identity(group(&addr, "rightid"));
    connections.define(sa);
}

/// Consume one state record starting at `start`; returns the index of the
/// first line that does not belong to it
fn collect_state(lines: &[&str], start: usize, connections: &mut Connections) -> usize {
    let first = lines[start];
    let Some(caps) = STATE_RE.captures(first) else {
        return start + 1;
    };
    let prefix = group(&caps, "prefix");
    let name = format!("{}{}", group(&caps, "conname"), group(&caps, "coninst"));
    let serial: u32 = group(&caps, "serialno").parse().unwrap_or_default();

    let mut child = PARENT_ID_RE.is_match(first).then(|| {
        let mut child = ChildSa::new(name.clone(), serial);
        if let Some(ts) = connections.local_ts.get(&name).filter(|ts| !ts.is_empty()) {
            child.local_ts.push(ts.clone());
        }
        if let Some(ts) = connections.remote_ts.get(&name).filter(|ts| !ts.is_empty()) {
            child.remote_ts.push(ts.clone());
        }
        child
    });

    let mut end = start;
    for line in &lines[start..] {
        let Some(rest) = line.strip_prefix(prefix) else {
            break;
        };
        end += 1;
        match child.as_mut() {
            Some(child) => apply_child_line(rest, child, connections.get_mut(&name)),
            None => apply_parent_line(rest, serial, connections.get_mut(&name)),
        }
    }

    if let Some(child) = child {
        if let Some(sa) = connections.get_mut(&name) {
            sa.insert_child(child);
        }
    }
    end
}

fn apply_parent_line(line: &str, serial: u32, parent: Option<&mut IkeSa>) {
    let Some(sa) = parent else {
        return;
    };
    sa.uid = serial;
    if let Some(caps) = STATE_NAME_RE.captures(line) {
        sa.state = caps[1].to_string();
        sa.set_version_from_state(&caps[1]);
    }
}

fn apply_child_line(line: &str, child: &mut ChildSa, mut parent: Option<&mut IkeSa>) {
    if let Some(caps) = STATE_NAME_RE.captures(line) {
        child.state = caps[1].to_string();
        if let Some(sa) = parent.as_deref_mut() {
            sa.set_version_from_state(&caps[1]);
        }
    }

    if SPI_RE.captures_iter(line).any(|caps| &caps[1] == "tun") {
        child.mode = "TUNNEL".to_string();
    }

    for caps in TRAFFIC_RE.captures_iter(line) {
        let amount: u64 = caps[2].parse().unwrap_or_default();
        let bytes = match &caps[3] {
            "MB" => amount.saturating_mul(1024 * 1024),
            "KB" => amount.saturating_mul(1024),
            _ => amount,
        };
        let (protocol, inbound) = match &caps[1] {
            "AHin" => ("AH", true),
            "AHout" => ("AH", false),
            "ESPin" => ("ESP", true),
            "ESPout" => ("ESP", false),
            "IPCOMPin" => ("IPCOMP", true),
            _ => ("IPCOMP", false),
        };
        child.protocol = protocol.to_string();
        if inbound {
            child.bytes_in = bytes;
        } else {
            child.bytes_out = bytes;
        }
    }

    if let Some(caps) = USERNAME_RE.captures(line) {
        if let Some(sa) = parent {
            sa.remote_xauth_id = caps[1].to_string();
        }
    }
}
