//! Mapping VICI responses onto the snapshot model
//!
//! Missing keys decode to zero, empty, or `None`. A present value that does
//! not parse as the expected number is a decode error.

use std::str::FromStr;

use swanmon_platform::{SwanmonError, SwanmonResult};

use super::message::{Element, Message};
use crate::model::{ChildSa, DaemonStats, IkeSa, IkeSaCounts, Pool, Queues, Workers};

fn number<T: FromStr>(message: &Message, key: &str) -> SwanmonResult<Option<T>> {
    match message.get_str(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| SwanmonError::Decode(format!("'{}' is not a valid number: '{}'", key, raw))),
    }
}

fn number_or_zero<T: FromStr + Default>(message: &Message, key: &str) -> SwanmonResult<T> {
    Ok(number(message, key)?.unwrap_or_default())
}

fn text(message: &Message, key: &str) -> String {
    message.get_str(key).unwrap_or_default()
}

fn list(message: &Message, key: &str) -> Vec<String> {
    message.get_list(key).unwrap_or_default()
}

fn queues(message: Option<&Message>) -> SwanmonResult<Queues> {
    let Some(message) = message else {
        return Ok(Queues::default());
    };
    Ok(Queues {
        critical: number_or_zero(message, "critical")?,
        high: number_or_zero(message, "high")?,
        medium: number_or_zero(message, "medium")?,
        low: number_or_zero(message, "low")?,
    })
}

/// Decode a `stats` response
///
/// # Errors
///
/// Returns `SwanmonError::Decode` if a counter is not a number.
pub fn stats(message: &Message) -> SwanmonResult<DaemonStats> {
    let uptime_since = message
        .get_section("uptime")
        .and_then(|uptime| uptime.get_str("since"));

    let workers = message.get_section("workers");
    let workers = Workers {
        total: workers.map_or(Ok(0), |w| number_or_zero(w, "total"))?,
        idle: workers.map_or(Ok(0), |w| number_or_zero(w, "idle"))?,
        active: queues(workers.and_then(|w| w.get_section("active")))?,
    };

    let ike_sas = match message.get_section("ikesas") {
        Some(section) => IkeSaCounts {
            total: number_or_zero(section, "total")?,
            half_open: number_or_zero(section, "half-open")?,
        },
        None => IkeSaCounts::default(),
    };

    Ok(DaemonStats {
        uptime_since,
        workers: Some(workers),
        queues: Some(queues(message.get_section("queues"))?),
        scheduled: number(message, "scheduled")?,
        ike_sas,
    })
}

/// Decode a `get-pools` response; every top-level section is one pool
///
/// # Errors
///
/// Returns `SwanmonError::Decode` if a counter is not a number.
pub fn pools(message: &Message) -> SwanmonResult<Vec<Pool>> {
    let mut pools = Vec::new();
    for (name, element) in message.iter() {
        let Element::Section(section) = element else {
            continue;
        };
        pools.push(Pool {
            name: name.to_string(),
            address: text(section, "base"),
            size: number_or_zero(section, "size")?,
            online: number_or_zero(section, "online")?,
            offline: number_or_zero(section, "offline")?,
        });
    }
    Ok(pools)
}

/// Decode one `list-sa` event; every top-level section is one IKE SA
///
/// # Errors
///
/// Returns `SwanmonError::Decode` if a numeric field is malformed.
pub fn ike_sas(message: &Message) -> SwanmonResult<Vec<IkeSa>> {
    let mut sas = Vec::new();
    for (name, element) in message.iter() {
        let Element::Section(section) = element else {
            continue;
        };
        sas.push(ike_sa(name, section)?);
    }
    Ok(sas)
}

fn ike_sa(name: &str, section: &Message) -> SwanmonResult<IkeSa> {
    let mut sa = IkeSa::new(name, number_or_zero(section, "uniqueid")?);
    sa.version = number_or_zero(section, "version")?;
    sa.state = text(section, "state");
    sa.local_host = text(section, "local-host");
    sa.local_id = text(section, "local-id");
    sa.remote_host = text(section, "remote-host");
    sa.remote_id = text(section, "remote-id");
    sa.remote_xauth_id = text(section, "remote-xauth-id");
    sa.remote_eap_id = text(section, "remote-eap-id");
    sa.established = number(section, "established")?;
    sa.local_vips = list(section, "local-vips");
    sa.remote_vips = list(section, "remote-vips");

    if let Some(children) = section.get_section("child-sas") {
        for (_, element) in children.iter() {
            if let Element::Section(child) = element {
                sa.insert_child(child_sa(child)?);
            }
        }
    }
    Ok(sa)
}

fn child_sa(section: &Message) -> SwanmonResult<ChildSa> {
    let mut child = ChildSa::new(text(section, "name"), number_or_zero(section, "uniqueid")?);
    child.reqid = number(section, "reqid")?;
    child.state = text(section, "state");
    child.mode = text(section, "mode");
    child.protocol = text(section, "protocol");
    child.bytes_in = number_or_zero(section, "bytes-in")?;
    child.packets_in = number(section, "packets-in")?;
    child.bytes_out = number_or_zero(section, "bytes-out")?;
    child.packets_out = number(section, "packets-out")?;
    child.installed = number(section, "install-time")?;
    child.local_ts = list(section, "local-ts");
    child.remote_ts = list(section, "remote-ts");
    Ok(child)
}
