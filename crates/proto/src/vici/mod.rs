//! strongSwan VICI polling
//!
//! The Versatile IKE Control Interface is strongSwan's binary request/response
//! protocol. One scrape opens a fresh [`Session`], issues `stats`,
//! `get-pools` and a streamed `list-sas`, and closes the session again.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use swanmon_proto::vici::{Endpoint, ViciPoller};
//!
//! # async fn example() -> swanmon_platform::SwanmonResult<()> {
//! let poller = ViciPoller::new(Endpoint::default(), Duration::from_secs(1));
//! let snapshot = poller.poll().await?;
//! println!("{} IKE SAs", snapshot.ike_sas.len());
//! # Ok(())
//! # }
//! ```

pub mod decode;
pub mod message;
pub mod packet;
mod session;

pub use message::{Element, Message};
pub use packet::{Packet, PacketType, MAX_FRAME_SIZE};
pub use session::{Endpoint, Session, DEFAULT_ENDPOINT};

use std::time::Duration;

use swanmon_platform::SwanmonResult;

use crate::model::Snapshot;

/// Default connect timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// Builds snapshots over VICI
#[derive(Debug, Clone)]
pub struct ViciPoller {
    endpoint: Endpoint,
    timeout: Duration,
}

impl ViciPoller {
    /// Create a poller for `endpoint`, bounding connects by `timeout`
    pub fn new(endpoint: Endpoint, timeout: Duration) -> Self {
        Self { endpoint, timeout }
    }

    /// Daemon endpoint
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Acquire one snapshot
    ///
    /// # Errors
    ///
    /// Any connect, transport, protocol or decode failure aborts the poll.
    pub async fn poll(&self) -> SwanmonResult<Snapshot> {
        let mut session = Session::connect(&self.endpoint, self.timeout).await?;

        let stats = session.request("stats", Message::new()).await?;
        let stats = decode::stats(&stats)?;

        let pools = session.request("get-pools", Message::new()).await?;
        let pools = decode::pools(&pools)?;

        let mut ike_sas = Vec::new();
        for event in session
            .streamed_request("list-sas", "list-sa", Message::new())
            .await?
        {
            event.check_success()?;
            ike_sas.extend(decode::ike_sas(&event)?);
        }

        Ok(Snapshot {
            stats,
            pools,
            ike_sas,
        }
        .finalize())
    }
}
