//! IPsec daemon monitoring for the swanmon exporter.
//!
//! This crate turns the state of a strongSwan or Libreswan daemon into
//! Prometheus metrics:
//!
//! - **status** - parsers for the `ipsec statusall` (strongSwan) and
//!   `ipsec status` (Libreswan) text reports
//! - **vici** - strongSwan VICI client (codec, session, snapshot decoding)
//! - **collector** - serialized acquisition over one of the two paths
//! - **emitter** / **exposition** - snapshot to gauge conversion and text
//!   rendering
//!
//! # Example
//!
//! ```rust
//! use swanmon_proto::emitter::{Emitter, Metric};
//! use swanmon_proto::status;
//!
//! let output = "\
//! Security Associations (1 up, 0 connecting):
//!         home[1]: ESTABLISHED 5 minutes ago, 10.0.0.1[moon]...10.0.0.2[sun]
//! ";
//! let snapshot = status::parse(output).unwrap();
//! assert_eq!(snapshot.ike_sas.len(), 1);
//!
//! let emission = Emitter::default().emit(&Ok(snapshot));
//! assert!(emission.up);
//! assert!(emission
//!     .samples
//!     .iter()
//!     .any(|sample| sample.metric == Metric::IkeSaState));
//! ```
//!
//! # References
//!
//! - [VICI protocol](https://github.com/strongswan/strongswan/blob/master/src/libcharon/plugins/vici/README.md)
//! - [Prometheus text format](https://prometheus.io/docs/instrumenting/exposition_formats/)

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod collector;
pub mod command;
pub mod config;
pub mod emitter;
pub mod exporter;
pub mod exposition;
pub mod logging;
pub mod metrics;
pub mod model;
pub mod status;
pub mod vici;

pub use collector::{Collector, CollectorKind, Source};
pub use config::ExporterConfig;
pub use emitter::{Emission, Emitter, Metric, Sample, StateTables};
pub use exporter::Exporter;
pub use model::Snapshot;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
