//! Status command output parsing
//!
//! The `ipsec` front-end prints one of two textual dialects depending on the
//! installed daemon. [`Dialect::detect`] picks one by looking for a marker
//! line, then the matching [`Parser`] turns the text into a [`Snapshot`].
//!
//! # Example
//!
//! ```
//! use swanmon_proto::status::{self, Dialect};
//!
//! let output = "Security Associations (0 up, 0 connecting):\n  none\n";
//! assert_eq!(Dialect::detect(output).unwrap(), Dialect::Strongswan);
//!
//! let snapshot = status::parse(output).unwrap();
//! assert!(snapshot.ike_sas.is_empty());
//! ```

mod libreswan;
mod strongswan;

pub use libreswan::{parse_status, Libreswan};
pub use strongswan::{parse_statusall, Strongswan};

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use swanmon_platform::{Parser, SwanmonError, SwanmonResult};

use crate::logging;
use crate::model::Snapshot;

static STRONGSWAN_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!("(?m){}", strongswan::SA_HEADER)).unwrap());
static LIBRESWAN_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(libreswan::CONNECTION_LIST).unwrap());

static STRONGSWAN: Strongswan = Strongswan;
static LIBRESWAN: Libreswan = Libreswan;

/// Status output dialect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    /// strongSwan `statusall`
    Strongswan,
    /// Libreswan `status`
    Libreswan,
}

impl Dialect {
    /// Identify the dialect of a command output
    ///
    /// strongSwan is checked first, so text carrying both markers is treated
    /// as strongSwan.
    ///
    /// # Errors
    ///
    /// Returns `SwanmonError::UnrecognizedOutput` if neither marker occurs.
    pub fn detect(output: &str) -> SwanmonResult<Self> {
        if STRONGSWAN_MARKER.is_match(output) {
            Ok(Dialect::Strongswan)
        } else if LIBRESWAN_MARKER.is_match(output) {
            Ok(Dialect::Libreswan)
        } else {
            Err(SwanmonError::UnrecognizedOutput)
        }
    }

    /// Parser for this dialect
    pub fn parser(self) -> &'static dyn Parser<Output = Snapshot> {
        match self {
            Dialect::Strongswan => &STRONGSWAN,
            Dialect::Libreswan => &LIBRESWAN,
        }
    }

    /// Name used in logs
    pub fn as_str(self) -> &'static str {
        self.parser().id()
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Detect the dialect and parse the output
///
/// # Errors
///
/// Returns `SwanmonError::UnrecognizedOutput` if no dialect is detected.
/// Parsing itself is lenient and never fails on malformed lines.
pub fn parse(output: &str) -> SwanmonResult<Snapshot> {
    let dialect = Dialect::detect(output)?;
    logging::log_dialect_detected(dialect.as_str(), output.len());
    dialect.parser().parse(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_strongswan() {
        let output = "Status of IKE charon daemon\nSecurity Associations (2 up, 1 connecting):\n";
        assert_eq!(Dialect::detect(output).unwrap(), Dialect::Strongswan);
    }

    #[test]
    fn test_detect_libreswan() {
        let output = "000 using kernel interface: xfrm\n000 Connection list:\n000\n";
        assert_eq!(Dialect::detect(output).unwrap(), Dialect::Libreswan);
    }

    #[test]
    fn test_detect_prefers_strongswan() {
        let output = "000 Connection list:\nSecurity Associations (0 up, 0 connecting):\n";
        assert_eq!(Dialect::detect(output).unwrap(), Dialect::Strongswan);
    }

    #[test]
    fn test_detect_unrecognized() {
        assert!(matches!(
            Dialect::detect("bin\nboot\ndev\n"),
            Err(SwanmonError::UnrecognizedOutput)
        ));
        assert!(matches!(parse(""), Err(SwanmonError::UnrecognizedOutput)));
    }

    #[test]
    fn test_marker_must_span_whole_line() {
        let output = "  Security Associations (0 up, 0 connecting):\n";
        assert!(Dialect::detect(output).is_err());
    }

    #[test]
    fn test_dialect_names() {
        assert_eq!(Dialect::Strongswan.to_string(), "strongswan");
        assert_eq!(Dialect::Libreswan.to_string(), "libreswan");
    }
}
