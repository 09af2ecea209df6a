//! # swanmon platform
//!
//! Core types and traits shared by the swanmon crates.
//!
//! This crate provides:
//! - Unified error types (`SwanmonError`, `SwanmonResult`)
//! - Core traits (`Parser`, `Scraper`)
//!
//! # Examples
//!
//! ```
//! use swanmon_platform::{SwanmonError, SwanmonResult};
//!
//! fn detect(output: &str) -> SwanmonResult<&'static str> {
//!     if output.contains("Connection list:") {
//!         Ok("libreswan")
//!     } else {
//!         Err(SwanmonError::UnrecognizedOutput)
//!     }
//! }
//!
//! # fn main() -> SwanmonResult<()> {
//! assert_eq!(detect("000 Connection list:")?, "libreswan");
//! assert!(detect("bin boot dev").is_err());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod error;
pub mod traits;

pub use error::{SwanmonError, SwanmonResult};
pub use traits::{Parser, Scraper};

/// Platform version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
