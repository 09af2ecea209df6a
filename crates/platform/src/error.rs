//! Error types for swanmon

use std::fmt;
use std::time::Duration;

/// Unified error type for every scrape and construction failure
#[derive(Debug)]
pub enum SwanmonError {
    /// I/O error
    Io(std::io::Error),

    /// Configuration error (construction time only)
    Config(String),

    /// External command could not be spawned
    Exec {
        /// Program that was executed
        program: String,
        /// Underlying spawn error
        source: std::io::Error,
    },

    /// External command exited unsuccessfully
    ExitStatus {
        /// Program that was executed
        program: String,
        /// Exit code, if the process was not killed by a signal
        code: Option<i32>,
        /// Combined output captured from the command
        output: String,
    },

    /// Socket connection to the daemon failed
    Connect {
        /// Endpoint that was dialed
        endpoint: String,
        /// Underlying connect error
        source: std::io::Error,
    },

    /// An operation did not complete in time
    Timeout {
        /// What timed out ("connect", "command", ...)
        operation: &'static str,
        /// Configured limit
        after: Duration,
    },

    /// Protocol-level failure reported by, or while talking to, the daemon
    Protocol(String),

    /// Neither status dialect was recognized in command output
    UnrecognizedOutput,

    /// A structured response could not be decoded into the model
    Decode(String),

    /// Metric exposition could not be rendered
    Encode(String),

    /// A required field failed to parse
    InvalidField {
        /// Field name
        field: &'static str,
        /// Raw value that failed to parse
        value: String,
    },
}

impl fmt::Display for SwanmonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwanmonError::Io(e) => write!(f, "IO error: {}", e),
            SwanmonError::Config(msg) => write!(f, "Configuration error: {}", msg),
            SwanmonError::Exec { program, source } => {
                write!(f, "Failed to execute '{}': {}", program, source)
            }
            SwanmonError::ExitStatus { program, code, .. } => match code {
                Some(code) => write!(f, "'{}' exited with status {}", program, code),
                None => write!(f, "'{}' was terminated by a signal", program),
            },
            SwanmonError::Connect { endpoint, source } => {
                write!(f, "Failed to connect to {}: {}", endpoint, source)
            }
            SwanmonError::Timeout { operation, after } => {
                write!(f, "{} timed out after {:?}", operation, after)
            }
            SwanmonError::Protocol(msg) => write!(f, "Protocol error: {}", msg),
            SwanmonError::UnrecognizedOutput => write!(f, "Failed to recognize output type"),
            SwanmonError::Decode(msg) => write!(f, "Decode error: {}", msg),
            SwanmonError::Encode(msg) => write!(f, "Encode error: {}", msg),
            SwanmonError::InvalidField { field, value } => {
                write!(f, "Invalid {}: '{}'", field, value)
            }
        }
    }
}

impl std::error::Error for SwanmonError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SwanmonError::Io(e) => Some(e),
            SwanmonError::Exec { source, .. } => Some(source),
            SwanmonError::Connect { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<std::io::Error> for SwanmonError {
    fn from(err: std::io::Error) -> Self {
        SwanmonError::Io(err)
    }
}

/// Result type for swanmon operations
pub type SwanmonResult<T> = Result<T, SwanmonError>;
