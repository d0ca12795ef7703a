//! Error Types
//!
//! Three layers of failure, from the wire up:
//! - [`LinkError`]: one register transaction failed (transient, retried)
//! - [`CodecError`] / [`MapError`]: structural faults in data or tables (never retried)
//! - [`AdapterError`]: what a façade operation reports to its caller

use thiserror::Error;

/// Result type for link-level operations
pub type Result<T> = std::result::Result<T, LinkError>;

/// Result type for façade operations
pub type AdapterResult<T> = std::result::Result<T, AdapterError>;

/// Transport/link errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LinkError {
    /// Endpoint unreachable or refused
    #[error("Connection error: {0}")]
    Connection(String),

    /// Not connected
    #[error("Not connected")]
    NotConnected,

    /// IO errors on an open link
    #[error("IO error: {0}")]
    Io(String),

    /// Deadline exceeded while connecting or waiting for a response
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Malformed or unexpected frame
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Device answered with an exception response
    #[error("Device exception {code:#04X} on FC{function:02X}: {}", exception_description(*.code))]
    Exception { function: u8, code: u8 },

    /// Endpoint configuration cannot be used
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<std::io::Error> for LinkError {
    fn from(err: std::io::Error) -> Self {
        LinkError::Io(err.to_string())
    }
}

impl LinkError {
    pub fn connection(msg: impl Into<String>) -> Self {
        LinkError::Connection(msg.into())
    }

    pub fn io(msg: impl Into<String>) -> Self {
        LinkError::Io(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        LinkError::Timeout(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        LinkError::Protocol(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        LinkError::Config(msg.into())
    }

    /// Check if this error indicates the link must be reopened before the next attempt.
    ///
    /// Protocol and exception errors leave the link usable: only a resend is needed.
    /// A timed-out stream may still deliver the late response, so it is reopened too.
    pub fn needs_reconnect(&self) -> bool {
        matches!(
            self,
            LinkError::Connection(_)
                | LinkError::NotConnected
                | LinkError::Io(_)
                | LinkError::Timeout(_)
        )
    }

    /// Configuration faults fail the same way on every attempt
    pub fn is_retryable(&self) -> bool {
        !matches!(self, LinkError::Config(_))
    }
}

/// Human description of a Modbus exception code
pub fn exception_description(code: u8) -> &'static str {
    match code {
        0x01 => "Illegal Function",
        0x02 => "Illegal Data Address",
        0x03 => "Illegal Data Value",
        0x04 => "Slave Device Failure",
        0x05 => "Acknowledge",
        0x06 => "Slave Device Busy",
        0x07 => "Negative Acknowledge",
        0x08 => "Memory Parity Error",
        0x0A => "Gateway Path Unavailable",
        0x0B => "Gateway Target Device Failed to Respond",
        _ => "Unknown Exception",
    }
}

/// Value codec errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CodecError {
    #[error("expected {expected} registers, got {actual}")]
    WordCountMismatch { expected: u16, actual: usize },

    #[error("only single-register values can be written (descriptor spans {word_count})")]
    MultiRegisterWrite { word_count: u16 },

    #[error("value {value} encodes to {raw}, outside 0..=65535")]
    OutOfRange { value: f64, raw: f64 },

    #[error("value {0} is not a finite number")]
    NonFinite(f64),
}

/// Register map construction errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MapError {
    #[error("parameter '{parameter}': scale must be finite and non-zero, got {scale}")]
    InvalidScale { parameter: String, scale: f64 },

    #[error("parameter '{parameter}': {kind} cannot span {word_count} registers")]
    WordCountMismatch {
        parameter: String,
        kind: &'static str,
        word_count: u16,
    },

    #[error("parameter '{0}' is defined twice")]
    DuplicateParameter(String),

    #[error("{context} references unknown parameter '{parameter}'")]
    UnknownReference {
        context: &'static str,
        parameter: String,
    },
}

/// Errors reported by the parameter adapter
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AdapterError {
    /// Could not open the endpoint
    #[error("Connection failed: {0}")]
    Connection(LinkError),

    /// Every attempt of a transaction failed
    #[error("Transaction failed after {attempts} attempts: {last}")]
    Transport { attempts: u32, last: LinkError },

    #[error("Unknown parameter: {0}")]
    UnknownParameter(String),

    #[error("Unknown {table} label: {label}")]
    UnknownEnumLabel { table: &'static str, label: String },

    /// Device returned a register span of the wrong length
    #[error("Decode mismatch for '{parameter}': expected {expected} registers, got {actual}")]
    DecodeMismatch {
        parameter: String,
        expected: u16,
        actual: usize,
    },

    #[error("Parameter '{parameter}' is not writable: {reason}")]
    NotWritable { parameter: String, reason: String },

    #[error("Value {value} out of range for '{parameter}'")]
    ValueOutOfRange { parameter: String, value: f64 },

    #[error("Register map error: {0}")]
    Map(#[from] MapError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl AdapterError {
    /// Whether the failure came from the wire (as opposed to caller input or tables)
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            AdapterError::Connection(_) | AdapterError::Transport { .. }
        )
    }

    /// Classify a failed open: unusable configuration stays a configuration error
    pub(crate) fn from_open(err: LinkError) -> Self {
        match err {
            LinkError::Config(msg) => AdapterError::Config(msg),
            other => AdapterError::Connection(other),
        }
    }

    /// Attach the parameter name to a codec failure
    pub(crate) fn from_codec(parameter: &str, err: CodecError) -> Self {
        match err {
            CodecError::WordCountMismatch { expected, actual } => AdapterError::DecodeMismatch {
                parameter: parameter.to_string(),
                expected,
                actual,
            },
            CodecError::MultiRegisterWrite { .. } => AdapterError::NotWritable {
                parameter: parameter.to_string(),
                reason: err.to_string(),
            },
            CodecError::OutOfRange { value, .. } | CodecError::NonFinite(value) => {
                AdapterError::ValueOutOfRange {
                    parameter: parameter.to_string(),
                    value,
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_needs_reconnect_classification() {
        assert!(LinkError::connection("refused").needs_reconnect());
        assert!(LinkError::NotConnected.needs_reconnect());
        assert!(LinkError::io("broken pipe").needs_reconnect());
        assert!(LinkError::timeout("no response").needs_reconnect());

        assert!(!LinkError::protocol("bad crc").needs_reconnect());
        assert!(!LinkError::Exception {
            function: 0x03,
            code: 0x02
        }
        .needs_reconnect());
        assert!(!LinkError::config("no host").needs_reconnect());
    }

    #[test]
    fn test_retryable_classification() {
        assert!(LinkError::connection("refused").is_retryable());
        assert!(LinkError::timeout("no response").is_retryable());
        assert!(LinkError::protocol("bad crc").is_retryable());
        assert!(!LinkError::config("unsupported data bits: 9").is_retryable());
    }

    #[test]
    fn test_open_failure_classification() {
        assert_eq!(
            AdapterError::from_open(LinkError::config("unsupported stop bits: 3")),
            AdapterError::Config("unsupported stop bits: 3".to_string())
        );
        let err = AdapterError::from_open(LinkError::connection("refused"));
        assert!(matches!(err, AdapterError::Connection(_)));
        assert!(err.is_transport());
    }

    #[test]
    fn test_exception_display() {
        let err = LinkError::Exception {
            function: 0x06,
            code: 0x02,
        };
        let text = err.to_string();
        assert!(text.contains("0x02"));
        assert!(text.contains("FC06"));
        assert!(text.contains("Illegal Data Address"));
    }

    #[test]
    fn test_exception_description_unknown() {
        assert_eq!(exception_description(0x7F), "Unknown Exception");
        assert_eq!(exception_description(0x0B), "Gateway Target Device Failed to Respond");
    }

    #[test]
    fn test_codec_error_mapping() {
        let err = AdapterError::from_codec(
            "pv_total_energy",
            CodecError::WordCountMismatch {
                expected: 2,
                actual: 1,
            },
        );
        assert_eq!(
            err,
            AdapterError::DecodeMismatch {
                parameter: "pv_total_energy".to_string(),
                expected: 2,
                actual: 1
            }
        );
        assert!(!err.is_transport());

        let err = AdapterError::from_codec("time_now", CodecError::MultiRegisterWrite { word_count: 3 });
        assert!(matches!(err, AdapterError::NotWritable { .. }));
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "Broken pipe");
        let err: LinkError = io.into();
        assert!(matches!(err, LinkError::Io(_)));
        assert!(err.needs_reconnect());
    }
}
