use std::{fmt, io};

use crate::error::mongo::format_mongodb_error;

/// Crate-wide `Result` type using [`CursorError`] as the error.
pub type Result<T> = std::result::Result<T, CursorError>;

/// Server error code reported when an operation was interrupted.
pub(crate) const INTERRUPTED_CODE: i32 = 11601;

/// Message fragments that identify a deliberately closed transport.
const TRANSPORT_CLOSED_MARKERS: &[&str] = &[
    "server is closed",
    "topology is closed",
    "client was shut down",
];

/// Top-level error type for cursor operations.
#[derive(Debug)]
pub enum CursorError {
    /// Malformed option value or unknown flag name. Never reaches the network.
    InvalidArgument(String),

    /// A builder or option setter was called after the cursor was initialized.
    CursorInUse(String),

    /// `next()` was called on a cursor the caller already knows is dead.
    CursorExhausted,

    /// Internal invariant violation.
    IllegalState(String),

    /// The underlying transport was closed on purpose.
    TransportClosed(String),

    /// Any other server or network failure.
    OperationFailed { code: Option<i32>, message: String },

    /// A document could not be decoded into the caller's type.
    Decode(bson::de::Error),

    /// MongoDB driver errors.
    MongoDb(mongodb::error::Error),

    /// Configuration errors.
    Config(ConfigError),

    /// I/O errors.
    Io(io::Error),
}

/// Configuration-specific errors.
#[derive(Debug)]
pub enum ConfigError {
    /// Config file not found.
    FileNotFound(String),

    /// Invalid config format.
    InvalidFormat(String),

    /// Invalid field value.
    InvalidValue { field: String, value: String },
}

impl CursorError {
    /// Build an `OperationFailed` error without a server code.
    pub fn operation_failed(message: impl Into<String>) -> Self {
        CursorError::OperationFailed {
            code: None,
            message: message.into(),
        }
    }

    /// Server error code, when the failure carries one.
    pub fn code(&self) -> Option<i32> {
        match self {
            CursorError::OperationFailed { code, .. } => *code,
            CursorError::MongoDb(e) => match e.kind.as_ref() {
                mongodb::error::ErrorKind::Command(command_error) => Some(command_error.code),
                _ => None,
            },
            _ => None,
        }
    }

    /// Whether the error means the transport was shut down deliberately.
    pub fn is_transport_closed(&self) -> bool {
        match self {
            CursorError::TransportClosed(_) => true,
            CursorError::OperationFailed { message, .. } => has_transport_closed_marker(message),
            CursorError::MongoDb(e) => has_transport_closed_marker(&e.to_string()),
            _ => false,
        }
    }

    /// Whether the server interrupted the operation.
    pub fn is_interrupted(&self) -> bool {
        if self.code() == Some(INTERRUPTED_CODE) {
            return true;
        }
        match self {
            CursorError::OperationFailed { message, .. } => {
                message.to_ascii_lowercase().contains("interrupted")
            }
            _ => false,
        }
    }

    /// Errors a stream treats as a graceful end rather than a failure.
    pub fn is_benign_stream_termination(&self) -> bool {
        self.is_transport_closed()
            || self.is_interrupted()
            || matches!(self, CursorError::CursorExhausted)
    }
}

fn has_transport_closed_marker(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    TRANSPORT_CLOSED_MARKERS
        .iter()
        .any(|marker| message.contains(marker))
}

/* ========================= Display & Error impls ========================= */

impl fmt::Display for CursorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CursorError::InvalidArgument(msg) => write!(f, "Invalid argument: {msg}"),
            CursorError::CursorInUse(msg) => write!(f, "Cursor in use: {msg}"),
            CursorError::CursorExhausted => write!(f, "Cursor is exhausted"),
            CursorError::IllegalState(msg) => write!(f, "Illegal state: {msg}"),
            CursorError::TransportClosed(msg) => write!(f, "Transport closed: {msg}"),
            CursorError::OperationFailed {
                code: Some(code),
                message,
            } => write!(f, "Operation failed ({code}): {message}"),
            CursorError::OperationFailed { code: None, message } => {
                write!(f, "Operation failed: {message}")
            }
            CursorError::Decode(e) => write!(f, "Failed to decode document: {e}"),
            CursorError::MongoDb(e) => format_mongodb_error(f, e),
            CursorError::Config(e) => write!(f, "Configuration error: {e}"),
            CursorError::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::FileNotFound(path) => write!(f, "Config file not found: {path}"),
            ConfigError::InvalidFormat(msg) => write!(f, "Invalid config format: {msg}"),
            ConfigError::InvalidValue { field, value } => {
                write!(f, "Invalid value '{value}' for field '{field}'")
            }
        }
    }
}

impl std::error::Error for CursorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CursorError::Decode(e) => Some(e),
            CursorError::MongoDb(e) => Some(e),
            CursorError::Config(e) => Some(e),
            CursorError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl std::error::Error for ConfigError {}

/* ========================= Conversions to CursorError ========================= */

impl From<io::Error> for CursorError {
    fn from(err: io::Error) -> Self {
        CursorError::Io(err)
    }
}

impl From<mongodb::error::Error> for CursorError {
    fn from(err: mongodb::error::Error) -> Self {
        CursorError::MongoDb(err)
    }
}

impl From<ConfigError> for CursorError {
    fn from(err: ConfigError) -> Self {
        CursorError::Config(err)
    }
}

impl From<bson::de::Error> for CursorError {
    fn from(err: bson::de::Error) -> Self {
        CursorError::Decode(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_closed_classification() {
        assert!(CursorError::TransportClosed("bye".into()).is_transport_closed());
        assert!(CursorError::operation_failed("Topology is closed").is_transport_closed());
        assert!(CursorError::operation_failed("server is closed").is_benign_stream_termination());
        assert!(!CursorError::operation_failed("boom").is_transport_closed());
    }

    #[test]
    fn test_interrupted_classification() {
        let by_code = CursorError::OperationFailed {
            code: Some(INTERRUPTED_CODE),
            message: "operation was killed".into(),
        };
        assert!(by_code.is_interrupted());
        assert!(CursorError::operation_failed("operation was interrupted").is_interrupted());
        assert!(!CursorError::InvalidArgument("interrupted".into()).is_interrupted());
    }

    #[test]
    fn test_display_includes_code() {
        let err = CursorError::OperationFailed {
            code: Some(43),
            message: "cursor id 42 not found".into(),
        };
        assert_eq!(err.to_string(), "Operation failed (43): cursor id 42 not found");
        assert_eq!(err.code(), Some(43));
    }

    #[test]
    fn test_config_error_conversion() {
        let err: CursorError = ConfigError::FileNotFound("/nope.toml".into()).into();
        assert!(matches!(err, CursorError::Config(_)));
        assert_eq!(
            err.to_string(),
            "Configuration error: Config file not found: /nope.toml"
        );
    }
}
