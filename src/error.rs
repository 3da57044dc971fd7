//! Custom error types for the relay.
//!
//! `RelayError` is the single library error type. Binaries wrap it in
//! `anyhow::Error` at their boundary; inside the library every fallible
//! operation returns [`AppResult`].
//!
//! ## Error Taxonomy
//!
//! - **`Config`** / **`Configuration`**: the configuration file could not be
//!   parsed, or parsed into values that fail validation.
//! - **`Io`**: socket and file I/O.
//! - **`ShortHeader`**: the connection closed before a full upload header
//!   arrived. The connection is dropped without touching the store.
//! - **`InvalidHeader`**: a complete header whose capture time is not a
//!   finite number. Handled like a short header.
//! - **`PayloadTooLarge`** / **`EmptyPayload`** / **`ReadTimeout`**: the
//!   payload could not be drained into a usable frame. The device's write
//!   lease is released without publishing.
//! - **`Detection`**: the detection stage could not run (its worker panicked
//!   or was cancelled).
//! - **`MalformedRequest`**: an HTTP request line that could not be parsed.

use thiserror::Error;

/// Convenience alias for results using the relay error type.
pub type AppResult<T> = std::result::Result<T, RelayError>;

/// Every failure the relay can report.
#[derive(Error, Debug)]
pub enum RelayError {
    /// Configuration sources could not be extracted
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    /// Configuration values failed validation
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// Socket or file I/O
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Peer closed before a full upload header arrived
    #[error("Upload header too short: expected {expected} bytes, received {received}")]
    ShortHeader {
        /// Header size for the configured layout
        expected: usize,
        /// Bytes actually read
        received: usize,
    },

    /// Header decoded but carries unusable values
    #[error("Invalid upload header: {0}")]
    InvalidHeader(String),

    /// Payload grew past `upload.max_payload_bytes`
    #[error("Upload payload exceeds {limit} bytes")]
    PayloadTooLarge {
        /// Configured ceiling in bytes
        limit: usize,
    },

    /// Peer closed before sending any payload bytes
    #[error("Upload payload is empty")]
    EmptyPayload,

    /// A read exceeded `server.read_timeout_ms`
    #[error("Timed out after {0} ms waiting for the peer")]
    ReadTimeout(u64),

    /// The detection worker panicked or was cancelled
    #[error("Detection stage failed: {0}")]
    Detection(String),

    /// HTTP request line could not be parsed
    #[error("Malformed HTTP request: {0}")]
    MalformedRequest(String),
}

impl From<figment::Error> for RelayError {
    fn from(value: figment::Error) -> Self {
        RelayError::Config(Box::new(value))
    }
}

impl RelayError {
    /// Whether the error came from the peer hanging up or stalling rather
    /// than from the relay itself. Used to pick the log level.
    pub fn is_peer_fault(&self) -> bool {
        match self {
            RelayError::ShortHeader { .. }
            | RelayError::InvalidHeader(_)
            | RelayError::EmptyPayload
            | RelayError::ReadTimeout(_)
            | RelayError::PayloadTooLarge { .. }
            | RelayError::MalformedRequest(_) => true,
            RelayError::Io(err) => matches!(
                err.kind(),
                std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::UnexpectedEof
            ),
            _ => false,
        }
    }
}
