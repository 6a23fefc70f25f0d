//! Error handling for hashcash approval
//!
//! Error types covering encoding, external chain reads and configuration,
//! with enough context to tell which read failed and against which contract.

use alloy_primitives::Address;
use alloy_transport::{RpcError, TransportError};
use thiserror::Error;

/// Result type alias for hashcash approval operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for hashcash approval
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP request errors
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Provider transport errors other than node error responses
    #[error("RPC transport error: {0}")]
    Transport(TransportError),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML configuration parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Layered configuration errors
    #[error("Configuration source error: {0}")]
    ConfigSource(#[from] config::ConfigError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed or out-of-range ABI encoder input
    #[error("Encoding error: {message}")]
    Encoding { message: String },

    /// A read-only contract call failed or returned something unusable
    #[error("External read `{read}` against {address:#x} failed: {message}")]
    ExternalRead {
        read: String,
        address: Address,
        message: String,
    },

    /// JSON-RPC level error returned by the node
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// Caller supplied an invalid parameter
    #[error("Invalid parameter: {message}")]
    InvalidParameter { message: String },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Invalid state errors
    #[error("Invalid state: {message}")]
    InvalidState { message: String },
}

impl Error {
    /// Create an encoding error
    pub fn encoding(message: impl Into<String>) -> Self {
        Self::Encoding {
            message: message.into(),
        }
    }

    /// Create an external read error
    pub fn external_read(
        read: impl Into<String>,
        address: Address,
        message: impl Into<String>,
    ) -> Self {
        Self::ExternalRead {
            read: read.into(),
            address,
            message: message.into(),
        }
    }

    /// Create a JSON-RPC error
    pub fn rpc(code: i64, message: impl Into<String>) -> Self {
        Self::Rpc {
            code,
            message: message.into(),
        }
    }

    /// Create an invalid parameter error
    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an invalid state error
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Http(e) => {
                if let Some(status) = e.status() {
                    status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS
                } else {
                    e.is_timeout() || e.is_connect()
                }
            }
            Error::Transport(e) => crate::client::is_transient(e),
            Error::Io(_) => true,
            _ => false,
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            Error::Http(_) => "http",
            Error::Transport(_) => "transport",
            Error::Json(_) => "json",
            Error::Yaml(_) => "yaml",
            Error::ConfigSource(_) => "config_source",
            Error::Io(_) => "io",
            Error::Encoding { .. } => "encoding",
            Error::ExternalRead { .. } => "external_read",
            Error::Rpc { .. } => "rpc",
            Error::InvalidParameter { .. } => "invalid_parameter",
            Error::Config { .. } => "config",
            Error::InvalidState { .. } => "invalid_state",
        }
    }
}

impl From<TransportError> for Error {
    fn from(error: TransportError) -> Self {
        match error {
            RpcError::ErrorResp(payload) => Error::rpc(payload.code, payload.message.to_string()),
            other => Error::Transport(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::encoding("value overflows uint8");
        assert_eq!(err.to_string(), "Encoding error: value overflows uint8");

        let err = Error::external_read("difficulty", Address::repeat_byte(0xab), "execution reverted");
        assert_eq!(
            err.to_string(),
            "External read `difficulty` against 0xabababababababababababababababababababab failed: execution reverted"
        );
    }

    #[test]
    fn test_error_category() {
        assert_eq!(Error::encoding("x").category(), "encoding");
        assert_eq!(Error::rpc(-32000, "x").category(), "rpc");
        assert_eq!(Error::invalid_state("x").category(), "invalid_state");
    }

    #[test]
    fn test_retryable() {
        assert!(!Error::encoding("x").is_retryable());
        assert!(!Error::external_read("getNonce", Address::ZERO, "x").is_retryable());

        let io_err = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        assert!(Error::from(io_err).is_retryable());
    }

    #[test]
    fn test_transport_conversions() {
        let err = Error::from(TransportError::local_usage_str("no signer"));
        assert_eq!(err.category(), "transport");
        assert!(!err.is_retryable());

        let err = Error::from(alloy_transport::TransportErrorKind::http_error(503, String::new()));
        assert!(err.is_retryable());
        let err = Error::from(alloy_transport::TransportErrorKind::http_error(404, String::new()));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_error_conversions() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }
}
