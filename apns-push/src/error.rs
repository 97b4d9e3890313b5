//! Crate-wide error types.

use thiserror::Error;

/// Crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced to callers of the push engine and its transports.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Not connected to Push Notification Service")]
    NotConnected,

    #[error("No notifications queued to be sent")]
    EmptyQueue,

    #[error("Message ID format is not valid: {0}")]
    InvalidMessageId(u32),

    #[error("The Message ID {0} does not exist")]
    UnknownMessageId(u32),

    #[error("Sequence ids exhausted for this engine instance")]
    SequenceExhausted,

    #[error("Payload is {len} bytes, maximum is {max} bytes")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("Operation `{operation}` is not supported by the {transport} transport")]
    Unsupported {
        operation: &'static str,
        transport: &'static str,
    },

    #[error("Wire protocol error: {0}")]
    Wire(#[from] apns_wire::WireError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn unsupported(operation: &'static str, transport: &'static str) -> Self {
        Self::Unsupported {
            operation,
            transport,
        }
    }

    /// Whether the error was raised synchronously because of how the engine was used.
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            Self::NotConnected
                | Self::EmptyQueue
                | Self::InvalidMessageId(_)
                | Self::UnknownMessageId(_)
                | Self::PayloadTooLarge { .. }
                | Self::Validation(_)
                | Self::Wire(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_errors() {
        assert!(Error::NotConnected.is_usage_error());
        assert!(Error::UnknownMessageId(4).is_usage_error());
        assert!(!Error::Timeout("poll".to_string()).is_usage_error());
        assert!(!Error::Io(std::io::Error::other("reset")).is_usage_error());
    }

    #[test]
    fn test_messages() {
        assert_eq!(
            Error::UnknownMessageId(4).to_string(),
            "The Message ID 4 does not exist"
        );
        assert_eq!(
            Error::unsupported("write", "http").to_string(),
            "Operation `write` is not supported by the http transport"
        );
    }
}
