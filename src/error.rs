//! Error types for the CDC reader.
//!
//! Errors are classified so the reader loop can tell transient query
//! failures (retried with backoff) apart from fatal consumer failures.

use thiserror::Error;

/// Errors produced by the reader, the querier, or a consumer.
#[derive(Error, Debug)]
pub enum CdcError {
    /// Range query could not be issued or executed.
    #[error("query error: {0}")]
    Query(String),

    /// A CDC log row could not be decoded.
    #[error("row decode error: {0}")]
    Decode(String),

    /// Invalid reader configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// A change consumer rejected a change or could not be created.
    #[error("consumer error: {0}")]
    Consumer(String),

    /// The reader was cancelled by its outer scope.
    #[error("reader cancelled")]
    Cancelled,

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error.
    #[error("{0}")]
    Other(String),
}

impl CdcError {
    /// Create a new query error.
    pub fn query(msg: impl Into<String>) -> Self {
        Self::Query(msg.into())
    }

    /// Create a new row decode error.
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// Create a new configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new consumer error.
    pub fn consumer(msg: impl Into<String>) -> Self {
        Self::Consumer(msg.into())
    }

    /// Create a generic error.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Check if this error is retriable.
    ///
    /// Retriable errors cause the reader to back off and repeat the same
    /// window; everything else is fatal to the owning shard reader.
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::Query(_) | Self::Decode(_) => true,

            Self::Io(e) => {
                use std::io::ErrorKind;
                matches!(
                    e.kind(),
                    ErrorKind::ConnectionReset
                        | ErrorKind::ConnectionAborted
                        | ErrorKind::TimedOut
                        | ErrorKind::Interrupted
                )
            }

            Self::Config(_)
            | Self::Consumer(_)
            | Self::Cancelled
            | Self::Json(_)
            | Self::Other(_) => false,
        }
    }
}

/// Result type for CDC operations.
pub type Result<T> = std::result::Result<T, CdcError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CdcError::query("coordinator timed out");
        assert!(err.to_string().contains("query error"));
        assert!(err.to_string().contains("coordinator timed out"));
    }

    #[test]
    fn test_error_constructors() {
        let _ = CdcError::decode("bad cdc$operation value");
        let _ = CdcError::config("missing session");
        let _ = CdcError::consumer("downstream apply failed");
        let _ = CdcError::other("unknown");
    }

    #[test]
    fn test_error_is_retriable() {
        assert!(CdcError::query("timeout").is_retriable());
        assert!(CdcError::decode("short row").is_retriable());
        assert!(CdcError::Io(std::io::Error::from(std::io::ErrorKind::TimedOut)).is_retriable());

        assert!(!CdcError::config("bad window").is_retriable());
        assert!(!CdcError::consumer("apply failed").is_retriable());
        assert!(!CdcError::Cancelled.is_retriable());
        assert!(!CdcError::other("unknown").is_retriable());
    }
}
