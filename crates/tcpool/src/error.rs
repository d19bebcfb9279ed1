//! Pool and connection error types.

use std::time::Duration;

use thiserror::Error;

/// Errors returned by pool operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PoolError {
    /// The pool configuration was rejected at construction.
    #[error("invalid pool configuration: {0}")]
    InvalidConfiguration(String),

    /// No connection became available within the requested window.
    #[error("timed out trying to get a connection after waiting for {0:?}")]
    AcquireTimeout(Duration),

    /// The pool has been shut down.
    #[error("connection pool is closed")]
    PoolClosed,

    /// The pool was created outside of a tokio runtime.
    #[error("connection pool requires a running tokio runtime")]
    NoRuntime,

    /// An operation on a pooled connection failed.
    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

/// Errors returned by operations on a single [`Connection`](crate::Connection).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConnectionError {
    /// The connection has already been marked failed.
    #[error("connection is not usable")]
    Unusable,

    /// The peer closed the socket.
    #[error("connection closed by peer")]
    EndOfStream,

    /// A read did not complete before its deadline.
    #[error("i/o timeout")]
    IoTimeout,

    /// Dialing the endpoint did not complete in time.
    #[error("connect to {endpoint} timed out after {timeout:?}")]
    ConnectTimeout {
        /// Endpoint being dialed.
        endpoint: String,
        /// Timeout that elapsed.
        timeout: Duration,
    },

    /// The endpoint did not resolve to any socket address.
    #[error("could not resolve endpoint {0}")]
    Resolve(String),

    /// Other transport-level failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConnectionError {
    /// Whether this error leaves the connection unusable.
    ///
    /// Timeouts do not; the caller may retry on the same connection.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::IoTimeout)
    }
}

/// Result type for pool operations.
pub type Result<T> = std::result::Result<T, PoolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_is_not_fatal() {
        assert!(!ConnectionError::IoTimeout.is_fatal());
        assert!(ConnectionError::EndOfStream.is_fatal());
        assert!(ConnectionError::Unusable.is_fatal());
    }

    #[test]
    fn test_connection_error_converts_into_pool_error() {
        let err: PoolError = ConnectionError::EndOfStream.into();
        assert!(matches!(
            err,
            PoolError::Connection(ConnectionError::EndOfStream)
        ));
        assert_eq!(err.to_string(), "connection closed by peer");
    }
}
