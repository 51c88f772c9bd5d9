//! Error types for the session transport.

use thiserror::Error;

/// Transport-layer errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// An I/O error from the underlying socket.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No listening socket could be bound in the configured port range.
    #[error("failed to bind listener: {0}")]
    BindFailed(String),

    /// A connection attempt did not complete within the configured timeout.
    #[error("connection timed out")]
    ConnectTimeout,

    /// The target peer has no known address to connect to.
    #[error("peer has no known address")]
    NoKnownAddress,
}

/// Convenience alias for transport results.
pub type TransportResult<T> = Result<T, TransportError>;
