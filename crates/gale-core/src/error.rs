//! Error types for gale-core
//!
//! These are submission and construction failures only. A request that was
//! submitted successfully never produces an `Error`; its transport or
//! protocol failure is reported through the [`Response`](crate::Response).

use thiserror::Error;

/// Socket half of a failure report when the socket layer had nothing to say
pub const NO_SOCKET_ERRORS: &str = "No socket errors";

/// TLS half of a failure report when the TLS error queue is empty
pub const NO_TLS_ERRORS: &str = "No additional TLS errors";

/// Result type alias for gale operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the gale HTTP client
#[derive(Debug, Error)]
pub enum Error {
    /// Request has no usable host
    #[error("Invalid host: {0:?}")]
    InvalidHost(String),

    /// Header name or value cannot be put on the wire
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    /// Path and query do not form a valid request target
    #[error("Invalid request target: {0}")]
    InvalidUri(String),

    /// Externally supplied reactor is unusable
    #[error("Invalid reactor: the supplied reactor has already been destroyed")]
    InvalidReactor,

    /// Reactor refused the exchange because it is shut down
    #[error("Reactor is closed")]
    ReactorClosed,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TLS error
    #[cfg(feature = "tls")]
    #[error("TLS error: {0}")]
    Tls(String),

    /// An https request was made from a build without TLS
    #[error("TLS support not enabled. Compile with 'tls' feature.")]
    TlsUnavailable,

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
