//! Error types for the SSDB client.

use thiserror::Error;

/// Main error type for all client operations.
#[derive(Debug, Error)]
pub enum SsdbError {
    /// I/O error during socket operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The receive buffer would grow past its hard limit.
    #[error("receive buffer would exceed {limit} bytes (required {required})")]
    BufferLimit {
        /// Capacity the pending append would have needed.
        required: usize,
        /// The hard cap the buffer enforces.
        limit: usize,
    },

    /// Malformed response frame (bad length digit, oversize header,
    /// odd-length map body, and similar).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Server closed the connection (empty frame or zero-byte read).
    #[error("connection closed by server")]
    ConnectionClosed,

    /// The `auth` handshake was rejected or failed mid-flight.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The pool is at `max_connections` and the lease wait timed out.
    #[error("connection pool exhausted")]
    PoolExhausted,

    /// A freshly (re)connected socket still had unsolicited data pending.
    #[error("connection not ready: unexpected data on idle socket")]
    ConnectionNotReady,

    /// Could not acquire the fork-reset lock within its bounded wait.
    #[error("timed out waiting for the fork reset lock")]
    ForkLockTimeout,

    /// Server replied with a status other than `ok` or `not_found`.
    #[error("server error: {0}")]
    Remote(String),

    /// Command name missing from the response classification table.
    #[error("unknown command: {0}")]
    UnknownCommand(String),
}

/// Result type alias using [`SsdbError`].
pub type Result<T> = std::result::Result<T, SsdbError>;
