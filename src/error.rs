//! Tunnel error taxonomy.
//!
//! # Kinds
//! - Rejection: the breaker refused the call (`CircuitOpen`, `CircuitTimeout`)
//! - Exhaustion: the retry policy gave up (`MaxRetriesExceeded`)
//! - Cancellation: the caller's token fired (`Cancelled`)
//! - Capacity: `MaxSessionsReached`, `MaxStreamsReached`
//! - Not-found: `SessionNotFound`, `StreamNotFound`
//! - Underlying: transport failures returned by the wrapped operation
//!
//! # Design Decisions
//! - Classification is a property of the error, not of the caller
//! - Rejection and exhaustion are never confused with the wrapped failure

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the resilience and session layer.
#[derive(Debug, Error)]
pub enum TunnelError {
    /// The breaker for this target is open; the call was never attempted.
    #[error("circuit breaker is open")]
    CircuitOpen,

    /// The breaker-guarded call did not finish in time.
    #[error("circuit breaker timeout")]
    CircuitTimeout,

    /// The retry policy ran out of attempts.
    #[error("max retries exceeded after {attempts} attempts")]
    MaxRetriesExceeded { attempts: u32 },

    /// The caller cancelled the operation.
    #[error("operation cancelled")]
    Cancelled,

    #[error("session expired")]
    SessionExpired,

    #[error("session not found")]
    SessionNotFound,

    #[error("max sessions reached ({0})")]
    MaxSessionsReached(usize),

    #[error("stream closed")]
    StreamClosed,

    #[error("stream {0} not found")]
    StreamNotFound(u32),

    #[error("max streams reached ({0})")]
    MaxStreamsReached(usize),

    /// Remote endpoint is unreachable or refused the connection.
    #[error("destination unavailable: {0}")]
    Unavailable(String),

    /// Transport operation timed out.
    #[error("transport timeout after {0:?}")]
    Timeout(Duration),

    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    #[error("reconnect failed: {0}")]
    ReconnectFailed(String),

    #[error("connection closed")]
    ConnectionClosed,

    /// Peer violated the tunnel protocol. Retrying will not help.
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Result type for tunnel operations.
pub type Result<T> = std::result::Result<T, TunnelError>;

impl TunnelError {
    /// Whether a retry loop should try the operation again.
    pub fn is_retryable(&self) -> bool {
        match self {
            TunnelError::Unavailable(_)
            | TunnelError::Timeout(_)
            | TunnelError::HandshakeFailed(_)
            | TunnelError::ReconnectFailed(_)
            | TunnelError::ConnectionClosed
            | TunnelError::CircuitOpen
            | TunnelError::CircuitTimeout => true,
            TunnelError::Io(e) => io_is_retryable(e),
            _ => false,
        }
    }

    /// Whether the condition is expected to clear on its own.
    ///
    /// Covers exactly the retryable kinds.
    pub fn is_transient(&self) -> bool {
        self.is_retryable()
    }

    /// True for breaker rejections (the operation was never attempted).
    pub fn is_rejection(&self) -> bool {
        matches!(self, TunnelError::CircuitOpen | TunnelError::CircuitTimeout)
    }
}

fn io_is_retryable(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::TimedOut
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::UnexpectedEof
    )
}

/// `None` (no error) is never retryable.
pub fn is_retryable(err: Option<&TunnelError>) -> bool {
    err.is_some_and(TunnelError::is_retryable)
}

/// `None` (no error) is never transient.
pub fn is_transient(err: Option<&TunnelError>) -> bool {
    err.is_some_and(TunnelError::is_transient)
}
