//! Error types for the TCP protocol engine.
//!
//! Protocol-level anomalies (an impossible acknowledgment, a segment
//! outside the receive window) are never surfaced as errors; the engine
//! drops or answers them per RFC 793. The errors here cover only calls
//! the local application makes against a connection that cannot honor
//! them.

use std::result;

/// A convenience wrapper around `Result` for `tcp_engine::Error`.
pub type Result<T> = result::Result<T, Error>;

/// Set of errors that can occur when driving a TCP connection.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// `connect` was called on a connection that has already transmitted
    /// its `SYN`.
    #[error("connection request already sent")]
    AlreadyConnected,
    /// The connection has shut down cleanly and no longer accepts data.
    #[error("connection is closed")]
    Closed,
    /// The connection was torn down by a reset, either received from the
    /// peer or emitted locally after exhausting retransmissions.
    #[error("connection reset")]
    Reset,
}
