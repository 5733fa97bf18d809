//! Configuration for TCP connections.

use crate::protocol::WrappingSeqno;

/// Tunable parameters for a single TCP connection.
#[derive(Debug, Clone)]
pub struct TcpConfig {
    /// Capacity of each direction's byte stream, in bytes.
    pub capacity: usize,
    /// Initial retransmission timeout, in milliseconds. Doubled on every
    /// backed-off retransmission.
    pub rt_timeout: u64,
    /// Initial sequence number to use for the outbound direction. A random
    /// ISN is chosen when unset.
    pub fixed_isn: Option<WrappingSeqno>,
    /// Consecutive retransmissions of the same segment tolerated before
    /// the connection is reset.
    pub max_retx_attempts: u32,
}

impl TcpConfig {
    /// Largest payload carried by a single segment, in bytes.
    pub const MAX_PAYLOAD_SIZE: usize = 1460;

    /// Default per-direction stream capacity, in bytes.
    pub const DEFAULT_CAPACITY: usize = 64000;

    /// Default initial retransmission timeout, in milliseconds.
    pub const DEFAULT_RT_TIMEOUT: u64 = 1000;

    /// Default retransmission cap.
    pub const DEFAULT_MAX_RETX_ATTEMPTS: u32 = 8;
}

impl Default for TcpConfig {
    fn default() -> Self {
        TcpConfig {
            capacity: Self::DEFAULT_CAPACITY,
            rt_timeout: Self::DEFAULT_RT_TIMEOUT,
            fixed_isn: None,
            max_retx_attempts: Self::DEFAULT_MAX_RETX_ATTEMPTS,
        }
    }
}
