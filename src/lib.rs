//! A user-space implementation of the Transmission Control Protocol (TCP)
//! engine, based on [RFC 793].
//!
//! The crate provides the protocol core only: the flow-controlled byte
//! stream, the out-of-order stream reassembler, the retransmitting sender,
//! the validating receiver, and the connection state machine that composes
//! them. Carrying segments over a wire (tunnel device, UDP socket, raw
//! Ethernet) and coupling the byte streams to OS sockets are left to the
//! embedding program.
//!
//! The engine is strictly single-threaded and reactive: every entry point
//! runs to completion, no operation blocks, and no threads are owned. The
//! caller feeds parsed segments in, drains outbound segments after every
//! call, and reports the passage of time through millisecond ticks.
//!
//! [RFC 793]: https://www.rfc-editor.org/rfc/rfc793

#![deny(missing_docs)]
#![warn(missing_debug_implementations)]
#![warn(rust_2018_idioms)]

pub mod config;
pub use config::TcpConfig;

pub mod protocol;

pub mod error;
pub use error::{Error, Result};
