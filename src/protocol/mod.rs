//! Components of the TCP protocol engine.
//!
//! This module implements the pieces that compose into a full TCP
//! endpoint: sequence-number arithmetic, the flow-controlled byte stream,
//! the out-of-order stream reassembler, the receiving and sending halves
//! of a connection, and the connection state machine itself.

pub mod seqno;
pub use seqno::{WrappingSeqno, unwrap, wrap};

pub mod byte_stream;
pub use byte_stream::ByteStream;

pub mod reassembler;
pub use reassembler::StreamReassembler;

pub mod segment;
pub use segment::TcpSegment;

pub mod timer;

pub mod receiver;
pub use receiver::TcpReceiver;

pub mod sender;
pub use sender::{SenderState, TcpSender};

pub mod connection;
pub use connection::{TcpConnection, TcpState};
