//! The TCP connection state machine.
//!
//! A [`TcpConnection`] composes a [`TcpSender`] and a [`TcpReceiver`] and
//! mediates everything that involves both halves: stamping outbound
//! segments with the acknowledgment and window the receiver derives,
//! answering segments that occupy sequence space, tearing both streams
//! down on a reset, and deciding when the connection is finished. The
//! classic connection state is never stored; it is derived on demand
//! from the two halves and the lifecycle flags.

use std::collections::VecDeque;

use log::{debug, warn};

use crate::protocol::{ByteStream, SenderState, TcpReceiver, TcpSegment, TcpSender};
use crate::{Error, Result, TcpConfig};

/// Idle multiple of the initial retransmission timeout after which a
/// lingering connection gives up waiting for stray retransmissions.
const TIME_WAIT_RTO_MULTIPLIER: u64 = 10;

/// Connection states from RFC 793 3.2, with `RESET` standing in for the
/// aborted endpoint.
///
/// ```text
///                              +---------+ ---------\      active OPEN
///                              |  CLOSED |            \    -----------
///                              +---------+<---------\   \   create TCB
///                                |     ^              \   \  snd SYN
///                   passive OPEN |     |   CLOSE        \   \
///                   ------------ |     | ----------       \   \
///                    create TCB  |     | delete TCB         \   \
///                                V     |                      \   \
///                              +---------+            CLOSE    |    \
///                              |  LISTEN |          ---------- |     |
///                              +---------+          delete TCB |     |
///                   rcv SYN      |     |     SEND              |     |
///                  -----------   |     |    -------            |     V
/// +---------+      snd SYN,ACK  /       \   snd SYN          +---------+
/// |         |<-----------------           ------------------>|         |
/// |   SYN   |                    rcv SYN                     |   SYN   |
/// |   RCVD  |<-----------------------------------------------|   SENT  |
/// |         |                    snd ACK                     |         |
/// |         |------------------           -------------------|         |
/// +---------+   rcv ACK of SYN  \       /  rcv SYN,ACK       +---------+
///   |           --------------   |     |   -----------
///   |                  x         |     |     snd ACK
///   |                            V     V
///   |  CLOSE                   +---------+
///   | -------                  |  ESTAB  |
///   | snd FIN                  +---------+
///   |                   CLOSE    |     |    rcv FIN
///   V                  -------   |     |    -------
/// +---------+          snd FIN  /       \   snd ACK          +---------+
/// |  FIN    |<-----------------           ------------------>|  CLOSE  |
/// | WAIT-1  |------------------                              |   WAIT  |
/// +---------+          rcv FIN  \                            +---------+
///   | rcv ACK of FIN   -------   |                            CLOSE  |
///   | --------------   snd ACK   |                           ------- |
///   V        x                   V                           snd FIN V
/// +---------+                  +---------+                   +---------+
/// |FINWAIT-2|                  | CLOSING |                   | LAST-ACK|
/// +---------+                  +---------+                   +---------+
///   |                rcv ACK of FIN |                 rcv ACK of FIN |
///   |  rcv FIN       -------------- |    Timeout      -------------- |
///   |  -------              x       V    ------------        x       V
///    \ snd ACK                 +---------+delete TCB         +---------+
///     ------------------------>|TIME WAIT|------------------>| CLOSED  |
///                              +---------+                   +---------+
/// ```
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[allow(non_camel_case_types)]
#[allow(clippy::upper_case_acronyms)]
pub enum TcpState {
    /// Fresh endpoint: nothing sent, nothing received. An arriving `SYN`
    /// is answered; `connect` turns it into an active opener.
    LISTEN,
    /// Our `SYN` is out and unacknowledged, the peer's has not arrived.
    SYN_SENT,
    /// The peer's `SYN` arrived and ours is out but unacknowledged.
    SYN_RCVD,
    /// Both `SYN`s acknowledged; the data transfer phase.
    ESTABLISHED,
    /// The peer's `FIN` arrived while our stream is still open.
    CLOSE_WAIT,
    /// Our `FIN` followed the peer's and awaits its acknowledgment.
    LAST_ACK,
    /// Our `FIN` is out and unacknowledged, the peer's has not arrived.
    FIN_WAIT_1,
    /// Our `FIN` is acknowledged, the peer's has not arrived.
    FIN_WAIT_2,
    /// Both `FIN`s are out, ours not yet acknowledged.
    CLOSING,
    /// Everything acknowledged both ways; lingering to absorb stray
    /// retransmissions of the peer's `FIN`.
    TIME_WAIT,
    /// Finished cleanly.
    CLOSED,
    /// Torn down abortively, by either side.
    RESET,
}

/// A full TCP endpoint over a single connection.
#[derive(Debug)]
pub struct TcpConnection {
    /// Configuration the connection was built with.
    cfg: TcpConfig,
    /// The sending half.
    sender: TcpSender,
    /// The receiving half.
    receiver: TcpReceiver,
    /// Segments stamped and ready for the datagram carrier.
    segments_out: VecDeque<TcpSegment>,
    /// Milliseconds since a segment last arrived.
    time_since_segment_ms: u64,
    /// Whether to hold the connection open after both streams finish, to
    /// absorb stray retransmissions. Cleared when the peer closes first.
    linger_after_streams_finish: bool,
    /// Whether the connection is still live in either direction.
    active: bool,
    /// Whether the connection ended in a reset.
    rst: bool,
}

impl TcpConnection {
    /// Creates an endpoint in the fresh state. It acts as a passive
    /// opener until [`connect`] is called.
    ///
    /// [`connect`]: TcpConnection::connect
    pub fn new(cfg: TcpConfig) -> Self {
        let sender = TcpSender::new(cfg.capacity, cfg.rt_timeout, cfg.fixed_isn);
        let receiver = TcpReceiver::new(cfg.capacity);

        TcpConnection {
            cfg,
            sender,
            receiver,
            segments_out: VecDeque::new(),
            time_since_segment_ms: 0,
            linger_after_streams_finish: true,
            active: true,
            rst: false,
        }
    }

    /// Initiates the connection by transmitting a `SYN`.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection is no longer active or has
    /// already transmitted its connection request.
    pub fn connect(&mut self) -> Result<()> {
        self.check_active()?;

        if self.sender.next_seqno() != 0 {
            return Err(Error::AlreadyConnected);
        }

        debug!("(LISTEN) connecting, constructing SYN: LISTEN -> SYN_SENT");

        self.sender.fill_window();
        self.push_pending();

        Ok(())
    }

    /// Accepts outbound application data, returning how much the stream
    /// buffered. Data is transmitted as the peer's window allows.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection is no longer active.
    pub fn write(&mut self, data: &[u8]) -> Result<usize> {
        self.check_active()?;

        let written = self.sender.stream_in_mut().write(data);
        self.sender.fill_window();
        self.push_pending();

        Ok(written)
    }

    /// Closes the outbound stream. The `FIN` goes out as soon as the
    /// remaining data and the peer's window allow.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection is no longer active.
    pub fn end_input_stream(&mut self) -> Result<()> {
        self.check_active()?;

        self.sender.stream_in_mut().end_input();
        self.sender.fill_window();
        self.push_pending();

        Ok(())
    }

    /// Processes one segment from the carrier.
    pub fn segment_received(&mut self, seg: &TcpSegment) {
        if !self.active {
            return;
        }

        self.time_since_segment_ms = 0;

        let before = self.state();

        if seg.rst {
            warn!("({before:?}) received RST, connection reset: {before:?} -> RESET");
            self.tear_down();
            return;
        }

        // A fresh endpoint answers nothing but a connection request.
        if self.in_listen() && !seg.syn {
            debug!("(LISTEN) segment carries no SYN: dropping");
            return;
        }

        self.receiver.segment_received(seg);

        // The peer closing before our stream ended makes us the passive
        // closer; no need to linger once everything is acknowledged.
        if self.receiver.stream_out().input_ended() && !self.sender.stream_in().input_ended() {
            self.linger_after_streams_finish = false;
        }

        if seg.ack {
            self.sender.ack_received(seg.ackno, seg.window);
        }

        if seg.length_in_sequence_space() > 0 {
            // Anything occupying sequence space deserves an answer, so
            // the peer learns the new ackno even if we have no data.
            self.sender.fill_window();
            if self.sender.segments_out().is_empty() {
                self.sender.send_empty_segment(false);
            }
        } else if let Some(ackno) = self.receiver.ackno() {
            // Keep-alive probe: an empty segment one below the ackno.
            if seg.seqno == ackno - 1 {
                self.sender.send_empty_segment(false);
            }
        }

        self.push_pending();
        self.try_clean_shutdown();

        let after = self.state();
        if after != before {
            debug!("({before:?}) received segment: {before:?} -> {after:?}");
        }
    }

    /// Reports `ms` milliseconds of elapsed time, driving retransmission
    /// and the TIME_WAIT clock.
    pub fn tick(&mut self, ms: u64) {
        if !self.active {
            return;
        }

        self.sender.tick(ms);
        self.time_since_segment_ms += ms;

        if self.sender.consecutive_retransmissions() > self.cfg.max_retx_attempts {
            let state = self.state();
            warn!(
                "({state:?}) retransmission limit exceeded, constructing RST: {state:?} -> RESET"
            );
            self.abort();
            return;
        }

        self.push_pending();
        self.try_clean_shutdown();
    }

    /// Derives the classic connection state from the two halves and the
    /// lifecycle flags.
    pub fn state(&self) -> TcpState {
        if self.rst {
            return TcpState::RESET;
        }
        if !self.active {
            return TcpState::CLOSED;
        }

        let syn_received = self.receiver.ackno().is_some();
        let fin_received = self.receiver.stream_out().input_ended();

        match self.sender.state() {
            SenderState::Closed => TcpState::LISTEN,
            SenderState::SynSent if syn_received => TcpState::SYN_RCVD,
            SenderState::SynSent => TcpState::SYN_SENT,
            // Our SYN was acknowledged by a bare ACK; the peer's SYN is
            // still on its way.
            SenderState::SynAcked if !syn_received => TcpState::SYN_SENT,
            SenderState::SynAcked if fin_received => TcpState::CLOSE_WAIT,
            SenderState::SynAcked => TcpState::ESTABLISHED,
            SenderState::FinSent if !fin_received => TcpState::FIN_WAIT_1,
            SenderState::FinSent if self.linger_after_streams_finish => TcpState::CLOSING,
            SenderState::FinSent => TcpState::LAST_ACK,
            SenderState::FinAcked if fin_received => TcpState::TIME_WAIT,
            SenderState::FinAcked => TcpState::FIN_WAIT_2,
        }
    }

    /// Returns whether the connection is live in either direction.
    pub fn active(&self) -> bool {
        self.active
    }

    /// Returns whether the connection ended in a reset.
    pub fn rst(&self) -> bool {
        self.rst
    }

    /// Segments stamped and awaiting the carrier. Drain after every call
    /// into the connection.
    pub fn segments_out(&mut self) -> &mut VecDeque<TcpSegment> {
        &mut self.segments_out
    }

    /// The assembled inbound stream, for the application's reading side.
    pub fn inbound_stream(&self) -> &ByteStream {
        self.receiver.stream_out()
    }

    /// Mutable access to the assembled inbound stream.
    pub fn inbound_stream_mut(&mut self) -> &mut ByteStream {
        self.receiver.stream_out_mut()
    }

    /// Bytes the outbound stream can still buffer.
    pub fn remaining_outbound_capacity(&self) -> usize {
        self.sender.stream_in().remaining_capacity()
    }

    /// Sequence space transmitted but not yet acknowledged.
    pub fn bytes_in_flight(&self) -> u64 {
        self.sender.bytes_in_flight()
    }

    /// Inbound bytes received but not yet contiguous.
    pub fn unassembled_bytes(&self) -> usize {
        self.receiver.unassembled_bytes()
    }

    /// Milliseconds since a segment last arrived.
    pub fn time_since_last_segment_received_ms(&self) -> u64 {
        self.time_since_segment_ms
    }

    /// Guards application calls against a finished connection.
    fn check_active(&self) -> Result<()> {
        if self.active {
            Ok(())
        } else if self.rst {
            Err(Error::Reset)
        } else {
            Err(Error::Closed)
        }
    }

    /// Returns whether the endpoint is still fresh in both directions.
    fn in_listen(&self) -> bool {
        self.receiver.ackno().is_none() && self.sender.next_seqno() == 0
    }

    /// Drains the sender's queue, stamping each segment with the
    /// receiver's acknowledgment and window, into the carrier queue.
    fn push_pending(&mut self) {
        let ackno = self.receiver.ackno();
        let window = self.receiver.window_size();

        while let Some(mut seg) = self.sender.segments_out().pop_front() {
            if let Some(ackno) = ackno {
                seg.ack = true;
                seg.ackno = ackno;
            }
            seg.window = window;

            self.segments_out.push_back(seg);
        }
    }

    /// Deactivates the connection once both streams are finished: the
    /// peer's `FIN` is assembled and our `FIN` is acknowledged. A passive
    /// closer stops immediately; an active closer lingers through
    /// TIME_WAIT first.
    fn try_clean_shutdown(&mut self) {
        let inbound_done = self.receiver.stream_out().input_ended();
        let outbound_done = self.sender.state() == SenderState::FinAcked;

        if !(inbound_done && outbound_done) {
            return;
        }

        if !self.linger_after_streams_finish
            || self.time_since_segment_ms >= TIME_WAIT_RTO_MULTIPLIER * self.cfg.rt_timeout
        {
            debug!("({:?}) both streams finished: -> CLOSED", self.state());
            self.active = false;
        }
    }

    /// Tears the connection down after a peer reset: both streams are
    /// errored and nothing further is sent.
    fn tear_down(&mut self) {
        self.sender.shutdown();
        self.sender.stream_in_mut().set_error();
        self.receiver.stream_out_mut().set_error();
        self.active = false;
        self.rst = true;
    }

    /// Aborts the connection locally. A `RST` is queued for the peer and
    /// both streams surface the error flag.
    fn abort(&mut self) {
        self.sender.shutdown();
        self.sender.send_empty_segment(true);
        self.push_pending();

        self.sender.stream_in_mut().set_error();
        self.receiver.stream_out_mut().set_error();
        self.active = false;
        self.rst = true;
    }
}

impl Drop for TcpConnection {
    /// An endpoint dropped while live aborts the connection so the peer
    /// does not wait on a vanished endpoint. The queued `RST` is best
    /// effort; the carrier may no longer drain it.
    fn drop(&mut self) {
        if self.active {
            warn!("({:?}) dropped while active, aborting", self.state());
            self.abort();
        }
    }
}
