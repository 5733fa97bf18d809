//! The sending half of a TCP connection.
//!
//! The sender reads application bytes from its outbound [`ByteStream`]
//! and cuts them into segments that respect both the payload bound and
//! the peer's advertised window. Every segment that occupies sequence
//! space goes onto the outstanding queue until the peer acknowledges it
//! in full; a single countdown timer covers the earliest outstanding
//! segment and retransmits it with exponential backoff (RFC 6298 5).
//!
//! Flags come from the sender's position in the stream: the first
//! sequence number is a `SYN`, and once the application ends the stream
//! a `FIN` rides the first segment with room for it.

use std::collections::VecDeque;

use log::debug;

use crate::TcpConfig;
use crate::protocol::timer::RetransmissionTimer;
use crate::protocol::{ByteStream, TcpSegment, WrappingSeqno, unwrap, wrap};

/// A segment transmitted but not yet fully acknowledged.
#[derive(Debug)]
struct OutstandingSegment {
    /// Absolute sequence index of the segment's first sequence number.
    abs_seqno: u64,
    /// The segment as transmitted, kept for retransmission.
    segment: TcpSegment,
}

/// Position of the sender within its stream's lifecycle, derived from
/// the counters rather than stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderState {
    /// Nothing sent yet.
    Closed,
    /// `SYN` transmitted but not acknowledged.
    SynSent,
    /// `SYN` acknowledged; the stream is still open or its `FIN` has not
    /// been transmitted.
    SynAcked,
    /// `FIN` transmitted but not fully acknowledged.
    FinSent,
    /// `FIN` acknowledged; this direction is done.
    FinAcked,
}

/// The sending half of a connection: segmentizes the outbound stream and
/// retransmits until acknowledged.
#[derive(Debug)]
pub struct TcpSender {
    /// Our initial sequence number.
    isn: WrappingSeqno,
    /// Initial retransmission timeout, in milliseconds.
    initial_rto_ms: u64,
    /// Outbound application bytes not yet segmentized.
    stream: ByteStream,
    /// Segments ready for the carrier, drained by the connection.
    segments_out: VecDeque<TcpSegment>,
    /// Transmitted segments awaiting acknowledgment, in absolute
    /// sequence order.
    outstanding: VecDeque<OutstandingSegment>,
    /// Absolute sequence index of the next byte to transmit.
    next_seqno: u64,
    /// The peer's last advertised window. Starts at one so the `SYN`
    /// can be sent, and so its retransmissions back off normally.
    peer_window: u16,
    /// Countdown for the earliest outstanding segment.
    timer: RetransmissionTimer,
    /// Expiries of the same segment since the last acknowledgment of
    /// new data.
    consecutive_retransmissions: u32,
}

impl TcpSender {
    /// Creates a sender over an outbound stream of `capacity` bytes. A
    /// random ISN is chosen unless `fixed_isn` pins one.
    pub fn new(capacity: usize, initial_rto_ms: u64, fixed_isn: Option<WrappingSeqno>) -> Self {
        TcpSender {
            isn: fixed_isn.unwrap_or_else(|| WrappingSeqno::new(rand::random())),
            initial_rto_ms,
            stream: ByteStream::new(capacity),
            segments_out: VecDeque::new(),
            outstanding: VecDeque::new(),
            next_seqno: 0,
            peer_window: 1,
            timer: RetransmissionTimer::new(),
            consecutive_retransmissions: 0,
        }
    }

    /// Emits as many segments as the peer's window allows.
    ///
    /// A zero window is treated as one byte so the peer keeps being
    /// probed; the probe's acknowledgment will carry the reopened window.
    pub fn fill_window(&mut self) {
        let window = u64::max(self.peer_window as u64, 1);

        loop {
            let in_flight = self.bytes_in_flight();
            if in_flight >= window {
                break;
            }

            let mut remaining = window - in_flight;

            let mut seg = TcpSegment {
                seqno: wrap(self.next_seqno, self.isn),
                ..Default::default()
            };

            if self.next_seqno == 0 {
                seg.syn = true;
                remaining -= 1;
            }

            let take = u64::min(
                TcpConfig::MAX_PAYLOAD_SIZE as u64,
                u64::min(remaining, self.stream.buffer_size() as u64),
            );
            seg.payload = self.stream.read(take as usize);
            remaining -= take;

            // The FIN goes out once the stream is drained, provided our
            // SYN is acknowledged and the window has a slot left over.
            if self.state() == SenderState::SynAcked && self.stream.eof() && remaining > 0 {
                seg.fin = true;
            }

            let len = seg.length_in_sequence_space();
            if len == 0 {
                break;
            }

            self.segments_out.push_back(seg.clone());
            self.outstanding.push_back(OutstandingSegment {
                abs_seqno: self.next_seqno,
                segment: seg,
            });

            if !self.timer.active() {
                self.timer.start(self.initial_rto_ms);
            }

            self.next_seqno += len;
        }
    }

    /// Processes the peer's acknowledgment and advertised window.
    ///
    /// Only segments covered in full leave the outstanding queue; an
    /// acknowledgment splitting a segment leaves it queued whole. An
    /// acknowledgment of data never transmitted is ignored.
    pub fn ack_received(&mut self, ackno: WrappingSeqno, window: u16) {
        self.peer_window = window;

        let abs_ack = unwrap(ackno, self.isn, self.next_seqno);
        if abs_ack > self.next_seqno {
            debug!("ackno {ackno} beyond next seqno {}: ignoring", self.next_seqno);
            return;
        }

        let mut acked_new_data = false;
        while let Some(front) = self.outstanding.front() {
            if front.abs_seqno + front.segment.length_in_sequence_space() > abs_ack {
                break;
            }

            self.outstanding.pop_front();
            acked_new_data = true;
        }

        if acked_new_data {
            self.consecutive_retransmissions = 0;

            // RFC 6298 (5.2, 5.3): restart the timer while data remains
            // outstanding, stop it otherwise.
            if self.outstanding.is_empty() {
                self.timer.stop();
            } else {
                self.timer.start(self.initial_rto_ms);
            }
        }

        self.fill_window();
    }

    /// Advances the retransmission timer by `ms` milliseconds,
    /// retransmitting the earliest outstanding segment on expiry.
    ///
    /// The timeout doubles and the retransmission counter grows only
    /// when the peer's window was open; the expiry of a zero-window
    /// probe signals a closed window, not a congested path.
    pub fn tick(&mut self, ms: u64) {
        if !self.timer.tick(ms) {
            return;
        }

        let Some(earliest) = self.outstanding.front() else {
            return;
        };

        self.segments_out.push_back(earliest.segment.clone());

        let mut timeout = self.timer.period_ms();
        if self.peer_window > 0 {
            // RFC 6298 (5.5): back off the timer.
            timeout *= 2;
            self.consecutive_retransmissions += 1;

            debug!(
                "retransmitting seqno {}, consecutive retransmissions: {}",
                earliest.segment.seqno, self.consecutive_retransmissions
            );
        }

        self.timer.start(timeout);
    }

    /// Queues an empty segment at the next sequence number, optionally
    /// flagged `RST`. The segment occupies no sequence space and is
    /// never retransmitted.
    pub fn send_empty_segment(&mut self, rst: bool) {
        self.segments_out.push_back(TcpSegment {
            seqno: wrap(self.next_seqno, self.isn),
            rst,
            ..Default::default()
        });
    }

    /// Abandons all transmission state when the connection aborts.
    /// Nothing queued or outstanding survives, and the timer stops.
    pub(crate) fn shutdown(&mut self) {
        self.segments_out.clear();
        self.outstanding.clear();
        self.timer.stop();
    }

    /// Sum of the sequence-space lengths of all outstanding segments.
    pub fn bytes_in_flight(&self) -> u64 {
        self.outstanding
            .iter()
            .map(|seg| seg.segment.length_in_sequence_space())
            .sum()
    }

    /// Expiries of the same segment since new data was last acknowledged.
    pub fn consecutive_retransmissions(&self) -> u32 {
        self.consecutive_retransmissions
    }

    /// Absolute sequence index of the next byte to transmit.
    pub fn next_seqno(&self) -> u64 {
        self.next_seqno
    }

    /// Derives the sender's lifecycle position from its counters.
    pub fn state(&self) -> SenderState {
        if self.next_seqno == 0 {
            SenderState::Closed
        } else if self.next_seqno == self.bytes_in_flight() {
            SenderState::SynSent
        } else if !self.fin_transmitted() {
            SenderState::SynAcked
        } else if self.bytes_in_flight() > 0 {
            SenderState::FinSent
        } else {
            SenderState::FinAcked
        }
    }

    /// Whether the `FIN` has been transmitted: every stream byte plus
    /// `SYN` and `FIN` is accounted for in `next_seqno`.
    fn fin_transmitted(&self) -> bool {
        self.stream.input_ended() && self.next_seqno == self.stream.bytes_written() + 2
    }

    /// Segments awaiting the carrier.
    pub fn segments_out(&mut self) -> &mut VecDeque<TcpSegment> {
        &mut self.segments_out
    }

    /// The outbound application stream.
    pub fn stream_in(&self) -> &ByteStream {
        &self.stream
    }

    /// Mutable access to the outbound stream, for the writing side.
    pub fn stream_in_mut(&mut self) -> &mut ByteStream {
        &mut self.stream
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ISN: u32 = 0;
    const RTO: u64 = 1000;

    /// A sender with a pinned ISN and the standard test timeout.
    fn sender(capacity: usize) -> TcpSender {
        TcpSender::new(capacity, RTO, Some(WrappingSeqno::new(ISN)))
    }

    /// Acknowledges everything sent so far and opens the peer window.
    fn ack_all(tx: &mut TcpSender, window: u16) {
        tx.ack_received(wrap(tx.next_seqno(), WrappingSeqno::new(ISN)), window);
    }

    #[test]
    fn sender_emits_syn_first_valid() {
        let mut tx = sender(64);

        assert_eq!(tx.state(), SenderState::Closed);
        tx.fill_window();

        let seg = tx.segments_out().pop_front().unwrap();
        assert!(seg.syn);
        assert_eq!(seg.seqno, WrappingSeqno::new(ISN));
        assert!(seg.payload.is_empty());

        assert_eq!(tx.bytes_in_flight(), 1);
        assert_eq!(tx.state(), SenderState::SynSent);

        // The window admits nothing further until the SYN is acked.
        tx.fill_window();
        assert!(tx.segments_out().is_empty());
    }

    #[test]
    fn sender_respects_window_valid() {
        let mut tx = sender(64);

        tx.fill_window();
        tx.segments_out().clear();
        ack_all(&mut tx, 4);

        tx.stream_in_mut().write(b"0123456789");
        tx.fill_window();

        let seg = tx.segments_out().pop_front().unwrap();
        assert_eq!(seg.payload, b"0123");
        assert_eq!(tx.bytes_in_flight(), 4);
        assert!(tx.segments_out().is_empty());

        // Acknowledging the first four admits the rest.
        tx.ack_received(WrappingSeqno::new(ISN + 5), 4);
        let seg = tx.segments_out().pop_front().unwrap();
        assert_eq!(seg.payload, b"4567");
    }

    #[test]
    fn sender_splits_at_max_payload_valid() {
        let mut tx = sender(4096);

        tx.fill_window();
        tx.segments_out().clear();
        ack_all(&mut tx, u16::MAX);

        tx.stream_in_mut().write(&[b'a'; 2000]);
        tx.fill_window();

        let first = tx.segments_out().pop_front().unwrap();
        let second = tx.segments_out().pop_front().unwrap();
        assert_eq!(first.payload.len(), TcpConfig::MAX_PAYLOAD_SIZE);
        assert_eq!(second.payload.len(), 2000 - TcpConfig::MAX_PAYLOAD_SIZE);
        assert_eq!(
            unwrap(second.seqno, WrappingSeqno::new(ISN), 0),
            1 + TcpConfig::MAX_PAYLOAD_SIZE as u64
        );
    }

    #[test]
    fn sender_retransmission_backoff_valid() {
        let mut tx = sender(64);

        tx.fill_window();
        tx.segments_out().clear();
        ack_all(&mut tx, 4096);

        tx.stream_in_mut().write(b"0123456789");
        tx.fill_window();
        tx.segments_out().clear();

        // Not yet: one millisecond short of the timeout.
        tx.tick(999);
        assert!(tx.segments_out().is_empty());

        // Expired: retransmit and double to 2000.
        tx.tick(2);
        let seg = tx.segments_out().pop_front().unwrap();
        assert_eq!(seg.payload, b"0123456789");
        assert_eq!(tx.consecutive_retransmissions(), 1);

        tx.tick(1999);
        assert!(tx.segments_out().is_empty());
        tx.tick(1);
        assert_eq!(tx.consecutive_retransmissions(), 2);
        tx.segments_out().clear();

        // Acknowledging everything clears the counter and the timer.
        tx.ack_received(WrappingSeqno::new(ISN + 11), 4096);
        assert_eq!(tx.consecutive_retransmissions(), 0);
        assert_eq!(tx.bytes_in_flight(), 0);
        tx.tick(u64::MAX);
        assert!(tx.segments_out().is_empty());
    }

    #[test]
    fn sender_zero_window_probe_no_backoff_valid() {
        let mut tx = sender(64);

        tx.fill_window();
        tx.segments_out().clear();
        ack_all(&mut tx, 0);

        // A closed window still admits a one-byte probe.
        tx.stream_in_mut().write(b"probe");
        tx.fill_window();
        let seg = tx.segments_out().pop_front().unwrap();
        assert_eq!(seg.payload, b"p");

        // Probe expiries neither back off nor count.
        tx.tick(RTO);
        assert_eq!(tx.segments_out().pop_front().unwrap().payload, b"p");
        assert_eq!(tx.consecutive_retransmissions(), 0);

        tx.tick(RTO);
        assert_eq!(tx.segments_out().pop_front().unwrap().payload, b"p");
        assert_eq!(tx.consecutive_retransmissions(), 0);

        // The window reopens via the probe's acknowledgment.
        tx.ack_received(WrappingSeqno::new(ISN + 2), 16);
        let seg = tx.segments_out().pop_front().unwrap();
        assert_eq!(seg.payload, b"robe");
    }

    #[test]
    fn sender_partial_ack_keeps_segment_valid() {
        let mut tx = sender(64);

        tx.fill_window();
        tx.segments_out().clear();
        ack_all(&mut tx, 64);

        tx.stream_in_mut().write(b"0123456789");
        tx.fill_window();
        tx.segments_out().clear();

        // An ack splitting the segment must not retire it.
        tx.ack_received(WrappingSeqno::new(ISN + 6), 64);
        assert_eq!(tx.bytes_in_flight(), 10);

        // The split ack also must not reset the backoff bookkeeping.
        tx.tick(RTO);
        assert_eq!(tx.consecutive_retransmissions(), 1);
        let seg = tx.segments_out().pop_front().unwrap();
        assert_eq!(seg.payload, b"0123456789");
    }

    #[test]
    fn sender_ack_beyond_next_seqno_ignored_valid() {
        let mut tx = sender(64);

        tx.fill_window();
        tx.segments_out().clear();

        // Nothing past the SYN has been sent; such an ack is impossible.
        tx.ack_received(WrappingSeqno::new(ISN + 100), 64);
        assert_eq!(tx.bytes_in_flight(), 1);
        assert_eq!(tx.state(), SenderState::SynSent);
    }

    #[test]
    fn sender_fin_rides_last_segment_valid() {
        let mut tx = sender(64);

        tx.fill_window();
        tx.segments_out().clear();
        ack_all(&mut tx, 64);

        tx.stream_in_mut().write(b"done");
        tx.stream_in_mut().end_input();
        tx.fill_window();

        let seg = tx.segments_out().pop_front().unwrap();
        assert_eq!(seg.payload, b"done");
        assert!(seg.fin);
        assert_eq!(tx.state(), SenderState::FinSent);

        tx.ack_received(WrappingSeqno::new(ISN + 6), 64);
        assert_eq!(tx.state(), SenderState::FinAcked);
        assert_eq!(tx.bytes_in_flight(), 0);
    }

    #[test]
    fn sender_fin_waits_for_window_valid() {
        let mut tx = sender(64);

        tx.fill_window();
        tx.segments_out().clear();
        ack_all(&mut tx, 4);

        tx.stream_in_mut().write(b"data");
        tx.stream_in_mut().end_input();
        tx.fill_window();

        // The window is exactly consumed by the payload; no FIN slot.
        let seg = tx.segments_out().pop_front().unwrap();
        assert_eq!(seg.payload, b"data");
        assert!(!seg.fin);
        assert_eq!(tx.state(), SenderState::SynAcked);

        // Acknowledgment frees the window and the FIN follows alone.
        tx.ack_received(WrappingSeqno::new(ISN + 5), 4);
        let seg = tx.segments_out().pop_front().unwrap();
        assert!(seg.fin);
        assert!(seg.payload.is_empty());
        assert_eq!(tx.state(), SenderState::FinSent);
    }

    #[test]
    fn sender_empty_segment_untracked_valid() {
        let mut tx = sender(64);

        tx.fill_window();
        tx.segments_out().clear();

        tx.send_empty_segment(false);
        let seg = tx.segments_out().pop_front().unwrap();
        assert_eq!(seg.length_in_sequence_space(), 0);
        assert!(!seg.rst);
        assert_eq!(tx.bytes_in_flight(), 1);

        tx.send_empty_segment(true);
        assert!(tx.segments_out().pop_front().unwrap().rst);
    }
}
