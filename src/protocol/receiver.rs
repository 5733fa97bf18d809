//! The receiving half of a TCP connection.
//!
//! The receiver owns the inbound [`StreamReassembler`] and translates
//! arriving segments into substrings indexed by their position in the
//! stream. It also derives the two values advertised back to the peer:
//! the acknowledgment number (the next sequence number needed) and the
//! receive window (how much the reassembler can still hold).

use log::debug;

use crate::protocol::{ByteStream, StreamReassembler, TcpSegment, WrappingSeqno, unwrap, wrap};

/// The receiving half of a connection: reassembles the inbound stream
/// and derives `ackno` and `window_size`.
#[derive(Debug)]
pub struct TcpReceiver {
    /// Reassembler for the inbound stream.
    reassembler: StreamReassembler,
    /// The peer's initial sequence number, learned from its `SYN`.
    isn: Option<WrappingSeqno>,
}

impl TcpReceiver {
    /// Creates a receiver whose inbound stream holds up to `capacity`
    /// bytes.
    pub fn new(capacity: usize) -> Self {
        TcpReceiver {
            reassembler: StreamReassembler::new(capacity),
            isn: None,
        }
    }

    /// Processes one arriving segment.
    ///
    /// Before a `SYN` has been seen every segment is dropped, since
    /// sequence numbers cannot be placed without an ISN. `SYN` segments
    /// may carry data; the payload begins at stream index 0 either way.
    pub fn segment_received(&mut self, seg: &TcpSegment) {
        if self.isn.is_none() {
            if !seg.syn {
                debug!("receiver has no ISN and segment carries no SYN: dropping");
                return;
            }

            self.isn = Some(seg.seqno);
        }

        let Some(isn) = self.isn else {
            return;
        };

        // The first unassembled byte is the best guess for where the
        // segment falls; +1 accounts for the SYN occupying index 0.
        let checkpoint = self.reassembler.stream().bytes_written() + 1;
        let abs_index = unwrap(seg.seqno, isn, checkpoint);

        // A non-SYN segment claiming the SYN's sequence number carries
        // nothing placeable.
        if !seg.syn && abs_index == 0 {
            debug!("segment seqno {} occupies the SYN slot: dropping", seg.seqno);
            return;
        }

        let stream_index = abs_index + seg.syn as u64 - 1;

        self.reassembler
            .push_substring(&seg.payload, stream_index, seg.fin);
    }

    /// The acknowledgment number to advertise: the lowest sequence number
    /// not yet assembled. `None` until the peer's `SYN` arrives.
    pub fn ackno(&self) -> Option<WrappingSeqno> {
        let isn = self.isn?;

        let stream = self.reassembler.stream();
        // SYN occupies one sequence number ahead of the stream bytes, and
        // an assembled FIN occupies one more.
        let mut abs_ack = stream.bytes_written() + 1;
        if stream.input_ended() {
            abs_ack += 1;
        }

        Some(wrap(abs_ack, isn))
    }

    /// The receive window to advertise: remaining reassembly capacity,
    /// saturated to what the 16-bit header field can carry.
    pub fn window_size(&self) -> u16 {
        u16::try_from(self.reassembler.stream().remaining_capacity()).unwrap_or(u16::MAX)
    }

    /// Bytes received but not yet contiguous with the assembled prefix.
    pub fn unassembled_bytes(&self) -> usize {
        self.reassembler.unassembled_bytes()
    }

    /// The assembled inbound stream.
    pub fn stream_out(&self) -> &ByteStream {
        self.reassembler.stream()
    }

    /// Mutable access to the assembled inbound stream, for the
    /// application's reading side.
    pub fn stream_out_mut(&mut self) -> &mut ByteStream {
        self.reassembler.stream_mut()
    }
}
