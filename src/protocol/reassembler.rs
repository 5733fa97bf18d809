//! Reassembly of out-of-order substrings into a contiguous byte stream.
//!
//! Segments may arrive out of order, and retransmissions may overlap
//! data already seen. The [`StreamReassembler`] files each substring by
//! its stream index, keeps
//! the pending pieces in a map ordered by start index so they can be
//! drained in order, and commits every newly contiguous prefix into its
//! inner [`ByteStream`]. Bytes outside the current window, which spans
//! from the first unassembled index to the first unacceptable one, are
//! discarded so that memory use stays bounded by the configured capacity.

use std::collections::BTreeMap;

use crate::protocol::ByteStream;

/// Accepts substrings of a byte stream in any order and writes them out
/// contiguously.
#[derive(Debug)]
pub struct StreamReassembler {
    /// Stream the assembled prefix is committed to.
    output: ByteStream,
    /// Capacity shared between buffered stream bytes and pending pieces.
    capacity: usize,
    /// Pending substrings keyed by start index. Entries are disjoint;
    /// overlap is resolved on insert.
    pending: BTreeMap<u64, Vec<u8>>,
    /// Total bytes across all pending substrings.
    pending_bytes: usize,
    /// Stream index one past the last byte, once the end of the stream
    /// has been observed.
    eof_index: Option<u64>,
}

impl StreamReassembler {
    /// Creates a reassembler committing into a [`ByteStream`] of the
    /// given capacity.
    pub fn new(capacity: usize) -> Self {
        StreamReassembler {
            output: ByteStream::new(capacity),
            capacity,
            pending: BTreeMap::new(),
            pending_bytes: 0,
            eof_index: None,
        }
    }

    /// Merges `data`, whose first byte has stream index `index`, into the
    /// reassembly window, committing whatever becomes contiguous.
    ///
    /// `eof` marks the substring as carrying the end of the stream; the
    /// end is recorded only when the substring's tail fits within the
    /// current window. Once the committed prefix reaches the recorded
    /// end, the inner stream's input is ended.
    pub fn push_substring(&mut self, data: &[u8], index: u64, eof: bool) {
        if data.is_empty() && !eof {
            return;
        }

        let first_unassembled = self.output.bytes_written();
        let first_unacceptable = self.output.bytes_read() + self.capacity as u64;

        let end = index + data.len() as u64;

        if eof && end <= first_unacceptable {
            self.eof_index = Some(end);
        }

        // Clamp to the window; everything outside is stale or unstorable.
        let start = u64::max(index, first_unassembled);
        let stop = u64::min(end, first_unacceptable);
        if start < stop {
            let piece = &data[(start - index) as usize..(stop - index) as usize];
            self.insert_piece(start, piece);
        }

        // Commit the contiguous prefix.
        while let Some(start) = self.pending.first_key_value().map(|(start, _)| *start) {
            if start != self.output.bytes_written() {
                break;
            }

            if let Some(piece) = self.pending.remove(&start) {
                self.pending_bytes -= piece.len();
                self.output.write(&piece);
            }
        }

        if let Some(eof_index) = self.eof_index {
            if self.output.bytes_written() >= eof_index {
                self.output.end_input();
            }
        }
    }

    /// Files a window-clamped piece, trimming it against any overlapping
    /// neighbors so entries stay disjoint.
    fn insert_piece(&mut self, start: u64, piece: &[u8]) {
        let mut start = start;
        let mut piece = piece.to_vec();

        // A predecessor reaching past `start` already holds our prefix.
        if let Some((&prev_start, prev)) = self.pending.range(..=start).next_back() {
            let prev_end = prev_start + prev.len() as u64;

            if prev_end >= start + piece.len() as u64 {
                return;
            }

            if prev_end > start {
                piece.drain(..(prev_end - start) as usize);
                start = prev_end;
            }
        }

        // Successors beginning before our end are subsumed; the last one
        // may contribute a tail we do not hold yet.
        let mut end = start + piece.len() as u64;

        while let Some(next_start) = self.pending.range(start..).next().map(|(key, _)| *key) {
            if next_start >= end {
                break;
            }

            if let Some(next) = self.pending.remove(&next_start) {
                self.pending_bytes -= next.len();

                let next_end = next_start + next.len() as u64;
                if next_end > end {
                    piece.extend_from_slice(&next[(end - next_start) as usize..]);
                    end = next_end;
                }
            }
        }

        self.pending_bytes += piece.len();
        self.pending.insert(start, piece);
    }

    /// Bytes received but not yet committed to the stream.
    pub fn unassembled_bytes(&self) -> usize {
        self.pending_bytes
    }

    /// Returns whether nothing is pending and the committed stream has
    /// been fully read.
    pub fn empty(&self) -> bool {
        self.pending.is_empty() && self.output.buffer_empty()
    }

    /// The stream assembled bytes are committed into.
    pub fn stream(&self) -> &ByteStream {
        &self.output
    }

    /// Mutable access to the assembled stream, for the reading side.
    pub fn stream_mut(&mut self) -> &mut ByteStream {
        &mut self.output
    }
}
