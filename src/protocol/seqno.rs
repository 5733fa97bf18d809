//! 32-bit wrapping sequence numbers and their conversion to and from
//! 64-bit absolute sequence indices.
//!
//! Sequence numbers on the wire occupy 32 bits and wrap around (RFC 793
//! 3.3), so excluding equality, comparisons between them are
//! non-transitive. Internally the engine counts in 64-bit *absolute*
//! indices, which start at 0 for the `SYN` of a direction and never wrap.
//! Every conversion between the two widths is explicit: [`wrap`] maps an
//! absolute index onto the wire given the direction's ISN, and [`unwrap`]
//! recovers the absolute index closest to a recent checkpoint.

use std::fmt;
use std::ops::{Add, Sub};

/// A 32-bit sequence number as carried on the wire, relative to an
/// Initial Sequence Number (ISN) and wrapping modulo 2^32.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WrappingSeqno(u32);

impl WrappingSeqno {
    /// Creates a sequence number from its raw wire value.
    pub const fn new(raw: u32) -> Self {
        WrappingSeqno(raw)
    }

    /// Returns the raw wire value.
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl From<u32> for WrappingSeqno {
    fn from(raw: u32) -> Self {
        WrappingSeqno(raw)
    }
}

impl From<WrappingSeqno> for u32 {
    fn from(seqno: WrappingSeqno) -> u32 {
        seqno.0
    }
}

impl fmt::Display for WrappingSeqno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Add<u32> for WrappingSeqno {
    type Output = WrappingSeqno;

    fn add(self, rhs: u32) -> WrappingSeqno {
        WrappingSeqno(self.0.wrapping_add(rhs))
    }
}

impl Sub<u32> for WrappingSeqno {
    type Output = WrappingSeqno;

    fn sub(self, rhs: u32) -> WrappingSeqno {
        WrappingSeqno(self.0.wrapping_sub(rhs))
    }
}

/// Transforms an absolute sequence index into a wire sequence number.
#[inline]
pub fn wrap(n: u64, isn: WrappingSeqno) -> WrappingSeqno {
    WrappingSeqno(isn.0.wrapping_add(n as u32))
}

/// Transforms a wire sequence number into the unique absolute sequence
/// index that wraps to it and lies closest to `checkpoint`.
///
/// Each wire value corresponds to one absolute index per 2^32 bytes of
/// stream; the checkpoint (a recently seen absolute index for the same
/// direction, e.g. the first unassembled byte) disambiguates. An
/// equidistant tie resolves to the smaller index, and the result is never
/// taken below zero.
pub fn unwrap(seqno: WrappingSeqno, isn: WrappingSeqno, checkpoint: u64) -> u64 {
    const WINDOW: u64 = 1 << 32;

    let offset = seqno.0.wrapping_sub(isn.0) as u64;
    let candidate = (checkpoint & !(WINDOW - 1)) + offset;

    // The candidate shares the checkpoint's 2^32-aligned base; one of its
    // neighbors a full wrap away may sit closer.
    let mut best = candidate;
    let mut best_distance = candidate.abs_diff(checkpoint);

    for neighbor in [
        candidate.checked_sub(WINDOW),
        candidate.checked_add(WINDOW),
    ]
    .into_iter()
    .flatten()
    {
        let distance = neighbor.abs_diff(checkpoint);
        if distance < best_distance || (distance == best_distance && neighbor < best) {
            best = neighbor;
            best_distance = distance;
        }
    }

    best
}
