//! Receive-side reassembly state machine.
//!
//! [`Reassembly`] accepts segments in any order, de-duplicates them, and
//! releases payload bytes strictly by sequence number:
//!
//! - Segments at or past the delivery cursor are buffered on first arrival.
//! - Duplicates — whether still buffered or already delivered — are
//!   recognised and never buffered twice.  The caller still ACKs them, since
//!   a duplicate usually means the previous ACK was lost.
//! - Whenever the segment at the cursor is present, it and every contiguous
//!   successor are moved to the ready queue, so output is always a prefix of
//!   the original stream.
//!
//! This module only manages state; all socket I/O is the caller's
//! responsibility (see [`crate::endpoint`]).

use std::collections::{BTreeMap, VecDeque};

// ---------------------------------------------------------------------------
// Reassembly
// ---------------------------------------------------------------------------

/// Reordering receive buffer for one transfer.
#[derive(Debug, Default)]
pub struct Reassembly {
    /// Lowest sequence number not yet released.  Held one wider than the
    /// 16-bit wire field so the cursor can sit past the final segment of a
    /// maximum-length stream.
    next: u32,

    /// Payloads received out of order, keyed by sequence number.  Holds only
    /// entries at or past the cursor.
    buffer: BTreeMap<u16, Vec<u8>>,

    /// In-order bytes awaiting the caller, oldest first.
    ready: VecDeque<u8>,
}

impl Reassembly {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sequence number the delivery cursor is waiting for.
    pub fn next_expected(&self) -> u32 {
        self.next
    }

    /// Number of out-of-order segments currently parked.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Process one DATA segment.
    ///
    /// Returns `true` when the segment was new and has been buffered (and
    /// possibly released).  Returns `false` for duplicates, which leave all
    /// state untouched.  Either way the segment deserves an ACK.
    pub fn on_data(&mut self, seq: u16, payload: &[u8]) -> bool {
        if (seq as u32) < self.next || self.buffer.contains_key(&seq) {
            return false;
        }
        self.buffer.insert(seq, payload.to_vec());
        self.release_contiguous();
        true
    }

    /// Drain every byte that is ready for in-order delivery.
    pub fn take_ready(&mut self) -> Vec<u8> {
        self.ready.drain(..).collect()
    }

    /// Move the contiguous run at the cursor from the buffer to the ready
    /// queue, advancing the cursor past it.
    fn release_contiguous(&mut self) {
        while self.next <= u16::MAX as u32 {
            match self.buffer.remove(&(self.next as u16)) {
                Some(payload) => {
                    self.ready.extend(payload);
                    self.next += 1;
                }
                None => break,
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
