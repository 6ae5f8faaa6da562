//! Selective-repeat send-side state machine.
//!
//! [`SendWindow`] owns the segmented stream and tracks, per sequence number,
//! whether the segment is awaiting transmission, in flight, or acknowledged.
//! Unlike go-back-N, a timeout re-queues only the specific segments that
//! expired; everything else stays in flight.
//!
//! # Protocol contract
//!
//! - The stream is segmented once, up front, into fixed 1024-byte segments
//!   (the final one may be shorter).  Segments are immutable afterwards.
//! - At most `window` segments may be in flight at once; the window adapts
//!   to observed saturation and never drops below [`MIN_WINDOW`].
//! - ACKs are per-segment, not cumulative.  An ACK only counts while its
//!   segment is in flight; late and duplicate ACKs are ignored.
//! - Each accepted ACK contributes a round-trip sample to the
//!   [`RttEstimator`], which in turn sets the retransmission threshold.
//!
//! This module only manages state; all socket I/O is the caller's
//! responsibility (see [`crate::endpoint`]).

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::packet::{Packet, MAX_PAYLOAD};
use crate::timer::RttEstimator;

/// Window capacity before any adjustment has fired.
pub const INITIAL_WINDOW: usize = 14;

/// Lower bound on the window; contraction clamps here.
pub const MIN_WINDOW: usize = 2;

/// Multiplier applied (then floored) when the window contracts.
const WINDOW_SHRINK: f64 = 0.55;

/// A 16-bit sequence number caps the stream at this many segments.
const MAX_SEGMENTS: usize = 1 << 16;

/// The stream cannot be represented in the 16-bit sequence space.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("stream of {0} bytes needs more than {MAX_SEGMENTS} segments")]
pub struct OversizedStream(pub usize);

// ---------------------------------------------------------------------------
// SendWindow
// ---------------------------------------------------------------------------

/// Send-side state for one transfer.
///
/// # Sequence-number life cycle
///
/// ```text
///   pending ──record_sent──▶ in flight ──on_ack──▶ acked (terminal)
///      ▲                         │
///      └─────sweep_timeouts──────┘
/// ```
#[derive(Debug)]
pub struct SendWindow {
    /// The segmented stream, indexed by sequence number.  Built once.
    packets: Vec<Packet>,

    /// Segments awaiting (re)transmission, ordered so the lowest goes first.
    pending: BTreeSet<u16>,

    /// Segments sent, neither acknowledged nor timed out.
    in_flight: BTreeSet<u16>,

    /// Dense acknowledgement record over `[0, N)`.
    acked: Vec<bool>,
    acked_count: usize,

    /// Timestamp of the most recent transmission, per sequence number.
    send_time: Vec<Option<Instant>>,

    /// Smoothed round-trip estimate driving the retransmission threshold.
    rtt: RttEstimator,

    /// Current window capacity.
    window: usize,
}

impl SendWindow {
    /// Segment `stream` into DATA packets and build the initial state.
    ///
    /// Every segment is exactly [`MAX_PAYLOAD`] bytes except possibly the
    /// last.  An empty stream yields zero segments and a window that is
    /// already [`complete`](Self::is_complete).
    pub fn from_stream(stream: &[u8]) -> Result<Self, OversizedStream> {
        let count = stream.len().div_ceil(MAX_PAYLOAD);
        if count > MAX_SEGMENTS {
            return Err(OversizedStream(stream.len()));
        }
        let packets: Vec<Packet> = stream
            .chunks(MAX_PAYLOAD)
            .enumerate()
            .map(|(seq, chunk)| Packet::data(seq as u16, chunk.to_vec()))
            .collect();
        Ok(Self {
            pending: (0..count).map(|s| s as u16).collect(),
            in_flight: BTreeSet::new(),
            acked: vec![false; count],
            acked_count: 0,
            send_time: vec![None; count],
            rtt: RttEstimator::new(),
            window: INITIAL_WINDOW,
            packets,
        })
    }

    /// Total number of segments in the transfer.
    pub fn segment_count(&self) -> usize {
        self.packets.len()
    }

    /// `true` once every segment has been acknowledged.
    pub fn is_complete(&self) -> bool {
        self.acked_count == self.packets.len()
    }

    /// Number of segments currently in flight.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Number of segments acknowledged so far.
    pub fn acked(&self) -> usize {
        self.acked_count
    }

    /// Current window capacity.
    pub fn window(&self) -> usize {
        self.window
    }

    /// Current smoothed round-trip estimate in seconds.
    pub fn rtt_seconds(&self) -> f64 {
        self.rtt.seconds()
    }

    /// Current retransmission threshold (`rtt · 2`).
    pub fn retransmit_timeout(&self) -> Duration {
        self.rtt.retransmit_timeout()
    }

    /// The DATA frame for `seq`.
    pub fn packet(&self, seq: u16) -> &Packet {
        &self.packets[seq as usize]
    }

    /// When `seq` was last handed to the socket, if ever.
    pub fn last_sent(&self, seq: u16) -> Option<Instant> {
        self.send_time[seq as usize]
    }

    // -----------------------------------------------------------------------
    // The three steps of the send loop
    // -----------------------------------------------------------------------

    /// Move every expired in-flight segment back to pending.
    ///
    /// A segment expires once it has been in flight longer than the current
    /// retransmission threshold.  Each expiry also adjusts the window.
    /// Returns how many segments were re-queued.
    pub fn sweep_timeouts(&mut self, now: Instant) -> usize {
        let expired: Vec<u16> = self
            .in_flight
            .iter()
            .copied()
            .filter(|&s| match self.send_time[s as usize] {
                Some(sent_at) => self.rtt.is_expired(sent_at, now),
                None => false,
            })
            .collect();
        for seq in &expired {
            self.in_flight.remove(seq);
            self.pending.insert(*seq);
            self.adjust_window();
        }
        expired.len()
    }

    /// Process one ACK.
    ///
    /// Returns `true` when `seq` was in flight and is now acknowledged; the
    /// round trip since its last transmission feeds the RTT estimate and the
    /// window adjusts.  Late, duplicate, and out-of-range ACKs return `false`
    /// and change nothing.
    pub fn on_ack(&mut self, seq: u16, now: Instant) -> bool {
        if seq as usize >= self.packets.len() || !self.in_flight.remove(&seq) {
            return false;
        }
        self.acked[seq as usize] = true;
        self.acked_count += 1;
        if let Some(sent_at) = self.send_time[seq as usize] {
            self.rtt.record_sample(now.saturating_duration_since(sent_at));
        }
        self.adjust_window();
        true
    }

    /// The sequence number to transmit next, if the window has room.
    ///
    /// Selective repeat: the lowest pending sequence number goes first,
    /// whether it is a fresh segment or a timed-out one.
    pub fn next_transmit(&self) -> Option<u16> {
        if self.in_flight.len() < self.window {
            self.pending.first().copied()
        } else {
            None
        }
    }

    /// Mark `seq` as handed to the socket: pending → in flight, fresh
    /// timestamp.
    pub fn record_sent(&mut self, seq: u16, now: Instant) {
        debug_assert!(
            self.pending.contains(&seq),
            "record_sent for segment {seq} that is not pending"
        );
        self.pending.remove(&seq);
        self.in_flight.insert(seq);
        self.send_time[seq as usize] = Some(now);
    }

    // -----------------------------------------------------------------------
    // Window policy
    // -----------------------------------------------------------------------

    /// Asymmetric adjustment, run after every ACK and every timeout:
    /// grow by one while the pipe stays saturated, contract geometrically
    /// once slack appears, never below [`MIN_WINDOW`].
    fn adjust_window(&mut self) {
        if self.in_flight.len() >= self.window {
            self.window += 1;
        } else if self.window > MIN_WINDOW {
            let shrunk = (self.window as f64 * WINDOW_SHRINK).floor() as usize;
            self.window = shrunk.max(MIN_WINDOW);
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::Kind;

    fn window_of(len: usize) -> SendWindow {
        SendWindow::from_stream(&vec![0x41u8; len]).unwrap()
    }

    /// Fill the window to capacity at time `t0`.
    fn fill(w: &mut SendWindow, t0: Instant) -> usize {
        let mut sent = 0;
        while let Some(seq) = w.next_transmit() {
            w.record_sent(seq, t0);
            sent += 1;
        }
        sent
    }

    #[test]
    fn segmentation_shapes() {
        let w = window_of(3000);
        assert_eq!(w.segment_count(), 3);
        assert_eq!(w.packet(0).payload.len(), 1024);
        assert_eq!(w.packet(1).payload.len(), 1024);
        assert_eq!(w.packet(2).payload.len(), 952);
        for seq in 0..3u16 {
            assert_eq!(w.packet(seq).kind, Kind::Data);
            assert_eq!(w.packet(seq).seq, seq);
        }
    }

    #[test]
    fn exact_multiple_has_no_empty_tail() {
        let w = window_of(2048);
        assert_eq!(w.segment_count(), 2);
        assert_eq!(w.packet(1).payload.len(), 1024);
    }

    #[test]
    fn empty_stream_is_complete_immediately() {
        let w = window_of(0);
        assert_eq!(w.segment_count(), 0);
        assert!(w.is_complete());
        assert_eq!(w.next_transmit(), None);
    }

    #[test]
    fn oversized_stream_is_rejected() {
        let too_big = vec![0u8; MAX_PAYLOAD * MAX_SEGMENTS + 1];
        assert_eq!(
            SendWindow::from_stream(&too_big).unwrap_err(),
            OversizedStream(too_big.len())
        );
    }

    #[test]
    fn transmits_lowest_pending_first_up_to_window() {
        let mut w = window_of(MAX_PAYLOAD * 20);
        let t0 = Instant::now();

        assert_eq!(w.next_transmit(), Some(0));
        let sent = fill(&mut w, t0);
        assert_eq!(sent, INITIAL_WINDOW);
        assert_eq!(w.in_flight(), INITIAL_WINDOW);
        assert_eq!(w.next_transmit(), None, "window full");
    }

    #[test]
    fn ack_is_counted_once() {
        let mut w = window_of(MAX_PAYLOAD * 3);
        let t0 = Instant::now();
        fill(&mut w, t0);

        assert!(w.on_ack(1, t0 + Duration::from_millis(10)));
        assert!(!w.on_ack(1, t0 + Duration::from_millis(20)), "duplicate");
        assert_eq!(w.in_flight(), 2);
        assert!(!w.is_complete());

        assert!(w.on_ack(0, t0 + Duration::from_millis(30)));
        assert!(w.on_ack(2, t0 + Duration::from_millis(30)));
        assert!(w.is_complete());
    }

    #[test]
    fn ack_for_unsent_or_out_of_range_seq_is_ignored() {
        let mut w = window_of(MAX_PAYLOAD * 4);
        let now = Instant::now();
        assert!(!w.on_ack(2, now), "pending, not in flight");
        assert!(!w.on_ack(9999, now), "outside [0, N)");
        assert_eq!(w.in_flight(), 0);
    }

    #[test]
    fn accepted_ack_updates_rtt_estimate() {
        let mut w = window_of(MAX_PAYLOAD);
        let t0 = Instant::now();
        w.record_sent(0, t0);
        w.on_ack(0, t0 + Duration::from_millis(500));
        // 0.7 × 1.0 + 0.3 × 0.5
        assert!((w.rtt_seconds() - 0.85).abs() < 1e-9);
    }

    #[test]
    fn timeout_sweep_requeues_expired_segments() {
        let mut w = window_of(MAX_PAYLOAD * 2);
        let t0 = Instant::now();
        w.record_sent(0, t0);
        w.record_sent(1, t0 + Duration::from_millis(1500));

        // Threshold is 2 s while rtt sits at its initial 1.0 s; only seq 0
        // has been in flight long enough.
        let expired = w.sweep_timeouts(t0 + Duration::from_millis(2500));
        assert_eq!(expired, 1);
        assert_eq!(w.in_flight(), 1);
        assert_eq!(w.next_transmit(), Some(0), "eligible for retransmission");
    }

    #[test]
    fn fresh_segments_survive_the_sweep() {
        let mut w = window_of(MAX_PAYLOAD);
        let t0 = Instant::now();
        w.record_sent(0, t0);
        assert_eq!(w.sweep_timeouts(t0 + Duration::from_secs(1)), 0);
        assert_eq!(w.in_flight(), 1);
    }

    #[test]
    fn ack_arriving_after_timeout_is_ignored() {
        let mut w = window_of(MAX_PAYLOAD);
        let t0 = Instant::now();
        w.record_sent(0, t0);
        w.sweep_timeouts(t0 + Duration::from_secs(3));

        // The segment is pending again; its late ACK must not complete it.
        assert!(!w.on_ack(0, t0 + Duration::from_secs(3)));
        assert!(!w.is_complete());
        assert_eq!(w.next_transmit(), Some(0));
    }

    #[test]
    fn retransmission_refreshes_the_send_timestamp() {
        let mut w = window_of(MAX_PAYLOAD);
        let t0 = Instant::now();
        w.record_sent(0, t0);
        w.sweep_timeouts(t0 + Duration::from_secs(3));

        let t1 = t0 + Duration::from_secs(4);
        w.record_sent(0, t1);
        assert_eq!(w.last_sent(0), Some(t1));

        // The sample is measured from the latest transmission.
        w.on_ack(0, t1 + Duration::from_millis(100));
        assert!((w.rtt_seconds() - (0.7 + 0.3 * 0.1)).abs() < 1e-9);
    }

    #[test]
    fn window_contracts_on_slack_and_grows_under_saturation() {
        let mut w = window_of(MAX_PAYLOAD * 20);
        let t0 = Instant::now();
        fill(&mut w, t0); // 14 in flight, window 14

        // First ACK leaves 13 < 14 in flight: contraction to ⌊14·0.55⌋ = 7.
        w.on_ack(0, t0 + Duration::from_millis(1));
        assert_eq!(w.window(), 7);

        // 12 in flight against a window of 7: saturation, grow by one.
        w.on_ack(1, t0 + Duration::from_millis(2));
        assert_eq!(w.window(), 8);
    }

    #[test]
    fn window_never_drops_below_the_floor() {
        let mut w = window_of(MAX_PAYLOAD * 3);
        let t0 = Instant::now();
        fill(&mut w, t0); // 3 in flight against a window of 14

        // Every ACK leaves slack, so the window contracts: 14 → 7 → 3 → 2.
        for (seq, expect) in [(0u16, 7), (1, 3), (2, MIN_WINDOW)] {
            w.on_ack(seq, t0 + Duration::from_millis(1));
            assert_eq!(w.window(), expect);
        }
        assert!(w.is_complete());
    }

    #[test]
    fn timeout_also_adjusts_the_window() {
        let mut w = window_of(MAX_PAYLOAD * 20);
        let t0 = Instant::now();
        fill(&mut w, t0);

        // All 14 expire; the first removal sees 13 < 14 and contracts.
        w.sweep_timeouts(t0 + Duration::from_secs(3));
        assert_eq!(w.in_flight(), 0);
        assert_eq!(w.window(), MIN_WINDOW);
    }
}
