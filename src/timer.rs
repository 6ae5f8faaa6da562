//! Adaptive retransmission timing.
//!
//! Reliable delivery requires that unacknowledged segments are re-sent if no
//! ACK arrives within a bounded time.  [`RttEstimator`] tracks a smoothed
//! round-trip estimate and derives the retransmission threshold from it:
//!
//! - `rtt ← 0.7·rtt + 0.3·sample` on every accepted ACK of an in-flight
//!   segment (exponentially weighted moving average, heavy on history),
//! - a segment is considered lost once it has been in flight longer than
//!   `rtt · 2`.
//!
//! Samples are only taken from segments that were still in flight when their
//! ACK arrived.  A retransmitted segment re-enters flight with a fresh send
//! timestamp, so a late ACK is attributed to the most recent transmission — a
//! simplification of Karn's rule that keeps the estimate bounded.

use std::time::{Duration, Instant};

/// Round-trip estimate before any sample has been observed, in seconds.
pub const INITIAL_RTT: f64 = 1.0;

/// Weight given to the previous estimate; the sample gets the remainder.
const HISTORY_WEIGHT: f64 = 0.7;

/// A segment is retransmission-eligible after `rtt` times this factor.
const TIMEOUT_FACTOR: f64 = 2.0;

/// Smoothed round-trip estimator for one sender instance.
#[derive(Debug, Clone)]
pub struct RttEstimator {
    rtt: f64,
}

impl Default for RttEstimator {
    fn default() -> Self {
        Self::new()
    }
}

impl RttEstimator {
    pub fn new() -> Self {
        Self { rtt: INITIAL_RTT }
    }

    /// Fold one observed round trip into the smoothed estimate.
    pub fn record_sample(&mut self, sample: Duration) {
        self.rtt = HISTORY_WEIGHT * self.rtt + (1.0 - HISTORY_WEIGHT) * sample.as_secs_f64();
    }

    /// Current smoothed round-trip estimate in seconds.
    pub fn seconds(&self) -> f64 {
        self.rtt
    }

    /// How long a segment may stay in flight before it counts as lost.
    pub fn retransmit_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.rtt * TIMEOUT_FACTOR)
    }

    /// `true` once a segment sent at `sent_at` has exceeded the threshold.
    pub fn is_expired(&self, sent_at: Instant, now: Instant) -> bool {
        now.saturating_duration_since(sent_at) > self.retransmit_timeout()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
