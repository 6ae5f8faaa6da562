//! `stream-over-udp` — reliable, ordered, one-way byte-stream delivery over
//! an unreliable datagram path.
//!
//! # Architecture
//!
//! ```text
//!  ┌──────────┐  DATA frames  ┌──────────┐
//!  │  sender  │──────────────▶│ receiver │
//!  │  (stdin) │◀──────────────│ (stdout) │
//!  └────┬─────┘     ACKs      └─────┬────┘
//!       │                          │
//!  ┌────▼──────────────────────────▼────┐
//!  │              endpoint              │
//!  │   (event loops, owns the socket)   │
//!  └────┬───────────────────────────────┘
//!       │ raw UDP datagrams
//!  ┌────▼──────┐
//!  │  Socket   │  (thin async wrapper around tokio UdpSocket)
//!  └───────────┘
//! ```
//!
//! The datagram path may drop, reorder, duplicate, or corrupt traffic; the
//! sender's selective-repeat window and the receiver's reassembly buffer
//! together deliver the stream exactly once and in order.
//!
//! Each module has a single responsibility:
//! - [`packet`]    — wire format (serialise / deserialise, SHA-1 integrity)
//! - [`sender`]    — selective-repeat send window (pure state)
//! - [`receiver`]  — reordering reassembly buffer (pure state)
//! - [`timer`]     — smoothed RTT estimate and retransmission threshold
//! - [`endpoint`]  — sender and receiver event loops (all socket I/O)
//! - [`socket`]    — async UDP socket abstraction
//! - [`simulator`] — lossy/reordering relay for testing

pub mod endpoint;
pub mod packet;
pub mod receiver;
pub mod sender;
pub mod simulator;
pub mod socket;
pub mod timer;
