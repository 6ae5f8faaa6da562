//! Sender and receiver event loops.
//!
//! # Architecture
//!
//! ```text
//!  stdin ─▶ SendWindow ──────DATA──────▶ Reassembly ─▶ stdout
//!              ▲   │                        │   ▲
//!              │   └── sweep / send one ────┤   │
//!              └───────────ACKs─────────────┘   └── in-order release
//! ```
//!
//! Both loops are single-threaded and cooperative.  The sender's only
//! suspension point is the bounded readiness wait in ACK intake; the
//! receiver's is an unbounded wait on its socket.  All state mutation is
//! serialised with I/O, so neither side needs locks.

use std::net::SocketAddr;
use std::time::Instant;

use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::time::{timeout, Duration};

use crate::packet::{Kind, Packet};
use crate::receiver::Reassembly;
use crate::sender::{OversizedStream, SendWindow};
use crate::socket::{Socket, SocketError};

/// Ceiling on one ACK-intake readiness wait.  Bounds how long the loop can
/// sleep without attending to timeouts; the wait still returns immediately
/// on activity, so ACK arrival clocks the next send.
pub const ACK_WAIT: Duration = Duration::from_millis(100);

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Fatal conditions that abort a transfer.
///
/// Corrupt, truncated, misdirected, and duplicate datagrams are handled
/// inside the loops and never surface here.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error(transparent)]
    Oversized(#[from] OversizedStream),
    #[error(transparent)]
    Socket(#[from] SocketError),
    #[error("output write failed: {0}")]
    Output(std::io::Error),
}

// ---------------------------------------------------------------------------
// Sender loop
// ---------------------------------------------------------------------------

/// Counters reported by a completed send.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SendStats {
    /// DATA frames handed to the socket, retransmissions included.
    pub data_frames: u64,
    /// How many of those were retransmissions.
    pub retransmits: u64,
}

/// Deliver `stream` to the receiver at `peer` and return once every segment
/// has been acknowledged.
///
/// Each loop iteration sweeps timed-out segments back into the pending set,
/// drains whatever ACKs have arrived (waiting at most [`ACK_WAIT`] for the
/// first one), and transmits a single segment if the window has room.
pub async fn run_sender(
    socket: &Socket,
    peer: SocketAddr,
    stream: &[u8],
) -> Result<SendStats, TransportError> {
    let mut window = SendWindow::from_stream(stream)?;
    let mut stats = SendStats::default();
    if window.segment_count() == 0 {
        log::debug!("[snd] empty stream, nothing to deliver");
        return Ok(stats);
    }
    log::debug!(
        "[snd] delivering {} byte(s) in {} segment(s) to {peer}",
        stream.len(),
        window.segment_count()
    );

    while !window.is_complete() {
        // 1. Timeout sweep: expired segments become pending again.
        let expired = window.sweep_timeouts(Instant::now());
        if expired > 0 {
            log::debug!(
                "[snd] {expired} segment(s) timed out (rto={:?} window={})",
                window.retransmit_timeout(),
                window.window()
            );
        }

        // 2. ACK intake: bounded wait for the first datagram, then drain the
        //    queue without blocking.
        match timeout(ACK_WAIT, socket.recv_from()).await {
            Err(_elapsed) => {}
            Ok(first) => {
                let mut slot = Some(first);
                loop {
                    let item = match slot.take() {
                        Some(r) => r.map(Some),
                        None => socket.try_recv_from(),
                    };
                    match item {
                        Ok(Some((pkt, addr))) => note_ack(&mut window, &pkt, addr, peer),
                        Ok(None) => break,
                        Err(SocketError::Frame(e)) => {
                            log::trace!("[snd] dropping datagram: {e}");
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
            }
        }

        // 3. Send step: one segment per iteration, lowest pending first.
        if let Some(seq) = window.next_transmit() {
            let retransmission = window.last_sent(seq).is_some();
            socket.send_to(window.packet(seq), peer).await?;
            window.record_sent(seq, Instant::now());
            stats.data_frames += 1;
            if retransmission {
                stats.retransmits += 1;
            }
            log::debug!(
                "[snd] → DATA seq={seq} len={}{} in_flight={}/{}",
                window.packet(seq).payload.len(),
                if retransmission { " (retransmission)" } else { "" },
                window.in_flight(),
                window.window()
            );
        }
    }

    log::info!(
        "[snd] delivered {} segment(s); {} DATA frame(s) sent, {} retransmitted, rtt={:.3}s",
        window.segment_count(),
        stats.data_frames,
        stats.retransmits,
        window.rtt_seconds()
    );
    Ok(stats)
}

/// Account for one inbound datagram on the sender side.
fn note_ack(window: &mut SendWindow, pkt: &Packet, addr: SocketAddr, peer: SocketAddr) {
    if addr != peer {
        log::trace!("[snd] datagram from unexpected source {addr} dropped");
        return;
    }
    if pkt.kind != Kind::Ack {
        log::trace!("[snd] non-ACK frame dropped");
        return;
    }
    if window.on_ack(pkt.seq, Instant::now()) {
        log::debug!(
            "[snd] ← ACK seq={} acked={}/{} rtt={:.3}s window={}",
            pkt.seq,
            window.acked(),
            window.segment_count(),
            window.rtt_seconds(),
            window.window()
        );
    } else {
        log::trace!("[snd] late or duplicate ACK seq={} ignored", pkt.seq);
    }
}

// ---------------------------------------------------------------------------
// Receiver loop
// ---------------------------------------------------------------------------

/// Receive a stream on `socket` and write it, in order, to `out`.
///
/// The first source address that produces a valid frame becomes the peer;
/// everything from other addresses is dropped afterwards.  Every non-corrupt
/// DATA frame is ACKed with its own sequence number — duplicates included,
/// since a duplicate usually means the previous ACK was lost.
///
/// The loop runs until the process is killed or the socket fails; it has no
/// termination of its own.
pub async fn run_receiver<W>(socket: &Socket, out: &mut W) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    let mut assembly = Reassembly::new();
    let mut peer: Option<SocketAddr> = None;

    loop {
        let (pkt, addr) = match socket.recv_from().await {
            Ok(received) => received,
            Err(SocketError::Frame(e)) => {
                log::trace!("[rcv] dropping datagram: {e}");
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        if peer.is_none() {
            log::info!("[rcv] peer locked: {addr}");
        }
        let peer_addr = *peer.get_or_insert(addr);
        if addr != peer_addr {
            log::trace!("[rcv] datagram from unknown peer {addr} dropped");
            continue;
        }
        if pkt.kind != Kind::Data {
            log::trace!("[rcv] non-DATA frame dropped");
            continue;
        }

        let fresh = assembly.on_data(pkt.seq, &pkt.payload);
        let ready = assembly.take_ready();
        if !ready.is_empty() {
            out.write_all(&ready).await.map_err(TransportError::Output)?;
            out.flush().await.map_err(TransportError::Output)?;
        }
        log::debug!(
            "[rcv] ← DATA seq={} len={} {}; released {} byte(s), next={}",
            pkt.seq,
            pkt.payload.len(),
            if fresh { "buffered" } else { "duplicate" },
            ready.len(),
            assembly.next_expected()
        );

        socket.send_to(&Packet::ack(pkt.seq), peer_addr).await?;
    }
}
