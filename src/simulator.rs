//! Fault-injecting datagram relay for deterministic testing.
//!
//! Real networks drop, reorder, duplicate, and corrupt packets.  To exercise
//! the reliability mechanisms without depending on actual network conditions,
//! [`Simulator`] spawns a relay that sits between the two endpoints and
//! applies a configurable fault model to every datagram passing through:
//!
//! | Fault       | Description                                             |
//! |-------------|---------------------------------------------------------|
//! | Loss        | Drop a datagram with probability `loss_rate`.           |
//! | Duplication | Deliver a datagram twice with `duplicate_rate`.         |
//! | Corruption  | Flip one random bit with `corrupt_rate`.                |
//! | Reordering  | Hold a datagram back until the next one has passed.     |
//!
//! Random faults are drawn from a [`StdRng`] seeded via the config, so a
//! failing run reproduces exactly.  On top of the random model there are
//! single-shot deterministic knobs keyed on a DATA frame's sequence number
//! (`drop_data_once`, `corrupt_data_once`) for scripting scenarios such as
//! "lose the first copy of segment 1".
//!
//! The relay forwards raw bytes — deliberately not [`crate::socket::Socket`],
//! which refuses to carry the corrupt datagrams this module exists to
//! produce.  It decodes frames only to read the sequence number for the
//! deterministic knobs.
//!
//! The sender is pointed at the relay's address instead of the receiver's;
//! the relay learns the sender's address from the first datagram it sees and
//! shuttles traffic both ways from a single socket.

use std::collections::BTreeSet;
use std::net::SocketAddr;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;

use crate::packet::{Kind, Packet};

const MAX_DATAGRAM: usize = 65_535;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Fault model applied to every relayed datagram.
///
/// All rates are probabilities in `[0.0, 1.0]`.  The default is a transparent
/// pass-through.
#[derive(Debug, Clone, Default)]
pub struct FaultConfig {
    /// Probability that any given datagram is silently dropped.
    pub loss_rate: f64,
    /// Probability that a datagram is delivered twice.
    pub duplicate_rate: f64,
    /// Probability that one random bit of a datagram is flipped.
    pub corrupt_rate: f64,
    /// Probability that a datagram is held back until the next one passes.
    pub reorder_rate: f64,
    /// Seed for the fault RNG; identical seeds replay identical faults.
    pub seed: u64,
    /// Drop the first relayed copy of each of these DATA sequence numbers.
    pub drop_data_once: Vec<u16>,
    /// Flip a bit in the first relayed copy of each of these DATA sequence
    /// numbers.
    pub corrupt_data_once: Vec<u16>,
}

// ---------------------------------------------------------------------------
// Simulator
// ---------------------------------------------------------------------------

/// A running fault-injecting relay.
///
/// Dropping the handle aborts the relay task.
#[derive(Debug)]
pub struct Simulator {
    /// Address the sender should target instead of the receiver.
    pub local_addr: SocketAddr,
    handle: JoinHandle<()>,
}

impl Simulator {
    /// Bind a relay on loopback that forwards to `upstream` (the receiver)
    /// and spawn its task.
    pub async fn spawn(upstream: SocketAddr, config: FaultConfig) -> std::io::Result<Self> {
        let socket = UdpSocket::bind(SocketAddr::from(([127, 0, 0, 1], 0))).await?;
        let local_addr = socket.local_addr()?;
        let handle = tokio::spawn(relay_loop(socket, upstream, config));
        Ok(Self { local_addr, handle })
    }
}

impl Drop for Simulator {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

// ---------------------------------------------------------------------------
// Relay task
// ---------------------------------------------------------------------------

async fn relay_loop(socket: UdpSocket, upstream: SocketAddr, config: FaultConfig) {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut drop_once: BTreeSet<u16> = config.drop_data_once.iter().copied().collect();
    let mut corrupt_once: BTreeSet<u16> = config.corrupt_data_once.iter().copied().collect();
    let mut downstream: Option<SocketAddr> = None;
    let mut held: Option<(Vec<u8>, SocketAddr)> = None;
    let mut buf = vec![0u8; MAX_DATAGRAM];

    loop {
        let (n, from) = match socket.recv_from(&mut buf).await {
            Ok(received) => received,
            Err(_) => return,
        };
        let mut frame = buf[..n].to_vec();

        // The first non-upstream source is the sender; shuttle accordingly.
        let dest = if from == upstream {
            match downstream {
                Some(addr) => addr,
                None => continue,
            }
        } else {
            downstream = Some(from);
            upstream
        };

        // Single-shot scripted faults, keyed on the DATA sequence number.
        if let Ok(pkt) = Packet::decode(&frame) {
            if pkt.kind == Kind::Data {
                if drop_once.remove(&pkt.seq) {
                    log::trace!("[sim] scripted drop of DATA seq={}", pkt.seq);
                    continue;
                }
                if corrupt_once.remove(&pkt.seq) {
                    log::trace!("[sim] scripted corruption of DATA seq={}", pkt.seq);
                    flip_random_bit(&mut frame, &mut rng);
                }
            }
        }

        // Random fault model.
        if rng.gen::<f64>() < config.loss_rate {
            continue;
        }
        if rng.gen::<f64>() < config.corrupt_rate {
            flip_random_bit(&mut frame, &mut rng);
        }
        if held.is_none() && rng.gen::<f64>() < config.reorder_rate {
            held = Some((frame, dest));
            continue;
        }

        let duplicate = rng.gen::<f64>() < config.duplicate_rate;
        let _ = socket.send_to(&frame, dest).await;
        if duplicate {
            let _ = socket.send_to(&frame, dest).await;
        }

        // A held-back datagram is released after the one that overtook it.
        if let Some((late_frame, late_dest)) = held.take() {
            let _ = socket.send_to(&late_frame, late_dest).await;
        }
    }
}

fn flip_random_bit(frame: &mut [u8], rng: &mut StdRng) {
    if frame.is_empty() {
        return;
    }
    let byte = rng.gen_range(0..frame.len());
    frame[byte] ^= 1 << rng.gen_range(0..8u8);
}
