//! End-to-end tests for the reliable transport.
//!
//! Each test spins up a receiver task and a sender over the loopback
//! interface; the lossy tests interpose the fault-injecting relay.  The
//! receiver writes into one end of an in-memory duplex pipe so the test can
//! read back exactly what was delivered, in the order it was delivered.

use std::net::SocketAddr;

use tokio::io::{AsyncReadExt, DuplexStream};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration};

use stream_over_udp::endpoint::{self, SendStats};
use stream_over_udp::simulator::{FaultConfig, Simulator};
use stream_over_udp::socket::Socket;

/// Bind a socket to an OS-assigned port on loopback.
async fn ephemeral() -> Socket {
    let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
    Socket::bind(addr).await.expect("bind failed")
}

/// Spawn a receiver task; returns its address and the read end of its output.
async fn spawn_receiver() -> (SocketAddr, DuplexStream, JoinHandle<()>) {
    let socket = ephemeral().await;
    let addr = socket.local_addr;
    let (mut write_half, read_half) = tokio::io::duplex(1 << 20);
    let handle = tokio::spawn(async move {
        let _ = endpoint::run_receiver(&socket, &mut write_half).await;
    });
    (addr, read_half, handle)
}

/// Run a sender for `stream` against `peer` and return its counters.
async fn deliver(peer: SocketAddr, stream: &[u8]) -> SendStats {
    let socket = ephemeral().await;
    endpoint::run_sender(&socket, peer, stream)
        .await
        .expect("send failed")
}

/// Read exactly `len` bytes of delivered output.
async fn read_delivered(out: &mut DuplexStream, len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    timeout(Duration::from_secs(30), out.read_exact(&mut buf))
        .await
        .expect("timed out waiting for delivery")
        .expect("output pipe closed early");
    buf
}

/// Assert that nothing further shows up on the output for a little while.
async fn assert_no_more_output(out: &mut DuplexStream) {
    let mut probe = [0u8; 1];
    let extra = timeout(Duration::from_millis(300), out.read(&mut probe)).await;
    assert!(extra.is_err(), "receiver produced unexpected extra bytes");
}

// ---------------------------------------------------------------------------
// Test 1: clean pipe — exact delivery, exactly one frame per segment
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_clean_pipe_exact_delivery() {
    let (peer, mut out, _recv) = spawn_receiver().await;
    let stream = vec![0x41u8; 3000];

    let stats = deliver(peer, &stream).await;
    assert_eq!(stats.data_frames, 3, "1024 + 1024 + 952");
    assert_eq!(stats.retransmits, 0);

    assert_eq!(read_delivered(&mut out, 3000).await, stream);
    assert_no_more_output(&mut out).await;
}

// ---------------------------------------------------------------------------
// Test 2: a dropped segment is retransmitted and the stream stays intact
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_single_drop_is_retransmitted() {
    let (recv_addr, mut out, _recv) = spawn_receiver().await;
    let relay = Simulator::spawn(
        recv_addr,
        FaultConfig {
            drop_data_once: vec![1],
            ..Default::default()
        },
    )
    .await
    .expect("relay spawn");

    let stream = vec![0x41u8; 3000];
    let stats = deliver(relay.local_addr, &stream).await;
    assert!(stats.data_frames >= 4, "segment 1 must be sent again");
    assert!(stats.retransmits >= 1);

    assert_eq!(read_delivered(&mut out, 3000).await, stream);
}

// ---------------------------------------------------------------------------
// Test 3: a corrupted segment is not ACKed and arrives again intact
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_corrupted_segment_is_dropped_and_resent() {
    let (recv_addr, mut out, _recv) = spawn_receiver().await;
    let relay = Simulator::spawn(
        recv_addr,
        FaultConfig {
            corrupt_data_once: vec![0],
            ..Default::default()
        },
    )
    .await
    .expect("relay spawn");

    let stream: Vec<u8> = (0..3000u32).map(|i| (i % 251) as u8).collect();
    let stats = deliver(relay.local_addr, &stream).await;
    assert!(
        stats.retransmits >= 1,
        "the corrupt copy must not have been ACKed"
    );

    assert_eq!(read_delivered(&mut out, 3000).await, stream);
}

// ---------------------------------------------------------------------------
// Test 4: duplicated datagrams never duplicate output
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_duplicates_are_suppressed() {
    let (recv_addr, mut out, _recv) = spawn_receiver().await;
    let relay = Simulator::spawn(
        recv_addr,
        FaultConfig {
            duplicate_rate: 1.0,
            ..Default::default()
        },
    )
    .await
    .expect("relay spawn");

    let stream = vec![0x41u8; 3000];
    let stats = deliver(relay.local_addr, &stream).await;
    // Duplicate ACKs must not be double-counted, and duplicate DATA must be
    // re-ACKed without rewriting output; nothing here needs a retransmission.
    assert_eq!(stats.data_frames, 3);
    assert_eq!(stats.retransmits, 0);

    assert_eq!(read_delivered(&mut out, 3000).await, stream);
    assert_no_more_output(&mut out).await;
}

// ---------------------------------------------------------------------------
// Test 5: loss, reordering, duplication, and corruption all at once
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_hostile_path_delivers_exactly() {
    let (recv_addr, mut out, _recv) = spawn_receiver().await;
    let relay = Simulator::spawn(
        recv_addr,
        FaultConfig {
            loss_rate: 0.10,
            reorder_rate: 0.15,
            duplicate_rate: 0.15,
            corrupt_rate: 0.05,
            seed: 7,
            ..Default::default()
        },
    )
    .await
    .expect("relay spawn");

    // A payload with structure, so any reordering or loss would be visible.
    let stream: Vec<u8> = (0..20_000u32).flat_map(|i| i.to_be_bytes()).collect();
    let stats = deliver(relay.local_addr, &stream).await;
    assert!(stats.data_frames as usize >= stream.len().div_ceil(1024));

    assert_eq!(read_delivered(&mut out, stream.len()).await, stream);
    assert_no_more_output(&mut out).await;
}

// ---------------------------------------------------------------------------
// Test 6: empty input — nothing sent, receiver stays idle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_empty_stream_sends_nothing() {
    let (peer, mut out, _recv) = spawn_receiver().await;

    let stats = deliver(peer, &[]).await;
    assert_eq!(stats, SendStats::default());

    assert_no_more_output(&mut out).await;
}
