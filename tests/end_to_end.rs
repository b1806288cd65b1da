//! End-to-end tests for the sender → relay → receiver line topology.
//!
//! Each test spins up the real endpoints on OS-assigned loopback ports as
//! background tokio tasks and drives them through the public client API.
//! Relays are seeded so corruption outcomes are reproducible; the fixtures
//! are chosen so the assertions hold for every seed.

use std::net::SocketAddr;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{sleep, Duration};

use noisy_link::codec::Algorithm;
use noisy_link::corrupt::Strategy;
use noisy_link::receiver::{Receiver, ReceiverConfig, ReceiverHandle};
use noisy_link::relay::{Relay, RelayConfig, RelayHandle, ACK_ERR_PREFIX, ACK_OK};
use noisy_link::sender::{send_text, SendError};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn loopback() -> SocketAddr {
    "127.0.0.1:0".parse().unwrap()
}

/// Bind and start a receiver on an OS-assigned port.
async fn start_receiver() -> (ReceiverHandle, SocketAddr) {
    let receiver = Receiver::bind(ReceiverConfig::new(loopback()))
        .await
        .expect("bind receiver");
    let addr = receiver.local_addr().expect("receiver addr");
    (receiver.run(), addr)
}

/// Bind and start a seeded relay forwarding to `forward`.
async fn start_relay(
    forward: SocketAddr,
    strategy: Strategy,
    seed: u64,
) -> (RelayHandle, SocketAddr) {
    let mut config = RelayConfig::new(loopback(), forward);
    config.strategy = strategy;
    config.seed = Some(seed);
    let relay = Relay::bind(config).await.expect("bind relay");
    let addr = relay.local_addr().expect("relay addr");
    (relay.run(), addr)
}

/// The relay acknowledges before the receiver finishes its session, so
/// poll the counters instead of asserting immediately.
async fn wait_for_received(handle: &ReceiverHandle, expected: u64) {
    for _ in 0..200 {
        if handle.stats().received >= expected {
            return;
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "timed out waiting for {expected} packet(s); stats = {:?}",
        handle.stats()
    );
}

// ---------------------------------------------------------------------------
// Clean path
// ---------------------------------------------------------------------------

#[tokio::test]
async fn none_strategy_delivers_a_valid_packet() {
    let (receiver, receiver_addr) = start_receiver().await;
    let (relay, relay_addr) = start_relay(receiver_addr, Strategy::None, 1).await;

    let delivery = send_text(relay_addr, "HELLO", Algorithm::Crc16)
        .await
        .expect("send");
    assert_eq!(delivery.reply, ACK_OK);
    assert!(delivery
        .packet
        .algorithm
        .verify(&delivery.packet.data, &delivery.packet.control));

    wait_for_received(&receiver, 1).await;
    let stats = receiver.stats();
    assert_eq!(stats.received, 1);
    assert_eq!(stats.valid, 1);
    assert_eq!(stats.corrupted, 0);

    relay.shutdown().await;
    receiver.shutdown().await;
}

// ---------------------------------------------------------------------------
// Corruption is detected
// ---------------------------------------------------------------------------

#[tokio::test]
async fn bit_flip_is_detected_by_crc16() {
    let (receiver, receiver_addr) = start_receiver().await;
    let (relay, relay_addr) = start_relay(receiver_addr, Strategy::BitFlip, 42).await;

    // A bit flip always changes exactly one character of "HELLO", and a
    // one-byte change is a burst CRC-16 is guaranteed to catch.
    let delivery = send_text(relay_addr, "HELLO", Algorithm::Crc16)
        .await
        .expect("send");
    assert_eq!(delivery.reply, ACK_OK);

    wait_for_received(&receiver, 1).await;
    let stats = receiver.stats();
    assert_eq!(stats.valid, 0);
    assert_eq!(stats.corrupted, 1);

    relay.shutdown().await;
    receiver.shutdown().await;
}

#[tokio::test]
async fn bit_flip_is_detected_by_parity() {
    let (receiver, receiver_addr) = start_receiver().await;
    let (relay, relay_addr) = start_relay(receiver_addr, Strategy::BitFlip, 7).await;

    // Every possible flip outcome for 'o' (both the in-range single-bit
    // flips and the two printable-range remaps) changes the total set-bit
    // parity, so detection does not depend on what the seed picks.
    send_text(relay_addr, "ooooo", Algorithm::Parity)
        .await
        .expect("send");

    wait_for_received(&receiver, 1).await;
    let stats = receiver.stats();
    assert_eq!(stats.valid, 0);
    assert_eq!(stats.corrupted, 1);

    relay.shutdown().await;
    receiver.shutdown().await;
}

// ---------------------------------------------------------------------------
// Corruption that evades detection
// ---------------------------------------------------------------------------

#[tokio::test]
async fn adjacent_swap_evades_parity_but_not_crc16() {
    let (receiver, receiver_addr) = start_receiver().await;
    let (relay, relay_addr) = start_relay(receiver_addr, Strategy::CharSwap, 9).await;

    // "AB" has a single swap position, so the relay always forwards "BA".
    // Parity counts set bits over the multiset of characters and cannot
    // see the reordering: the corrupted packet still verifies.
    send_text(relay_addr, "AB", Algorithm::Parity)
        .await
        .expect("send parity");
    wait_for_received(&receiver, 1).await;
    assert_eq!(receiver.stats().valid, 1);
    assert_eq!(receiver.stats().corrupted, 0);

    // CRC-16 is order-sensitive and catches the same transposition.
    send_text(relay_addr, "AB", Algorithm::Crc16)
        .await
        .expect("send crc16");
    wait_for_received(&receiver, 2).await;
    assert_eq!(receiver.stats().valid, 1);
    assert_eq!(receiver.stats().corrupted, 1);

    relay.shutdown().await;
    receiver.shutdown().await;
}

// ---------------------------------------------------------------------------
// Malformed frames
// ---------------------------------------------------------------------------

#[tokio::test]
async fn malformed_frame_is_rejected_by_both_endpoints() {
    let (receiver, receiver_addr) = start_receiver().await;
    let (relay, relay_addr) = start_relay(receiver_addr, Strategy::None, 3).await;

    // Straight at the relay: the reply embeds the failure reason.
    let mut stream = TcpStream::connect(relay_addr).await.expect("connect relay");
    stream.write_all(b"onlyonefield").await.expect("write");
    let mut buf = vec![0u8; 1024];
    let n = stream.read(&mut buf).await.expect("read reply");
    let reply = String::from_utf8_lossy(&buf[..n]).into_owned();
    assert!(
        reply.starts_with(ACK_ERR_PREFIX),
        "unexpected reply: {reply}"
    );
    drop(stream);

    // Straight at the receiver: the session fails before any counter.
    let mut stream = TcpStream::connect(receiver_addr)
        .await
        .expect("connect receiver");
    stream.write_all(b"onlyonefield").await.expect("write");
    drop(stream);

    // A subsequent valid packet proves the endpoints survived and that the
    // malformed frames touched no counter.
    send_text(relay_addr, "still alive", Algorithm::Checksum)
        .await
        .expect("send");
    wait_for_received(&receiver, 1).await;
    let stats = receiver.stats();
    assert_eq!(stats.received, 1);
    assert_eq!(stats.valid, 1);
    assert_eq!(stats.corrupted, 0);

    relay.shutdown().await;
    receiver.shutdown().await;
}

// ---------------------------------------------------------------------------
// Runtime strategy selection
// ---------------------------------------------------------------------------

#[tokio::test]
async fn strategy_swap_affects_only_later_packets() {
    let (receiver, receiver_addr) = start_receiver().await;
    let (relay, relay_addr) = start_relay(receiver_addr, Strategy::None, 11).await;

    send_text(relay_addr, "HELLO", Algorithm::Crc16)
        .await
        .expect("send clean");
    wait_for_received(&receiver, 1).await;
    assert_eq!(receiver.stats().valid, 1);

    relay.set_strategy(Strategy::BitFlip);
    assert_eq!(relay.active_strategy(), Strategy::BitFlip);

    send_text(relay_addr, "HELLO", Algorithm::Crc16)
        .await
        .expect("send corrupted");
    wait_for_received(&receiver, 2).await;
    let stats = receiver.stats();
    assert_eq!(stats.valid, 1);
    assert_eq!(stats.corrupted, 1);

    relay.shutdown().await;
    receiver.shutdown().await;
}

// ---------------------------------------------------------------------------
// Concurrency
// ---------------------------------------------------------------------------

#[tokio::test]
async fn concurrent_senders_are_all_acknowledged_and_counted() {
    const SENDERS: usize = 8;

    let (receiver, receiver_addr) = start_receiver().await;
    let (relay, relay_addr) = start_relay(receiver_addr, Strategy::None, 5).await;

    let mut tasks = Vec::new();
    for i in 0..SENDERS {
        let text = format!("packet-{i:02}");
        tasks.push(tokio::spawn(async move {
            send_text(relay_addr, &text, Algorithm::Checksum).await
        }));
    }
    for task in tasks {
        let delivery = task.await.expect("join").expect("send");
        assert_eq!(delivery.reply, ACK_OK);
    }

    wait_for_received(&receiver, SENDERS as u64).await;
    let stats = receiver.stats();
    assert_eq!(stats.received, SENDERS as u64);
    assert_eq!(stats.valid, SENDERS as u64);
    assert_eq!(stats.corrupted, 0);

    relay.shutdown().await;
    receiver.shutdown().await;
}

// ---------------------------------------------------------------------------
// Failure handling
// ---------------------------------------------------------------------------

#[tokio::test]
async fn relay_acknowledges_even_when_receiver_is_down() {
    // Claim a port, then free it so the forward connection is refused.
    let parked = TcpListener::bind(loopback()).await.expect("bind");
    let dead_addr = parked.local_addr().expect("addr");
    drop(parked);

    let (relay, relay_addr) = start_relay(dead_addr, Strategy::None, 2).await;

    let delivery = send_text(relay_addr, "HELLO", Algorithm::Parity)
        .await
        .expect("send");
    assert_eq!(delivery.reply, ACK_OK);

    relay.shutdown().await;
}

#[tokio::test]
async fn empty_data_is_rejected_before_the_network() {
    let err = send_text("127.0.0.1:1".parse().unwrap(), "", Algorithm::Crc16)
        .await
        .expect_err("empty data must be rejected");
    assert!(matches!(err, SendError::EmptyData));
}
