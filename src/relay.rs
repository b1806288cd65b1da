//! The corrupting middle hop.
//!
//! The relay accepts one framed packet per inbound connection, damages the
//! data field with its currently active [`Strategy`], reframes the result
//! with the **original** algorithm and control fields, forwards it to the
//! receiver over one outbound connection, and acknowledges the sender on
//! the inbound connection before closing it.
//!
//! # Concurrency
//!
//! One listener task accepts connections; each accepted connection runs as
//! its own tokio task, gated by a semaphore so a burst of senders cannot
//! spawn unbounded work.  The active strategy is shared behind a mutex and
//! read once at dispatch: changing it mid-flight never affects a session
//! that has already started.  Shutdown is signalled over a watch channel;
//! in-flight sessions run to completion.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;

use crate::corrupt::{corrupt, Strategy};
use crate::packet::{FrameError, Packet, MAX_FRAME};
use crate::state::RelayState;

/// Default relay listening address.
pub const DEFAULT_RELAY_ADDR: &str = "127.0.0.1:5000";

/// Fixed acknowledgment written back to the sender on success.
pub const ACK_OK: &str = "packet received and processed";

/// Prefix of the acknowledgment written back on a malformed packet.
pub const ACK_ERR_PREFIX: &str = "error: ";

/// Upper bound on concurrently running sessions per endpoint.
pub const DEFAULT_MAX_SESSIONS: usize = 64;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can abort a single session.
///
/// Session errors are logged by the session task and never propagate to the
/// accept loop; one bad connection cannot take the endpoint down.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The peer closed the connection before any data arrived.
    #[error("connection closed before any data arrived")]
    EmptyRead,

    /// The inbound frame violated the wire format.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// Underlying I/O error from the OS.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration owned by one relay instance.  No ambient globals: every
/// session borrows its settings from here.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Local address to listen on.
    pub bind: SocketAddr,
    /// Receiver address to forward corrupted packets to.
    pub forward: SocketAddr,
    /// Corruption strategy active at startup (swappable at runtime).
    pub strategy: Strategy,
    /// Seed for the corruption RNG; `None` draws one from the OS.
    ///
    /// A fixed seed makes a whole run's corruption reproducible.
    pub seed: Option<u64>,
    /// Maximum number of concurrently running sessions.
    pub max_sessions: usize,
}

impl RelayConfig {
    /// Configuration with the original defaults: bit-flip corruption,
    /// OS-seeded randomness, bounded concurrency.
    pub fn new(bind: SocketAddr, forward: SocketAddr) -> Self {
        Self {
            bind,
            forward,
            strategy: Strategy::BitFlip,
            seed: None,
            max_sessions: DEFAULT_MAX_SESSIONS,
        }
    }
}

// ---------------------------------------------------------------------------
// Relay
// ---------------------------------------------------------------------------

/// A bound, not-yet-running relay endpoint.
///
/// Binding is separate from running so callers (and tests) can bind port 0
/// and learn the resolved address before any traffic flows.
pub struct Relay {
    config: RelayConfig,
    listener: TcpListener,
    strategy: Arc<Mutex<Strategy>>,
    rng: Arc<Mutex<ChaCha8Rng>>,
}

impl Relay {
    /// Bind the listening socket and seed the corruption RNG.
    pub async fn bind(config: RelayConfig) -> std::io::Result<Self> {
        let listener = TcpListener::bind(config.bind).await?;
        let seed = config.seed.unwrap_or_else(|| rand::rng().random());
        log::debug!("[relay] corruption rng seed = {seed}");
        Ok(Self {
            strategy: Arc::new(Mutex::new(config.strategy)),
            rng: Arc::new(Mutex::new(ChaCha8Rng::seed_from_u64(seed))),
            config,
            listener,
        })
    }

    /// Address the listener actually bound (resolves port 0).
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Spawn the accept loop and return a control handle.
    pub fn run(self) -> RelayHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let strategy = Arc::clone(&self.strategy);
        let task = tokio::spawn(accept_loop(
            self.listener,
            self.config.forward,
            Arc::clone(&self.strategy),
            self.rng,
            self.config.max_sessions,
            shutdown_rx,
        ));
        RelayHandle {
            strategy,
            shutdown_tx,
            task,
        }
    }
}

/// Handle returned by [`Relay::run`]: strategy selection and shutdown.
pub struct RelayHandle {
    strategy: Arc<Mutex<Strategy>>,
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl RelayHandle {
    /// Swap the active corruption strategy.
    ///
    /// Takes effect for sessions dispatched after the call; a session that
    /// has already read its packet keeps the strategy it started with.
    pub fn set_strategy(&self, strategy: Strategy) {
        *self.strategy.lock().unwrap() = strategy;
        log::info!("[relay] corruption strategy set to {strategy}");
    }

    /// The strategy sessions dispatched right now would use.
    pub fn active_strategy(&self) -> Strategy {
        *self.strategy.lock().unwrap()
    }

    /// Stop accepting connections, let in-flight sessions finish, and wait
    /// for the accept loop to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.task.await;
    }
}

// ---------------------------------------------------------------------------
// Accept loop and per-session handler
// ---------------------------------------------------------------------------

async fn accept_loop(
    listener: TcpListener,
    forward: SocketAddr,
    strategy: Arc<Mutex<Strategy>>,
    rng: Arc<Mutex<ChaCha8Rng>>,
    max_sessions: usize,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let limit = Arc::new(Semaphore::new(max_sessions));
    log::info!("[relay] listening, forwarding to {forward}");

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                log::info!("[relay] shutdown requested");
                break;
            }
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        log::warn!("[relay] accept failed: {e}");
                        continue;
                    }
                };
                let permit = match Arc::clone(&limit).acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => break,
                };
                let strategy = Arc::clone(&strategy);
                let rng = Arc::clone(&rng);
                tokio::spawn(async move {
                    let _permit = permit;
                    if let Err(e) = handle_session(stream, peer, forward, strategy, rng).await {
                        log::warn!("[relay] session from {peer} failed: {e}");
                    }
                });
            }
        }
    }

    // Drain the semaphore so in-flight sessions run to completion.
    let _ = limit.acquire_many(max_sessions as u32).await;
    log::info!("[relay] shut down");
}

/// Handle exactly one inbound connection end-to-end.
async fn handle_session(
    mut stream: TcpStream,
    peer: SocketAddr,
    forward: SocketAddr,
    strategy: Arc<Mutex<Strategy>>,
    rng: Arc<Mutex<ChaCha8Rng>>,
) -> Result<(), SessionError> {
    let mut state = RelayState::Reading;
    log::debug!("[relay] {peer}: {state}");

    let mut buf = vec![0u8; MAX_FRAME];
    let n = stream.read(&mut buf).await?;
    if n == 0 {
        return Err(SessionError::EmptyRead);
    }

    let packet = match Packet::decode(&buf[..n]) {
        Ok(packet) => packet,
        Err(e) => {
            state = RelayState::Failed;
            log::debug!("[relay] {peer}: {state}");
            // The error reply is best-effort; the frame error is what counts.
            let _ = stream
                .write_all(format!("{ACK_ERR_PREFIX}{e}").as_bytes())
                .await;
            return Err(e.into());
        }
    };

    state = RelayState::Corrupting;
    log::debug!("[relay] {peer}: {state}");
    // Read once at dispatch; later swaps must not affect this session.
    let active = *strategy.lock().unwrap();
    let corrupted = {
        let mut rng = rng.lock().unwrap();
        corrupt(&packet.data, active, &mut *rng)
    };
    log::info!(
        "[relay] {active}: '{}' -> '{}' ({})",
        packet.data,
        corrupted,
        packet.algorithm
    );

    // Reframe with the original algorithm and control fields; only the
    // data field may differ from what arrived.
    let outbound = Packet {
        data: corrupted,
        algorithm: packet.algorithm,
        control: packet.control,
    };

    state = RelayState::Forwarding;
    log::debug!("[relay] {peer}: {state}");
    forward_packet(&outbound, forward).await;

    // Acknowledge once forwarding was attempted, whatever its outcome.
    stream.write_all(ACK_OK.as_bytes()).await?;
    state = RelayState::Done;
    log::debug!("[relay] {peer}: {state}");
    Ok(())
}

/// One outbound connection, one write, close.  Failure to reach the
/// receiver is logged and does not fail the session.
async fn forward_packet(packet: &Packet, forward: SocketAddr) {
    match TcpStream::connect(forward).await {
        Ok(mut downstream) => {
            if let Err(e) = downstream.write_all(packet.encode().as_bytes()).await {
                log::warn!("[relay] write to receiver {forward} failed: {e}");
            }
        }
        Err(e) => {
            log::warn!("[relay] cannot reach receiver at {forward}: {e}");
        }
    }
}
