//! The verifying endpoint.
//!
//! The receiver accepts one framed packet per inbound connection, recomputes
//! the control value with the algorithm named in the packet, and compares it
//! to the control value that arrived.  The outcome feeds process-wide
//! statistics; nothing is ever written back on the connection.
//!
//! # Concurrency
//!
//! Same shape as the relay: one accept loop, one semaphore-gated task per
//! connection, watch-channel shutdown.  Sessions share only the statistics
//! counters, which are atomics so concurrent increments cannot lose updates.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;

use crate::codec::Algorithm;
use crate::packet::{Packet, MAX_FRAME};
use crate::relay::{SessionError, DEFAULT_MAX_SESSIONS};
use crate::state::VerifyState;

/// Default receiver listening address.
pub const DEFAULT_RECEIVER_ADDR: &str = "127.0.0.1:5001";

// ---------------------------------------------------------------------------
// Verification result
// ---------------------------------------------------------------------------

/// The outcome of verifying one received packet.  Ephemeral: feeds the
/// statistics and the log, then is dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationReport {
    pub data: String,
    pub algorithm: Algorithm,
    pub received_control: String,
    pub computed_control: String,
    pub is_valid: bool,
}

/// Recompute the control value for `packet` and compare it to the one that
/// arrived.
pub fn verify_packet(packet: &Packet) -> VerificationReport {
    let computed_control = packet.algorithm.encode(&packet.data);
    let is_valid = computed_control == packet.control;
    VerificationReport {
        data: packet.data.clone(),
        algorithm: packet.algorithm,
        received_control: packet.control.clone(),
        computed_control,
        is_valid,
    }
}

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

/// Process-wide packet counters, shared by every session.
///
/// `received` counts packets that parsed successfully, incremented before
/// verification; malformed frames touch no counter.  Reset only by process
/// restart.
#[derive(Debug, Default)]
pub struct Stats {
    received: AtomicU64,
    valid: AtomicU64,
    corrupted: AtomicU64,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one fully-handled packet.
    fn record(&self, report: &VerificationReport) {
        self.received.fetch_add(1, Ordering::Relaxed);
        if report.is_valid {
            self.valid.fetch_add(1, Ordering::Relaxed);
        } else {
            self.corrupted.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// A consistent-enough point-in-time copy for display.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            valid: self.valid.load(Ordering::Relaxed),
            corrupted: self.corrupted.load(Ordering::Relaxed),
        }
    }
}

/// Plain-value copy of [`Stats`] for display and assertions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub received: u64,
    pub valid: u64,
    pub corrupted: u64,
}

impl StatsSnapshot {
    /// Fraction of received packets whose corruption was detected.
    pub fn error_rate(&self) -> f64 {
        if self.received == 0 {
            0.0
        } else {
            self.corrupted as f64 / self.received as f64
        }
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration owned by one receiver instance.
#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    /// Local address to listen on.
    pub bind: SocketAddr,
    /// Maximum number of concurrently running sessions.
    pub max_sessions: usize,
}

impl ReceiverConfig {
    pub fn new(bind: SocketAddr) -> Self {
        Self {
            bind,
            max_sessions: DEFAULT_MAX_SESSIONS,
        }
    }
}

// ---------------------------------------------------------------------------
// Receiver
// ---------------------------------------------------------------------------

/// A bound, not-yet-running receiver endpoint.
pub struct Receiver {
    config: ReceiverConfig,
    listener: TcpListener,
    stats: Arc<Stats>,
}

impl Receiver {
    /// Bind the listening socket.
    pub async fn bind(config: ReceiverConfig) -> std::io::Result<Self> {
        let listener = TcpListener::bind(config.bind).await?;
        Ok(Self {
            config,
            listener,
            stats: Arc::new(Stats::new()),
        })
    }

    /// Address the listener actually bound (resolves port 0).
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Spawn the accept loop and return a control handle.
    pub fn run(self) -> ReceiverHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let stats = Arc::clone(&self.stats);
        let task = tokio::spawn(accept_loop(
            self.listener,
            Arc::clone(&self.stats),
            self.config.max_sessions,
            shutdown_rx,
        ));
        ReceiverHandle {
            stats,
            shutdown_tx,
            task,
        }
    }
}

/// Handle returned by [`Receiver::run`]: statistics access and shutdown.
pub struct ReceiverHandle {
    stats: Arc<Stats>,
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ReceiverHandle {
    /// Current counter values.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Stop accepting connections, let in-flight sessions finish, and wait
    /// for the accept loop to exit.  Returns the final counters.
    pub async fn shutdown(self) -> StatsSnapshot {
        let _ = self.shutdown_tx.send(true);
        let _ = self.task.await;
        self.stats.snapshot()
    }
}

// ---------------------------------------------------------------------------
// Accept loop and per-session handler
// ---------------------------------------------------------------------------

async fn accept_loop(
    listener: TcpListener,
    stats: Arc<Stats>,
    max_sessions: usize,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let limit = Arc::new(Semaphore::new(max_sessions));
    log::info!("[receiver] listening");

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                log::info!("[receiver] shutdown requested");
                break;
            }
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        log::warn!("[receiver] accept failed: {e}");
                        continue;
                    }
                };
                let permit = match Arc::clone(&limit).acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => break,
                };
                let stats = Arc::clone(&stats);
                tokio::spawn(async move {
                    let _permit = permit;
                    if let Err(e) = handle_session(stream, peer, stats).await {
                        log::warn!("[receiver] session from {peer} failed: {e}");
                    }
                });
            }
        }
    }

    let _ = limit.acquire_many(max_sessions as u32).await;
    log::info!("[receiver] shut down");
}

/// Handle exactly one inbound connection end-to-end.
async fn handle_session(
    mut stream: TcpStream,
    peer: SocketAddr,
    stats: Arc<Stats>,
) -> Result<(), SessionError> {
    let mut state = VerifyState::Reading;
    log::debug!("[receiver] {peer}: {state}");

    let mut buf = vec![0u8; MAX_FRAME];
    let n = stream.read(&mut buf).await?;
    if n == 0 {
        return Err(SessionError::EmptyRead);
    }

    let packet = match Packet::decode(&buf[..n]) {
        Ok(packet) => packet,
        Err(e) => {
            state = VerifyState::Failed;
            log::debug!("[receiver] {peer}: {state}");
            return Err(e.into());
        }
    };

    state = VerifyState::Verifying;
    log::debug!("[receiver] {peer}: {state}");
    let report = verify_packet(&packet);
    stats.record(&report);

    if report.is_valid {
        log::info!(
            "[receiver] DATA CORRECT: '{}' ({}, control {})",
            report.data,
            report.algorithm,
            report.received_control
        );
    } else {
        log::info!(
            "[receiver] DATA CORRUPTED: '{}' ({}, received {}, computed {})",
            report.data,
            report.algorithm,
            report.received_control,
            report.computed_control
        );
    }

    state = VerifyState::Done;
    log::debug!("[receiver] {peer}: {state}");
    Ok(())
}
