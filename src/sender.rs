//! One-shot packet builder and client.
//!
//! The sender owns no listener.  For each send it derives the control value,
//! frames the packet, opens one connection to the relay, writes the frame,
//! and reads back the relay's acknowledgment on the same connection.  The
//! acknowledgment only confirms the relay processed the packet; it says
//! nothing about whether the receiver judged it valid.

use std::net::SocketAddr;

use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::codec::Algorithm;
use crate::packet::{Packet, MAX_REPLY};

/// Errors that can fail one send attempt.
///
/// A failed attempt is fatal only to itself; the caller is free to issue
/// the next send.
#[derive(Debug, Error)]
pub enum SendError {
    /// Empty payloads are rejected before anything touches the network.
    #[error("refusing to send empty data")]
    EmptyData,

    /// Underlying I/O error (including connection refused by the relay).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// What one completed send produced: the packet that went out and the
/// relay's acknowledgment string.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub packet: Packet,
    pub reply: String,
}

/// Build a packet for `text` and push it through the relay at `relay`.
///
/// One connection, one write, one bounded acknowledgment read, close.
/// No retries: a transport failure fails this attempt only.
pub async fn send_text(
    relay: SocketAddr,
    text: &str,
    algorithm: Algorithm,
) -> Result<Delivery, SendError> {
    if text.is_empty() {
        return Err(SendError::EmptyData);
    }

    let packet = Packet::new(text.to_string(), algorithm);
    log::debug!(
        "[sender] sending '{}' with {} (control {})",
        packet.data,
        packet.algorithm,
        packet.control
    );

    let mut stream = TcpStream::connect(relay).await?;
    stream.write_all(packet.encode().as_bytes()).await?;

    let mut buf = vec![0u8; MAX_REPLY];
    let n = stream.read(&mut buf).await?;
    let reply = String::from_utf8_lossy(&buf[..n]).into_owned();
    log::debug!("[sender] relay replied: {reply}");

    Ok(Delivery { packet, reply })
}
