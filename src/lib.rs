//! `noisy-link` — an error-detection demo over a deliberately noisy relay.
//!
//! # Architecture
//!
//! ```text
//!              data|algo|control                corrupted|algo|control
//!  ┌────────┐ ────────────────────▶ ┌────────┐ ────────────────────▶ ┌──────────┐
//!  │ Sender │                       │ Relay  │                       │ Receiver │
//!  └────────┘ ◀──── ack string ──── └────────┘                       └──────────┘
//! ```
//!
//! The sender derives a control value from its payload with one of five
//! algorithms and frames both into a single delimited line.  The relay
//! damages the payload with one of eight corruption strategies, keeps the
//! control value untouched, and forwards the packet.  The receiver
//! recomputes the control value and reports whether the damage was caught.
//!
//! Each module has a single responsibility:
//! - [`codec`]    — control-code algorithms (encode / verify)
//! - [`corrupt`]  — payload corruption strategies
//! - [`packet`]   — wire format (serialise / deserialise)
//! - [`state`]    — session finite-state-machine types
//! - [`relay`]    — corrupting middle hop (listener + per-connection session)
//! - [`receiver`] — verifying endpoint (listener + statistics)
//! - [`sender`]   — one-shot packet builder and client

pub mod codec;
pub mod corrupt;
pub mod packet;
pub mod receiver;
pub mod relay;
pub mod sender;
pub mod state;

// Re-export commonly used types
pub use codec::{Algorithm, CodecError};
pub use corrupt::Strategy;
pub use packet::{FrameError, Packet};
