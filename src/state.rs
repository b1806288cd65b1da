//! Session finite-state-machine (FSM) types.
//!
//! A session is the lifetime of handling exactly one inbound connection.
//! State transitions are *not* implemented here; they live in
//! [`crate::relay`] and [`crate::receiver`], which drive their session
//! through these states and log each step.  Keeping the types in their own
//! module makes it easy to add guard logic or tracing without touching the
//! session plumbing.

/// States of one relay session.
///
/// ```text
/// AwaitConnection ──▶ Reading ──▶ Corrupting ──▶ Forwarding ──▶ Done
///        │               │            │              │
///        └───────────────┴────────────┴──────────────┴──▶ Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    /// Waiting for an inbound connection; initial state.
    AwaitConnection,
    /// One bounded read of the inbound frame, then deserialise.
    Reading,
    /// Applying the active corruption strategy to the data field only.
    Corrupting,
    /// Reframing with the original control field, one outbound write to the
    /// receiver, then the acknowledgment reply upstream.
    Forwarding,
    /// Session complete; connection closed.
    Done,
    /// Any error aborted the session; connection closed.
    Failed,
}

/// States of one verifier session.
///
/// ```text
/// AwaitConnection ──▶ Reading ──▶ Verifying ──▶ Done
///        │               │            │
///        └───────────────┴────────────┴──▶ Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyState {
    /// Waiting for an inbound connection; initial state.
    AwaitConnection,
    /// One bounded read of the inbound frame, then deserialise.
    Reading,
    /// Recomputing the control value and comparing against the packet's.
    Verifying,
    /// Session complete; statistics updated.
    Done,
    /// Malformed frame or I/O error; no statistics updated.
    Failed,
}

impl std::fmt::Display for RelayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl std::fmt::Display for VerifyState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}
