//! Link State Machine
//!
//! Defines valid connection state transitions for the serial link.

use std::fmt;

/// Connection status of the serial link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkState::Disconnected => write!(f, "disconnected"),
            LinkState::Connecting => write!(f, "connecting"),
            LinkState::Connected => write!(f, "connected"),
        }
    }
}

/// Events that can trigger state transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    /// A connect was requested by the caller
    ConnectRequested,
    /// The RFCOMM handshake completed
    HandshakeSucceeded,
    /// The handshake failed, timed out or was cancelled
    HandshakeFailed,
    /// A read or write on the open channel failed
    IoFailure,
    /// Explicit close
    CloseRequested,
}

/// Result of a state transition attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionResult {
    /// Transition was valid and state changed (or stayed put)
    Success(LinkState),
    /// Transition was invalid from current state
    Rejected { from: LinkState, event: LinkEvent },
}

impl TransitionResult {
    pub fn is_success(&self) -> bool {
        matches!(self, TransitionResult::Success(_))
    }
}

/// Get the next state for a given event
///
/// A connect request is only accepted from `Disconnected`; a second request
/// while connecting or connected is rejected rather than opening another
/// socket over the first one.
pub fn transition(from: LinkState, event: LinkEvent) -> TransitionResult {
    use LinkEvent::*;
    use LinkState::*;

    let next = match (from, event) {
        (_, CloseRequested) => Some(Disconnected),

        (Disconnected, ConnectRequested) => Some(Connecting),

        (Connecting, HandshakeSucceeded) => Some(Connected),
        (Connecting, HandshakeFailed) => Some(Disconnected),

        (Connected, IoFailure) => Some(Disconnected),

        _ => None,
    };

    match next {
        Some(state) => TransitionResult::Success(state),
        None => TransitionResult::Rejected { from, event },
    }
}

/// Check if a transition from one state to another is generally valid
pub fn is_valid_transition(from: LinkState, to: LinkState) -> bool {
    use LinkState::*;

    match (from, to) {
        (a, b) if a == b => true,

        // Close and failures can always drop the link
        (_, Disconnected) => true,

        (Disconnected, Connecting) => true,
        (Connecting, Connected) => true,

        _ => false,
    }
}
