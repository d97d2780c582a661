//! LED Link Shared Types
//!
//! This crate provides the wire contract and connection state table shared
//! between the controller and the peer simulator.

pub mod command;
pub mod state_machine;

pub use command::{CodecError, CommandDecoder, LedCommand, PayloadEncoding, SPP_UUID};
pub use state_machine::{LinkEvent, LinkState, TransitionResult};

/// Timing defaults for the serial link
pub mod timing {
    /// Upper bound on the RFCOMM handshake, on top of whatever the OS enforces
    pub const CONNECT_TIMEOUT_MS: u64 = 12_000;

    /// A single command write must complete within this bound
    pub const SEND_TIMEOUT_MS: u64 = 2_000;

    /// Best-effort socket shutdown bound
    pub const CLOSE_TIMEOUT_MS: u64 = 1_000;
}
