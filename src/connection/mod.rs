//! Connection management for the serial link to the LED peer
//!
//! This module handles:
//! - Bonded device lookup and target selection
//! - A bounded, cancellable RFCOMM handshake
//! - Serialized command writes
//! - Releasing the channel on close or I/O failure

mod manager;

pub use manager::{ConnectionConfig, ConnectionManager, LinkStatus, StatusReceiver};
