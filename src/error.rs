//! Error taxonomy for the serial link
//!
//! Every failure is recovered at the connection manager boundary and handed
//! back to the caller as one of these variants; none of them is fatal.

use thiserror::Error;

/// Errors surfaced by the connection manager and the transports beneath it
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    #[error("Bluetooth connect permission not granted")]
    PermissionDenied,

    #[error("Bluetooth adapter unavailable: {0}")]
    AdapterUnavailable(String),

    #[error("{0}")]
    DeviceNotFound(String),

    #[error("Device unreachable: {0}")]
    DeviceUnreachable(String),

    #[error("I/O failure: {0}")]
    IoFailure(String),

    #[error("Not connected")]
    NotConnected,

    #[error("Already connected to {0}")]
    AlreadyConnected(String),

    #[error("A connection attempt is already in progress")]
    ConnectInProgress,

    #[error("Connection attempt cancelled")]
    Cancelled,

    #[error("Unexpected error: {0}")]
    Unknown(String),
}

impl LinkError {
    /// Map an I/O error raised while opening a channel
    pub fn from_connect_io(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::PermissionDenied => LinkError::PermissionDenied,
            _ => LinkError::DeviceUnreachable(err.to_string()),
        }
    }

    /// Map an I/O error raised on an open channel
    pub fn from_channel_io(err: std::io::Error) -> Self {
        LinkError::IoFailure(err.to_string())
    }
}
