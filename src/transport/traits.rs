//! Transport trait abstraction for pluggable Bluetooth backends

use crate::error::LinkError;
use crate::transport::device::DeviceHandle;
use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use uuid::Uuid;

/// A duplex serial channel that can read and write bytes
#[async_trait]
pub trait TransportStream: AsyncRead + AsyncWrite + Send + Unpin + 'static {
    /// Close the channel and release the underlying socket
    async fn shutdown(&mut self) -> Result<(), LinkError>;
}

/// Platform Bluetooth stack: bonded-device lookup and serial-profile connect
#[async_trait]
pub trait TransportConnector: Send + Sync {
    /// The stream type this connector produces
    type Stream: TransportStream;

    /// Devices already paired with the local adapter
    async fn bonded_devices(&self) -> Result<Vec<DeviceHandle>, LinkError>;

    /// Open a serial channel to `device` for the given service class.
    /// Blocks until the handshake completes or fails.
    async fn connect(&self, device: &DeviceHandle, service: Uuid) -> Result<Self::Stream, LinkError>;

    /// Whether the caller currently holds connect authorization.
    /// Must answer without blocking.
    fn connect_permitted(&self) -> bool {
        true
    }

    /// Human-readable name for this transport
    fn name(&self) -> &'static str;
}
