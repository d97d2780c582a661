//! TCP transport for developing against the peer simulator without a radio

use crate::error::LinkError;
use crate::transport::device::DeviceHandle;
use crate::transport::traits::{TransportConnector, TransportStream};
use async_trait::async_trait;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tracing::{debug, info};
use uuid::Uuid;

/// TCP stream wrapper implementing TransportStream
pub struct TcpTransportStream {
    inner: TcpStream,
}

impl TcpTransportStream {
    pub fn new(stream: TcpStream) -> Self {
        Self { inner: stream }
    }
}

impl AsyncRead for TcpTransportStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for TcpTransportStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

#[async_trait]
impl TransportStream for TcpTransportStream {
    async fn shutdown(&mut self) -> Result<(), LinkError> {
        tokio::io::AsyncWriteExt::shutdown(&mut self.inner)
            .await
            .map_err(LinkError::from_channel_io)
    }
}

/// Connector that treats a fixed list of `host:port` peers as bonded devices
pub struct TcpConnector {
    devices: Vec<DeviceHandle>,
}

impl TcpConnector {
    /// Create a connector over the simulated bonded set
    pub fn new(devices: Vec<DeviceHandle>) -> Self {
        Self { devices }
    }
}

#[async_trait]
impl TransportConnector for TcpConnector {
    type Stream = TcpTransportStream;

    async fn bonded_devices(&self) -> Result<Vec<DeviceHandle>, LinkError> {
        Ok(self.devices.clone())
    }

    async fn connect(&self, device: &DeviceHandle, service: Uuid) -> Result<Self::Stream, LinkError> {
        debug!("[SIM] Service {} is implied by the simulator port", service);
        info!("[SIM] Connecting to {}", device);

        let stream = TcpStream::connect(&device.address)
            .await
            .map_err(LinkError::from_connect_io)?;
        // Commands are single bytes; don't let Nagle hold them back
        stream.set_nodelay(true).map_err(LinkError::from_connect_io)?;

        Ok(TcpTransportStream::new(stream))
    }

    fn name(&self) -> &'static str {
        "TCP simulation"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use led_link_shared::SPP_UUID;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_bonded_devices_are_configured_list() {
        let connector = TcpConnector::new(vec![DeviceHandle::new(
            "127.0.0.1:9000",
            Some("HC-05".into()),
        )]);
        let devices = connector.bonded_devices().await.unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].display_name(), "HC-05");
        assert_eq!(connector.name(), "TCP simulation");
    }

    #[tokio::test]
    async fn test_connect_and_write() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let accept = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1];
            socket.read_exact(&mut buf).await.unwrap();
            buf[0]
        });

        let device = DeviceHandle::new(addr, Some("HC-05".into()));
        let connector = TcpConnector::new(vec![device.clone()]);
        let mut stream = connector.connect(&device, SPP_UUID).await.unwrap();
        tokio::io::AsyncWriteExt::write_all(&mut stream, &[0x01]).await.unwrap();
        stream.shutdown().await.unwrap();

        assert_eq!(accept.await.unwrap(), 0x01);
    }

    #[tokio::test]
    async fn test_connect_refused_is_unreachable() {
        // Bind then drop to get a port nobody listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let device = DeviceHandle::new(addr, None);
        let connector = TcpConnector::new(vec![device.clone()]);
        let result = connector.connect(&device, SPP_UUID).await;
        assert!(matches!(result, Err(LinkError::DeviceUnreachable(_))));
    }
}
