//! RFCOMM transport implementation for Bluetooth Classic serial links

use crate::error::LinkError;
use crate::transport::device::DeviceHandle;
use crate::transport::traits::{TransportConnector, TransportStream};
use async_trait::async_trait;
use bluer::rfcomm::{Profile, ReqError, Role, Stream as RfcommStream};
use bluer::{Adapter, Address, ErrorKind, Session};
use futures::StreamExt;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tracing::{debug, info};
use uuid::Uuid;

/// RFCOMM stream wrapper implementing TransportStream
pub struct RfcommTransportStream {
    inner: RfcommStream,
    peer_addr: Address,
}

impl RfcommTransportStream {
    /// Create a new RFCOMM transport stream
    pub fn new(stream: RfcommStream, peer_addr: Address) -> Self {
        Self {
            inner: stream,
            peer_addr,
        }
    }
}

impl AsyncRead for RfcommTransportStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for RfcommTransportStream {
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
impl TransportStream for RfcommTransportStream {
    async fn shutdown(&mut self) -> Result<(), LinkError> {
        debug!("[BT] Closing RFCOMM channel to {}", self.peer_addr);
        tokio::io::AsyncWriteExt::shutdown(&mut self.inner)
            .await
            .map_err(LinkError::from_channel_io)
    }
}

/// Configuration for RFCOMM connector
#[derive(Debug, Clone)]
pub struct RfcommConfig {
    /// Adapter to use (e.g. "hci0"); the default adapter when unset
    pub adapter_name: Option<String>,
    /// Name under which the client profile is registered with BlueZ
    pub profile_name: String,
}

impl Default for RfcommConfig {
    fn default() -> Self {
        Self {
            adapter_name: None,
            profile_name: "LED Link Serial Port".into(),
        }
    }
}

/// RFCOMM connector backed by BlueZ
pub struct RfcommConnector {
    config: RfcommConfig,
}

impl RfcommConnector {
    /// Create a new RFCOMM connector
    pub fn new(config: RfcommConfig) -> Self {
        Self { config }
    }

    /// Open a session and get a powered adapter
    async fn adapter(&self) -> Result<(Session, Adapter), LinkError> {
        let session = Session::new().await.map_err(map_session_error)?;
        let adapter = match &self.config.adapter_name {
            Some(name) => session.adapter(name),
            None => session.default_adapter().await,
        }
        .map_err(|e| LinkError::AdapterUnavailable(e.to_string()))?;

        if !adapter.is_powered().await.map_err(map_adapter_error)? {
            return Err(LinkError::AdapterUnavailable(format!(
                "{} is powered off",
                adapter.name()
            )));
        }

        Ok((session, adapter))
    }
}

#[async_trait]
impl TransportConnector for RfcommConnector {
    type Stream = RfcommTransportStream;

    async fn bonded_devices(&self) -> Result<Vec<DeviceHandle>, LinkError> {
        let (_session, adapter) = self.adapter().await?;

        let mut devices = Vec::new();
        for addr in adapter.device_addresses().await.map_err(map_adapter_error)? {
            let device = adapter.device(addr).map_err(map_adapter_error)?;
            if !device.is_paired().await.unwrap_or(false) {
                continue;
            }
            let name = device.name().await.ok().flatten();
            devices.push(DeviceHandle::new(addr.to_string(), name));
        }

        debug!("[BT] {} bonded device(s) on {}", devices.len(), adapter.name());
        Ok(devices)
    }

    async fn connect(&self, device: &DeviceHandle, service: Uuid) -> Result<Self::Stream, LinkError> {
        let addr: Address = device.address.parse().map_err(|_| {
            LinkError::DeviceNotFound(format!("invalid Bluetooth address {}", device.address))
        })?;

        let (session, adapter) = self.adapter().await?;

        // Client-role profile: BlueZ looks up the channel via SDP and hands
        // the connected socket back through the profile handle.
        let profile = Profile {
            uuid: service,
            name: Some(self.config.profile_name.clone()),
            role: Some(Role::Client),
            require_authentication: Some(false),
            require_authorization: Some(false),
            auto_connect: Some(false),
            ..Default::default()
        };
        let handle = session
            .register_profile(profile)
            .await
            .map_err(map_connect_error)?;
        tokio::pin!(handle);

        let bt_device = adapter.device(addr).map_err(map_connect_error)?;
        info!("[BT] Connecting to {} (service {})", device, service);

        let connect = bt_device.connect_profile(&service);
        tokio::pin!(connect);
        let mut profile_connected = false;

        loop {
            tokio::select! {
                result = &mut connect, if !profile_connected => {
                    result.map_err(map_connect_error)?;
                    profile_connected = true;
                }
                request = handle.next() => {
                    let request = request.ok_or_else(|| {
                        LinkError::Unknown("profile registration closed".into())
                    })?;
                    if request.device() != addr {
                        debug!("[BT] Ignoring connection from {}", request.device());
                        request.reject(ReqError::Rejected);
                        continue;
                    }
                    let stream = request.accept().map_err(map_connect_error)?;
                    info!("[BT] Connected to {}", device);
                    return Ok(RfcommTransportStream::new(stream, addr));
                }
            }
        }
    }

    fn name(&self) -> &'static str {
        "Bluetooth"
    }
}

fn is_permission_error(kind: &ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::NotAuthorized | ErrorKind::NotPermitted | ErrorKind::AuthenticationRejected
    )
}

fn map_session_error(err: bluer::Error) -> LinkError {
    if is_permission_error(&err.kind) {
        LinkError::PermissionDenied
    } else {
        LinkError::AdapterUnavailable(format!("bluetoothd not reachable: {}", err))
    }
}

fn map_adapter_error(err: bluer::Error) -> LinkError {
    classify_adapter_error(&err.kind, err.to_string())
}

fn map_connect_error(err: bluer::Error) -> LinkError {
    classify_connect_error(&err.kind, err.to_string())
}

fn classify_adapter_error(kind: &ErrorKind, message: String) -> LinkError {
    if is_permission_error(kind) {
        return LinkError::PermissionDenied;
    }
    match kind {
        ErrorKind::NotReady | ErrorKind::NotAvailable => LinkError::AdapterUnavailable(message),
        _ => LinkError::Unknown(message),
    }
}

fn classify_connect_error(kind: &ErrorKind, message: String) -> LinkError {
    if is_permission_error(kind) {
        return LinkError::PermissionDenied;
    }
    match kind {
        ErrorKind::NotReady => LinkError::AdapterUnavailable(message),
        _ => LinkError::DeviceUnreachable(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RfcommConfig::default();
        assert!(config.adapter_name.is_none());
        assert_eq!(config.profile_name, "LED Link Serial Port");
    }

    #[test]
    fn test_connector_name() {
        let connector = RfcommConnector::new(RfcommConfig::default());
        assert_eq!(connector.name(), "Bluetooth");
        assert!(connector.connect_permitted());
    }

    #[test]
    fn test_error_mapping() {
        assert_eq!(
            classify_connect_error(&ErrorKind::NotAuthorized, "Operation Not Authorized".into()),
            LinkError::PermissionDenied
        );
        assert!(matches!(
            classify_connect_error(&ErrorKind::Failed, "br-connection-page-timeout".into()),
            LinkError::DeviceUnreachable(_)
        ));
        assert!(matches!(
            classify_adapter_error(&ErrorKind::NotReady, "Resource Not Ready".into()),
            LinkError::AdapterUnavailable(_)
        ));
        assert!(matches!(
            classify_adapter_error(&ErrorKind::Failed, "boom".into()),
            LinkError::Unknown(_)
        ));
    }
}
