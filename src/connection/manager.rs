//! Connection manager owning the serial link to a single bonded peer

use crate::error::LinkError;
use crate::transport::{DeviceHandle, DeviceSelector, TransportConnector, TransportStream};
use led_link_shared::command::{self, LedCommand, PayloadEncoding, SPP_UUID};
use led_link_shared::state_machine::{is_valid_transition, transition, LinkEvent, LinkState, TransitionResult};
use led_link_shared::timing;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Status updates for whatever front end drives the manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkStatus {
    Disconnected,
    /// Handshake in progress with the named device
    Connecting(String),
    /// Channel open to the named device
    Connected(String),
    /// Human-readable failure; always followed by the resulting state
    Error(String),
}

impl fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkStatus::Disconnected => write!(f, "Disconnected"),
            LinkStatus::Connecting(name) => write!(f, "Connecting to: {}", name),
            LinkStatus::Connected(name) => write!(f, "Connected to: {}", name),
            LinkStatus::Error(message) => write!(f, "Error: {}", message),
        }
    }
}

/// Receiving half of the status channel
pub type StatusReceiver = mpsc::UnboundedReceiver<LinkStatus>;

/// Configuration for connection manager
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Which bonded device `connect_target` picks
    pub target: DeviceSelector,
    /// Service class to open on the peer
    pub service_uuid: Uuid,
    /// Wire representation of LED commands
    pub encoding: PayloadEncoding,
    /// Upper bound on the handshake
    pub connect_timeout: Duration,
    /// Upper bound on a single write
    pub send_timeout: Duration,
    /// Upper bound on socket shutdown
    pub close_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            target: DeviceSelector::FirstBonded,
            service_uuid: SPP_UUID,
            encoding: PayloadEncoding::default(),
            connect_timeout: Duration::from_millis(timing::CONNECT_TIMEOUT_MS),
            send_timeout: Duration::from_millis(timing::SEND_TIMEOUT_MS),
            close_timeout: Duration::from_millis(timing::CLOSE_TIMEOUT_MS),
        }
    }
}

/// The channel slot. A stream only exists in `Connected`.
enum Slot<S> {
    Disconnected,
    Connecting {
        device: DeviceHandle,
        attempt: u64,
        /// Dropping or firing this aborts the handshake
        cancel: oneshot::Sender<()>,
    },
    Connected {
        device: DeviceHandle,
        stream: S,
    },
}

impl<S> Slot<S> {
    fn state(&self) -> LinkState {
        match self {
            Slot::Disconnected => LinkState::Disconnected,
            Slot::Connecting { .. } => LinkState::Connecting,
            Slot::Connected { .. } => LinkState::Connected,
        }
    }

    /// Why a new connect request can't proceed
    fn busy_error(&self) -> LinkError {
        match self {
            Slot::Connected { device, .. } => {
                LinkError::AlreadyConnected(device.display_name().to_string())
            }
            _ => LinkError::ConnectInProgress,
        }
    }
}

struct Inner<S> {
    slot: Slot<S>,
    next_attempt: u64,
}

impl<S> Inner<S> {
    /// Replace the slot, returning the previous one
    fn replace(&mut self, slot: Slot<S>) -> Slot<S> {
        let (from, to) = (self.slot.state(), slot.state());
        debug_assert!(is_valid_transition(from, to), "{} -> {}", from, to);
        if from != to {
            debug!("[LINK] {} -> {}", from, to);
        }
        std::mem::replace(&mut self.slot, slot)
    }
}

/// Resets an abandoned handshake.
///
/// If the future driving `connect` is dropped mid-handshake (caller-side
/// timeout, `select!`, aborted worker), the slot would otherwise stay in
/// `Connecting` and reject every retry.
struct AttemptGuard<S: Send + 'static> {
    inner: Arc<Mutex<Inner<S>>>,
    status_tx: mpsc::UnboundedSender<LinkStatus>,
    attempt: u64,
    armed: bool,
}

impl<S: Send + 'static> AttemptGuard<S> {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl<S: Send + 'static> Drop for AttemptGuard<S> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        let attempt = self.attempt;
        let status_tx = self.status_tx.clone();
        let reset = move |inner: &mut Inner<S>| {
            let abandoned =
                matches!(&inner.slot, Slot::Connecting { attempt: a, .. } if *a == attempt);
            if abandoned {
                info!("[LINK] Connect attempt {} abandoned", attempt);
                inner.replace(Slot::Disconnected);
                let _ = status_tx.send(LinkStatus::Disconnected);
            }
        };

        match self.inner.try_lock() {
            Ok(mut inner) => reset(&mut inner),
            Err(_) => {
                // Lock is busy; finish the reset once it frees up
                if let Ok(runtime) = tokio::runtime::Handle::try_current() {
                    let inner = self.inner.clone();
                    runtime.spawn(async move {
                        let mut inner = inner.lock().await;
                        reset(&mut inner);
                    });
                } else {
                    warn!("[LINK] Connect attempt {} abandoned outside a runtime", attempt);
                }
            }
        }
    }
}

/// Owns the connection state and the open channel.
///
/// All mutation goes through `connect`, `send` and `close`. Clones share
/// the same underlying link, so one clone can run a handshake on a worker
/// task while another closes it.
pub struct ConnectionManager<C: TransportConnector> {
    connector: Arc<C>,
    config: ConnectionConfig,
    inner: Arc<Mutex<Inner<C::Stream>>>,
    status_tx: mpsc::UnboundedSender<LinkStatus>,
}

impl<C: TransportConnector> Clone for ConnectionManager<C> {
    fn clone(&self) -> Self {
        Self {
            connector: self.connector.clone(),
            config: self.config.clone(),
            inner: self.inner.clone(),
            status_tx: self.status_tx.clone(),
        }
    }
}

impl<C: TransportConnector> ConnectionManager<C> {
    /// Create a new connection manager in the `Disconnected` state
    pub fn new(connector: C, config: ConnectionConfig) -> (Self, StatusReceiver) {
        let (status_tx, status_rx) = mpsc::unbounded_channel();

        let manager = Self {
            connector: Arc::new(connector),
            config,
            inner: Arc::new(Mutex::new(Inner {
                slot: Slot::Disconnected,
                next_attempt: 0,
            })),
            status_tx,
        };

        (manager, status_rx)
    }

    /// Get the configuration
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Name of the underlying transport
    pub fn transport_name(&self) -> &'static str {
        self.connector.name()
    }

    /// Current connection state
    pub async fn state(&self) -> LinkState {
        self.inner.lock().await.slot.state()
    }

    /// Device the channel is open to, if any
    pub async fn connected_device(&self) -> Option<DeviceHandle> {
        match &self.inner.lock().await.slot {
            Slot::Connected { device, .. } => Some(device.clone()),
            _ => None,
        }
    }

    /// Devices already paired with the local adapter
    pub async fn list_bonded_devices(&self) -> Result<Vec<DeviceHandle>, LinkError> {
        self.ensure_permitted()?;
        self.connector.bonded_devices().await
    }

    /// Look up the configured target among the bonded devices and connect to it
    pub async fn connect_target(&self) -> Result<DeviceHandle, LinkError> {
        self.ensure_permitted()?;

        // Don't bother the Bluetooth stack if the request will be rejected anyway
        {
            let inner = self.inner.lock().await;
            if let TransitionResult::Rejected { .. } =
                transition(inner.slot.state(), LinkEvent::ConnectRequested)
            {
                return Err(inner.slot.busy_error());
            }
        }

        let devices = match self.list_bonded_devices().await {
            Ok(devices) => devices,
            Err(e) => {
                error!("[LINK] Failed to list bonded devices: {}", e);
                self.publish(LinkStatus::Error(e.to_string()));
                return Err(e);
            }
        };

        let device = match self.config.target.select(&devices) {
            Some(device) => device.clone(),
            None => {
                let message = if devices.is_empty() {
                    "no paired device found".to_string()
                } else {
                    format!("no paired device matches {}", self.config.target)
                };
                warn!("[LINK] {}", message);
                self.publish(LinkStatus::Error(message.clone()));
                return Err(LinkError::DeviceNotFound(message));
            }
        };

        self.connect(device.clone()).await?;
        Ok(device)
    }

    /// Open a serial channel to `device`.
    ///
    /// Blocks for the whole handshake, bounded by the configured connect
    /// timeout. Rejected without touching the transport while another
    /// attempt is in flight or a channel is already open.
    pub async fn connect(&self, device: DeviceHandle) -> Result<(), LinkError> {
        self.ensure_permitted()?;

        let (attempt, cancel_rx) = {
            let mut inner = self.inner.lock().await;
            if let TransitionResult::Rejected { from, .. } =
                transition(inner.slot.state(), LinkEvent::ConnectRequested)
            {
                info!("[LINK] Connect to {} rejected: link is {}", device, from);
                return Err(inner.slot.busy_error());
            }

            inner.next_attempt += 1;
            let attempt = inner.next_attempt;
            let (cancel_tx, cancel_rx) = oneshot::channel();
            inner.replace(Slot::Connecting {
                device: device.clone(),
                attempt,
                cancel: cancel_tx,
            });
            (attempt, cancel_rx)
        };
        let mut guard = AttemptGuard {
            inner: self.inner.clone(),
            status_tx: self.status_tx.clone(),
            attempt,
            armed: true,
        };

        let name = device.display_name().to_string();
        info!("[LINK] Connecting to {} via {}", device, self.connector.name());
        self.publish(LinkStatus::Connecting(name.clone()));

        let handshake = timeout(
            self.config.connect_timeout,
            self.connector.connect(&device, self.config.service_uuid),
        );

        let outcome = tokio::select! {
            result = handshake => match result {
                Ok(result) => result,
                Err(_) => Err(LinkError::DeviceUnreachable(format!(
                    "handshake timed out after {:?}",
                    self.config.connect_timeout
                ))),
            },
            _ = cancel_rx => Err(LinkError::Cancelled),
        };

        let mut inner = self.inner.lock().await;
        guard.disarm();
        let current = matches!(&inner.slot, Slot::Connecting { attempt: a, .. } if *a == attempt);

        match outcome {
            Ok(stream) if current => {
                let event = transition(LinkState::Connecting, LinkEvent::HandshakeSucceeded);
                debug_assert!(event.is_success());
                inner.replace(Slot::Connected {
                    device: device.clone(),
                    stream,
                });
                drop(inner);

                info!("[LINK] Connected to {}", device);
                self.publish(LinkStatus::Connected(name));
                Ok(())
            }
            Ok(mut stream) => {
                // close() won the race against a handshake that just finished
                drop(inner);
                info!("[LINK] Handshake with {} finished after cancellation", device);
                self.shutdown_stream(&mut stream).await;
                Err(LinkError::Cancelled)
            }
            Err(e) => {
                if current {
                    inner.replace(Slot::Disconnected);
                }
                drop(inner);

                if e == LinkError::Cancelled {
                    info!("[LINK] Connect to {} cancelled", device);
                } else {
                    error!("[LINK] Connect to {} failed: {}", device, e);
                    if current {
                        self.publish(LinkStatus::Error(e.to_string()));
                        self.publish(LinkStatus::Disconnected);
                    }
                }
                Err(e)
            }
        }
    }

    /// Spawn `connect_target` on a worker task so the caller never blocks
    pub fn spawn_connect(&self) -> JoinHandle<Result<DeviceHandle, LinkError>>
    where
        C: 'static,
    {
        let manager = self.clone();
        tokio::spawn(async move { manager.connect_target().await })
    }

    /// Write `payload` to the open channel.
    ///
    /// Writes are serialized. A failed or stalled write drops the link and
    /// releases the channel.
    pub async fn send(&self, payload: &[u8]) -> Result<(), LinkError> {
        self.ensure_permitted()?;

        let mut inner = self.inner.lock().await;
        let stream = match &mut inner.slot {
            Slot::Connected { stream, .. } => stream,
            _ => return Err(LinkError::NotConnected),
        };

        let write = async {
            stream.write_all(payload).await?;
            stream.flush().await
        };
        let result = match timeout(self.config.send_timeout, write).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(LinkError::from_channel_io(e)),
            Err(_) => Err(LinkError::IoFailure(format!(
                "write stalled for more than {:?}",
                self.config.send_timeout
            ))),
        };

        let err = match result {
            Ok(()) => {
                debug!("[LINK] Sent {} byte(s)", payload.len());
                return Ok(());
            }
            Err(e) => e,
        };

        debug_assert!(transition(LinkState::Connected, LinkEvent::IoFailure).is_success());
        let previous = inner.replace(Slot::Disconnected);
        drop(inner);

        if let Slot::Connected { device, mut stream } = previous {
            error!("[LINK] Write to {} failed: {}", device, err);
            self.shutdown_stream(&mut stream).await;
        }
        self.publish(LinkStatus::Error(err.to_string()));
        self.publish(LinkStatus::Disconnected);
        Err(err)
    }

    /// Encode and send an LED command with the configured encoding
    pub async fn send_command(&self, command: LedCommand) -> Result<(), LinkError> {
        let payload = command::encode(command, self.config.encoding);
        self.send(&payload).await?;
        info!("[LINK] Sent {} (0x{:02x})", command, payload[0]);
        Ok(())
    }

    /// Release the channel, or abort an in-flight handshake.
    ///
    /// Idempotent: closing an already closed link does nothing.
    pub async fn close(&self) {
        let previous = {
            let mut inner = self.inner.lock().await;
            if let Slot::Disconnected = inner.slot {
                debug!("[LINK] Close requested on a closed link");
                return;
            }
            inner.replace(Slot::Disconnected)
        };

        match previous {
            Slot::Disconnected => {}
            Slot::Connecting { device, cancel, .. } => {
                info!("[LINK] Cancelling connect to {}", device);
                let _ = cancel.send(());
            }
            Slot::Connected { device, mut stream } => {
                info!("[LINK] Closing channel to {}", device);
                self.shutdown_stream(&mut stream).await;
            }
        }

        self.publish(LinkStatus::Disconnected);
    }

    fn ensure_permitted(&self) -> Result<(), LinkError> {
        if self.connector.connect_permitted() {
            Ok(())
        } else {
            warn!("[LINK] Bluetooth connect permission not granted");
            Err(LinkError::PermissionDenied)
        }
    }

    /// Best-effort shutdown; the stream is dropped by the caller either way
    async fn shutdown_stream(&self, stream: &mut C::Stream) {
        match timeout(self.config.close_timeout, TransportStream::shutdown(stream)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("[LINK] Error closing channel: {}", e),
            Err(_) => warn!(
                "[LINK] Channel shutdown timed out after {:?}",
                self.config.close_timeout
            ),
        }
    }

    fn publish(&self, status: LinkStatus) {
        let _ = self.status_tx.send(status);
    }
}
