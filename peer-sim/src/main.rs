//! Peer simulator
//!
//! Accepts serial-profile connections the way an HC-05 wired to an Arduino
//! does and logs the LED state each command byte would produce.

use anyhow::{Context, Result};
use bluer::rfcomm::{Profile, Role};
use clap::{Parser, ValueEnum};
use futures::StreamExt;
use led_link_shared::{CommandDecoder, LedCommand, PayloadEncoding, SPP_UUID};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SimMode {
    /// Register a Serial Port Profile server with BlueZ
    Rfcomm,
    /// Listen on a TCP address
    Tcp,
}

#[derive(Parser, Debug)]
#[command(name = "peer-sim", about = "Simulated Arduino LED peer")]
struct Args {
    #[arg(long, value_enum, default_value_t = SimMode::Tcp)]
    mode: SimMode,

    /// TCP listen address
    #[arg(long, default_value = "127.0.0.1:9000")]
    listen: String,

    /// Encoding the simulated firmware expects
    #[arg(long, default_value = "raw-byte")]
    encoding: PayloadEncoding,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let args = Args::parse();
    info!("[SIM] Expecting {} payloads", args.encoding);

    match args.mode {
        SimMode::Tcp => serve_tcp(&args.listen, args.encoding).await,
        SimMode::Rfcomm => serve_rfcomm(args.encoding).await,
    }
}

async fn serve_tcp(listen: &str, encoding: PayloadEncoding) -> Result<()> {
    let listener = TcpListener::bind(listen)
        .await
        .with_context(|| format!("binding {}", listen))?;
    info!("[SIM] Listening on {}", listener.local_addr()?);

    loop {
        let (socket, addr) = listener.accept().await?;
        tokio::spawn(async move {
            if let Err(e) = serve_peer(socket, addr.to_string(), encoding).await {
                warn!("[SIM] Session with {} ended: {}", addr, e);
            }
        });
    }
}

async fn serve_rfcomm(encoding: PayloadEncoding) -> Result<()> {
    let session = bluer::Session::new().await?;
    let adapter = session.default_adapter().await?;
    adapter.set_powered(true).await?;

    let profile = Profile {
        uuid: SPP_UUID,
        name: Some("LED Peer Simulator".into()),
        role: Some(Role::Server),
        require_authentication: Some(false),
        require_authorization: Some(false),
        ..Default::default()
    };
    let handle = session.register_profile(profile).await?;
    tokio::pin!(handle);
    info!("[SIM] Serial Port Profile registered on {} ({})", adapter.name(), adapter.address().await?);

    while let Some(request) = handle.next().await {
        let peer = request.device();
        match request.accept() {
            Ok(stream) => {
                tokio::spawn(async move {
                    if let Err(e) = serve_peer(stream, peer.to_string(), encoding).await {
                        warn!("[SIM] Session with {} ended: {}", peer, e);
                    }
                });
            }
            Err(e) => warn!("[SIM] Failed to accept {}: {}", peer, e),
        }
    }

    Ok(())
}

/// Read command bytes until the controller hangs up.
/// Returns the last LED command applied.
async fn serve_peer<S: AsyncRead + Unpin>(
    mut stream: S,
    peer: String,
    encoding: PayloadEncoding,
) -> Result<Option<LedCommand>> {
    info!("[SIM] {} connected", peer);

    let mut decoder = CommandDecoder::new(encoding);
    let mut buf = vec![0u8; 64];
    let mut led = None;

    loop {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            info!("[SIM] {} disconnected", peer);
            return Ok(led);
        }

        for result in decoder.feed(&buf[..n]) {
            match result {
                Ok(command) => {
                    info!("[SIM] LED {}", command);
                    led = Some(command);
                }
                Err(e) => warn!("[SIM] Ignoring byte from {}: {}", peer, e),
            }
        }
    }
}
