mod config;
mod connection;
mod error;
mod transport;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use config::{BluetoothMode, LinkConfig};
use connection::{ConnectionManager, LinkStatus, StatusReceiver};
use led_link_shared::{LedCommand, PayloadEncoding};
use std::io::Write;
use std::path::PathBuf;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::oneshot;
use transport::{RfcommConnector, TcpConnector, TransportConnector};

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "led-link", version, about = "Switch an Arduino LED over a Bluetooth serial link")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Transport to use
    #[arg(long, value_enum)]
    mode: Option<BluetoothMode>,

    /// Bonded device name to connect to (e.g. HC-05)
    #[arg(long)]
    target_name: Option<String>,

    /// Bonded device address to connect to; wins over --target-name
    #[arg(long)]
    target_address: Option<String>,

    /// Command payload encoding: raw-byte (0x01/0x00) or ascii ('1'/'0')
    #[arg(long)]
    encoding: Option<PayloadEncoding>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Command {
    /// List bonded devices
    Devices,
    /// Connect, switch the LED on, disconnect
    On,
    /// Connect, switch the LED off, disconnect
    Off,
    /// Interactive prompt (default)
    Repl,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let cli = Cli::parse();

    let mut config = LinkConfig::load(cli.config.as_deref())?;
    if let Some(mode) = cli.mode {
        config.mode = mode;
    }
    if let Some(name) = cli.target_name {
        config.target_name = Some(name);
    }
    if let Some(address) = cli.target_address {
        config.target_address = Some(address);
    }
    if let Some(encoding) = cli.encoding {
        config.encoding = encoding;
    }

    info!("LED link starting");
    info!("  Mode: {:?}", config.mode);
    info!("  Target: {}", config.target());

    let command = cli.command.unwrap_or(Command::Repl);
    match config.mode {
        BluetoothMode::Rfcomm => run(RfcommConnector::new(config.rfcomm()), &config, command).await,
        BluetoothMode::TcpSimulation => {
            let connector = TcpConnector::new(config.simulated_devices.clone());
            run(connector, &config, command).await
        }
    }
}

async fn run<C: TransportConnector + 'static>(
    connector: C,
    config: &LinkConfig,
    command: Command,
) -> Result<()> {
    let (manager, status) = ConnectionManager::new(connector, config.connection());
    info!("  Transport: {}", manager.transport_name());
    info!("  Encoding: {}", manager.config().encoding);

    match command {
        Command::Devices => list_devices(&manager).await,
        Command::On => switch_once(&manager, LedCommand::On).await,
        Command::Off => switch_once(&manager, LedCommand::Off).await,
        Command::Repl => {
            let input = BufReader::new(tokio::io::stdin());
            repl(manager, status, input, std::io::stdout()).await?;
            Ok(())
        }
    }
}

async fn list_devices<C: TransportConnector>(manager: &ConnectionManager<C>) -> Result<()> {
    let devices = manager
        .list_bonded_devices()
        .await
        .context("listing bonded devices")?;

    if devices.is_empty() {
        println!("No paired devices found.");
    }
    for device in devices {
        println!("{}", device);
    }
    Ok(())
}

/// Connect, send one command, and always close again
async fn switch_once<C: TransportConnector>(
    manager: &ConnectionManager<C>,
    command: LedCommand,
) -> Result<()> {
    let device = manager.connect_target().await.context("connecting")?;
    let result = manager.send_command(command).await;
    manager.close().await;

    result.with_context(|| format!("sending {} to {}", command, device.display_name()))?;
    println!("LED {} on {}", command, device.display_name());
    Ok(())
}

/// A line typed at the interactive prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReplCommand {
    Connect,
    Send(LedCommand),
    Close,
    Devices,
    Status,
    Help,
    Quit,
}

fn parse_repl_command(line: &str) -> Option<ReplCommand> {
    let line = line.trim().to_ascii_lowercase();
    let command = match line.as_str() {
        "connect" | "c" => ReplCommand::Connect,
        "close" | "disconnect" => ReplCommand::Close,
        "devices" | "list" => ReplCommand::Devices,
        "status" => ReplCommand::Status,
        "help" | "?" => ReplCommand::Help,
        "quit" | "exit" | "q" => ReplCommand::Quit,
        other => ReplCommand::Send(other.parse().ok()?),
    };
    Some(command)
}

fn print_help() {
    println!("Commands: connect, on, off, close, devices, status, help, quit");
}

/// Write status updates until told to stop, then flush whatever is queued
async fn print_status<W: Write>(
    mut status: StatusReceiver,
    mut out: W,
    mut stop: oneshot::Receiver<()>,
) -> W {
    loop {
        tokio::select! {
            update = status.recv() => match update {
                Some(update) => write_status(&mut out, &update),
                None => break,
            },
            _ = &mut stop => {
                while let Ok(update) = status.try_recv() {
                    write_status(&mut out, &update);
                }
                break;
            }
        }
    }
    out
}

fn write_status<W: Write>(out: &mut W, update: &LinkStatus) {
    if let Err(e) = writeln!(out, "[status] {}", update).and_then(|_| out.flush()) {
        error!("Failed to print status: {}", e);
    }
}

/// Interactive front end: reads commands from `input` and writes status
/// updates to `status_out`, which is handed back once the link is closed.
async fn repl<C, R, W>(
    manager: ConnectionManager<C>,
    status: StatusReceiver,
    input: R,
    status_out: W,
) -> Result<W>
where
    C: TransportConnector + 'static,
    R: AsyncBufRead + Unpin,
    W: Write + Send + 'static,
{
    let (stop_tx, stop_rx) = oneshot::channel();
    let status_task = tokio::spawn(print_status(status, status_out, stop_rx));

    print_help();
    let mut lines = input.lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let Some(command) = parse_repl_command(&line) else {
            println!("Unknown command: {}", line.trim());
            print_help();
            continue;
        };

        match command {
            ReplCommand::Connect => {
                // Handshake runs on a worker so the prompt stays responsive
                let worker = manager.spawn_connect();
                tokio::spawn(async move {
                    match worker.await {
                        Ok(Ok(_)) => {}
                        Ok(Err(e)) => println!("Connect failed: {}", e),
                        Err(e) => error!("Connect task failed: {}", e),
                    }
                });
            }
            ReplCommand::Send(led) => match manager.send_command(led).await {
                Ok(()) => println!("LED {}", led),
                Err(e) => println!("Send failed: {}", e),
            },
            ReplCommand::Close => manager.close().await,
            ReplCommand::Devices => {
                if let Err(e) = list_devices(&manager).await {
                    println!("{:#}", e);
                }
            }
            ReplCommand::Status => match manager.connected_device().await {
                Some(device) => println!("Connected to {}", device),
                None => println!("{}", manager.state().await),
            },
            ReplCommand::Help => print_help(),
            ReplCommand::Quit => break,
        }
    }

    // close() has queued its final update by the time it returns
    manager.close().await;
    drop(manager);
    let _ = stop_tx.send(());
    let status_out = status_task.await.context("status printer")?;
    Ok(status_out)
}
