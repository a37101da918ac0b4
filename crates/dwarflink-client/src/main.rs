//! DwarfLink client application entry point.
//!
//! Wires together discovery, the device connection, and the message
//! dispatcher, then runs the Tokio async event loop.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ load_config()            -- TOML config with first-run defaults
//!  └─ scan:    DiscoveryEngine -- bounded subnet sweep, prints devices
//!  └─ connect: ConnectionManager::connect()
//!       └─ event loop
//!            ├─ MessageReceived -> MessageDispatcher -> per-module channels
//!            ├─ Disconnected    -> exit
//!            └─ Ctrl-C          -> disconnect() and exit
//! ```

use std::net::IpAddr;

use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use dwarflink_client::application::{camera, MessageDispatcher};
use dwarflink_client::infrastructure::{
    storage, ConnectionConfig, ConnectionEvent, ConnectionManager, DiscoveryConfig,
    DiscoveryEngine, DiscoveryEvent,
};
use dwarflink_core::protocol::modules::ModuleId;

#[derive(Parser)]
#[command(name = "dwarflink", about = "Control client for DWARF II smart telescopes", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sweep the LAN (or one subnet) for devices.
    Scan {
        /// Subnet prefix to sweep, e.g. "192.168.1".  All local subnets
        /// when omitted.
        #[arg(long)]
        subnet: Option<String>,
    },
    /// Connect to a device and print its traffic.
    Connect {
        /// Device IP address.  Falls back to the last connected address
        /// from the config file.
        #[arg(long, env = "DWARFLINK_DEVICE")]
        device: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = storage::load_config().unwrap_or_else(|e| {
        eprintln!("config unreadable ({e}), using defaults");
        storage::AppConfig::default()
    });

    // Initialise structured logging.  RUST_LOG wins over the config file.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.client.log_level.clone())),
        )
        .init();

    match cli.command {
        Command::Scan { subnet } => run_scan(&config, subnet.as_deref()).await,
        Command::Connect { device } => run_connect(config, device).await,
    }
}

/// Sweeps for devices and prints each one as it is found.
async fn run_scan(config: &storage::AppConfig, subnet: Option<&str>) -> anyhow::Result<()> {
    let (engine, mut events) = DiscoveryEngine::new(DiscoveryConfig {
        probe_port: config.device.discovery_port,
        ..Default::default()
    });
    engine.start_scan(subnet);

    let mut found = 0usize;
    while let Some(event) = events.recv().await {
        match event {
            DiscoveryEvent::DeviceFound(device) => {
                found += 1;
                let version = device.version.as_deref().unwrap_or("unknown");
                println!("{}  {}  (firmware {version})", device.address, device.name);
            }
            DiscoveryEvent::ScanProgress(percent) => {
                info!("scan {percent}%");
            }
            DiscoveryEvent::ScanFinished => break,
        }
    }

    info!("scan finished, {found} device(s) found");
    Ok(())
}

/// Connects to one device and runs the dispatch loop until the session ends.
async fn run_connect(
    mut config: storage::AppConfig,
    device: Option<String>,
) -> anyhow::Result<()> {
    let address = device
        .or_else(|| config.device.last_address.clone())
        .ok_or_else(|| anyhow::anyhow!("no device address given and none remembered; run a scan first"))?;
    let ip: IpAddr = address
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid device address {address:?}"))?;

    let (connection, mut events) = ConnectionManager::new(ConnectionConfig {
        control_port: config.device.control_port,
        keepalive_interval: std::time::Duration::from_secs(config.device.keepalive_secs),
    });
    connection.connect(ip).await?;

    // Remember the address for the next run.
    config.device.last_address = Some(address.clone());
    if let Err(e) = storage::save_config(&config) {
        warn!("could not persist config: {e}");
    }

    // ── Message fan-out ───────────────────────────────────────────────────────
    let mut dispatcher = MessageDispatcher::new();
    let mut tele_rx = dispatcher.register(ModuleId::CameraTele);
    let mut notify_rx = dispatcher.register(ModuleId::Notify);
    let mut unknown_rx = dispatcher.register_unrecognized();

    tokio::spawn(async move {
        while let Some(msg) = tele_rx.recv().await {
            let ok = camera::open_ack_is_success(&msg.payload);
            info!(cmd = msg.cmd, success = ok, "tele camera ack");
        }
    });
    tokio::spawn(async move {
        while let Some(msg) = notify_rx.recv().await {
            info!(cmd = msg.cmd, bytes = msg.payload.len(), "device notification");
        }
    });
    tokio::spawn(async move {
        while let Some(msg) = unknown_rx.recv().await {
            warn!(module = msg.module, cmd = msg.cmd, "message for unknown module");
        }
    });

    // ── Ctrl-C handler ────────────────────────────────────────────────────────
    let shutdown = connection.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            shutdown.disconnect().await;
        }
    });

    // ── Main event loop ───────────────────────────────────────────────────────
    while let Some(event) = events.recv().await {
        match event {
            ConnectionEvent::Connected { session_id } => {
                info!("session {session_id} established with {address}");
            }
            ConnectionEvent::MessageReceived {
                module,
                cmd,
                payload,
            } => {
                dispatcher.dispatch(module, cmd, payload);
            }
            ConnectionEvent::Error(message) => {
                error!("{message}");
            }
            ConnectionEvent::Disconnected => {
                info!("session ended");
                break;
            }
        }
    }

    Ok(())
}
