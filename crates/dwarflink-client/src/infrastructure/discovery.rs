//! LAN device discovery.
//!
//! Devices expose a small HTTP service on a fixed port alongside the control
//! channel.  The discovery engine sweeps candidate addresses with
//! bounded-concurrency TCP probes; any host that accepts the probe is then
//! asked for `/getdeviceinfo` to pick up its name and firmware version.  A
//! host that accepts TCP but cannot answer the info request is still
//! reported, with a placeholder name, so the user can try connecting anyway.
//!
//! One scan runs at a time.  The engine emits [`DiscoveryEvent::ScanProgress`]
//! as probes resolve and exactly one [`DiscoveryEvent::ScanFinished`] when the
//! scan completes, is cancelled, or had nothing to do.

use std::collections::VecDeque;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Configuration for a subnet sweep.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// TCP port probed on every candidate host (the device HTTP service).
    pub probe_port: u16,
    /// How long to wait for a TCP connect before writing a host off.
    pub probe_timeout: Duration,
    /// How long to wait for the device-info HTTP request.
    pub info_timeout: Duration,
    /// Upper bound on simultaneously outstanding probes.
    pub max_concurrent: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            probe_port: 8082,
            probe_timeout: Duration::from_secs(2),
            info_timeout: Duration::from_millis(1500),
            max_concurrent: 40,
        }
    }
}

/// A device found during a sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredDevice {
    pub address: Ipv4Addr,
    pub name: String,
    pub version: Option<String>,
}

/// Events emitted while a scan runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryEvent {
    DeviceFound(DiscoveredDevice),
    /// Percentage of candidate hosts resolved so far (0–100).
    ScanProgress(u8),
    /// Emitted exactly once per scan, whether it completed or was stopped.
    ScanFinished,
}

/// JSON body of the device's `/getdeviceinfo` endpoint.
#[derive(Debug, Deserialize)]
struct DeviceInfo {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    version: Option<String>,
}

/// Bounded-concurrency subnet scanner.
pub struct DiscoveryEngine {
    config: DiscoveryConfig,
    scanning: Arc<AtomicBool>,
    /// Cancellation handle for the scan in flight.  One `Notify` per scan:
    /// a permit stored by a late or repeated `stop_scan` must die with the
    /// scan it targeted instead of instantly cancelling the next one.
    cancel: std::sync::Mutex<Option<Arc<Notify>>>,
    event_tx: mpsc::Sender<DiscoveryEvent>,
}

impl DiscoveryEngine {
    /// Creates the engine and its event receiver.
    pub fn new(config: DiscoveryConfig) -> (Self, mpsc::Receiver<DiscoveryEvent>) {
        let (tx, rx) = mpsc::channel(256);
        let engine = Self {
            config,
            scanning: Arc::new(AtomicBool::new(false)),
            cancel: std::sync::Mutex::new(None),
            event_tx: tx,
        };
        (engine, rx)
    }

    /// Whether a sweep is currently in flight.
    pub fn is_scanning(&self) -> bool {
        self.scanning.load(Ordering::SeqCst)
    }

    /// Starts a sweep of `prefix` (e.g. `"192.168.1"`), or of every local
    /// IPv4 subnet when `prefix` is `None`.  Ignored if a scan is already
    /// running.
    pub fn start_scan(&self, prefix: Option<&str>) {
        let candidates = match prefix {
            Some(p) => hosts_for_prefix(p),
            None => local_subnets()
                .into_iter()
                .flat_map(|net| hosts_for_octets(net))
                .collect(),
        };
        self.start_scan_addresses(candidates);
    }

    /// Starts a sweep of an explicit address list.
    pub fn start_scan_addresses(&self, candidates: Vec<Ipv4Addr>) {
        if self.scanning.swap(true, Ordering::SeqCst) {
            debug!("scan request ignored: already scanning");
            return;
        }

        let cancel = Arc::new(Notify::new());
        if let Ok(mut slot) = self.cancel.lock() {
            *slot = Some(Arc::clone(&cancel));
        }

        let config = self.config.clone();
        let scanning = Arc::clone(&self.scanning);
        let event_tx = self.event_tx.clone();

        tokio::spawn(async move {
            run_scan(config, candidates, cancel, event_tx).await;
            scanning.store(false, Ordering::SeqCst);
        });
    }

    /// Requests cancellation of the running scan.  The `ScanFinished` event
    /// still arrives, once, after in-flight probes are dropped.  A no-op
    /// when idle, and repeated calls cannot affect a later scan.
    pub fn stop_scan(&self) {
        if self.is_scanning() {
            info!("stopping scan");
            if let Ok(slot) = self.cancel.lock() {
                if let Some(cancel) = slot.as_ref() {
                    cancel.notify_one();
                }
            }
        }
    }
}

/// Drives one sweep to completion or cancellation.
async fn run_scan(
    config: DiscoveryConfig,
    candidates: Vec<Ipv4Addr>,
    cancel: Arc<Notify>,
    event_tx: mpsc::Sender<DiscoveryEvent>,
) {
    let total = candidates.len();
    info!(total, "scan started");

    if total == 0 {
        let _ = event_tx.send(DiscoveryEvent::ScanFinished).await;
        return;
    }

    let http = reqwest::Client::builder()
        .timeout(config.info_timeout)
        .build();
    let http = match http {
        Ok(c) => c,
        Err(e) => {
            warn!("discovery HTTP client unavailable: {e}");
            let _ = event_tx.send(DiscoveryEvent::ScanFinished).await;
            return;
        }
    };

    let mut queue: VecDeque<Ipv4Addr> = candidates.into();
    let mut probes = JoinSet::new();
    let mut resolved = 0usize;

    // Prime up to the concurrency cap; each completion refills one slot.
    for _ in 0..config.max_concurrent.max(1) {
        let Some(addr) = queue.pop_front() else { break };
        probes.spawn(probe_host(addr, config.clone(), http.clone()));
    }

    loop {
        tokio::select! {
            biased;

            _ = cancel.notified() => {
                // Dropping the JoinSet aborts outstanding probes.
                info!(resolved, total, "scan cancelled");
                break;
            }

            joined = probes.join_next() => {
                let Some(joined) = joined else { break };
                resolved += 1;

                match joined {
                    Ok(Some(device)) => {
                        info!(address = %device.address, name = %device.name, "device found");
                        let _ = event_tx.send(DiscoveryEvent::DeviceFound(device)).await;
                    }
                    Ok(None) => {}
                    Err(e) => debug!("probe task failed: {e}"),
                }

                let percent = (resolved * 100 / total) as u8;
                let _ = event_tx.send(DiscoveryEvent::ScanProgress(percent)).await;

                if let Some(addr) = queue.pop_front() {
                    probes.spawn(probe_host(addr, config.clone(), http.clone()));
                } else if probes.is_empty() {
                    break;
                }
            }
        }
    }

    let _ = event_tx.send(DiscoveryEvent::ScanFinished).await;
}

/// Probes one host: TCP connect, then the device-info request.
///
/// Returns `None` for hosts that refuse or time out the TCP probe.  Hosts
/// that accept the probe are always reported, falling back to a placeholder
/// name when the info request fails.
async fn probe_host(
    addr: Ipv4Addr,
    config: DiscoveryConfig,
    http: reqwest::Client,
) -> Option<DiscoveredDevice> {
    let target = SocketAddr::new(IpAddr::V4(addr), config.probe_port);
    match timeout(config.probe_timeout, TcpStream::connect(target)).await {
        Ok(Ok(_stream)) => {}
        _ => return None,
    }

    // Parsed from the raw body rather than via the content-type aware helper:
    // some firmware builds serve the JSON as text/html.
    let url = format!("http://{addr}:{}/getdeviceinfo", config.probe_port);
    let info = match http.get(&url).send().await {
        Ok(response) => match response.text().await {
            Ok(body) => serde_json::from_str::<DeviceInfo>(&body).ok(),
            Err(_) => None,
        },
        Err(e) => {
            debug!(%addr, "device info request failed: {e}");
            None
        }
    };

    let device = match info {
        Some(info) => DiscoveredDevice {
            address: addr,
            name: info.name.unwrap_or_else(|| "DWARF II".to_string()),
            version: info.version,
        },
        None => DiscoveredDevice {
            address: addr,
            name: "DWARF II (Unverified)".to_string(),
            version: None,
        },
    };
    Some(device)
}

// ── Candidate enumeration ─────────────────────────────────────────────────────

/// Expands a dotted prefix (`"192.168.1"`) into hosts .1 through .254.
fn hosts_for_prefix(prefix: &str) -> Vec<Ipv4Addr> {
    let mut octets = [0u8; 3];
    let mut parts = prefix.split('.');
    for slot in &mut octets {
        match parts.next().and_then(|p| p.parse::<u8>().ok()) {
            Some(o) => *slot = o,
            None => {
                warn!("invalid subnet prefix {prefix:?}");
                return Vec::new();
            }
        }
    }
    if parts.next().is_some() {
        warn!("invalid subnet prefix {prefix:?}");
        return Vec::new();
    }
    hosts_for_octets(octets)
}

fn hosts_for_octets(octets: [u8; 3]) -> Vec<Ipv4Addr> {
    (1..=254)
        .map(|host| Ipv4Addr::new(octets[0], octets[1], octets[2], host))
        .collect()
}

/// First three octets of every usable local IPv4 interface address.
fn local_subnets() -> Vec<[u8; 3]> {
    let mut subnets = Vec::new();
    match if_addrs::get_if_addrs() {
        Ok(interfaces) => {
            for iface in interfaces {
                if iface.is_loopback() {
                    continue;
                }
                if let IpAddr::V4(ip) = iface.ip() {
                    let [a, b, c, _] = ip.octets();
                    if !subnets.contains(&[a, b, c]) {
                        subnets.push([a, b, c]);
                    }
                }
            }
        }
        Err(e) => warn!("could not enumerate local interfaces: {e}"),
    }
    subnets
}

// ── Tests ─────────────────────────────────────────────────────────────────────
