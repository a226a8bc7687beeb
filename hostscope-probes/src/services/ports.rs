//! TCP connect port scanner.

use std::future::Future;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use log::{debug, trace, warn};
use tokio::net::TcpStream;
use tokio::time::Instant;

use crate::config::PortScanConfig;
use crate::error::{HostscopeResult, ProbeError};
use crate::types::{PortScanReport, ProbeResult, ProbeStatus};

use super::deadline::{try_with_deadline_at, with_deadline, with_deadline_at};
use super::ip::resolve_addresses;

/// Scan the configured ports on `host`.
///
/// Never fails: an unresolvable host simply yields every port as failed.
pub async fn scan_ports(host: &str, config: &PortScanConfig) -> PortScanReport {
    let start_time = Instant::now();
    debug!("[PORTS] Scanning {} port(s) on {host}", config.ports.len());

    let report = scan_host_with(
        resolve_addresses(host),
        &config.ports,
        config.connect_timeout(),
        config.scan_deadline(),
        connect,
    )
    .await;

    debug!(
        "[PORTS] {host}: {} open, {} failed, took {:?}",
        report.open_ports.len(),
        report.failed_ports.len(),
        start_time.elapsed()
    );
    report
}

/// Resolve, then fan out over `ports`; both stages share one `scan_deadline`.
///
/// Each attempt gets every resolved address for its port and may try them in turn.
pub(crate) async fn scan_host_with<R, F, Fut>(
    resolve: R,
    ports: &[u16],
    per_port: Duration,
    scan_deadline: Duration,
    probe: F,
) -> PortScanReport
where
    R: Future<Output = HostscopeResult<Vec<IpAddr>>>,
    F: Fn(Vec<SocketAddr>) -> Fut,
    Fut: Future<Output = io::Result<()>>,
{
    let deadline = Instant::now() + scan_deadline;

    let addresses = match try_with_deadline_at(deadline, resolve).await {
        Ok(addresses) => addresses,
        Err(e) => {
            warn!("[PORTS] Address resolution failed: {e}");
            return PortScanReport {
                open_ports: Vec::new(),
                failed_ports: sorted_unique(ports),
            };
        }
    };

    scan_ports_with(ports, per_port, deadline, |port| {
        probe(
            addresses
                .iter()
                .map(|&ip| SocketAddr::new(ip, port))
                .collect(),
        )
    })
    .await
}

/// Fan out `probe` over `ports`, each under `per_port`, all until `deadline`.
///
/// Results land in a slot per port index. Ports still pending when the scan
/// deadline fires are dropped (closing their sockets) and reported as failed.
pub(crate) async fn scan_ports_with<F, Fut>(
    ports: &[u16],
    per_port: Duration,
    deadline: Instant,
    probe: F,
) -> PortScanReport
where
    F: Fn(u16) -> Fut,
    Fut: Future<Output = io::Result<()>>,
{
    let ports = sorted_unique(ports);
    let mut slots: Vec<Option<ProbeResult<u16>>> = ports.iter().map(|_| None).collect();

    let mut pending: FuturesUnordered<_> = ports
        .iter()
        .enumerate()
        .map(|(idx, &port)| {
            let attempt = probe(port);
            async move { (idx, check_port(port, per_port, attempt).await) }
        })
        .collect();

    let drained = with_deadline_at(deadline, async {
        while let Some((idx, result)) = pending.next().await {
            slots[idx] = Some(result);
        }
    })
    .await;

    if drained.is_err() {
        debug!(
            "[PORTS] Scan deadline elapsed with {} port(s) unresolved",
            pending.len()
        );
    }
    drop(pending);

    let mut report = PortScanReport::default();
    for (port, slot) in ports.into_iter().zip(slots) {
        match slot {
            Some(result) if result.status == ProbeStatus::Success => report.open_ports.push(port),
            _ => report.failed_ports.push(port),
        }
    }
    report
}

/// Classify one connect attempt. Timeouts, refusals and other socket errors are all terminal.
async fn check_port<Fut>(port: u16, budget: Duration, attempt: Fut) -> ProbeResult<u16>
where
    Fut: Future<Output = io::Result<()>>,
{
    match with_deadline(budget, attempt).await {
        Ok(Ok(())) => {
            trace!("[PORTS] {port} open");
            ProbeResult::success(port)
        }
        Ok(Err(e)) => {
            trace!("[PORTS] {port} closed: {e}");
            ProbeResult::closed(ProbeError::from_io(&format!("port {port}"), &e))
        }
        Err(e) => {
            trace!("[PORTS] {port} timed out");
            ProbeResult::failed(e)
        }
    }
}

/// Try each address in order until one accepts.
async fn connect(addresses: Vec<SocketAddr>) -> io::Result<()> {
    // Dropping the stream closes the connection immediately.
    TcpStream::connect(&addresses[..]).await.map(drop)
}

fn sorted_unique(ports: &[u16]) -> Vec<u16> {
    let mut ports = ports.to_vec();
    ports.sort_unstable();
    ports.dedup();
    ports
}
