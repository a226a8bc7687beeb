//! IP lookup module: first address of a host via the system resolver.

use std::net::IpAddr;

use log::{debug, trace};

use crate::error::{HostscopeResult, ProbeError};
use crate::types::IpLookup;

/// Resolve `host` and return its first address with the address family.
pub async fn lookup_ip(host: &str) -> HostscopeResult<IpLookup> {
    let ip = first_address(host).await?;
    debug!("[IP] {host} -> {ip}");
    Ok(IpLookup {
        ip,
        family: if ip.is_ipv4() { 4 } else { 6 },
    })
}

/// First address for `host`, as `getaddrinfo` orders them. IP literals resolve to themselves.
async fn first_address(host: &str) -> HostscopeResult<IpAddr> {
    let addresses = resolve_addresses(host).await?;
    addresses
        .first()
        .copied()
        .ok_or_else(|| ProbeError::NotFound(format!("{host}: no addresses")))
}

/// Every address for `host` in resolver order, duplicates removed. Never empty on success.
pub(crate) async fn resolve_addresses(host: &str) -> HostscopeResult<Vec<IpAddr>> {
    if let Ok(ip) = host.trim_matches(|c| c == '[' || c == ']').parse::<IpAddr>() {
        return Ok(vec![ip]);
    }
    let mut addresses: Vec<IpAddr> = Vec::new();
    for addr in tokio::net::lookup_host((host, 0))
        .await
        .map_err(|e| ProbeError::NotFound(format!("{host}: {e}")))?
    {
        if !addresses.contains(&addr.ip()) {
            addresses.push(addr.ip());
        }
    }
    if addresses.is_empty() {
        return Err(ProbeError::NotFound(format!("{host}: no addresses")));
    }
    trace!("[IP] {host} -> {addresses:?}");
    Ok(addresses)
}
