//! DNS server probe: reverse names and DNS-over-HTTPS support of the host's addresses.

use std::future::Future;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::LazyLock;
use std::time::Instant;

use futures::future::join_all;
use log::{debug, trace};

use crate::config::DnsServerConfig;
use crate::error::HostscopeResult;
use crate::types::{DnsServerInfo, DnsServerReport};

use super::deadline::try_with_deadline;
use super::dns::trim_name;
use super::resolver::{SYSTEM_RESOLVER, classify_resolve_error, is_empty_answer};

/// Shared HTTP client for `DoH` capability checks.
static HTTP_CLIENT: LazyLock<reqwest::Client> = LazyLock::new(reqwest::Client::new);

/// Describe every A address of `host` as a potential DNS server.
///
/// A failed A lookup is treated like an empty one: there is nothing to describe.
pub async fn dns_servers(host: &str, config: &DnsServerConfig) -> DnsServerReport {
    let start_time = Instant::now();

    let addresses = addresses_or_empty(host, lookup_a(host).await);
    let report = report_with(
        host,
        &addresses,
        |ip| async move {
            try_with_deadline(config.reverse_timeout(), reverse_name(ip))
                .await
                .inspect_err(|e| trace!("[DNS-SERVER] PTR {ip}: {e}"))
                .ok()
                .flatten()
        },
        |ip| supports_doh(ip, config),
    )
    .await;

    if let DnsServerReport::Servers { dns, .. } = &report {
        debug!(
            "[DNS-SERVER] {host}: {} address(es), {} with DoH, took {:?}",
            dns.len(),
            dns.iter().filter(|s| s.doh_direct_supports).count(),
            start_time.elapsed()
        );
    }
    report
}

async fn lookup_a(host: &str) -> HostscopeResult<Vec<Ipv4Addr>> {
    match SYSTEM_RESOLVER.ipv4_lookup(host).await {
        Ok(response) => Ok(response.iter().map(|a| a.0).collect()),
        Err(e) if is_empty_answer(&e) => Ok(Vec::new()),
        Err(e) => Err(classify_resolve_error(&format!("A {host}"), &e)),
    }
}

fn addresses_or_empty(host: &str, lookup: HostscopeResult<Vec<Ipv4Addr>>) -> Vec<Ipv4Addr> {
    lookup.unwrap_or_else(|e| {
        debug!("[DNS-SERVER] {host}: {e}");
        Vec::new()
    })
}

/// `Skipped` without addresses, otherwise one entry per address.
async fn report_with<R, RFut, D, DFut>(
    host: &str,
    addresses: &[Ipv4Addr],
    reverse: R,
    doh: D,
) -> DnsServerReport
where
    R: Fn(Ipv4Addr) -> RFut,
    RFut: Future<Output = Option<String>>,
    D: Fn(Ipv4Addr) -> DFut,
    DFut: Future<Output = bool>,
{
    if addresses.is_empty() {
        return DnsServerReport::Skipped {
            skipped: format!("No A records found for {host}"),
        };
    }
    DnsServerReport::Servers {
        domain: host.to_string(),
        dns: describe_with(addresses, reverse, doh).await,
    }
}

/// Run `reverse` and `doh` for every address concurrently; output follows `addresses`.
async fn describe_with<R, RFut, D, DFut>(
    addresses: &[Ipv4Addr],
    reverse: R,
    doh: D,
) -> Vec<DnsServerInfo>
where
    R: Fn(Ipv4Addr) -> RFut,
    RFut: Future<Output = Option<String>>,
    D: Fn(Ipv4Addr) -> DFut,
    DFut: Future<Output = bool>,
{
    let futures: Vec<_> = addresses
        .iter()
        .map(|&address| {
            let hostname = reverse(address);
            let doh_direct_supports = doh(address);
            async move {
                let (hostname, doh_direct_supports) =
                    futures::join!(hostname, doh_direct_supports);
                DnsServerInfo {
                    address,
                    hostname,
                    doh_direct_supports,
                }
            }
        })
        .collect();

    join_all(futures).await
}

async fn reverse_name(ip: Ipv4Addr) -> HostscopeResult<Option<String>> {
    let response = SYSTEM_RESOLVER
        .reverse_lookup(IpAddr::V4(ip))
        .await
        .map_err(|e| classify_resolve_error(&format!("PTR {ip}"), &e))?;
    Ok(response.iter().next().map(|ptr| trim_name(&ptr.0)))
}

/// `GET https://<ip>/dns-query`; any success status counts as support.
async fn supports_doh(ip: Ipv4Addr, config: &DnsServerConfig) -> bool {
    let url = format!("https://{ip}/dns-query");
    match HTTP_CLIENT
        .get(&url)
        .timeout(config.doh_timeout())
        .send()
        .await
    {
        Ok(response) => response.status().is_success(),
        Err(e) => {
            trace!("[DNS-SERVER] DoH {ip}: {e}");
            false
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::ProbeError;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_describe_keeps_resolution_order() {
        let addresses = [
            Ipv4Addr::new(1, 1, 1, 1),
            Ipv4Addr::new(192, 0, 2, 1),
            Ipv4Addr::new(8, 8, 8, 8),
        ];
        let servers = describe_with(
            &addresses,
            |ip| async move {
                // Slowest answer first.
                if ip.octets()[0] == 1 {
                    tokio::time::sleep(Duration::from_millis(500)).await;
                    Some("one.one.one.one".to_string())
                } else if ip.octets()[0] == 8 {
                    Some("dns.google".to_string())
                } else {
                    None
                }
            },
            |ip| async move { ip.octets()[0] != 192 },
        )
        .await;

        assert_eq!(servers.len(), 3);
        assert_eq!(servers[0].address, addresses[0]);
        assert_eq!(servers[0].hostname.as_deref(), Some("one.one.one.one"));
        assert!(servers[0].doh_direct_supports);
        assert_eq!(servers[1].hostname, None);
        assert!(!servers[1].doh_direct_supports);
        assert_eq!(servers[2].hostname.as_deref(), Some("dns.google"));
    }

    #[test]
    fn test_failed_lookup_yields_no_addresses() {
        for err in [
            ProbeError::ServerFailure("A example.com".into()),
            ProbeError::Timeout("A example.com".into()),
            ProbeError::NotFound("A example.invalid".into()),
        ] {
            assert!(addresses_or_empty("example.com", Err(err)).is_empty());
        }
        let found = addresses_or_empty("example.com", Ok(vec![Ipv4Addr::new(192, 0, 2, 9)]));
        assert_eq!(found, vec![Ipv4Addr::new(192, 0, 2, 9)]);
    }

    #[tokio::test]
    async fn test_no_addresses_is_skipped() {
        let report = report_with(
            "example.com",
            &[],
            |_| async { Some("unused.example".to_string()) },
            |_| async { true },
        )
        .await;
        assert_eq!(
            report,
            DnsServerReport::Skipped {
                skipped: "No A records found for example.com".to_string()
            }
        );
    }

    #[test]
    fn test_report_serialization() {
        let report = DnsServerReport::Servers {
            domain: "one.one.one.one".to_string(),
            dns: vec![DnsServerInfo {
                address: Ipv4Addr::new(1, 0, 0, 1),
                hostname: None,
                doh_direct_supports: true,
            }],
        };
        assert_eq!(
            serde_json::to_value(report).unwrap(),
            serde_json::json!({
                "domain": "one.one.one.one",
                "dns": [{"address": "1.0.0.1", "hostname": null, "dohDirectSupports": true}]
            })
        );

        let skipped = DnsServerReport::Skipped {
            skipped: "No A records found for example.invalid".to_string(),
        };
        assert_eq!(
            serde_json::to_value(skipped).unwrap(),
            serde_json::json!({"skipped": "No A records found for example.invalid"})
        );
    }

    #[tokio::test]
    #[ignore = "requires network access"]
    async fn test_dns_servers_real() {
        let report = dns_servers("one.one.one.one", &DnsServerConfig::default()).await;
        let DnsServerReport::Servers { dns, .. } = report else {
            panic!("expected servers");
        };
        assert!(dns.iter().any(|s| s.hostname.is_some()));
    }
}
