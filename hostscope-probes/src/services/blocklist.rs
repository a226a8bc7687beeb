//! DNS blocklist check: resolve the host against filtering resolvers and look for sinkhole answers.

use std::future::Future;
use std::net::{IpAddr, Ipv4Addr};
use std::time::{Duration, Instant};

use futures::future::join_all;
use log::{debug, trace};

use crate::config::BlocklistConfig;
use crate::error::{HostscopeResult, ProbeError};
use crate::types::{BlocklistEntry, BlocklistReport, BlocklistResolver};

use super::deadline::try_with_deadline;
use super::resolver::{build_resolver_for_servers, classify_resolve_error, is_empty_answer};

/// Query every configured resolver concurrently.
///
/// The report always carries one entry per resolver, in table order.
pub async fn check_blocklists(host: &str, config: &BlocklistConfig) -> BlocklistReport {
    let budget = config.query_timeout();
    let start_time = Instant::now();

    let report = check_with(&config.resolvers, &config.sentinels, budget, |ip| {
        lookup_a_via(ip, host, budget)
    })
    .await;

    debug!(
        "[BLOCKLIST] {host}: blocked by {}/{} resolver(s), took {:?}",
        report.blocklists.iter().filter(|e| e.is_blocked).count(),
        report.blocklists.len(),
        start_time.elapsed()
    );
    report
}

pub(crate) async fn check_with<F, Fut>(
    resolvers: &[BlocklistResolver],
    sentinels: &[IpAddr],
    budget: Duration,
    lookup: F,
) -> BlocklistReport
where
    F: Fn(IpAddr) -> Fut,
    Fut: Future<Output = HostscopeResult<Vec<Ipv4Addr>>>,
{
    let futures: Vec<_> = resolvers
        .iter()
        .map(|resolver| {
            let query = lookup(resolver.ip);
            async move {
                let outcome = try_with_deadline(budget, query).await;
                if let Err(e) = &outcome {
                    trace!("[BLOCKLIST] {} ({}): {e}", resolver.name, resolver.ip);
                }
                BlocklistEntry {
                    server: resolver.name.clone(),
                    is_blocked: is_blocked(&outcome, sentinels),
                }
            }
        })
        .collect();

    BlocklistReport {
        blocklists: join_all(futures).await,
    }
}

/// 判定规则: sinkhole answer, NXDOMAIN, SERVFAIL or timeout count as blocked.
fn is_blocked(outcome: &HostscopeResult<Vec<Ipv4Addr>>, sentinels: &[IpAddr]) -> bool {
    match outcome {
        Ok(addresses) => addresses
            .iter()
            .any(|ip| sentinels.contains(&IpAddr::V4(*ip))),
        Err(ProbeError::NotFound(_) | ProbeError::ServerFailure(_) | ProbeError::Timeout(_)) => {
            true
        }
        Err(_) => false,
    }
}

async fn lookup_a_via(
    server: IpAddr,
    host: &str,
    budget: Duration,
) -> HostscopeResult<Vec<Ipv4Addr>> {
    let resolver = build_resolver_for_servers(&[server], budget);
    match resolver.ipv4_lookup(host).await {
        Ok(response) => Ok(response.iter().map(|a| a.0).collect()),
        Err(e) if is_empty_answer(&e) => Ok(Vec::new()),
        Err(e) => Err(classify_resolve_error(&format!("A {host} @{server}"), &e)),
    }
}
