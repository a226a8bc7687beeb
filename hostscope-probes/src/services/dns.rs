//! DNS 查询模块: concurrent per-record-type fan-out.

use std::future::Future;
use std::time::{Duration, Instant};

use futures::future::join_all;
use hickory_resolver::{ResolveError, TokioResolver, proto::rr::RecordType};
use log::{debug, trace};

use crate::config::DnsConfig;
use crate::error::HostscopeResult;
use crate::types::{
    DnsRecordType, DnsRecords, MxRecord, ProbeResult, RecordSet, SoaRecord, SrvRecord,
};

use super::deadline::try_with_deadline;
use super::resolver::{classify_resolve_error, fan_out_resolver, is_empty_answer};

/// Query all nine record types for `host` concurrently.
///
/// A record type that times out or errors is reported empty; it never affects
/// or delays its siblings.
pub async fn dns_records(host: &str, config: &DnsConfig) -> DnsRecords {
    let budget = config.query_timeout();
    let resolver = fan_out_resolver(config, budget);
    let start_time = Instant::now();

    let results = fan_out(&DnsRecordType::ALL, budget, |record_type| {
        query_record_type(&resolver, host, record_type)
    })
    .await;

    debug!(
        "[DNS] {host}: {}/{} record types answered, took {:?}",
        results.iter().filter(|r| r.is_success()).count(),
        results.len(),
        start_time.elapsed()
    );
    DnsRecords::from_results(results)
}

/// Run `query` for each record type under its own `budget`.
///
/// The returned results are indexed like `types`.
pub(crate) async fn fan_out<F, Fut>(
    types: &[DnsRecordType],
    budget: Duration,
    query: F,
) -> Vec<ProbeResult<RecordSet>>
where
    F: Fn(DnsRecordType) -> Fut,
    Fut: Future<Output = HostscopeResult<RecordSet>>,
{
    let futures: Vec<_> = types
        .iter()
        .map(|&record_type| {
            let lookup = query(record_type);
            async move {
                let result = ProbeResult::from_outcome(try_with_deadline(budget, lookup).await);
                if let Some(e) = &result.error {
                    trace!("[DNS] {record_type} failed: {e}");
                }
                result
            }
        })
        .collect();

    join_all(futures).await
}

/// Resolve one record type. NOERROR with an empty answer section is an empty success.
pub(crate) async fn query_record_type(
    resolver: &TokioResolver,
    host: &str,
    record_type: DnsRecordType,
) -> HostscopeResult<RecordSet> {
    let outcome = match record_type {
        DnsRecordType::A => lookup_a(resolver, host).await,
        DnsRecordType::Aaaa => lookup_aaaa(resolver, host).await,
        DnsRecordType::Mx => lookup_mx(resolver, host).await,
        DnsRecordType::Txt => lookup_txt(resolver, host).await,
        DnsRecordType::Ns => lookup_ns(resolver, host).await,
        DnsRecordType::Cname => lookup_cname(resolver, host).await,
        DnsRecordType::Soa => lookup_soa(resolver, host).await,
        DnsRecordType::Srv => lookup_srv(resolver, host).await,
        DnsRecordType::Ptr => lookup_ptr(resolver, host).await,
    };

    match outcome {
        Ok(set) => Ok(set),
        Err(e) if is_empty_answer(&e) => Ok(RecordSet::empty(record_type)),
        Err(e) => Err(classify_resolve_error(&format!("{record_type} {host}"), &e)),
    }
}

pub(crate) fn trim_name(name: &impl ToString) -> String {
    name.to_string().trim_end_matches('.').to_string()
}

async fn lookup_a(resolver: &TokioResolver, host: &str) -> Result<RecordSet, ResolveError> {
    let response = resolver.ipv4_lookup(host).await?;
    Ok(RecordSet::A(response.iter().map(|a| a.0).collect()))
}

async fn lookup_aaaa(resolver: &TokioResolver, host: &str) -> Result<RecordSet, ResolveError> {
    let response = resolver.ipv6_lookup(host).await?;
    Ok(RecordSet::Aaaa(response.iter().map(|aaaa| aaaa.0).collect()))
}

async fn lookup_mx(resolver: &TokioResolver, host: &str) -> Result<RecordSet, ResolveError> {
    let response = resolver.mx_lookup(host).await?;
    Ok(RecordSet::Mx(
        response
            .iter()
            .map(|mx| MxRecord {
                exchange: trim_name(mx.exchange()),
                priority: mx.preference(),
            })
            .collect(),
    ))
}

async fn lookup_txt(resolver: &TokioResolver, host: &str) -> Result<RecordSet, ResolveError> {
    let response = resolver.txt_lookup(host).await?;
    Ok(RecordSet::Txt(
        response
            .iter()
            .map(|txt| {
                txt.iter()
                    .map(|data| String::from_utf8_lossy(data).to_string())
                    .collect()
            })
            .collect(),
    ))
}

async fn lookup_ns(resolver: &TokioResolver, host: &str) -> Result<RecordSet, ResolveError> {
    let response = resolver.ns_lookup(host).await?;
    Ok(RecordSet::Ns(response.iter().map(trim_name).collect()))
}

async fn lookup_cname(resolver: &TokioResolver, host: &str) -> Result<RecordSet, ResolveError> {
    let response = resolver.lookup(host, RecordType::CNAME).await?;
    Ok(RecordSet::Cname(
        response
            .record_iter()
            .filter_map(|record| record.data().as_cname().map(|cname| trim_name(&cname.0)))
            .collect(),
    ))
}

async fn lookup_soa(resolver: &TokioResolver, host: &str) -> Result<RecordSet, ResolveError> {
    let response = resolver.soa_lookup(host).await?;
    Ok(RecordSet::Soa(
        response
            .iter()
            .map(|soa| SoaRecord {
                nsname: trim_name(soa.mname()),
                hostmaster: trim_name(soa.rname()),
                serial: soa.serial(),
                refresh: soa.refresh(),
                retry: soa.retry(),
                expire: soa.expire(),
                minttl: soa.minimum(),
            })
            .collect(),
    ))
}

async fn lookup_srv(resolver: &TokioResolver, host: &str) -> Result<RecordSet, ResolveError> {
    let response = resolver.srv_lookup(host).await?;
    Ok(RecordSet::Srv(
        response
            .iter()
            .map(|srv| SrvRecord {
                name: trim_name(srv.target()),
                port: srv.port(),
                priority: srv.priority(),
                weight: srv.weight(),
            })
            .collect(),
    ))
}

async fn lookup_ptr(resolver: &TokioResolver, host: &str) -> Result<RecordSet, ResolveError> {
    let response = resolver.lookup(host, RecordType::PTR).await?;
    Ok(RecordSet::Ptr(
        response
            .record_iter()
            .filter_map(|record| record.data().as_ptr().map(|ptr| trim_name(&ptr.0)))
            .collect(),
    ))
}
