//! Shared DNS resolver helpers used across probe modules.

use std::net::IpAddr;
use std::sync::LazyLock;
use std::time::Duration;

use hickory_resolver::{
    ResolveError, TokioResolver,
    config::{NameServerConfigGroup, ResolverConfig, ResolverOpts},
    name_server::TokioConnectionProvider,
    proto::{ProtoErrorKind, op::ResponseCode},
};

use crate::config::DnsConfig;
use crate::error::ProbeError;

/// Shared resolver built from the host system configuration.
///
/// On Unix/Windows this uses the host system configuration (e.g. `/etc/resolv.conf`).
/// If the system configuration cannot be loaded, it falls back to Hickory's default
/// upstream set (Google Public DNS).
pub(crate) static SYSTEM_RESOLVER: LazyLock<TokioResolver> = LazyLock::new(build_system_resolver);

/// Build a resolver that sends every query to `servers` only (UDP/TCP port 53).
///
/// Hickory's own per-request timeout is aligned with `budget` and retries are
/// disabled; the probe's deadline race remains the authoritative bound.
pub(crate) fn build_resolver_for_servers(servers: &[IpAddr], budget: Duration) -> TokioResolver {
    let config = ResolverConfig::from_parts(
        None,
        vec![],
        NameServerConfigGroup::from_ips_clear(servers, 53, true),
    );
    let provider = TokioConnectionProvider::default();
    let mut opts = ResolverOpts::default();
    opts.timeout = budget;
    opts.attempts = 1;
    TokioResolver::builder_with_config(config, provider)
        .with_options(opts)
        .build()
}

/// Resolver for the DNS fan-out: the configured pair, or the host configuration.
pub(crate) fn fan_out_resolver(config: &DnsConfig, budget: Duration) -> TokioResolver {
    if config.use_system_resolver {
        SYSTEM_RESOLVER.clone()
    } else {
        build_resolver_for_servers(&config.nameservers, budget)
    }
}

/// Build a resolver using the host system DNS configuration (with fallback).
fn build_system_resolver() -> TokioResolver {
    #[cfg(any(unix, target_os = "windows"))]
    {
        match TokioResolver::builder_tokio() {
            Ok(builder) => return builder.build(),
            Err(e) => {
                log::warn!(
                    "Failed to load system DNS configuration, falling back to defaults: {e}"
                );
            }
        }
    }

    let provider = TokioConnectionProvider::default();
    TokioResolver::builder_with_config(ResolverConfig::default(), provider)
        .with_options(ResolverOpts::default())
        .build()
}

/// Response code carried by a "no records" resolver error.
fn resolve_error_response_code(err: &ResolveError) -> Option<ResponseCode> {
    let proto = err.proto()?;
    match proto.kind() {
        ProtoErrorKind::NoRecordsFound { response_code, .. } => Some(*response_code),
        _ => None,
    }
}

/// Whether the server answered NOERROR with an empty answer section.
pub(crate) fn is_empty_answer(err: &ResolveError) -> bool {
    err.is_no_records_found() && resolve_error_response_code(err) == Some(ResponseCode::NoError)
}

/// Map a resolver error onto the probe error taxonomy.
pub(crate) fn classify_resolve_error(name: &str, err: &ResolveError) -> ProbeError {
    match resolve_error_response_code(err) {
        Some(ResponseCode::NXDomain) => return ProbeError::NotFound(format!("{name}: NXDOMAIN")),
        Some(ResponseCode::ServFail) => {
            return ProbeError::ServerFailure(format!("{name}: SERVFAIL"));
        }
        Some(ResponseCode::NoError) => return ProbeError::NotFound(format!("{name}: no data")),
        Some(code) => return ProbeError::ProtocolError(format!("{name}: {code}")),
        None => {}
    }
    if err.is_nx_domain() {
        return ProbeError::NotFound(format!("{name}: NXDOMAIN"));
    }
    match err.proto().map(hickory_resolver::proto::ProtoError::kind) {
        Some(ProtoErrorKind::Timeout) => ProbeError::Timeout(format!("{name}: resolver timeout")),
        Some(ProtoErrorKind::Io(e)) => ProbeError::Unreachable(format!("{name}: {e}")),
        Some(ProtoErrorKind::NoConnections) => {
            ProbeError::Unreachable(format!("{name}: no nameserver connections"))
        }
        _ => ProbeError::ProtocolError(format!("{name}: {err}")),
    }
}
