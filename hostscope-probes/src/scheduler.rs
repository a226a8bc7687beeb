//! Probe scheduler: many independent timed probes, one partial report.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use log::{debug, warn};

use crate::config::ProbeConfig;
use crate::error::HostscopeResult;
use crate::services::deadline::try_with_deadline;
use crate::services::{ProbeService, normalize_target};
use crate::types::{Probe, ProbeKind, ProbePayload, ProbeResult, Report};

/// Dispatches probes concurrently, each under its own outer budget.
#[derive(Debug, Clone, Default)]
pub struct ProbeScheduler {
    service: ProbeService,
}

impl ProbeScheduler {
    pub fn new(config: ProbeConfig) -> Self {
        Self {
            service: ProbeService::new(config),
        }
    }

    pub fn config(&self) -> &ProbeConfig {
        self.service.config()
    }

    pub const fn service(&self) -> &ProbeService {
        &self.service
    }

    /// Build a probe carrying the configured budget for `kind`.
    pub fn probe(&self, kind: ProbeKind, target: impl Into<String>) -> Probe {
        Probe::new(target, kind, self.config().probe_timeout(kind))
    }

    /// Run one probe. Always yields exactly one result, whatever happens inside.
    pub async fn dispatch(&self, probe: &Probe) -> ProbeResult<ProbePayload> {
        let kind = probe.kind();
        let start_time = Instant::now();

        let outcome = try_with_deadline(probe.timeout(), self.execute(kind, probe.target())).await;
        match &outcome {
            Ok(_) => debug!(
                "[SCHED] [{}] {} done in {:?}",
                kind.tag(),
                probe.target(),
                start_time.elapsed()
            ),
            Err(e) => warn!("[SCHED] [{}] {} failed: {e}", kind.tag(), probe.target()),
        }
        ProbeResult::from_outcome(outcome)
    }

    /// Normalise `target` once and dispatch every kind concurrently.
    ///
    /// Invalid input is the only failure of a whole run; duplicate kinds run once.
    pub async fn run(&self, target: &str, kinds: &[ProbeKind]) -> HostscopeResult<Report> {
        let host = normalize_target(target)?;
        let kinds: BTreeSet<ProbeKind> = kinds.iter().copied().collect();
        let probes: Vec<Probe> = kinds.iter().map(|&kind| self.probe(kind, &host)).collect();

        debug!("[SCHED] Dispatching {} probe(s) for {host}", probes.len());
        let start_time = Instant::now();
        let results = join_all(probes.iter().map(|probe| self.dispatch(probe))).await;

        let results: BTreeMap<_, _> = kinds.into_iter().zip(results).collect();
        debug!(
            "[SCHED] {host}: {}/{} probe(s) succeeded, took {:?}",
            results.values().filter(|r| r.is_success()).count(),
            results.len(),
            start_time.elapsed()
        );
        Ok(Report {
            target: host,
            results,
        })
    }

    async fn execute(&self, kind: ProbeKind, target: &str) -> HostscopeResult<ProbePayload> {
        let service = &self.service;
        match kind {
            ProbeKind::Port => service.scan_ports(target).await.map(ProbePayload::Ports),
            ProbeKind::DnsRecord => service.dns_records(target).await.map(ProbePayload::Dns),
            ProbeKind::Blocklist => service
                .check_blocklists(target)
                .await
                .map(ProbePayload::Blocklist),
            ProbeKind::Whois => service.whois_lookup(target).await.map(ProbePayload::Whois),
            ProbeKind::Tls => service.inspect_tls(target).await.map(ProbePayload::Tls),
            ProbeKind::MailConfig => service
                .mail_config(target)
                .await
                .map(ProbePayload::MailConfig),
            ProbeKind::TxtRecords => service
                .txt_records(target)
                .await
                .map(ProbePayload::TxtRecords),
            ProbeKind::DnsServer => service
                .dns_servers(target)
                .await
                .map(ProbePayload::DnsServer),
            ProbeKind::Ip => service.lookup_ip(target).await.map(ProbePayload::Ip),
        }
    }
}

impl From<Arc<ProbeConfig>> for ProbeScheduler {
    fn from(config: Arc<ProbeConfig>) -> Self {
        Self {
            service: ProbeService::with_shared(config),
        }
    }
}
