//! Network reconnaissance probes for hostscope
//!
//! 提供各种主机探测功能：端口扫描、DNS 查询、黑名单检查、WHOIS、TLS 握手检查。
//! Every probe runs under its own deadline and reports partial results instead of
//! failing as a whole.

mod config;
mod error;
mod scheduler;
mod services;
mod types;

pub use config::{
    BlocklistConfig, DEFAULT_PORTS, DEFAULT_SENTINELS, DnsConfig, DnsServerConfig, PORTS_ENV_VAR,
    PortScanConfig, ProbeConfig, TlsConfig, WhoisConfig, parse_port_list,
};
pub use error::{HostscopeResult, ProbeError};
pub use scheduler::ProbeScheduler;
pub use services::deadline::{
    try_with_deadline, try_with_deadline_at, with_deadline, with_deadline_at,
};
pub use services::{ProbeService, normalize_target, registrable_domain};
pub use types::{
    BlocklistEntry, BlocklistReport, BlocklistResolver, DnsRecordType, DnsRecords, DnsServerInfo,
    DnsServerReport, EphemeralKeyInfo, IpLookup, MailConfigReport, MailService, MxRecord,
    PortScanReport, Probe, ProbeKind, ProbePayload, ProbeResult, ProbeStatus, RecordSet, Report,
    SoaRecord, SrvRecord, TlsReport, TxtRecordsReport, TxtValue, WhoisRecord, WhoisReport,
};
