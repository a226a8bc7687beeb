//! Public types returned by probe operations.

use std::collections::BTreeMap;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ProbeError;

// ==================== Probe model ====================

/// Kind of network probe the scheduler can dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProbeKind {
    /// TCP connect scan over the configured port set.
    #[serde(rename = "ports")]
    Port,
    /// Nine-record-type DNS fan-out.
    #[serde(rename = "dns")]
    DnsRecord,
    /// Comparison across filtering / public DNS resolvers.
    Blocklist,
    /// Raw WHOIS query on port 43.
    Whois,
    /// TLS handshake inspection.
    Tls,
    /// MX + email-related TXT records.
    MailConfig,
    /// TXT records parsed into key/value pairs.
    TxtRecords,
    /// Reverse lookup and `DoH` capability of the host's addresses.
    DnsServer,
    /// First resolved address of the host.
    Ip,
}

impl ProbeKind {
    /// Every probe kind, in report order.
    pub const ALL: [Self; 9] = [
        Self::Port,
        Self::DnsRecord,
        Self::Blocklist,
        Self::Whois,
        Self::Tls,
        Self::MailConfig,
        Self::TxtRecords,
        Self::DnsServer,
        Self::Ip,
    ];

    /// Short log tag.
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Port => "PORTS",
            Self::DnsRecord => "DNS",
            Self::Blocklist => "BLOCKLIST",
            Self::Whois => "WHOIS",
            Self::Tls => "TLS",
            Self::MailConfig => "MAIL",
            Self::TxtRecords => "TXT",
            Self::DnsServer => "DNS-SERVER",
            Self::Ip => "IP",
        }
    }
}

impl fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Port => "ports",
            Self::DnsRecord => "dns",
            Self::Blocklist => "blocklist",
            Self::Whois => "whois",
            Self::Tls => "tls",
            Self::MailConfig => "mail-config",
            Self::TxtRecords => "txt-records",
            Self::DnsServer => "dns-server",
            Self::Ip => "ip",
        };
        f.write_str(name)
    }
}

impl FromStr for ProbeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ports" | "port" => Ok(Self::Port),
            "dns" => Ok(Self::DnsRecord),
            "blocklist" | "block-lists" => Ok(Self::Blocklist),
            "whois" => Ok(Self::Whois),
            "tls" => Ok(Self::Tls),
            "mail-config" => Ok(Self::MailConfig),
            "txt-records" => Ok(Self::TxtRecords),
            "dns-server" => Ok(Self::DnsServer),
            "ip" | "get-ip" => Ok(Self::Ip),
            _ => Err(format!("Unsupported probe kind: {s}")),
        }
    }
}

/// One timed operation against a host. Immutable once dispatched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Probe {
    target: String,
    kind: ProbeKind,
    timeout: Duration,
}

impl Probe {
    pub fn new(target: impl Into<String>, kind: ProbeKind, timeout: Duration) -> Self {
        Self {
            target: target.into(),
            kind,
            timeout,
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub const fn kind(&self) -> ProbeKind {
        self.kind
    }

    pub const fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// Outcome classification of a single probe or sub-operation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProbeStatus {
    Success,
    Closed,
    Timeout,
    Error,
}

/// Exactly one of these is produced for every dispatched (sub-)operation.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ProbeResult<T> {
    pub status: ProbeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ProbeError>,
}

impl<T> ProbeResult<T> {
    pub const fn success(payload: T) -> Self {
        Self {
            status: ProbeStatus::Success,
            payload: Some(payload),
            error: None,
        }
    }

    /// A terminal negative answer (e.g. a refused port) rather than a fault.
    pub const fn closed(error: ProbeError) -> Self {
        Self {
            status: ProbeStatus::Closed,
            payload: None,
            error: Some(error),
        }
    }

    pub fn failed(error: ProbeError) -> Self {
        let status = if error.is_timeout() {
            ProbeStatus::Timeout
        } else {
            ProbeStatus::Error
        };
        Self {
            status,
            payload: None,
            error: Some(error),
        }
    }

    pub fn from_outcome(outcome: Result<T, ProbeError>) -> Self {
        match outcome {
            Ok(payload) => Self::success(payload),
            Err(e) => Self::failed(e),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ProbeStatus::Success
    }
}

// ==================== Port scanner ====================

/// Disjoint, ascending port lists whose union is the configured port set.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PortScanReport {
    pub open_ports: Vec<u16>,
    pub failed_ports: Vec<u16>,
}

// ==================== DNS fan-out ====================

/// Record types queried by the DNS fan-out, in report order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DnsRecordType {
    A,
    Aaaa,
    Mx,
    Txt,
    Ns,
    Cname,
    Soa,
    Srv,
    Ptr,
}

impl DnsRecordType {
    pub const ALL: [Self; 9] = [
        Self::A,
        Self::Aaaa,
        Self::Mx,
        Self::Txt,
        Self::Ns,
        Self::Cname,
        Self::Soa,
        Self::Srv,
        Self::Ptr,
    ];
}

impl fmt::Display for DnsRecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::A => write!(f, "A"),
            Self::Aaaa => write!(f, "AAAA"),
            Self::Mx => write!(f, "MX"),
            Self::Txt => write!(f, "TXT"),
            Self::Ns => write!(f, "NS"),
            Self::Cname => write!(f, "CNAME"),
            Self::Soa => write!(f, "SOA"),
            Self::Srv => write!(f, "SRV"),
            Self::Ptr => write!(f, "PTR"),
        }
    }
}

impl FromStr for DnsRecordType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "A" => Ok(Self::A),
            "AAAA" => Ok(Self::Aaaa),
            "MX" => Ok(Self::Mx),
            "TXT" => Ok(Self::Txt),
            "NS" => Ok(Self::Ns),
            "CNAME" => Ok(Self::Cname),
            "SOA" => Ok(Self::Soa),
            "SRV" => Ok(Self::Srv),
            "PTR" => Ok(Self::Ptr),
            _ => Err(format!("Unsupported DNS record type: {s}")),
        }
    }
}

/// Mail exchange record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MxRecord {
    /// Exchange host name, trailing dot removed.
    pub exchange: String,
    pub priority: u16,
}

/// Start of authority record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SoaRecord {
    pub nsname: String,
    pub hostmaster: String,
    pub serial: u32,
    pub refresh: i32,
    pub retry: i32,
    pub expire: i32,
    pub minttl: u32,
}

/// Service locator record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SrvRecord {
    pub name: String,
    pub port: u16,
    pub priority: u16,
    pub weight: u16,
}

/// Answer for one record type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordSet {
    A(Vec<Ipv4Addr>),
    Aaaa(Vec<Ipv6Addr>),
    Mx(Vec<MxRecord>),
    /// Each record is the list of its character-strings.
    Txt(Vec<Vec<String>>),
    Ns(Vec<String>),
    Cname(Vec<String>),
    Soa(Vec<SoaRecord>),
    Srv(Vec<SrvRecord>),
    Ptr(Vec<String>),
}

impl RecordSet {
    pub const fn record_type(&self) -> DnsRecordType {
        match self {
            Self::A(_) => DnsRecordType::A,
            Self::Aaaa(_) => DnsRecordType::Aaaa,
            Self::Mx(_) => DnsRecordType::Mx,
            Self::Txt(_) => DnsRecordType::Txt,
            Self::Ns(_) => DnsRecordType::Ns,
            Self::Cname(_) => DnsRecordType::Cname,
            Self::Soa(_) => DnsRecordType::Soa,
            Self::Srv(_) => DnsRecordType::Srv,
            Self::Ptr(_) => DnsRecordType::Ptr,
        }
    }

    /// The empty answer for `record_type`.
    pub const fn empty(record_type: DnsRecordType) -> Self {
        match record_type {
            DnsRecordType::A => Self::A(Vec::new()),
            DnsRecordType::Aaaa => Self::Aaaa(Vec::new()),
            DnsRecordType::Mx => Self::Mx(Vec::new()),
            DnsRecordType::Txt => Self::Txt(Vec::new()),
            DnsRecordType::Ns => Self::Ns(Vec::new()),
            DnsRecordType::Cname => Self::Cname(Vec::new()),
            DnsRecordType::Soa => Self::Soa(Vec::new()),
            DnsRecordType::Srv => Self::Srv(Vec::new()),
            DnsRecordType::Ptr => Self::Ptr(Vec::new()),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::A(v) => v.is_empty(),
            Self::Aaaa(v) => v.is_empty(),
            Self::Mx(v) => v.is_empty(),
            Self::Txt(v) => v.is_empty(),
            Self::Ns(v) | Self::Cname(v) | Self::Ptr(v) => v.is_empty(),
            Self::Soa(v) => v.is_empty(),
            Self::Srv(v) => v.is_empty(),
        }
    }
}

/// DNS fan-out report: one (possibly empty) list per record type.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DnsRecords {
    #[serde(rename = "A")]
    pub a: Vec<Ipv4Addr>,
    #[serde(rename = "AAAA")]
    pub aaaa: Vec<Ipv6Addr>,
    #[serde(rename = "MX")]
    pub mx: Vec<MxRecord>,
    #[serde(rename = "TXT")]
    pub txt: Vec<Vec<String>>,
    #[serde(rename = "NS")]
    pub ns: Vec<String>,
    #[serde(rename = "CNAME")]
    pub cname: Vec<String>,
    #[serde(rename = "SOA")]
    pub soa: Vec<SoaRecord>,
    #[serde(rename = "SRV")]
    pub srv: Vec<SrvRecord>,
    #[serde(rename = "PTR")]
    pub ptr: Vec<String>,
}

impl DnsRecords {
    /// Store an answer in its record-type slot.
    pub fn set(&mut self, records: RecordSet) {
        match records {
            RecordSet::A(v) => self.a = v,
            RecordSet::Aaaa(v) => self.aaaa = v,
            RecordSet::Mx(v) => self.mx = v,
            RecordSet::Txt(v) => self.txt = v,
            RecordSet::Ns(v) => self.ns = v,
            RecordSet::Cname(v) => self.cname = v,
            RecordSet::Soa(v) => self.soa = v,
            RecordSet::Srv(v) => self.srv = v,
            RecordSet::Ptr(v) => self.ptr = v,
        }
    }

    /// Collapse per-type results; failed types stay empty.
    pub fn from_results(results: Vec<ProbeResult<RecordSet>>) -> Self {
        let mut records = Self::default();
        for result in results {
            if let Some(set) = result.payload {
                records.set(set);
            }
        }
        records
    }
}

/// A recognised hosted-mail provider derived from an MX exchange.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MailService {
    pub provider: String,
    pub value: String,
}

/// Mail configuration report.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MailConfigReport {
    pub mx_records: Vec<MxRecord>,
    /// Email authentication / verification TXT records only.
    pub txt_records: Vec<Vec<String>>,
    pub mail_services: Vec<MailService>,
}

/// Value of a parsed `key=value` TXT chunk; bare keys map to `true`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum TxtValue {
    Text(String),
    Flag(bool),
}

/// TXT records probe report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum TxtRecordsReport {
    Skipped { skipped: String },
    Parsed(BTreeMap<String, TxtValue>),
}

// ==================== Blocklist ====================

/// A named public resolver used for blocklist comparison.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlocklistResolver {
    pub name: String,
    pub ip: IpAddr,
}

/// Verdict of one resolver.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BlocklistEntry {
    pub server: String,
    pub is_blocked: bool,
}

/// One entry per configured resolver, in table order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlocklistReport {
    pub blocklists: Vec<BlocklistEntry>,
}

// ==================== WHOIS ====================

/// Parsed WHOIS response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum WhoisRecord {
    NoMatch { error: String },
    Fields(BTreeMap<String, String>),
}

/// WHOIS probe report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WhoisReport {
    pub internic_data: WhoisRecord,
}

// ==================== TLS ====================

/// Ephemeral key-exchange parameters of a TLS handshake.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EphemeralKeyInfo {
    /// `"ECDH"`, `"DH"` or `"KEM"`.
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u16>,
}

/// Negotiated TLS parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TlsReport {
    /// e.g. `"TLSv1.3"`.
    pub protocol: String,
    /// e.g. `"TLS_AES_256_GCM_SHA384"`.
    pub cipher: String,
    /// Protocol version the cipher suite belongs to.
    pub cipher_version: String,
    pub ephemeral: Option<EphemeralKeyInfo>,
    /// Whether the certificate chain validated against the bundled web roots.
    pub authorized: bool,
    pub authorization_error: Option<String>,
}

// ==================== DNS server / IP ====================

/// One address of the host with its reverse name and `DoH` support.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DnsServerInfo {
    pub address: Ipv4Addr,
    pub hostname: Option<String>,
    pub doh_direct_supports: bool,
}

/// DNS server probe report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum DnsServerReport {
    Skipped { skipped: String },
    Servers { domain: String, dns: Vec<DnsServerInfo> },
}

/// First resolved address of a host.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IpLookup {
    pub ip: IpAddr,
    pub family: u8,
}

// ==================== Aggregate report ====================

/// Payload of any probe kind.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum ProbePayload {
    Ports(PortScanReport),
    Dns(DnsRecords),
    Blocklist(BlocklistReport),
    Whois(WhoisReport),
    Tls(TlsReport),
    MailConfig(MailConfigReport),
    TxtRecords(TxtRecordsReport),
    DnsServer(DnsServerReport),
    Ip(IpLookup),
}

/// Aggregate of every dispatched probe, keyed by kind.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub target: String,
    pub results: BTreeMap<ProbeKind, ProbeResult<ProbePayload>>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_kind_from_str_roundtrip() {
        for kind in ProbeKind::ALL {
            assert_eq!(kind.to_string().parse::<ProbeKind>().unwrap(), kind);
        }
        assert!("traceroute".parse::<ProbeKind>().is_err());
    }

    #[test]
    fn test_probe_kind_serde_matches_display() {
        for kind in ProbeKind::ALL {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{kind}\""));
        }
    }

    #[test]
    fn test_dns_record_type_from_str_case_insensitive() {
        assert_eq!("aaaa".parse::<DnsRecordType>().unwrap(), DnsRecordType::Aaaa);
        assert_eq!("Srv".parse::<DnsRecordType>().unwrap(), DnsRecordType::Srv);
        assert!("CAA".parse::<DnsRecordType>().is_err());
    }

    #[test]
    fn test_record_set_empty_matches_type() {
        for record_type in DnsRecordType::ALL {
            let set = RecordSet::empty(record_type);
            assert_eq!(set.record_type(), record_type);
            assert!(set.is_empty());
        }
    }

    #[test]
    fn test_probe_result_failed_classifies_timeout() {
        let result: ProbeResult<()> = ProbeResult::failed(ProbeError::Timeout("3000 ms".into()));
        assert_eq!(result.status, ProbeStatus::Timeout);
        let result: ProbeResult<()> = ProbeResult::failed(ProbeError::NotFound("x".into()));
        assert_eq!(result.status, ProbeStatus::Error);
    }

    #[test]
    fn test_dns_records_serialize_schema() {
        let mut records = DnsRecords::default();
        records.set(RecordSet::A(vec![Ipv4Addr::new(93, 184, 216, 34)]));
        let json = serde_json::to_value(&records).unwrap();
        assert_eq!(json["A"][0], "93.184.216.34");
        assert_eq!(json["AAAA"], serde_json::json!([]));
        for key in ["A", "AAAA", "MX", "TXT", "NS", "CNAME", "SOA", "SRV", "PTR"] {
            assert!(json.get(key).is_some(), "missing {key}");
        }
    }

    #[test]
    fn test_whois_no_match_serializes_flat() {
        let report = WhoisReport {
            internic_data: WhoisRecord::NoMatch {
                error: "nope".to_string(),
            },
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json, serde_json::json!({"internicData": {"error": "nope"}}));
    }

    #[test]
    fn test_tls_report_field_names() {
        let report = TlsReport {
            protocol: "TLSv1.3".into(),
            cipher: "TLS_AES_128_GCM_SHA256".into(),
            cipher_version: "TLSv1.3".into(),
            ephemeral: None,
            authorized: false,
            authorization_error: Some("expired".into()),
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["cipherVersion"], "TLSv1.3");
        assert_eq!(json["authorizationError"], "expired");
        assert_eq!(json["authorized"], false);
    }
}
