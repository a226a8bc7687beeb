//! Probe configuration: serde defaults, optional TOML file, environment overrides.

use std::collections::BTreeSet;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{HostscopeResult, ProbeError};
use crate::types::{BlocklistResolver, ProbeKind};

/// Environment variable replacing the configured port list (comma-separated).
pub const PORTS_ENV_VAR: &str = "PORTS_TO_CHECK";

/// Commonly used ports checked when no override is configured.
pub const DEFAULT_PORTS: [u16; 32] = [
    20, 21, 22, 23, 25, 53, 80, 67, 68, 69, 110, 119, 123, 143, 156, 161, 162, 179, 194, 389, 443,
    587, 993, 995, 3000, 3306, 3389, 5060, 5900, 8000, 8080, 8888,
];

/// Named resolvers used for blocklist comparison (family filters and public resolvers).
const DEFAULT_BLOCKLIST_RESOLVERS: [(&str, Ipv4Addr); 17] = [
    ("AdGuard", Ipv4Addr::new(94, 140, 14, 14)),
    ("AdGuard Family", Ipv4Addr::new(94, 140, 14, 15)),
    ("CleanBrowsing Adult", Ipv4Addr::new(185, 228, 168, 10)),
    ("CleanBrowsing Family", Ipv4Addr::new(185, 228, 168, 168)),
    ("CleanBrowsing Security", Ipv4Addr::new(185, 228, 168, 9)),
    ("CloudFlare", Ipv4Addr::new(1, 1, 1, 1)),
    ("CloudFlare Family", Ipv4Addr::new(1, 1, 1, 3)),
    ("Comodo Secure", Ipv4Addr::new(8, 26, 56, 26)),
    ("Google DNS", Ipv4Addr::new(8, 8, 8, 8)),
    ("Neustar Family", Ipv4Addr::new(156, 154, 70, 3)),
    ("Neustar Protection", Ipv4Addr::new(156, 154, 70, 2)),
    ("Norton Family", Ipv4Addr::new(199, 85, 126, 20)),
    ("OpenDNS", Ipv4Addr::new(208, 67, 222, 222)),
    ("OpenDNS Family", Ipv4Addr::new(208, 67, 222, 123)),
    ("Quad9", Ipv4Addr::new(9, 9, 9, 9)),
    ("Yandex Family", Ipv4Addr::new(77, 88, 8, 7)),
    ("Yandex Safe", Ipv4Addr::new(77, 88, 8, 88)),
];

/// Addresses filtering resolvers answer with instead of the real record.
pub const DEFAULT_SENTINELS: [IpAddr; 16] = [
    IpAddr::V4(Ipv4Addr::new(146, 112, 61, 106)),
    IpAddr::V4(Ipv4Addr::new(185, 228, 168, 10)),
    IpAddr::V4(Ipv4Addr::new(8, 26, 56, 26)),
    IpAddr::V4(Ipv4Addr::new(9, 9, 9, 9)),
    IpAddr::V4(Ipv4Addr::new(208, 69, 38, 170)),
    IpAddr::V4(Ipv4Addr::new(208, 69, 39, 170)),
    IpAddr::V4(Ipv4Addr::new(208, 67, 222, 222)),
    IpAddr::V4(Ipv4Addr::new(208, 67, 222, 123)),
    IpAddr::V4(Ipv4Addr::new(199, 85, 126, 10)),
    IpAddr::V4(Ipv4Addr::new(199, 85, 126, 20)),
    IpAddr::V4(Ipv4Addr::new(156, 154, 70, 22)),
    IpAddr::V4(Ipv4Addr::new(77, 88, 8, 7)),
    IpAddr::V4(Ipv4Addr::new(77, 88, 8, 8)),
    IpAddr::V4(Ipv4Addr::LOCALHOST),
    IpAddr::V4(Ipv4Addr::UNSPECIFIED),
    IpAddr::V6(Ipv6Addr::LOCALHOST),
];

/// Port scanner settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PortScanConfig {
    pub ports: Vec<u16>,
    /// Per-port TCP connect budget.
    pub connect_timeout_ms: u64,
    /// Budget for the whole scan; unresolved ports count as failed.
    pub scan_deadline_ms: u64,
}

impl Default for PortScanConfig {
    fn default() -> Self {
        Self {
            ports: DEFAULT_PORTS.to_vec(),
            connect_timeout_ms: 1500,
            scan_deadline_ms: 8000,
        }
    }
}

impl PortScanConfig {
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub const fn scan_deadline(&self) -> Duration {
        Duration::from_millis(self.scan_deadline_ms)
    }
}

/// DNS fan-out settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DnsConfig {
    pub nameservers: Vec<IpAddr>,
    /// Use the host's resolver configuration instead of `nameservers`.
    pub use_system_resolver: bool,
    pub query_timeout_ms: u64,
    pub mail_query_timeout_ms: u64,
    pub txt_timeout_ms: u64,
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            nameservers: vec![
                IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8)),
                IpAddr::V4(Ipv4Addr::new(1, 1, 1, 1)),
            ],
            use_system_resolver: false,
            query_timeout_ms: 3000,
            mail_query_timeout_ms: 4000,
            txt_timeout_ms: 5000,
        }
    }
}

impl DnsConfig {
    pub const fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    pub const fn mail_query_timeout(&self) -> Duration {
        Duration::from_millis(self.mail_query_timeout_ms)
    }

    pub const fn txt_timeout(&self) -> Duration {
        Duration::from_millis(self.txt_timeout_ms)
    }
}

/// Blocklist checker settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BlocklistConfig {
    pub resolvers: Vec<BlocklistResolver>,
    pub sentinels: Vec<IpAddr>,
    pub query_timeout_ms: u64,
}

impl Default for BlocklistConfig {
    fn default() -> Self {
        Self {
            resolvers: DEFAULT_BLOCKLIST_RESOLVERS
                .iter()
                .map(|(name, ip)| BlocklistResolver {
                    name: (*name).to_string(),
                    ip: IpAddr::V4(*ip),
                })
                .collect(),
            sentinels: DEFAULT_SENTINELS.to_vec(),
            query_timeout_ms: 2000,
        }
    }
}

impl BlocklistConfig {
    pub const fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }
}

/// WHOIS client settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WhoisConfig {
    pub server: String,
    pub port: u16,
    pub timeout_ms: u64,
}

impl Default for WhoisConfig {
    fn default() -> Self {
        Self {
            server: "whois.internic.net".to_string(),
            port: 43,
            timeout_ms: 10_000,
        }
    }
}

impl WhoisConfig {
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// TLS inspector settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TlsConfig {
    pub port: u16,
    pub handshake_timeout_ms: u64,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            port: 443,
            handshake_timeout_ms: 5000,
        }
    }
}

impl TlsConfig {
    pub const fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }
}

/// DNS server probe settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DnsServerConfig {
    pub doh_timeout_ms: u64,
    pub reverse_timeout_ms: u64,
}

impl Default for DnsServerConfig {
    fn default() -> Self {
        Self {
            doh_timeout_ms: 2000,
            reverse_timeout_ms: 3000,
        }
    }
}

impl DnsServerConfig {
    pub const fn doh_timeout(&self) -> Duration {
        Duration::from_millis(self.doh_timeout_ms)
    }

    pub const fn reverse_timeout(&self) -> Duration {
        Duration::from_millis(self.reverse_timeout_ms)
    }
}

/// Top-level configuration for every probe.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProbeConfig {
    pub ports: PortScanConfig,
    pub dns: DnsConfig,
    pub blocklist: BlocklistConfig,
    pub whois: WhoisConfig,
    pub tls: TlsConfig,
    pub dns_server: DnsServerConfig,
    /// Outer budget the scheduler applies to each whole probe.
    pub probe_timeout_ms: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            ports: PortScanConfig::default(),
            dns: DnsConfig::default(),
            blocklist: BlocklistConfig::default(),
            whois: WhoisConfig::default(),
            tls: TlsConfig::default(),
            dns_server: DnsServerConfig::default(),
            probe_timeout_ms: 30_000,
        }
    }
}

impl ProbeConfig {
    /// Load from an optional TOML file, then apply process environment overrides.
    pub fn load(path: Option<&Path>) -> HostscopeResult<Self> {
        let config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|e| {
                    ProbeError::Config(format!("Cannot read {}: {e}", path.display()))
                })?;
                Self::from_toml_str(&text)?
            }
            None => Self::default(),
        };
        let config = config.with_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document; missing tables and fields keep their defaults.
    pub fn from_toml_str(text: &str) -> HostscopeResult<Self> {
        toml::from_str(text).map_err(|e| ProbeError::Config(format!("Invalid TOML: {e}")))
    }

    /// Apply overrides read through `lookup` (the process environment in production).
    pub fn with_env_overrides<F>(mut self, lookup: F) -> HostscopeResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(PORTS_ENV_VAR).filter(|v| !v.trim().is_empty()) {
            self.ports.ports = parse_port_list(&raw)?;
        }
        Ok(self)
    }

    /// Reject settings no probe can run with.
    pub fn validate(&self) -> HostscopeResult<()> {
        if self.ports.ports.is_empty() {
            return Err(ProbeError::Config("Port list is empty".to_string()));
        }
        if self.blocklist.resolvers.is_empty() {
            return Err(ProbeError::Config(
                "Blocklist resolver table is empty".to_string(),
            ));
        }
        if !self.dns.use_system_resolver && self.dns.nameservers.is_empty() {
            return Err(ProbeError::Config(
                "No DNS nameservers configured".to_string(),
            ));
        }
        let timeouts = [
            ("ports.connect_timeout_ms", self.ports.connect_timeout_ms),
            ("ports.scan_deadline_ms", self.ports.scan_deadline_ms),
            ("dns.query_timeout_ms", self.dns.query_timeout_ms),
            ("dns.mail_query_timeout_ms", self.dns.mail_query_timeout_ms),
            ("dns.txt_timeout_ms", self.dns.txt_timeout_ms),
            ("blocklist.query_timeout_ms", self.blocklist.query_timeout_ms),
            ("whois.timeout_ms", self.whois.timeout_ms),
            ("tls.handshake_timeout_ms", self.tls.handshake_timeout_ms),
            ("dns_server.doh_timeout_ms", self.dns_server.doh_timeout_ms),
            ("dns_server.reverse_timeout_ms", self.dns_server.reverse_timeout_ms),
            ("probe_timeout_ms", self.probe_timeout_ms),
        ];
        if let Some((name, _)) = timeouts.iter().find(|(_, ms)| *ms == 0) {
            return Err(ProbeError::Config(format!("{name} must be greater than 0")));
        }
        Ok(())
    }

    /// Outer budget for one probe kind, never shorter than the probe's own deadline.
    pub fn probe_timeout(&self, kind: ProbeKind) -> Duration {
        let inner_ms = match kind {
            ProbeKind::Port => self.ports.scan_deadline_ms,
            ProbeKind::Whois => self.whois.timeout_ms,
            ProbeKind::Tls => self.tls.handshake_timeout_ms,
            ProbeKind::DnsRecord => self.dns.query_timeout_ms,
            ProbeKind::MailConfig => self.dns.mail_query_timeout_ms,
            ProbeKind::TxtRecords => self.dns.txt_timeout_ms,
            ProbeKind::Blocklist => self.blocklist.query_timeout_ms,
            ProbeKind::DnsServer => self
                .dns_server
                .doh_timeout_ms
                .max(self.dns_server.reverse_timeout_ms),
            ProbeKind::Ip => 0,
        };
        Duration::from_millis(self.probe_timeout_ms.max(inner_ms.saturating_add(1000)))
    }
}

/// Parse a comma-separated port list; duplicates collapse, order is ascending.
pub fn parse_port_list(raw: &str) -> HostscopeResult<Vec<u16>> {
    let mut ports = BTreeSet::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let port: u16 = entry
            .parse()
            .map_err(|_| ProbeError::Config(format!("Invalid port in {PORTS_ENV_VAR}: {entry}")))?;
        ports.insert(port);
    }
    if ports.is_empty() {
        return Err(ProbeError::Config(format!("{PORTS_ENV_VAR} has no ports")));
    }
    Ok(ports.into_iter().collect())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ProbeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.ports.ports.len(), 32);
        assert_eq!(config.blocklist.resolvers.len(), 17);
        assert_eq!(config.ports.connect_timeout(), Duration::from_millis(1500));
        assert_eq!(config.ports.scan_deadline(), Duration::from_secs(8));
        assert_eq!(config.dns.query_timeout(), Duration::from_secs(3));
        assert_eq!(config.blocklist.query_timeout(), Duration::from_secs(2));
        assert_eq!(config.tls.handshake_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_default_blocklist_names_unique() {
        let config = BlocklistConfig::default();
        let names: BTreeSet<_> = config.resolvers.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names.len(), config.resolvers.len());
    }

    #[test]
    fn test_from_toml_partial_keeps_defaults() {
        let config = ProbeConfig::from_toml_str(
            r#"
            probe_timeout_ms = 12000

            [ports]
            ports = [22, 80, 9999]

            [whois]
            server = "whois.example.net"
            "#,
        )
        .unwrap();
        assert_eq!(config.ports.ports, vec![22, 80, 9999]);
        assert_eq!(config.ports.connect_timeout_ms, 1500);
        assert_eq!(config.whois.server, "whois.example.net");
        assert_eq!(config.whois.port, 43);
        assert_eq!(config.probe_timeout_ms, 12_000);
        assert_eq!(config.dns, DnsConfig::default());
    }

    #[test]
    fn test_from_toml_custom_resolvers() {
        let config = ProbeConfig::from_toml_str(
            r#"
            [dns]
            nameservers = ["9.9.9.9"]

            [[blocklist.resolvers]]
            name = "Quad9"
            ip = "9.9.9.9"
            "#,
        )
        .unwrap();
        assert_eq!(config.dns.nameservers, vec!["9.9.9.9".parse::<IpAddr>().unwrap()]);
        assert_eq!(config.blocklist.resolvers.len(), 1);
        assert_eq!(config.blocklist.resolvers[0].name, "Quad9");
    }

    #[test]
    fn test_from_toml_invalid() {
        assert!(matches!(
            ProbeConfig::from_toml_str("ports = 5"),
            Err(ProbeError::Config(_))
        ));
    }

    #[test]
    fn test_env_override_ports() {
        let config = ProbeConfig::default()
            .with_env_overrides(|key| (key == PORTS_ENV_VAR).then(|| "443, 22,80,22".to_string()))
            .unwrap();
        assert_eq!(config.ports.ports, vec![22, 80, 443]);
    }

    #[test]
    fn test_env_override_blank_is_ignored() {
        let config = ProbeConfig::default()
            .with_env_overrides(|_| Some("   ".to_string()))
            .unwrap();
        assert_eq!(config.ports.ports, DEFAULT_PORTS.to_vec());
    }

    #[test]
    fn test_parse_port_list_rejects_garbage() {
        assert!(parse_port_list("80,http").is_err());
        assert!(parse_port_list("70000").is_err());
        assert!(parse_port_list(",,").is_err());
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let mut config = ProbeConfig::default();
        config.tls.handshake_timeout_ms = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("tls.handshake_timeout_ms"));
    }

    #[test]
    fn test_probe_timeout_covers_inner_deadline() {
        let mut config = ProbeConfig::default();
        config.probe_timeout_ms = 2000;
        assert_eq!(config.probe_timeout(ProbeKind::Port), Duration::from_secs(9));
        assert_eq!(config.probe_timeout(ProbeKind::Ip), Duration::from_secs(2));
        config.probe_timeout_ms = 30_000;
        assert_eq!(config.probe_timeout(ProbeKind::Whois), Duration::from_secs(30));
    }

    #[test]
    fn test_validate_rejects_empty_ports() {
        let mut config = ProbeConfig::default();
        config.ports.ports.clear();
        assert!(config.validate().is_err());
    }
}
