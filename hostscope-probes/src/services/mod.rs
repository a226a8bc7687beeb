//! Probe service façade and target normalisation.
//!
//! Every method on [`ProbeService`] normalises its target first, then runs one probe
//! with the settings of the shared [`ProbeConfig`].

mod blocklist;
pub(crate) mod deadline;
mod dns;
mod dns_server;
mod ip;
mod mail_config;
mod ports;
mod resolver;
mod tls;
mod txt_records;
mod whois;

use std::net::IpAddr;
use std::sync::Arc;

use url::{Host, Url};

use crate::config::ProbeConfig;
use crate::error::{HostscopeResult, ProbeError};
use crate::types::{
    BlocklistReport, DnsRecords, DnsServerReport, IpLookup, MailConfigReport, PortScanReport,
    TlsReport, TxtRecordsReport, WhoisReport,
};

/// Maximum length of a DNS name in presentation form.
const MAX_HOST_LEN: usize = 253;

/// Reduce a hostname, IP literal or URL to a bare ASCII host.
///
/// Strips scheme, userinfo, port, path and query, converts IDNs to ASCII and
/// rejects empty, unparsable or overlong input.
pub fn normalize_target(input: &str) -> HostscopeResult<String> {
    let input = input.trim();
    if input.is_empty() {
        return Err(ProbeError::InvalidInput("Target is required".to_string()));
    }
    // Bare IPv6 literals are not valid URL authorities.
    if let Ok(ip) = input.trim_matches(|c| c == '[' || c == ']').parse::<IpAddr>() {
        return Ok(ip.to_string());
    }

    let candidate = if input.contains("://") {
        input.to_string()
    } else {
        format!("http://{input}")
    };
    let url = Url::parse(&candidate)
        .map_err(|e| ProbeError::InvalidInput(format!("Invalid target {input}: {e}")))?;

    let host = match url.host() {
        Some(Host::Domain(domain)) => domain.trim_end_matches('.').to_ascii_lowercase(),
        Some(Host::Ipv4(ip)) => ip.to_string(),
        Some(Host::Ipv6(ip)) => ip.to_string(),
        None => return Err(ProbeError::InvalidInput(format!("No host in {input}"))),
    };
    if host.is_empty() {
        return Err(ProbeError::InvalidInput(format!("No host in {input}")));
    }
    if host.len() > MAX_HOST_LEN {
        return Err(ProbeError::InvalidInput(format!(
            "Host name exceeds maximum length of {MAX_HOST_LEN} characters (got {})",
            host.len()
        )));
    }
    Ok(host)
}

/// Public-suffix-aware registrable domain (`www.example.co.uk` → `example.co.uk`).
///
/// IP literals and hosts without a registrable part are returned unchanged.
pub fn registrable_domain(host: &str) -> String {
    if host.parse::<IpAddr>().is_ok() {
        return host.to_string();
    }
    psl::domain_str(host).unwrap_or(host).to_string()
}

/// Entry point for individual probes, usable without the scheduler.
///
/// ```rust,no_run
/// use hostscope_probes::{ProbeConfig, ProbeService};
/// # async fn demo() -> hostscope_probes::HostscopeResult<()> {
/// let service = ProbeService::new(ProbeConfig::default());
/// let ports = service.scan_ports("example.com").await?;
/// println!("open: {:?}", ports.open_ports);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct ProbeService {
    config: Arc<ProbeConfig>,
}

impl ProbeService {
    pub fn new(config: ProbeConfig) -> Self {
        Self::with_shared(Arc::new(config))
    }

    pub const fn with_shared(config: Arc<ProbeConfig>) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    /// TCP connect scan of the configured ports.
    ///
    /// Individual port failures land in `failed_ports`; only invalid input is an error.
    pub async fn scan_ports(&self, target: &str) -> HostscopeResult<PortScanReport> {
        let host = normalize_target(target)?;
        Ok(ports::scan_ports(&host, &self.config.ports).await)
    }

    /// Resolve A, AAAA, MX, TXT, NS, CNAME, SOA, SRV and PTR concurrently.
    pub async fn dns_records(&self, target: &str) -> HostscopeResult<DnsRecords> {
        let host = normalize_target(target)?;
        Ok(dns::dns_records(&host, &self.config.dns).await)
    }

    /// Compare answers of the configured filtering resolvers.
    pub async fn check_blocklists(&self, target: &str) -> HostscopeResult<BlocklistReport> {
        let host = normalize_target(target)?;
        Ok(blocklist::check_blocklists(&host, &self.config.blocklist).await)
    }

    /// Raw WHOIS query for the registrable domain of `target`.
    pub async fn whois_lookup(&self, target: &str) -> HostscopeResult<WhoisReport> {
        let host = normalize_target(target)?;
        whois::whois_lookup(&host, &self.config.whois).await
    }

    /// TLS handshake inspection; certificate problems are reported, not raised.
    pub async fn inspect_tls(&self, target: &str) -> HostscopeResult<TlsReport> {
        let host = normalize_target(target)?;
        tls::inspect_tls(&host, &self.config.tls).await
    }

    /// MX records, email-related TXT records and recognised mail providers.
    pub async fn mail_config(&self, target: &str) -> HostscopeResult<MailConfigReport> {
        let host = normalize_target(target)?;
        Ok(mail_config::mail_config(&host, &self.config.dns).await)
    }

    /// TXT records parsed into key/value pairs.
    pub async fn txt_records(&self, target: &str) -> HostscopeResult<TxtRecordsReport> {
        let host = normalize_target(target)?;
        txt_records::txt_records(&host, &self.config.dns).await
    }

    /// Reverse names and `DoH` support of every A address.
    pub async fn dns_servers(&self, target: &str) -> HostscopeResult<DnsServerReport> {
        let host = normalize_target(target)?;
        Ok(dns_server::dns_servers(&host, &self.config.dns_server).await)
    }

    /// First resolved address and its family.
    pub async fn lookup_ip(&self, target: &str) -> HostscopeResult<IpLookup> {
        let host = normalize_target(target)?;
        ip::lookup_ip(&host).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_target_normal() {
        assert_eq!(normalize_target("example.com").unwrap(), "example.com");
    }

    #[test]
    fn test_normalize_target_strips_url_parts() {
        assert_eq!(
            normalize_target("https://user:pw@www.Example.com:8443/path?q=1#frag").unwrap(),
            "www.example.com"
        );
        assert_eq!(normalize_target("example.com/").unwrap(), "example.com");
        assert_eq!(normalize_target("ftp://files.example.org").unwrap(), "files.example.org");
    }

    #[test]
    fn test_normalize_target_idn() {
        assert_eq!(normalize_target("münchen.de").unwrap(), "xn--mnchen-3ya.de");
    }

    #[test]
    fn test_normalize_target_ipv4_passthrough() {
        assert_eq!(normalize_target("1.2.3.4").unwrap(), "1.2.3.4");
        assert_eq!(normalize_target("http://1.2.3.4:8080/").unwrap(), "1.2.3.4");
    }

    #[test]
    fn test_normalize_target_ipv6_passthrough() {
        assert_eq!(normalize_target("::1").unwrap(), "::1");
        assert_eq!(normalize_target("[2606:4700::1111]").unwrap(), "2606:4700::1111");
        assert_eq!(
            normalize_target("https://[2606:4700::1111]:443/").unwrap(),
            "2606:4700::1111"
        );
    }

    #[test]
    fn test_normalize_target_trims_whitespace_and_dot() {
        assert_eq!(normalize_target("  example.com.  ").unwrap(), "example.com");
    }

    #[test]
    fn test_normalize_target_empty() {
        assert!(matches!(normalize_target(""), Err(ProbeError::InvalidInput(_))));
        assert!(matches!(normalize_target("   "), Err(ProbeError::InvalidInput(_))));
        assert!(matches!(normalize_target("https://"), Err(ProbeError::InvalidInput(_))));
    }

    #[test]
    fn test_normalize_target_invalid() {
        assert!(matches!(
            normalize_target("not a valid domain!!!"),
            Err(ProbeError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_normalize_target_too_long() {
        let label = "a".repeat(60);
        let host = format!("{label}.{label}.{label}.{label}.{label}.com");
        assert!(matches!(
            normalize_target(&host),
            Err(ProbeError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_registrable_domain() {
        assert_eq!(registrable_domain("www.google.com"), "google.com");
        assert_eq!(registrable_domain("a.b.example.co.uk"), "example.co.uk");
        assert_eq!(registrable_domain("example.com"), "example.com");
        assert_eq!(registrable_domain("8.8.8.8"), "8.8.8.8");
    }

    #[tokio::test]
    async fn test_service_rejects_invalid_target() {
        let service = ProbeService::default();
        assert!(matches!(
            service.scan_ports("").await,
            Err(ProbeError::InvalidInput(_))
        ));
        assert!(matches!(
            service.whois_lookup("not a valid domain!!!").await,
            Err(ProbeError::InvalidInput(_))
        ));
    }
}
