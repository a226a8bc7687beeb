//! WHOIS lookup module: raw port-43 exchange and key/value parsing.

use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;
use std::time::Instant;

use log::{debug, trace};
use regex::Regex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::config::WhoisConfig;
use crate::error::{HostscopeResult, ProbeError};
use crate::types::{WhoisRecord, WhoisReport};

use super::deadline::try_with_deadline;
use super::registrable_domain;

const NO_MATCH_MARKER: &str = "No match for";
const NO_MATCH_ERROR: &str = "No matches found for domain in internic database";

/// Runs of non-word characters in a key.
static NON_WORD: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9_]+").ok());

/// Query the WHOIS server for the registrable domain of `host`.
pub async fn whois_lookup(host: &str, config: &WhoisConfig) -> HostscopeResult<WhoisReport> {
    let domain = registrable_domain(host);
    let start_time = Instant::now();
    debug!("[WHOIS] Querying {}:{} for {domain}", config.server, config.port);

    let raw = try_with_deadline(
        config.timeout(),
        WhoisSession::new(&config.server, config.port).run(&domain),
    )
    .await?;

    debug!(
        "[WHOIS] {domain}: {} byte(s), took {:?}",
        raw.len(),
        start_time.elapsed()
    );
    Ok(WhoisReport {
        internic_data: parse_whois_data(&raw),
    })
}

/// One query/response exchange over a plain TCP connection.
///
/// Dropping a session in any state closes its socket.
enum WhoisSession {
    Connecting { server: String, port: u16 },
    Sending(TcpStream),
    Receiving { stream: TcpStream, buf: Vec<u8> },
    Closed(String),
}

impl WhoisSession {
    fn new(server: &str, port: u16) -> Self {
        Self::Connecting {
            server: server.to_string(),
            port,
        }
    }

    async fn run(mut self, domain: &str) -> HostscopeResult<String> {
        loop {
            self = match self {
                Self::Closed(response) => return Ok(response),
                state => state.step(domain).await?,
            };
        }
    }

    async fn step(self, domain: &str) -> HostscopeResult<Self> {
        match self {
            Self::Connecting { server, port } => {
                let stream = TcpStream::connect((server.as_str(), port))
                    .await
                    .map_err(|e| ProbeError::Unreachable(format!("{server}:{port}: {e}")))?;
                trace!("[WHOIS] Connected to {server}:{port}");
                Ok(Self::Sending(stream))
            }
            Self::Sending(mut stream) => {
                stream
                    .write_all(format!("{domain}\r\n").as_bytes())
                    .await
                    .map_err(|e| ProbeError::from_io("whois write", &e))?;
                Ok(Self::Receiving {
                    stream,
                    buf: Vec::new(),
                })
            }
            Self::Receiving { mut stream, mut buf } => {
                stream
                    .read_to_end(&mut buf)
                    .await
                    .map_err(|e| ProbeError::from_io("whois read", &e))?;
                Ok(Self::Closed(String::from_utf8_lossy(&buf).into_owned()))
            }
            closed @ Self::Closed(_) => Ok(closed),
        }
    }
}

/// Parse a complete WHOIS response.
///
/// - A "No match for" marker anywhere yields a single error field.
/// - Lines are split at the first colon; keys have non-word runs replaced with `_`.
/// - Lines without a colon are appended, space-separated, to the previous key.
/// - Empty values are dropped.
/// - Repeated keys go to `key1`, `key2`, ... and never overwrite.
pub(crate) fn parse_whois_data(raw: &str) -> WhoisRecord {
    if raw.contains(NO_MATCH_MARKER) {
        return WhoisRecord::NoMatch {
            error: NO_MATCH_ERROR.to_string(),
        };
    }

    let mut fields: BTreeMap<String, String> = BTreeMap::new();
    let mut occurrences: HashMap<String, usize> = HashMap::new();
    let mut last_key: Option<String> = None;

    for line in raw.lines() {
        let Some((key, value)) = line.split_once(':') else {
            let continuation = line.trim();
            if !continuation.is_empty()
                && let Some(value) = last_key.as_ref().and_then(|k| fields.get_mut(k))
            {
                value.push(' ');
                value.push_str(continuation);
            }
            continue;
        };

        let value = value.trim();
        if value.is_empty() {
            continue;
        }

        let key = normalize_key(key.trim());
        let slot = if fields.contains_key(&key) {
            let count = occurrences.entry(key.clone()).or_insert(0);
            loop {
                *count += 1;
                let candidate = format!("{key}{count}");
                if !fields.contains_key(&candidate) {
                    break candidate;
                }
            }
        } else {
            key
        };
        fields.insert(slot.clone(), value.to_string());
        last_key = Some(slot);
    }

    WhoisRecord::Fields(fields)
}

fn normalize_key(key: &str) -> String {
    match NON_WORD.as_ref() {
        Some(re) => re.replace_all(key, "_").into_owned(),
        None => key.to_string(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    fn fields(record: WhoisRecord) -> BTreeMap<String, String> {
        match record {
            WhoisRecord::Fields(map) => map,
            WhoisRecord::NoMatch { error } => panic!("unexpected no-match: {error}"),
        }
    }

    #[test]
    fn test_parse_basic_fields() {
        let raw = "   Domain Name: EXAMPLE.COM\r\n   Registry Domain ID: 2336799_DOMAIN_COM-VRSN\r\n   Registrar WHOIS Server: whois.iana.org\r\n";
        let map = fields(parse_whois_data(raw));
        assert_eq!(map.get("Domain_Name").unwrap(), "EXAMPLE.COM");
        assert_eq!(
            map.get("Registry_Domain_ID").unwrap(),
            "2336799_DOMAIN_COM-VRSN"
        );
        assert_eq!(map.get("Registrar_WHOIS_Server").unwrap(), "whois.iana.org");
    }

    #[test]
    fn test_value_keeps_later_colons() {
        let raw = "Registrar URL: http://www.iana.org\r\n";
        let map = fields(parse_whois_data(raw));
        assert_eq!(map.get("Registrar_URL").unwrap(), "http://www.iana.org");
    }

    #[test]
    fn test_continuation_line_is_folded() {
        let raw = "NOTICE: The expiration date displayed in this record\r\n   is the date the registrar's sponsorship expires.\r\n\r\nDomain Name: EXAMPLE.COM\r\n";
        let map = fields(parse_whois_data(raw));
        assert_eq!(
            map.get("NOTICE").unwrap(),
            "The expiration date displayed in this record is the date the registrar's sponsorship expires."
        );
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_duplicate_keys_are_numbered() {
        let raw = "Name Server: A.IANA-SERVERS.NET\r\nName Server: B.IANA-SERVERS.NET\r\nName Server: C.IANA-SERVERS.NET\r\n";
        let map = fields(parse_whois_data(raw));
        assert_eq!(map.get("Name_Server").unwrap(), "A.IANA-SERVERS.NET");
        assert_eq!(map.get("Name_Server1").unwrap(), "B.IANA-SERVERS.NET");
        assert_eq!(map.get("Name_Server2").unwrap(), "C.IANA-SERVERS.NET");
    }

    #[test]
    fn test_duplicate_skips_taken_numeral() {
        let raw = "Status1: literal\r\nStatus: first\r\nStatus: second\r\n";
        let map = fields(parse_whois_data(raw));
        assert_eq!(map.get("Status1").unwrap(), "literal");
        assert_eq!(map.get("Status").unwrap(), "first");
        assert_eq!(map.get("Status2").unwrap(), "second");
    }

    #[test]
    fn test_continuation_follows_numbered_key() {
        let raw = "Status: ok\r\nStatus: clientHold\r\n  pending renewal\r\n";
        let map = fields(parse_whois_data(raw));
        assert_eq!(map.get("Status").unwrap(), "ok");
        assert_eq!(map.get("Status1").unwrap(), "clientHold pending renewal");
    }

    #[test]
    fn test_indented_url_line_is_its_own_key() {
        let raw = "Status: clientHold\r\n  https://icann.org/epp\r\n";
        let map = fields(parse_whois_data(raw));
        assert_eq!(map.get("Status").unwrap(), "clientHold");
        assert_eq!(map.get("https").unwrap(), "//icann.org/epp");
    }

    #[test]
    fn test_bare_lf_line_breaks() {
        let raw = "Domain Name: EXAMPLE.COM\nName Server: A.IANA-SERVERS.NET\n  backup\nName Server: B.IANA-SERVERS.NET\n";
        let map = fields(parse_whois_data(raw));
        assert_eq!(map.len(), 3);
        assert_eq!(map.get("Domain_Name").unwrap(), "EXAMPLE.COM");
        assert_eq!(map.get("Name_Server").unwrap(), "A.IANA-SERVERS.NET backup");
        assert_eq!(map.get("Name_Server1").unwrap(), "B.IANA-SERVERS.NET");
    }

    #[test]
    fn test_empty_values_dropped() {
        let raw = "Registrant:\r\nDNSSEC: unsigned\r\nDomain Status:   \r\n";
        let map = fields(parse_whois_data(raw));
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("DNSSEC").unwrap(), "unsigned");
    }

    #[test]
    fn test_leading_continuation_without_key_ignored() {
        let map = fields(parse_whois_data("banner text\r\nDomain Name: X.COM\r\n"));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_no_match() {
        let raw = "No match for \"NOPE-12345.COM\".\r\n>>> Last update of whois database: 2024-01-01T00:00:00Z <<<\r\n";
        assert_eq!(
            parse_whois_data(raw),
            WhoisRecord::NoMatch {
                error: NO_MATCH_ERROR.to_string()
            }
        );
        let json = serde_json::to_value(parse_whois_data(raw)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"error": "No matches found for domain in internic database"})
        );
    }

    #[test]
    fn test_normalize_key() {
        assert_eq!(
            normalize_key("Registrar Abuse Contact Email"),
            "Registrar_Abuse_Contact_Email"
        );
        assert_eq!(
            normalize_key(">>> Last update of whois database"),
            "_Last_update_of_whois_database"
        );
        assert_eq!(normalize_key("already_ok"), "already_ok");
    }

    #[tokio::test]
    async fn test_lookup_against_local_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut query = vec![0u8; 64];
            let n = socket.read(&mut query).await.unwrap();
            socket
                .write_all(b"Domain Name: EXAMPLE.COM\r\nName Server: A.IANA-SERVERS.NET\r\n")
                .await
                .unwrap();
            String::from_utf8_lossy(&query[..n]).into_owned()
        });

        let config = WhoisConfig {
            server: "127.0.0.1".to_string(),
            port,
            timeout_ms: 5000,
        };
        let report = whois_lookup("www.example.com", &config).await.unwrap();
        assert_eq!(server.await.unwrap(), "example.com\r\n");
        let map = fields(report.internic_data);
        assert_eq!(map.get("Domain_Name").unwrap(), "EXAMPLE.COM");
    }

    #[tokio::test]
    async fn test_connection_refused_is_unreachable() {
        let port = {
            let probe = TcpListener::bind("127.0.0.1:0").await.unwrap();
            probe.local_addr().unwrap().port()
        };
        let config = WhoisConfig {
            server: "127.0.0.1".to_string(),
            port,
            timeout_ms: 5000,
        };
        let err = whois_lookup("example.com", &config).await.unwrap_err();
        assert!(matches!(err, ProbeError::Unreachable(_)));
    }

    #[tokio::test]
    async fn test_silent_server_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let _server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(std::time::Duration::from_secs(30)).await;
            drop(socket);
        });
        let config = WhoisConfig {
            server: "127.0.0.1".to_string(),
            port,
            timeout_ms: 200,
        };
        let err = whois_lookup("example.com", &config).await.unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    #[ignore = "requires network access"]
    async fn test_whois_lookup_real() {
        let report = whois_lookup("https://www.google.com/", &WhoisConfig::default())
            .await
            .unwrap();
        let map = fields(report.internic_data);
        assert!(map.contains_key("Domain_Name"));
    }
}
