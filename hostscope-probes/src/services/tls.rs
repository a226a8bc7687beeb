//! TLS handshake inspection module.
//!
//! The handshake always proceeds; chain validation against the bundled web roots
//! is observed and reported instead of enforced.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use log::{debug, trace, warn};
use rustls::client::WebPkiServerVerifier;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::{
    CipherSuite, ClientConfig, DigitallySignedStruct, NamedGroup, ProtocolVersion, RootCertStore,
    SignatureScheme,
};
use rustls_pki_types::{CertificateDer, ServerName, UnixTime};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

use crate::config::TlsConfig;
use crate::error::{HostscopeResult, ProbeError};
use crate::types::{EphemeralKeyInfo, TlsReport};

use super::deadline::try_with_deadline;

/// Initialize the rustls `CryptoProvider` (once).
///
/// `install_default` returns `Err` only when a provider is already set.
fn ensure_crypto_provider() {
    let _ = CryptoProvider::install_default(rustls::crypto::ring::default_provider());
}

/// Outcome of the web-PKI chain check for one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Verdict {
    Trusted,
    Rejected(String),
}

/// Certificate verifier that records the web-PKI verdict and accepts every chain.
///
/// Handshake signatures are still checked by the inner verifier.
#[derive(Debug)]
struct ObservingVerifier {
    inner: Arc<WebPkiServerVerifier>,
    verdict: Mutex<Option<Verdict>>,
}

impl ObservingVerifier {
    fn new() -> HostscopeResult<Self> {
        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let inner = WebPkiServerVerifier::builder(Arc::new(roots))
            .build()
            .map_err(|e| ProbeError::Config(format!("TLS verifier: {e}")))?;
        Ok(Self {
            inner,
            verdict: Mutex::new(None),
        })
    }

    fn verdict(&self) -> Option<Verdict> {
        self.verdict.lock().ok().and_then(|v| v.clone())
    }
}

impl ServerCertVerifier for ObservingVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        let verdict = match self.inner.verify_server_cert(
            end_entity,
            intermediates,
            server_name,
            ocsp_response,
            now,
        ) {
            Ok(_) => Verdict::Trusted,
            Err(e) => Verdict::Rejected(e.to_string()),
        };
        trace!("[TLS] Chain verdict: {verdict:?}");
        if let Ok(mut slot) = self.verdict.lock() {
            *slot = Some(verdict);
        }
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.inner.supported_verify_schemes()
    }
}

/// Handshake with `host` and report the negotiated parameters.
///
/// Connect and handshake share one deadline; a timeout or transport error
/// fails the probe, an untrusted certificate does not.
pub async fn inspect_tls(host: &str, config: &TlsConfig) -> HostscopeResult<TlsReport> {
    ensure_crypto_provider();

    let server_name = ServerName::try_from(host.to_string())
        .map_err(|e| ProbeError::InvalidInput(format!("{host}: {e}")))?;
    let verifier = Arc::new(ObservingVerifier::new()?);
    let client_config = ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(verifier.clone())
        .with_no_client_auth();
    let connector = TlsConnector::from(Arc::new(client_config));

    debug!("[TLS] Starting handshake with {host}:{}", config.port);
    let start_time = Instant::now();

    let stream = try_with_deadline(config.handshake_timeout(), async {
        let tcp = TcpStream::connect((host, config.port))
            .await
            .map_err(|e| ProbeError::from_io(&format!("{host}:{}", config.port), &e))?;
        trace!("[TLS] TCP connected, took {:?}", start_time.elapsed());
        connector
            .connect(server_name, tcp)
            .await
            .map_err(|e| ProbeError::ProtocolError(format!("TLS handshake with {host}: {e}")))
    })
    .await
    .inspect_err(|e| warn!("[TLS] {host}: {e}"))?;

    let (_, connection) = stream.get_ref();
    let (authorized, authorization_error) = match verifier.verdict() {
        Some(Verdict::Trusted) => (true, None),
        Some(Verdict::Rejected(reason)) => (false, Some(reason)),
        None => (false, Some("certificate was not verified".to_string())),
    };

    let (cipher, cipher_version) = connection
        .negotiated_cipher_suite()
        .map(|suite| {
            (
                cipher_name(suite.suite()),
                protocol_name(suite.version().version),
            )
        })
        .unwrap_or_default();

    let report = TlsReport {
        protocol: connection
            .protocol_version()
            .map(protocol_name)
            .unwrap_or_default(),
        cipher,
        cipher_version,
        ephemeral: connection
            .negotiated_key_exchange_group()
            .map(|group| ephemeral_key_info(group.name())),
        authorized,
        authorization_error,
    };

    debug!(
        "[TLS] {host}: {} {} (authorized: {}), took {:?}",
        report.protocol,
        report.cipher,
        report.authorized,
        start_time.elapsed()
    );
    Ok(report)
}

fn protocol_name(version: ProtocolVersion) -> String {
    match version {
        ProtocolVersion::TLSv1_3 => "TLSv1.3".to_string(),
        ProtocolVersion::TLSv1_2 => "TLSv1.2".to_string(),
        ProtocolVersion::TLSv1_1 => "TLSv1.1".to_string(),
        ProtocolVersion::TLSv1_0 => "TLSv1".to_string(),
        other => format!("{other:?}"),
    }
}

/// IANA suite name; TLS 1.3 suites lose rustls' `TLS13_` prefix.
fn cipher_name(suite: CipherSuite) -> String {
    let name = format!("{suite:?}");
    match name.strip_prefix("TLS13_") {
        Some(rest) => format!("TLS_{rest}"),
        None => name,
    }
}

fn ephemeral_key_info(group: NamedGroup) -> EphemeralKeyInfo {
    let (kind, name, size) = match group {
        NamedGroup::X25519 => ("ECDH", "X25519", Some(253)),
        NamedGroup::X448 => ("ECDH", "X448", Some(448)),
        NamedGroup::secp256r1 => ("ECDH", "prime256v1", Some(256)),
        NamedGroup::secp384r1 => ("ECDH", "secp384r1", Some(384)),
        NamedGroup::secp521r1 => ("ECDH", "secp521r1", Some(521)),
        NamedGroup::FFDHE2048 => ("DH", "ffdhe2048", Some(2048)),
        NamedGroup::FFDHE3072 => ("DH", "ffdhe3072", Some(3072)),
        NamedGroup::FFDHE4096 => ("DH", "ffdhe4096", Some(4096)),
        NamedGroup::FFDHE6144 => ("DH", "ffdhe6144", Some(6144)),
        NamedGroup::FFDHE8192 => ("DH", "ffdhe8192", Some(8192)),
        other => {
            return EphemeralKeyInfo {
                kind: "KEM".to_string(),
                name: format!("{other:?}"),
                size: None,
            };
        }
    };
    EphemeralKeyInfo {
        kind: kind.to_string(),
        name: name.to_string(),
        size,
    }
}
