use monty_common::types::Endpoint;
use rustls::client::danger::{
    HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier,
};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, SignatureScheme};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

use super::{evaluator, ProbeReport};

/// What the handshake itself tells us, before any policy is applied.
#[derive(Debug, Clone)]
pub struct HandshakeFacts {
    pub leaf_der: Vec<u8>,
    pub tls_version: Option<String>,
    /// `Some` only when chain verification was attempted.
    pub chain_valid: Option<bool>,
}

/// TLS handshake against the endpoint's host/port, evaluated into an
/// SSL status. The probe itself succeeds iff the status is valid.
pub async fn check(endpoint: &Endpoint) -> ProbeReport {
    let started = Instant::now();
    let (host, port) = super::parse_host_port(&endpoint.url);
    let now = chrono::Utc::now();

    match handshake(&host, port, endpoint).await {
        Ok(facts) => {
            let status = evaluator::evaluate(endpoint, &facts, now);
            let elapsed_ms = started.elapsed().as_millis() as u64;
            let mut report = if status.is_valid {
                ProbeReport::success(elapsed_ms)
            } else {
                ProbeReport::failure(
                    elapsed_ms,
                    status
                        .error_message
                        .clone()
                        .unwrap_or_else(|| "certificate check failed".to_string()),
                )
            };
            report.ssl_status = Some(status);
            report
        }
        Err(e) => {
            let message = e.to_string();
            let status = evaluator::handshake_failure(endpoint, message.clone(), now);
            let mut report =
                ProbeReport::failure(started.elapsed().as_millis() as u64, message);
            report.ssl_status = Some(status);
            report
        }
    }
}

/// Two connections: a permissive one to extract the certificate and
/// negotiated version even when the chain is broken, and (when chain
/// checking is on) a verifying one against the webpki roots whose
/// outcome becomes `chain_valid`.
async fn handshake(host: &str, port: u16, endpoint: &Endpoint) -> anyhow::Result<HandshakeFacts> {
    let timeout = Duration::from_secs(endpoint.timeout_secs);

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let permissive = ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(CaptureCertVerifier { provider }))
        .with_no_client_auth();

    let conn = connect_tls(host, port, Arc::new(permissive), timeout).await?;
    let tls_version = conn.protocol_version().map(tls_version_name);
    let leaf_der = conn
        .peer_certificates()
        .and_then(|certs| certs.first())
        .map(|c| c.as_ref().to_vec())
        .ok_or_else(|| anyhow::anyhow!("No peer certificates"))?;

    let chain_valid = if endpoint.check_chain {
        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let verified = ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth();
        Some(connect_tls(host, port, Arc::new(verified), timeout).await.is_ok())
    } else {
        None
    };

    Ok(HandshakeFacts {
        leaf_der,
        tls_version,
        chain_valid,
    })
}

async fn connect_tls(
    host: &str,
    port: u16,
    config: Arc<ClientConfig>,
    timeout: Duration,
) -> anyhow::Result<rustls::ClientConnection> {
    let connector = TlsConnector::from(config);
    let addr = format!("{host}:{port}");
    let server_name = ServerName::try_from(host.to_string())
        .map_err(|e| anyhow::anyhow!("Invalid host name: {e}"))?;

    let tcp = tokio::time::timeout(timeout, TcpStream::connect(&addr))
        .await
        .map_err(|_| anyhow::anyhow!("Connection to {addr} timed out"))?
        .map_err(|e| anyhow::anyhow!("TCP connection to {addr} failed: {e}"))?;

    let tls_stream = tokio::time::timeout(timeout, connector.connect(server_name, tcp))
        .await
        .map_err(|_| anyhow::anyhow!("TLS handshake with {addr} timed out"))?
        .map_err(|e| anyhow::anyhow!("TLS handshake with {addr} failed: {e}"))?;

    let (_io, conn) = tls_stream.into_inner();
    Ok(conn)
}

/// Human-readable protocol name, matching what endpoints list in
/// `acceptable_tls_versions`.
pub(crate) fn tls_version_name(version: rustls::ProtocolVersion) -> String {
    match version {
        rustls::ProtocolVersion::TLSv1_0 => "TLS 1.0".to_string(),
        rustls::ProtocolVersion::TLSv1_1 => "TLS 1.1".to_string(),
        rustls::ProtocolVersion::TLSv1_2 => "TLS 1.2".to_string(),
        rustls::ProtocolVersion::TLSv1_3 => "TLS 1.3".to_string(),
        _ => "Unknown".to_string(),
    }
}

/// Accepts whatever certificate the server presents so the leaf can be
/// inspected; chain trust is judged by the separate verifying
/// connection. Signatures are still checked.
#[derive(Debug)]
struct CaptureCertVerifier {
    provider: Arc<rustls::crypto::CryptoProvider>,
}

impl ServerCertVerifier for CaptureCertVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use monty_common::types::{CheckType, CreateEndpointRequest};

    #[test]
    fn test_tls_version_name() {
        assert_eq!(tls_version_name(rustls::ProtocolVersion::TLSv1_2), "TLS 1.2");
        assert_eq!(tls_version_name(rustls::ProtocolVersion::TLSv1_3), "TLS 1.3");
        assert_eq!(tls_version_name(rustls::ProtocolVersion::SSLv3), "Unknown");
    }

    #[tokio::test]
    #[ignore] // touches the network
    async fn test_check_real_site() {
        let _ = rustls::crypto::ring::default_provider().install_default();
        let ep = CreateEndpointRequest {
            url: "https://example.com".to_string(),
            check_type: Some(CheckType::Ssl),
            timeout_secs: Some(20),
            ..Default::default()
        }
        .into_endpoint("test".to_string(), chrono::Utc::now());
        let report = check(&ep).await;
        assert!(report.succeeded, "{:?}", report.error_message);
        let status = report.ssl_status.unwrap();
        assert!(status.is_valid);
        assert!(status.chain_valid);
        assert!(status.domain_matches);
    }
}
