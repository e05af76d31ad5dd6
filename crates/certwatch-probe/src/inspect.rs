use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rustls::pki_types::ServerName;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::error::{ProbeError, Result};
use crate::pem::not_after_from_der;

/// Snapshot of one endpoint's certificate expiry.
#[derive(Debug, Clone)]
pub struct CertificateStatus {
    pub domain: String,
    /// `None` when inspection failed; treated downstream as "renewal needed".
    pub expires_at: Option<DateTime<Utc>>,
    pub checked_at: DateTime<Utc>,
}

/// Certificate expiry inspection.
///
/// Implementations must be `Send + Sync` so a probe can be shared behind an
/// `Arc` by the renewal cycle and driven from Tokio tasks.
#[async_trait]
pub trait ExpiryProbe: Send + Sync {
    /// Inspect `domain` and report what was found.
    ///
    /// Never fails: any probe problem is folded into an absent expiry.
    async fn inspect(&self, domain: &str) -> CertificateStatus;
}

/// Probes `domain:443` with a real TLS handshake and reads the leaf
/// certificate's `notAfter` field.
pub struct TlsProbe {
    port: u16,
    timeout: Duration,
    tls_config: Arc<rustls::ClientConfig>,
}

impl TlsProbe {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            port: 443,
            timeout,
            tls_config: Arc::new(observer_tls_config()?),
        })
    }

    /// Override the probed port (tests, nonstandard endpoints).
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    async fn fetch_not_after(&self, domain: &str) -> Result<DateTime<Utc>> {
        let server_name = ServerName::try_from(domain.to_string())
            .map_err(|e| ProbeError::InvalidName(e.to_string()))?;

        let addr = format!("{}:{}", domain, self.port);
        let tcp = timeout(self.timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| ProbeError::Timeout {
                secs: self.timeout.as_secs(),
            })?
            .map_err(|e| ProbeError::Connect(e.to_string()))?;

        let connector = tokio_rustls::TlsConnector::from(Arc::clone(&self.tls_config));
        let stream = timeout(self.timeout, connector.connect(server_name, tcp))
            .await
            .map_err(|_| ProbeError::Timeout {
                secs: self.timeout.as_secs(),
            })?
            .map_err(|e| ProbeError::Handshake(e.to_string()))?;

        let (_, session) = stream.get_ref();
        let leaf = session
            .peer_certificates()
            .and_then(|certs| certs.first())
            .ok_or(ProbeError::NoCertificate)?;

        not_after_from_der(leaf.as_ref())
    }
}

#[async_trait]
impl ExpiryProbe for TlsProbe {
    async fn inspect(&self, domain: &str) -> CertificateStatus {
        let checked_at = Utc::now();
        match self.fetch_not_after(domain).await {
            Ok(expires_at) => {
                debug!(%domain, expires_at = %expires_at.to_rfc3339(), "certificate expiry read");
                CertificateStatus {
                    domain: domain.to_string(),
                    expires_at: Some(expires_at),
                    checked_at,
                }
            }
            Err(e) => {
                warn!(%domain, error = %e, "certificate inspection failed; assuming renewal is needed");
                CertificateStatus {
                    domain: domain.to_string(),
                    expires_at: None,
                    checked_at,
                }
            }
        }
    }
}

/// Client config for observation: any certificate chain is accepted so the
/// probe can read expired or self-signed certificates. Handshake signature
/// verification still runs.
fn observer_tls_config() -> Result<rustls::ClientConfig> {
    let provider = rustls::crypto::ring::default_provider();
    let verifier = danger::AcceptAnyCert::new(provider.clone());

    let config = rustls::ClientConfig::builder_with_provider(Arc::new(provider))
        .with_safe_default_protocol_versions()
        .map_err(|e| ProbeError::Tls(e.to_string()))?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(verifier))
        .with_no_client_auth();

    Ok(config)
}

mod danger {
    use rustls::client::danger::{
        HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier,
    };
    use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
    use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
    use rustls::{DigitallySignedStruct, Error, SignatureScheme};

    #[derive(Debug)]
    pub(super) struct AcceptAnyCert(CryptoProvider);

    impl AcceptAnyCert {
        pub(super) fn new(provider: CryptoProvider) -> Self {
            Self(provider)
        }
    }

    impl ServerCertVerifier for AcceptAnyCert {
        fn verify_server_cert(
            &self,
            _end_entity: &CertificateDer<'_>,
            _intermediates: &[CertificateDer<'_>],
            _server_name: &ServerName<'_>,
            _ocsp_response: &[u8],
            _now: UnixTime,
        ) -> std::result::Result<ServerCertVerified, Error> {
            Ok(ServerCertVerified::assertion())
        }

        fn verify_tls12_signature(
            &self,
            message: &[u8],
            cert: &CertificateDer<'_>,
            dss: &DigitallySignedStruct,
        ) -> std::result::Result<HandshakeSignatureValid, Error> {
            verify_tls12_signature(
                message,
                cert,
                dss,
                &self.0.signature_verification_algorithms,
            )
        }

        fn verify_tls13_signature(
            &self,
            message: &[u8],
            cert: &CertificateDer<'_>,
            dss: &DigitallySignedStruct,
        ) -> std::result::Result<HandshakeSignatureValid, Error> {
            verify_tls13_signature(
                message,
                cert,
                dss,
                &self.0.signature_verification_algorithms,
            )
        }

        fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
            self.0
                .signature_verification_algorithms
                .supported_schemes()
        }
    }
}
