use thiserror::Error;

/// Why a single inspection attempt failed.
///
/// These never leave the crate as errors; [`inspect`](crate::inspect::ExpiryProbe::inspect)
/// logs them and degrades to an absent expiry instead.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("Probe timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("TLS handshake failed: {0}")]
    Handshake(String),

    #[error("Invalid server name: {0}")]
    InvalidName(String),

    #[error("TLS configuration error: {0}")]
    Tls(String),

    #[error("Peer presented no certificate")]
    NoCertificate,

    #[error("Certificate parse error: {0}")]
    Parse(String),
}

pub type Result<T> = std::result::Result<T, ProbeError>;
