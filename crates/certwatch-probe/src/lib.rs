//! `certwatch-probe` — TLS certificate expiry inspection.
//!
//! [`TlsProbe`] connects to `domain:443`, reads the leaf certificate the
//! endpoint presents, and extracts its `notAfter` instant. Chain validation
//! is skipped; a certificate that is already expired or self-signed must
//! still yield its expiry date.
//!
//! Inspection never fails upward. Timeouts, refused connections, and
//! unparsable certificates all produce a [`CertificateStatus`] with
//! `expires_at: None`, which callers treat as "assume renewal is needed".

pub mod error;
pub mod inspect;
pub mod pem;

pub use error::ProbeError;
pub use inspect::{CertificateStatus, ExpiryProbe, TlsProbe};
pub use pem::{not_after_from_der, not_after_from_pem};
