use chrono::{DateTime, Utc};
use x509_parser::parse_x509_certificate;
use x509_parser::pem::parse_x509_pem;

use crate::error::{ProbeError, Result};

/// Extract the `notAfter` instant from a DER-encoded certificate.
pub fn not_after_from_der(der: &[u8]) -> Result<DateTime<Utc>> {
    let (_, cert) =
        parse_x509_certificate(der).map_err(|e| ProbeError::Parse(e.to_string()))?;
    let ts = cert.validity().not_after.timestamp();
    DateTime::from_timestamp(ts, 0)
        .ok_or_else(|| ProbeError::Parse(format!("notAfter timestamp {ts} out of range")))
}

/// Extract the `notAfter` instant from the first certificate in a PEM bundle.
///
/// A fullchain file puts the leaf first, so this reads the leaf expiry.
pub fn not_after_from_pem(pem: &[u8]) -> Result<DateTime<Utc>> {
    let (_, doc) = parse_x509_pem(pem).map_err(|e| ProbeError::Parse(e.to_string()))?;
    not_after_from_der(&doc.contents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    /// Mint a self-signed cert whose notAfter is midnight UTC on the given date.
    fn cert_pem_expiring(year: i32, month: u8, day: u8) -> String {
        use rcgen::{date_time_ymd, CertificateParams, KeyPair};

        let key_pair = KeyPair::generate().unwrap();
        let mut params = CertificateParams::new(vec!["probe.example.com".to_string()]).unwrap();
        params.not_before = date_time_ymd(2024, 1, 1);
        params.not_after = date_time_ymd(year, month, day);
        params.self_signed(&key_pair).unwrap().pem()
    }

    #[test]
    fn reads_exact_not_after_from_pem() {
        let pem = cert_pem_expiring(2031, 6, 15);
        let not_after = not_after_from_pem(pem.as_bytes()).unwrap();
        assert_eq!(not_after, Utc.with_ymd_and_hms(2031, 6, 15, 0, 0, 0).unwrap());
    }

    #[test]
    fn leaf_is_read_from_a_bundle() {
        // Fullchain layout: leaf first, issuer after. The two expiries differ
        // so a wrong pick would be caught.
        let leaf = cert_pem_expiring(2031, 1, 1);
        let issuer = cert_pem_expiring(2040, 1, 1);
        let bundle = format!("{leaf}{issuer}");

        let not_after = not_after_from_pem(bundle.as_bytes()).unwrap();
        assert_eq!(not_after, Utc.with_ymd_and_hms(2031, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn rejects_garbage_pem() {
        assert!(not_after_from_pem(b"not a certificate").is_err());
    }

    #[test]
    fn rejects_truncated_der() {
        assert!(not_after_from_der(&[0x30, 0x82, 0x01]).is_err());
    }
}
