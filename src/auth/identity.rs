//! Peer certificate identity extraction.

use rustls::pki_types::CertificateDer;
use x509_parser::prelude::{FromDer, X509Certificate};

/// Error type for post-handshake authorization.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("no client certificate presented")]
    MissingCertificate,

    #[error("client certificate is not valid DER")]
    BadEncoding,

    #[error("client certificate has no usable subject common name")]
    MissingCommonName,
}

/// Identity derived from the peer certificate for one connection.
///
/// Used only for authorization decisions and audit logging. It is never
/// injected into backend-bound traffic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    /// Subject common name.
    pub common_name: String,
    /// Issuer distinguished name.
    pub issuer: String,
    /// Certificate serial number, uppercase hex without separators.
    pub serial: String,
    /// Start of the validity window (Unix timestamp).
    pub not_before: i64,
    /// End of the validity window (Unix timestamp).
    pub not_after: i64,
}

impl ClientIdentity {
    /// Parse the end-entity certificate presented by the peer.
    ///
    /// A certificate that does not parse, or that lacks a subject common
    /// name, yields an error; callers treat that as unauthenticated.
    pub fn from_der(cert: &CertificateDer<'_>) -> Result<Self, AuthError> {
        let (_, parsed) =
            X509Certificate::from_der(cert.as_ref()).map_err(|_| AuthError::BadEncoding)?;

        let common_name = parsed
            .subject()
            .iter_common_name()
            .find_map(|cn| cn.as_str().ok())
            .ok_or(AuthError::MissingCommonName)?
            .to_string();

        let validity = parsed.validity();

        Ok(Self {
            common_name,
            issuer: parsed.issuer().to_string(),
            serial: serial_hex(parsed.raw_serial()),
            not_before: validity.not_before.timestamp(),
            not_after: validity.not_after.timestamp(),
        })
    }
}

/// Render a raw serial number as uppercase hex without separators.
///
/// The same normalization is applied to configured revocation entries so
/// lookups compare like with like.
pub fn serial_hex(raw: &[u8]) -> String {
    let mut out = String::with_capacity(raw.len() * 2);
    for byte in raw {
        out.push_str(&format!("{:02X}", byte));
    }
    out
}

/// Normalize a user-supplied serial number string (strip separators, uppercase).
pub fn normalize_serial(serial: &str) -> String {
    serial
        .chars()
        .filter(|c| c.is_ascii_hexdigit())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}
