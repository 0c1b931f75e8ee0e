//! X.509 certificate inspection.
//!
//! SAML trusts certificates as key containers: only the validity window and
//! the RSA public key matter. Chain building is deliberately absent.

use base64::Engine;
use chrono::{DateTime, Utc};
use x509_parser::prelude::*;
use x509_parser::public_key::PublicKey;

use crate::error::{CryptoError, CryptoResult};
use crate::pem::pem_to_der;

/// A parsed X.509 certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    der: Vec<u8>,
    subject: String,
    not_before: DateTime<Utc>,
    not_after: DateTime<Utc>,
    spki_der: Vec<u8>,
    rsa_public_key: Option<Vec<u8>>,
    rsa_key_bits: Option<usize>,
}

impl Certificate {
    /// Parses a DER-encoded certificate.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidCertificate`] if parsing fails.
    pub fn from_der(der: &[u8]) -> CryptoResult<Self> {
        let (_, cert) = X509Certificate::from_der(der)
            .map_err(|e| CryptoError::InvalidCertificate(e.to_string()))?;

        let validity = cert.validity();
        let not_before = DateTime::from_timestamp(validity.not_before.timestamp(), 0)
            .ok_or_else(|| CryptoError::InvalidCertificate("notBefore out of range".into()))?;
        let not_after = DateTime::from_timestamp(validity.not_after.timestamp(), 0)
            .ok_or_else(|| CryptoError::InvalidCertificate("notAfter out of range".into()))?;

        let spki = cert.public_key();
        let (rsa_public_key, rsa_key_bits) = match spki.parsed() {
            Ok(PublicKey::RSA(rsa)) => (
                Some(spki.subject_public_key.data.to_vec()),
                Some(rsa.key_size()),
            ),
            _ => (None, None),
        };

        Ok(Self {
            der: der.to_vec(),
            subject: cert.subject().to_string(),
            not_before,
            not_after,
            spki_der: spki.raw.to_vec(),
            rsa_public_key,
            rsa_key_bits,
        })
    }

    /// Parses a PEM `CERTIFICATE` block.
    ///
    /// # Errors
    ///
    /// Returns an error if the PEM or the certificate is invalid.
    pub fn from_pem(pem: &str) -> CryptoResult<Self> {
        Self::from_der(&pem_to_der(pem, "CERTIFICATE")?)
    }

    /// Parses base64 DER as carried in `<ds:X509Certificate>`; whitespace is ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if decoding or parsing fails.
    pub fn from_base64(encoded: &str) -> CryptoResult<Self> {
        let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
        let der = base64::engine::general_purpose::STANDARD
            .decode(compact)
            .map_err(|e| CryptoError::InvalidCertificate(e.to_string()))?;
        Self::from_der(&der)
    }

    /// Returns the DER encoding.
    #[must_use]
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// Returns the DER encoding as standard base64.
    #[must_use]
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.der)
    }

    /// Returns the subject distinguished name.
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Returns the start of the validity window.
    #[must_use]
    pub fn not_before(&self) -> DateTime<Utc> {
        self.not_before
    }

    /// Returns the end of the validity window.
    #[must_use]
    pub fn not_after(&self) -> DateTime<Utc> {
        self.not_after
    }

    /// Returns true if `now` lies inside the validity window (inclusive).
    #[must_use]
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.not_before <= now && now <= self.not_after
    }

    /// Returns the `SubjectPublicKeyInfo` DER.
    #[must_use]
    pub fn spki_der(&self) -> &[u8] {
        &self.spki_der
    }

    /// Returns the PKCS#1 `RSAPublicKey` DER, if the key is RSA.
    #[must_use]
    pub fn rsa_public_key(&self) -> Option<&[u8]> {
        self.rsa_public_key.as_deref()
    }

    /// Returns the RSA modulus size in bits, if the key is RSA.
    #[must_use]
    pub fn rsa_key_bits(&self) -> Option<usize> {
        self.rsa_key_bits
    }
}
