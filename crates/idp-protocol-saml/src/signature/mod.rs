//! XML Signature support for SAML.
//!
//! Outbound messages are signed with an enveloped XML-DSig signature:
//! exclusive C14N, RSA-SHA256 over `SignedInfo`, SHA-256 reference digest,
//! and the signing certificate in `KeyInfo`.
//!
//! Inbound verification accepts RSA-SHA256 and RSA-SHA512 on both bindings
//! and refuses any reference that does not point at the document root.

mod engine;
mod signer;
mod verifier;

use std::sync::Arc;

use idp_crypto::{Certificate, HashAlgorithm, RsaPrivateKey};

pub use engine::*;
pub use signer::*;
pub(crate) use signer::outbound_parser;
pub use verifier::*;

use crate::error::SamlResult;
use crate::types::digest_algorithms;

/// The IdP's current signing certificate and private key.
///
/// Obtained from the key-material provider for each signing operation.
#[derive(Debug, Clone)]
pub struct SigningCredential {
    /// Certificate published in `KeyInfo`.
    pub certificate: Certificate,
    /// Matching private key.
    pub private_key: Arc<RsaPrivateKey>,
}

impl SigningCredential {
    /// Creates a credential.
    #[must_use]
    pub fn new(certificate: Certificate, private_key: RsaPrivateKey) -> Self {
        Self {
            certificate,
            private_key: Arc::new(private_key),
        }
    }

    /// Loads a credential from PEM-encoded key and certificate.
    ///
    /// # Errors
    ///
    /// Returns [`crate::SamlError::Crypto`] if either PEM block is invalid.
    pub fn from_pem(private_key_pem: &str, certificate_pem: &str) -> SamlResult<Self> {
        Ok(Self::new(
            Certificate::from_pem(certificate_pem)?,
            RsaPrivateKey::from_pem(private_key_pem)?,
        ))
    }
}

/// Reference digest algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DigestAlgorithm {
    /// SHA-256.
    #[default]
    Sha256,
    /// SHA-512.
    Sha512,
}

impl DigestAlgorithm {
    /// Returns the URI for this digest algorithm.
    #[must_use]
    pub const fn uri(&self) -> &'static str {
        match self {
            Self::Sha256 => digest_algorithms::SHA256,
            Self::Sha512 => digest_algorithms::SHA512,
        }
    }

    /// Parses a digest algorithm from its URI.
    #[must_use]
    pub fn from_uri(uri: &str) -> Option<Self> {
        match uri {
            digest_algorithms::SHA256 => Some(Self::Sha256),
            digest_algorithms::SHA512 => Some(Self::Sha512),
            _ => None,
        }
    }

    /// Digests `data`.
    #[must_use]
    pub fn digest(&self, data: &[u8]) -> Vec<u8> {
        let algorithm = match self {
            Self::Sha256 => HashAlgorithm::Sha256,
            Self::Sha512 => HashAlgorithm::Sha512,
        };
        idp_crypto::hash::hash(algorithm, data)
    }
}
