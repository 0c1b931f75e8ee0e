//! RSA PKCS#1 v1.5 signatures.
//!
//! SAML 2.0 deployments overwhelmingly sign with RSA-SHA256; RSA-SHA512 is
//! accepted as well. Nothing weaker is exposed.

use aws_lc_rs::{
    rand::SystemRandom,
    signature::{self, RsaKeyPair, UnparsedPublicKey},
};

use crate::error::{CryptoError, CryptoResult};
use crate::pem::pem_to_der;

/// RSA signature algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RsaAlgorithm {
    /// RSA PKCS#1 v1.5 with SHA-256.
    RsaSha256,
    /// RSA PKCS#1 v1.5 with SHA-512.
    RsaSha512,
}

impl RsaAlgorithm {
    /// Returns the XML-DSig algorithm URI.
    #[must_use]
    pub const fn xml_dsig_uri(self) -> &'static str {
        match self {
            Self::RsaSha256 => "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256",
            Self::RsaSha512 => "http://www.w3.org/2001/04/xmldsig-more#rsa-sha512",
        }
    }

    /// Parses an algorithm from its XML-DSig URI.
    #[must_use]
    pub fn from_uri(uri: &str) -> Option<Self> {
        match uri {
            "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256" => Some(Self::RsaSha256),
            "http://www.w3.org/2001/04/xmldsig-more#rsa-sha512" => Some(Self::RsaSha512),
            _ => None,
        }
    }
}

/// RSA private key used for signing.
pub struct RsaPrivateKey {
    key_pair: RsaKeyPair,
}

impl std::fmt::Debug for RsaPrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RsaPrivateKey")
            .field("modulus_bits", &(self.key_pair.public_modulus_len() * 8))
            .finish_non_exhaustive()
    }
}

impl RsaPrivateKey {
    /// Loads a key from PKCS#8 or PKCS#1 DER.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidKey`] if the DER is not an RSA key.
    pub fn from_der(der: &[u8]) -> CryptoResult<Self> {
        let key_pair = RsaKeyPair::from_pkcs8(der)
            .or_else(|_| RsaKeyPair::from_der(der))
            .map_err(|e| CryptoError::InvalidKey(format!("Invalid RSA key: {e}")))?;
        Ok(Self { key_pair })
    }

    /// Loads a key from a `PRIVATE KEY` or `RSA PRIVATE KEY` PEM block.
    ///
    /// # Errors
    ///
    /// Returns an error if no usable block is present.
    pub fn from_pem(pem: &str) -> CryptoResult<Self> {
        let der = pem_to_der(pem, "PRIVATE KEY").or_else(|_| pem_to_der(pem, "RSA PRIVATE KEY"))?;
        Self::from_der(&der)
    }

    /// Signs `data` with the given algorithm.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Signing`] if the backend rejects the operation.
    pub fn sign(&self, data: &[u8], algorithm: RsaAlgorithm) -> CryptoResult<Vec<u8>> {
        let rng = SystemRandom::new();
        let mut signature = vec![0u8; self.key_pair.public_modulus_len()];

        let padding = match algorithm {
            RsaAlgorithm::RsaSha256 => &signature::RSA_PKCS1_SHA256,
            RsaAlgorithm::RsaSha512 => &signature::RSA_PKCS1_SHA512,
        };

        self.key_pair
            .sign(padding, &rng, data, &mut signature)
            .map_err(|e| CryptoError::Signing(format!("RSA signing failed: {e}")))?;

        Ok(signature)
    }
}

/// Signs data with an RSA private key given as DER.
///
/// # Errors
///
/// Returns an error if the key is invalid or signing fails.
pub fn rsa_sign(key_der: &[u8], data: &[u8], algorithm: RsaAlgorithm) -> CryptoResult<Vec<u8>> {
    RsaPrivateKey::from_der(key_der)?.sign(data, algorithm)
}

/// Verifies an RSA PKCS#1 v1.5 signature.
///
/// `public_key_der` is the PKCS#1 `RSAPublicKey` carried in a certificate's
/// subject public key bit string. Keys below 2048 bits are refused.
///
/// # Errors
///
/// Returns [`CryptoError::Verification`] if the signature does not verify.
pub fn rsa_verify(
    public_key_der: &[u8],
    data: &[u8],
    sig: &[u8],
    algorithm: RsaAlgorithm,
) -> CryptoResult<()> {
    let verification_alg: &dyn signature::VerificationAlgorithm = match algorithm {
        RsaAlgorithm::RsaSha256 => &signature::RSA_PKCS1_2048_8192_SHA256,
        RsaAlgorithm::RsaSha512 => &signature::RSA_PKCS1_2048_8192_SHA512,
    };

    UnparsedPublicKey::new(verification_alg, public_key_der)
        .verify(data, sig)
        .map_err(|_| CryptoError::Verification)
}
