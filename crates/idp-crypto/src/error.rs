//! Error type for cryptographic operations.

use thiserror::Error;

/// Result type for cryptographic operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Error type for cryptographic operations.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Invalid key format.
    #[error("invalid key format: {0}")]
    InvalidKey(String),

    /// Invalid or unparseable certificate.
    #[error("invalid certificate: {0}")]
    InvalidCertificate(String),

    /// Invalid PEM document.
    #[error("invalid PEM: {0}")]
    InvalidPem(String),

    /// Signing failed.
    #[error("signing failed: {0}")]
    Signing(String),

    /// Signature verification failed.
    #[error("signature verification failed")]
    Verification,

    /// Encryption failed.
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// Decryption failed.
    #[error("decryption failed")]
    Decryption,

    /// Random generation failed.
    #[error("random generation failed")]
    Random,
}
