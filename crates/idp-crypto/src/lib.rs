//! # idp-crypto
//!
//! Cryptographic operations for SAML message security using aws-lc-rs.
//!
//! ## Coverage
//!
//! - SHA-256 / SHA-512 digests for XML-DSig references
//! - RSA PKCS#1 v1.5 signatures (RSA-SHA256, RSA-SHA512)
//! - X.509 certificate inspection (validity window, RSA key size)
//! - XML-Encryption primitives: AES-256-GCM content encryption and
//!   RSA-OAEP key transport
//!
//! SAML interoperability requires SHA-256 based signatures, so unlike the
//! token signing paths this crate does not restrict hashes to SHA-384+.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod certificate;
pub mod encryption;
pub mod error;
pub mod hash;
pub mod pem;
pub mod random;
pub mod rsa;

pub use certificate::Certificate;
pub use error::{CryptoError, CryptoResult};
pub use hash::{sha256, sha512, HashAlgorithm};
pub use rsa::{rsa_sign, rsa_verify, RsaAlgorithm, RsaPrivateKey};
