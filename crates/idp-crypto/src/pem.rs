//! Minimal PEM decoding.

use base64::Engine;

use crate::error::{CryptoError, CryptoResult};

/// Extracts the DER payload of the first PEM block with the given label.
///
/// # Errors
///
/// Returns [`CryptoError::InvalidPem`] if the block is missing or the body is
/// not valid base64.
pub fn pem_to_der(pem: &str, label: &str) -> CryptoResult<Vec<u8>> {
    let begin = format!("-----BEGIN {label}-----");
    let end = format!("-----END {label}-----");

    let start = pem
        .find(&begin)
        .ok_or_else(|| CryptoError::InvalidPem(format!("missing {label} block")))?
        + begin.len();
    let end_pos = pem[start..]
        .find(&end)
        .ok_or_else(|| CryptoError::InvalidPem(format!("unterminated {label} block")))?
        + start;

    let b64_data: String = pem[start..end_pos]
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();

    base64::engine::general_purpose::STANDARD
        .decode(b64_data)
        .map_err(|e| CryptoError::InvalidPem(e.to_string()))
}
