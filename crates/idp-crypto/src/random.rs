//! Cryptographically secure random generation.

use aws_lc_rs::rand::{SecureRandom, SystemRandom};

use crate::error::{CryptoError, CryptoResult};

/// Fills a fixed-size array with random bytes.
///
/// # Errors
///
/// Returns [`CryptoError::Random`] if the system RNG fails.
pub fn random_array<const N: usize>() -> CryptoResult<[u8; N]> {
    let mut bytes = [0u8; N];
    SystemRandom::new()
        .fill(&mut bytes)
        .map_err(|_| CryptoError::Random)?;
    Ok(bytes)
}
