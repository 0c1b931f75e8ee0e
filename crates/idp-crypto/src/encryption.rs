//! XML-Encryption primitives.
//!
//! Content is sealed with AES-256-GCM (`xmlenc11#aes256-gcm`): the cipher
//! value is `IV (12 bytes) || ciphertext || tag (16 bytes)`. The content key
//! is wrapped with RSA-OAEP using SHA-1 and MGF1-SHA1
//! (`xmlenc#rsa-oaep-mgf1p`), the transport every SAML SP understands.

use aws_lc_rs::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use aws_lc_rs::rsa::{
    OaepPrivateDecryptingKey, OaepPublicEncryptingKey, PrivateDecryptingKey, PublicEncryptingKey,
    OAEP_SHA1_MGF1SHA1,
};

use crate::error::{CryptoError, CryptoResult};
use crate::random::random_array;

/// AES-256 key length in bytes.
pub const CONTENT_KEY_LEN: usize = 32;

/// Generates a fresh AES-256 content encryption key.
///
/// # Errors
///
/// Returns [`CryptoError::Random`] if the RNG fails.
pub fn generate_content_key() -> CryptoResult<[u8; CONTENT_KEY_LEN]> {
    random_array()
}

/// Encrypts `plaintext` with AES-256-GCM under a random IV.
///
/// # Errors
///
/// Returns [`CryptoError::Encryption`] on backend failure.
pub fn aes256_gcm_encrypt(key: &[u8; CONTENT_KEY_LEN], plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
    let unbound = UnboundKey::new(&AES_256_GCM, key)
        .map_err(|e| CryptoError::Encryption(format!("AES key setup failed: {e}")))?;
    let sealing_key = LessSafeKey::new(unbound);

    let iv: [u8; NONCE_LEN] = random_array()?;
    let mut in_out = plaintext.to_vec();
    sealing_key
        .seal_in_place_append_tag(Nonce::assume_unique_for_key(iv), Aad::empty(), &mut in_out)
        .map_err(|e| CryptoError::Encryption(format!("AES-GCM seal failed: {e}")))?;

    let mut output = Vec::with_capacity(NONCE_LEN + in_out.len());
    output.extend_from_slice(&iv);
    output.extend_from_slice(&in_out);
    Ok(output)
}

/// Decrypts an `IV || ciphertext || tag` value produced by [`aes256_gcm_encrypt`].
///
/// # Errors
///
/// Returns [`CryptoError::Decryption`] if authentication fails.
pub fn aes256_gcm_decrypt(key: &[u8; CONTENT_KEY_LEN], data: &[u8]) -> CryptoResult<Vec<u8>> {
    if data.len() < NONCE_LEN {
        return Err(CryptoError::Decryption);
    }
    let (iv, sealed) = data.split_at(NONCE_LEN);
    let nonce = Nonce::try_assume_unique_for_key(iv).map_err(|_| CryptoError::Decryption)?;

    let unbound = UnboundKey::new(&AES_256_GCM, key).map_err(|_| CryptoError::Decryption)?;
    let opening_key = LessSafeKey::new(unbound);

    let mut in_out = sealed.to_vec();
    let plaintext = opening_key
        .open_in_place(nonce, Aad::empty(), &mut in_out)
        .map_err(|_| CryptoError::Decryption)?;
    Ok(plaintext.to_vec())
}

/// Wraps `key` for the holder of the RSA public key in `spki_der`.
///
/// # Errors
///
/// Returns [`CryptoError::InvalidKey`] for a non-RSA key and
/// [`CryptoError::Encryption`] on backend failure.
pub fn rsa_oaep_encrypt(spki_der: &[u8], key: &[u8]) -> CryptoResult<Vec<u8>> {
    let public_key = PublicEncryptingKey::from_der(spki_der)
        .map_err(|e| CryptoError::InvalidKey(format!("Invalid RSA public key: {e}")))?;
    let oaep = OaepPublicEncryptingKey::new(public_key)
        .map_err(|e| CryptoError::InvalidKey(format!("RSA-OAEP unavailable: {e}")))?;

    let mut ciphertext = vec![0u8; oaep.ciphertext_size()];
    let written = oaep
        .encrypt(&OAEP_SHA1_MGF1SHA1, key, &mut ciphertext, None)
        .map_err(|e| CryptoError::Encryption(format!("RSA-OAEP failed: {e}")))?
        .len();
    ciphertext.truncate(written);
    Ok(ciphertext)
}

/// Unwraps an RSA-OAEP encrypted key with a PKCS#8 private key.
///
/// # Errors
///
/// Returns [`CryptoError::Decryption`] if the ciphertext does not decrypt.
pub fn rsa_oaep_decrypt(pkcs8_der: &[u8], ciphertext: &[u8]) -> CryptoResult<Vec<u8>> {
    let private_key = PrivateDecryptingKey::from_pkcs8(pkcs8_der)
        .map_err(|e| CryptoError::InvalidKey(format!("Invalid RSA private key: {e}")))?;
    let oaep = OaepPrivateDecryptingKey::new(private_key)
        .map_err(|e| CryptoError::InvalidKey(format!("RSA-OAEP unavailable: {e}")))?;

    let mut plaintext = vec![0u8; oaep.min_output_size()];
    let len = oaep
        .decrypt(&OAEP_SHA1_MGF1SHA1, ciphertext, &mut plaintext, None)
        .map_err(|_| CryptoError::Decryption)?
        .len();
    plaintext.truncate(len);
    Ok(plaintext)
}
