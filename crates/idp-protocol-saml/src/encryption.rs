//! Assertion encryption with XML-Enc.
//!
//! The assertion is sealed with a fresh AES-256-GCM key, and that key is
//! wrapped with RSA-OAEP for the SP's encryption certificate:
//!
//! ```text
//! <saml:EncryptedAssertion>
//!   <xenc:EncryptedData Type="...#Element">
//!     <xenc:EncryptionMethod Algorithm="...xmlenc11#aes256-gcm"/>
//!     <ds:KeyInfo>
//!       <xenc:EncryptedKey> rsa-oaep-mgf1p wrapped content key </xenc:EncryptedKey>
//!     </ds:KeyInfo>
//!     <xenc:CipherData><xenc:CipherValue>...</xenc:CipherValue></xenc:CipherData>
//!   </xenc:EncryptedData>
//! </saml:EncryptedAssertion>
//! ```

use std::sync::Arc;

use base64::Engine;
use idp_core::Clock;
use idp_crypto::encryption::{
    aes256_gcm_decrypt, aes256_gcm_encrypt, generate_content_key, rsa_oaep_decrypt, rsa_oaep_encrypt,
    CONTENT_KEY_LEN,
};
use idp_crypto::Certificate;

use crate::error::{SamlError, SamlResult};
use crate::signature::outbound_parser;
use crate::types::{digest_algorithms, encryption_algorithms, ServiceProvider, SAML_NS, XMLDSIG_NS, XMLENC_NS};
use crate::xml::{Element, NodeId, XmlDocument};

/// Smallest RSA modulus an assertion may be encrypted to.
pub const MIN_ENCRYPTION_KEY_BITS: usize = 2048;

fn xenc(local_name: &str) -> Element {
    Element::new(Some("xenc"), local_name, Some(XMLENC_NS))
}

fn encode(data: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(data)
}

/// Replaces assertions with `saml:EncryptedAssertion` for an SP.
#[derive(Clone)]
pub struct AssertionEncryptor {
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for AssertionEncryptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssertionEncryptor").finish_non_exhaustive()
    }
}

impl AssertionEncryptor {
    /// Creates an encryptor reading certificate validity against `clock`.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Picks the first encryption certificate that is currently valid and
    /// carries an RSA key of at least [`MIN_ENCRYPTION_KEY_BITS`].
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::NoEncryptionCertificate`] if none qualifies.
    pub fn select_certificate<'a>(&self, sp: &'a ServiceProvider) -> SamlResult<&'a Certificate> {
        let now = self.clock.now();
        sp.encryption_certificates
            .iter()
            .find(|cert| {
                cert.is_valid_at(now)
                    && cert
                        .rsa_key_bits()
                        .is_some_and(|bits| bits >= MIN_ENCRYPTION_KEY_BITS)
            })
            .ok_or_else(|| {
                tracing::error!(
                    sp = %sp.entity_id,
                    configured = sp.encryption_certificates.len(),
                    "No usable encryption certificate"
                );
                SamlError::NoEncryptionCertificate(sp.entity_id.clone())
            })
    }

    /// Encrypts every `saml:Assertion` directly under the response root.
    ///
    /// # Errors
    ///
    /// Fails if no certificate qualifies, the input does not parse, the
    /// root holds no assertion or a cipher operation fails.
    pub fn encrypt(&self, response_xml: &str, sp: &ServiceProvider) -> SamlResult<String> {
        let certificate = self.select_certificate(sp)?;
        let mut doc = outbound_parser().parse_str(response_xml)?;
        let assertions = doc.find_children(doc.root(), SAML_NS, "Assertion");
        if assertions.is_empty() {
            tracing::error!(sp = %sp.entity_id, "No assertion to encrypt");
            return Err(SamlError::MissingElement("Assertion".into()));
        }
        for assertion in assertions {
            self.encrypt_assertion(&mut doc, assertion, certificate)
                .inspect_err(|err| {
                    tracing::error!(sp = %sp.entity_id, error = %err, "Assertion encryption failed");
                })?;
        }
        Ok(doc.serialize())
    }

    /// Replaces `assertion` with its encrypted form and returns the new
    /// `saml:EncryptedAssertion` node.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::Encryption`] if the certificate has no RSA key
    /// or a cipher operation fails.
    pub fn encrypt_assertion(
        &self,
        doc: &mut XmlDocument,
        assertion: NodeId,
        certificate: &Certificate,
    ) -> SamlResult<NodeId> {
        let plaintext = doc.serialize_node(assertion);

        let content_key = generate_content_key()?;
        let cipher_value = aes256_gcm_encrypt(&content_key, plaintext.as_bytes())
            .map_err(|e| SamlError::Encryption(e.to_string()))?;
        let wrapped_key = rsa_oaep_encrypt(certificate.spki_der(), &content_key)
            .map_err(|e| SamlError::Encryption(e.to_string()))?;

        let encrypted_assertion = doc.create_element(Element::declared("saml", "EncryptedAssertion", SAML_NS));
        let encrypted_data = doc.append_element(
            encrypted_assertion,
            Element::declared("xenc", "EncryptedData", XMLENC_NS)
                .with_attribute("Type", encryption_algorithms::TYPE_ELEMENT),
        );
        doc.append_element(
            encrypted_data,
            xenc("EncryptionMethod").with_attribute("Algorithm", encryption_algorithms::AES256_GCM),
        );

        let key_info = doc.append_element(encrypted_data, Element::declared("ds", "KeyInfo", XMLDSIG_NS));
        let encrypted_key = doc.append_element(key_info, xenc("EncryptedKey"));
        let key_method = doc.append_element(
            encrypted_key,
            xenc("EncryptionMethod").with_attribute("Algorithm", encryption_algorithms::RSA_OAEP_MGF1P),
        );
        doc.append_element(
            key_method,
            Element::new(Some("ds"), "DigestMethod", Some(XMLDSIG_NS))
                .with_attribute("Algorithm", digest_algorithms::SHA1),
        );
        let key_cipher_data = doc.append_element(encrypted_key, xenc("CipherData"));
        doc.append_text_element(key_cipher_data, xenc("CipherValue"), encode(&wrapped_key));

        let cipher_data = doc.append_element(encrypted_data, xenc("CipherData"));
        doc.append_text_element(cipher_data, xenc("CipherValue"), encode(&cipher_value));

        doc.replace(assertion, encrypted_assertion);
        tracing::debug!(certificate = certificate.subject(), "Encrypted assertion");
        Ok(encrypted_assertion)
    }
}

/// Decrypts a `saml:EncryptedAssertion` with the SP's PKCS#8 private key.
///
/// This is the SP side of the exchange, used to check what was produced.
///
/// # Errors
///
/// Returns [`SamlError::MissingElement`] for an incomplete structure,
/// [`SamlError::Crypto`] if a key or cipher value does not decrypt.
pub fn decrypt_assertion(
    doc: &XmlDocument,
    encrypted_assertion: NodeId,
    private_key_pkcs8_der: &[u8],
) -> SamlResult<XmlDocument> {
    let missing = |name: &str| SamlError::MissingElement(name.to_string());

    let encrypted_data = doc
        .find_child(encrypted_assertion, XMLENC_NS, "EncryptedData")
        .ok_or_else(|| missing("EncryptedData"))?;
    let encrypted_key = doc
        .find_child(encrypted_data, XMLDSIG_NS, "KeyInfo")
        .and_then(|key_info| doc.find_child(key_info, XMLENC_NS, "EncryptedKey"))
        .ok_or_else(|| missing("EncryptedKey"))?;

    let cipher_value = |parent: NodeId| -> SamlResult<Vec<u8>> {
        let value = doc
            .find_child(parent, XMLENC_NS, "CipherData")
            .and_then(|data| doc.find_child(data, XMLENC_NS, "CipherValue"))
            .ok_or_else(|| missing("CipherValue"))?;
        let compact: String = doc
            .text_content(value)
            .chars()
            .filter(|c| !c.is_ascii_whitespace())
            .collect();
        Ok(base64::engine::general_purpose::STANDARD.decode(compact)?)
    };

    let key = rsa_oaep_decrypt(private_key_pkcs8_der, &cipher_value(encrypted_key)?)?;
    let key: [u8; CONTENT_KEY_LEN] = key
        .as_slice()
        .try_into()
        .map_err(|_| SamlError::Encryption("content key has the wrong length".into()))?;
    let plaintext = aes256_gcm_decrypt(&key, &cipher_value(encrypted_data)?)?;

    Ok(outbound_parser().parse_bytes(&plaintext)?)
}
