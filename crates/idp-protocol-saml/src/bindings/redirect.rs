//! HTTP-Redirect Binding implementation.
//!
//! Messages travel in the URL query, DEFLATE-compressed and base64-encoded.
//! A signature, when present, is detached: it covers the exact encoded
//! query values, so decoding keeps the raw strings alongside the decoded ones.

use std::io::Write;

use base64::Engine;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use idp_crypto::{RsaAlgorithm, RsaPrivateKey};

use super::bounded::{BoundedReadStream, LimitExceeded};
use super::SamlMessageType;
use crate::error::{ExtractionErrorKind, SamlError, SamlResult};

/// A query parameter as it appeared on the wire and after decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryValue {
    /// Percent-encoded value exactly as received.
    pub raw: String,
    /// Decoded value.
    pub value: String,
}

/// SAML parameters of a Redirect-binding query string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RedirectQuery {
    /// `SAMLRequest`.
    pub saml_request: Option<QueryValue>,
    /// `SAMLResponse`.
    pub saml_response: Option<QueryValue>,
    /// `RelayState`.
    pub relay_state: Option<QueryValue>,
    /// `SigAlg`.
    pub sig_alg: Option<QueryValue>,
    /// `Signature`.
    pub signature: Option<QueryValue>,
}

impl RedirectQuery {
    /// Splits a raw query string, keeping the encoded form of each value.
    ///
    /// Unknown parameters are ignored. A SAML parameter given twice is an
    /// error since it makes the signed string ambiguous.
    pub fn parse(query: &str) -> Result<Self, ExtractionErrorKind> {
        let mut parsed = Self::default();
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (raw_key, raw_value) = pair.split_once('=').unwrap_or((pair, ""));
            let key = decode_component(raw_key);
            let slot = match key.as_str() {
                "SAMLRequest" => (&mut parsed.saml_request, "SAMLRequest"),
                "SAMLResponse" => (&mut parsed.saml_response, "SAMLResponse"),
                "RelayState" => (&mut parsed.relay_state, "RelayState"),
                "SigAlg" => (&mut parsed.sig_alg, "SigAlg"),
                "Signature" => (&mut parsed.signature, "Signature"),
                _ => continue,
            };
            if slot.0.is_some() {
                return Err(ExtractionErrorKind::DuplicateParameter(slot.1));
            }
            *slot.0 = Some(QueryValue {
                raw: raw_value.to_string(),
                value: decode_component(raw_value),
            });
        }
        Ok(parsed)
    }
}

/// Form-urlencoded decoding of a single component (`+` is a space).
fn decode_component(raw: &str) -> String {
    url::form_urlencoded::parse(format!("v={raw}").as_bytes())
        .next()
        .map(|(_, value)| value.into_owned())
        .unwrap_or_default()
}

/// Builds the byte string a Redirect signature covers.
///
/// All arguments are the encoded values as they appear in the query.
#[must_use]
pub fn signed_query_string(
    message_type: SamlMessageType,
    encoded_message: &str,
    encoded_relay_state: Option<&str>,
    encoded_sig_alg: &str,
) -> String {
    let mut signed = format!("{}={encoded_message}", message_type.form_param());
    if let Some(relay_state) = encoded_relay_state {
        signed.push_str("&RelayState=");
        signed.push_str(relay_state);
    }
    signed.push_str("&SigAlg=");
    signed.push_str(encoded_sig_alg);
    signed
}

/// HTTP-Redirect binding encoder/decoder.
pub struct HttpRedirectBinding;

impl HttpRedirectBinding {
    /// Encodes a message into a redirect URL.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::Deflate`] if compression fails.
    pub fn encode(
        xml: &str,
        destination: &str,
        relay_state: Option<&str>,
        message_type: SamlMessageType,
    ) -> SamlResult<String> {
        let query = Self::encode_query(xml, relay_state, message_type)?;
        Ok(append_query(destination, &query))
    }

    /// Encodes and signs a message into a redirect URL.
    ///
    /// The signature covers `SAMLRequest|SAMLResponse`, `RelayState` and
    /// `SigAlg` in that order, exactly as they appear in the URL.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::Deflate`] or [`SamlError::Crypto`].
    pub fn encode_signed(
        xml: &str,
        destination: &str,
        relay_state: Option<&str>,
        message_type: SamlMessageType,
        key: &RsaPrivateKey,
        algorithm: RsaAlgorithm,
    ) -> SamlResult<String> {
        let mut query = Self::encode_query(xml, relay_state, message_type)?;
        query.push_str("&SigAlg=");
        query.push_str(&urlencoding::encode(algorithm.xml_dsig_uri()));

        let signature = key.sign(query.as_bytes(), algorithm)?;
        query.push_str("&Signature=");
        query.push_str(&urlencoding::encode(
            &base64::engine::general_purpose::STANDARD.encode(signature),
        ));
        Ok(append_query(destination, &query))
    }

    fn encode_query(
        xml: &str,
        relay_state: Option<&str>,
        message_type: SamlMessageType,
    ) -> SamlResult<String> {
        let compressed = deflate_compress(xml.as_bytes())?;
        let encoded = base64::engine::general_purpose::STANDARD.encode(compressed);

        let mut query = format!(
            "{}={}",
            message_type.form_param(),
            urlencoding::encode(&encoded)
        );
        if let Some(rs) = relay_state {
            query.push_str("&RelayState=");
            query.push_str(&urlencoding::encode(rs));
        }
        Ok(query)
    }

    /// Decodes a `SAMLRequest`/`SAMLResponse` value into XML bytes.
    ///
    /// The base64 payload is inflated through a [`BoundedReadStream`] so the
    /// output never exceeds `limit` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractionErrorKind::Base64`],
    /// [`ExtractionErrorKind::Decompression`] or
    /// [`ExtractionErrorKind::TooLarge`].
    pub fn decode_message(encoded: &str, limit: usize) -> Result<Vec<u8>, ExtractionErrorKind> {
        let compact: String = encoded.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        let compressed = base64::engine::general_purpose::STANDARD
            .decode(compact)
            .map_err(|e| ExtractionErrorKind::Base64(e.to_string()))?;

        BoundedReadStream::new(DeflateDecoder::new(compressed.as_slice()), limit)
            .read_all()
            .map_err(|e| match LimitExceeded::from_io(&e) {
                Some(limit) => ExtractionErrorKind::TooLarge { limit },
                None => ExtractionErrorKind::Decompression(e.to_string()),
            })
    }
}

fn append_query(destination: &str, query: &str) -> String {
    let separator = if destination.contains('?') { '&' } else { '?' };
    format!("{destination}{separator}{query}")
}

/// Compresses data using DEFLATE (raw, no zlib header).
pub(crate) fn deflate_compress(data: &[u8]) -> SamlResult<Vec<u8>> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| SamlError::Deflate(format!("Compression error: {e}")))?;
    encoder
        .finish()
        .map_err(|e| SamlError::Deflate(format!("Compression finish error: {e}")))
}
