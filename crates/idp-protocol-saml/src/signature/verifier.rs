//! Signature verification for inbound messages.
//!
//! Redirect-bound messages carry a detached signature over the raw query
//! string. POST-bound messages carry an enveloped signature that must
//! reference the document root; anything else is treated as a wrapping
//! attempt and refused.

use std::collections::HashSet;
use std::marker::PhantomData;
use std::sync::Arc;

use base64::Engine;
use idp_core::{Clock, SamlConfig};
use idp_crypto::{rsa_verify, Certificate, RsaAlgorithm};
use thiserror::Error;

use super::DigestAlgorithm;
use crate::bindings::{signed_query_string, BindingType, SamlMessageType};
use crate::error::SamlRequestError;
use crate::extract::{RedirectSignatureData, RequestEnvelope};
use crate::message::SamlMessage;
use crate::types::{transform_algorithms, ServiceProvider, EXC_C14N_NS, XMLDSIG_NS};
use crate::xml::c14n::canonicalize;
use crate::xml::{NodeId, ParseError, SecureXmlParser, XmlDocument};

/// Attribute names treated as XML IDs.
const ID_ATTRIBUTES: [&str; 3] = ["ID", "Id", "AssertionID"];

/// Why a signature was refused.
#[derive(Debug, Error)]
pub enum SignatureCheckError {
    /// Document could not be re-parsed.
    #[error("document rejected: {0}")]
    Parse(#[from] ParseError),

    /// Signed element has no `ID`.
    #[error("signed element has no ID")]
    MissingId,

    /// Two elements share an ID value.
    #[error("duplicate ID {0}")]
    DuplicateId(String),

    /// No signature where one is required.
    #[error("signature missing")]
    MissingSignature,

    /// More than one signature on the signed element.
    #[error("multiple signatures")]
    MultipleSignatures,

    /// Signature structure is incomplete.
    #[error("malformed signature: {0}")]
    Malformed(&'static str),

    /// Algorithm outside the accepted set.
    #[error("unsupported algorithm {0}")]
    UnsupportedAlgorithm(String),

    /// `SignedInfo` must hold exactly one reference.
    #[error("expected one reference, found {0}")]
    ReferenceCount(usize),

    /// Reference points somewhere other than the signed element.
    #[error("reference {actual} does not match {expected}")]
    ReferenceMismatch {
        /// The URI the signature had to use.
        expected: String,
        /// The URI it used.
        actual: String,
    },

    /// Digest does not match the referenced content.
    #[error("digest mismatch")]
    DigestMismatch,

    /// No certificate was available to check against.
    #[error("no certificates")]
    NoCertificates,

    /// No certificate verified the signature value.
    #[error("signature value does not verify")]
    InvalidSignature,
}

/// Decodes base64 element text, skipping XML whitespace.
fn decode_xml_base64(value: &str) -> Option<Vec<u8>> {
    let compact: String = value
        .chars()
        .filter(|c| !matches!(c, ' ' | '\t' | '\r' | '\n'))
        .collect();
    base64::engine::general_purpose::STANDARD.decode(compact).ok()
}

/// Decodes a form-decoded query value, where `+` may have become a space.
fn decode_query_base64(value: &str) -> Option<Vec<u8>> {
    let compact: String = value
        .chars()
        .map(|c| if c == ' ' { '+' } else { c })
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    base64::engine::general_purpose::STANDARD.decode(compact).ok()
}

fn check_unique_ids(doc: &XmlDocument) -> Result<(), SignatureCheckError> {
    let mut seen = HashSet::new();
    for node in doc.descendants(doc.root()) {
        for name in ID_ATTRIBUTES {
            if let Some(value) = doc.attribute(node, name) {
                if !seen.insert(value.to_string()) {
                    return Err(SignatureCheckError::DuplicateId(value.to_string()));
                }
            }
        }
    }
    Ok(())
}

fn inclusive_prefixes(doc: &XmlDocument, method: NodeId) -> Vec<String> {
    doc.find_child(method, EXC_C14N_NS, "InclusiveNamespaces")
        .and_then(|n| doc.attribute(n, "PrefixList"))
        .map(|list| list.split_whitespace().map(String::from).collect())
        .unwrap_or_default()
}

fn algorithm_of(doc: &XmlDocument, node: NodeId) -> &str {
    doc.attribute(node, "Algorithm").unwrap_or_default()
}

fn verify_with<'a>(
    certificates: impl IntoIterator<Item = &'a Certificate>,
    data: &[u8],
    signature: &[u8],
    algorithm: RsaAlgorithm,
) -> Result<(), SignatureCheckError> {
    let mut tried = false;
    for certificate in certificates {
        tried = true;
        let Some(public_key) = certificate.rsa_public_key() else {
            continue;
        };
        if rsa_verify(public_key, data, signature, algorithm).is_ok() {
            return Ok(());
        }
    }
    if tried {
        Err(SignatureCheckError::InvalidSignature)
    } else {
        Err(SignatureCheckError::NoCertificates)
    }
}

/// Verifies the enveloped signature on `target` against `certificates`.
///
/// Exactly one `ds:Signature` must be a direct child of `target`, its only
/// reference must be `#<target ID>`, and no two elements in the document
/// may share an ID. Only the exclusive C14N and enveloped-signature
/// transforms are honoured. Certificates in `KeyInfo` are ignored.
///
/// # Errors
///
/// Returns the first [`SignatureCheckError`] encountered.
pub fn verify_enveloped_signature<'a>(
    doc: &XmlDocument,
    target: NodeId,
    certificates: impl IntoIterator<Item = &'a Certificate>,
) -> Result<(), SignatureCheckError> {
    let target_id = doc
        .attribute(target, "ID")
        .filter(|id| !id.is_empty())
        .ok_or(SignatureCheckError::MissingId)?;
    check_unique_ids(doc)?;

    let signature = match doc.find_children(target, XMLDSIG_NS, "Signature").as_slice() {
        [] => return Err(SignatureCheckError::MissingSignature),
        [one] => *one,
        _ => return Err(SignatureCheckError::MultipleSignatures),
    };
    let signed_info = doc
        .find_child(signature, XMLDSIG_NS, "SignedInfo")
        .ok_or(SignatureCheckError::Malformed("SignedInfo missing"))?;

    let c14n_method = doc
        .find_child(signed_info, XMLDSIG_NS, "CanonicalizationMethod")
        .ok_or(SignatureCheckError::Malformed("CanonicalizationMethod missing"))?;
    if algorithm_of(doc, c14n_method) != transform_algorithms::EXCLUSIVE_C14N {
        return Err(SignatureCheckError::UnsupportedAlgorithm(
            algorithm_of(doc, c14n_method).to_string(),
        ));
    }

    let signature_method = doc
        .find_child(signed_info, XMLDSIG_NS, "SignatureMethod")
        .ok_or(SignatureCheckError::Malformed("SignatureMethod missing"))?;
    let algorithm = RsaAlgorithm::from_uri(algorithm_of(doc, signature_method)).ok_or_else(|| {
        SignatureCheckError::UnsupportedAlgorithm(algorithm_of(doc, signature_method).to_string())
    })?;

    let reference = match doc.find_children(signed_info, XMLDSIG_NS, "Reference").as_slice() {
        [one] => *one,
        other => return Err(SignatureCheckError::ReferenceCount(other.len())),
    };
    let expected = format!("#{target_id}");
    let actual = doc.attribute(reference, "URI").unwrap_or_default();
    if actual != expected {
        return Err(SignatureCheckError::ReferenceMismatch {
            expected,
            actual: actual.to_string(),
        });
    }

    let mut enveloped = false;
    let mut reference_prefixes = Vec::new();
    if let Some(transforms) = doc.find_child(reference, XMLDSIG_NS, "Transforms") {
        for transform in doc.find_children(transforms, XMLDSIG_NS, "Transform") {
            match algorithm_of(doc, transform) {
                transform_algorithms::ENVELOPED_SIGNATURE => enveloped = true,
                transform_algorithms::EXCLUSIVE_C14N => {
                    reference_prefixes = inclusive_prefixes(doc, transform);
                }
                other => return Err(SignatureCheckError::UnsupportedAlgorithm(other.to_string())),
            }
        }
    }
    if !enveloped {
        return Err(SignatureCheckError::Malformed("enveloped-signature transform missing"));
    }

    let digest_method = doc
        .find_child(reference, XMLDSIG_NS, "DigestMethod")
        .ok_or(SignatureCheckError::Malformed("DigestMethod missing"))?;
    let digest_algorithm = DigestAlgorithm::from_uri(algorithm_of(doc, digest_method)).ok_or_else(|| {
        SignatureCheckError::UnsupportedAlgorithm(algorithm_of(doc, digest_method).to_string())
    })?;
    let expected_digest = doc
        .find_child(reference, XMLDSIG_NS, "DigestValue")
        .and_then(|n| decode_xml_base64(&doc.text_content(n)))
        .ok_or(SignatureCheckError::Malformed("DigestValue invalid"))?;

    let canonical = canonicalize(doc, target, Some(signature), &reference_prefixes);
    let actual_digest = digest_algorithm.digest(canonical.as_bytes());
    if !idp_crypto::hash::digests_equal(&actual_digest, &expected_digest) {
        return Err(SignatureCheckError::DigestMismatch);
    }

    let signature_value = doc
        .find_child(signature, XMLDSIG_NS, "SignatureValue")
        .and_then(|n| decode_xml_base64(&doc.text_content(n)))
        .ok_or(SignatureCheckError::Malformed("SignatureValue invalid"))?;
    let canonical_signed_info = canonicalize(
        doc,
        signed_info,
        None,
        &inclusive_prefixes(doc, c14n_method),
    );

    verify_with(
        certificates,
        canonical_signed_info.as_bytes(),
        &signature_value,
        algorithm,
    )
}

/// Verifies signatures on inbound `M` messages against the SP's certificates.
///
/// Only certificates valid at the current instant take part.
pub struct SignatureVerifier<M> {
    clock: Arc<dyn Clock>,
    parser: SecureXmlParser,
    _message: PhantomData<fn() -> M>,
}

impl<M> Clone for SignatureVerifier<M> {
    fn clone(&self) -> Self {
        Self {
            clock: Arc::clone(&self.clock),
            parser: self.parser,
            _message: PhantomData,
        }
    }
}

impl<M> std::fmt::Debug for SignatureVerifier<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier")
            .field("parser", &self.parser)
            .finish_non_exhaustive()
    }
}

impl<M: SamlMessage> SignatureVerifier<M> {
    /// Creates a verifier with the default message ceiling.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            parser: SecureXmlParser::new(),
            _message: PhantomData,
        }
    }

    /// Creates a verifier from configuration.
    #[must_use]
    pub fn from_config(config: &SamlConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            parser: SecureXmlParser::new().with_max_size(config.max_message_size),
            _message: PhantomData,
        }
    }

    /// Verifies according to the binding the message arrived on.
    ///
    /// # Errors
    ///
    /// Responder error when the SP has no currently valid certificate,
    /// Requester `Invalid signature` for every other failure.
    pub fn verify(&self, envelope: &RequestEnvelope<M>, sp: &ServiceProvider) -> Result<(), SamlRequestError> {
        match envelope.binding() {
            BindingType::Redirect => self.verify_redirect(envelope, sp),
            BindingType::Post => self.verify_post(envelope, sp),
        }
    }

    /// Verifies the detached signature of a Redirect-bound message.
    ///
    /// # Errors
    ///
    /// See [`Self::verify`].
    pub fn verify_redirect(
        &self,
        envelope: &RequestEnvelope<M>,
        sp: &ServiceProvider,
    ) -> Result<(), SamlRequestError> {
        let certificates = self.valid_certificates(sp)?;
        let result = envelope
            .redirect_signature()
            .ok_or(SignatureCheckError::MissingSignature)
            .and_then(|data| Self::check_redirect(data, &certificates));
        self.finish(result, sp, BindingType::Redirect)
    }

    /// Verifies the enveloped signature of a POST-bound message.
    ///
    /// The raw XML is parsed again with the hardened parser so the checked
    /// tree is exactly what was received.
    ///
    /// # Errors
    ///
    /// See [`Self::verify`].
    pub fn verify_post(&self, envelope: &RequestEnvelope<M>, sp: &ServiceProvider) -> Result<(), SamlRequestError> {
        let certificates = self.valid_certificates(sp)?;
        let result = self
            .parser
            .parse_bytes(envelope.raw_xml())
            .map_err(SignatureCheckError::from)
            .and_then(|doc| verify_enveloped_signature(&doc, doc.root(), certificates.iter().copied()));
        self.finish(result, sp, BindingType::Post)
    }

    fn check_redirect(
        data: &RedirectSignatureData,
        certificates: &[&Certificate],
    ) -> Result<(), SignatureCheckError> {
        let (Some(signature), Some(sig_alg), Some(encoded_sig_alg)) =
            (&data.signature, &data.sig_alg, &data.encoded_sig_alg)
        else {
            return Err(SignatureCheckError::MissingSignature);
        };
        let algorithm = RsaAlgorithm::from_uri(sig_alg)
            .ok_or_else(|| SignatureCheckError::UnsupportedAlgorithm(sig_alg.clone()))?;
        let signature = decode_query_base64(signature).ok_or(SignatureCheckError::Malformed("Signature invalid"))?;

        let signed = signed_query_string(
            SamlMessageType::Request,
            &data.encoded_message,
            data.encoded_relay_state.as_deref(),
            encoded_sig_alg,
        );
        verify_with(certificates.iter().copied(), signed.as_bytes(), &signature, algorithm)
    }

    fn valid_certificates<'a>(&self, sp: &'a ServiceProvider) -> Result<Vec<&'a Certificate>, SamlRequestError> {
        let certificates: Vec<_> = sp.valid_signing_certificates(self.clock.now()).collect();
        if certificates.is_empty() {
            tracing::warn!(
                sp = %sp.entity_id,
                configured = sp.signing_certificates.len(),
                "No valid signing certificates"
            );
            return Err(SamlRequestError::responder("No valid certificates"));
        }
        Ok(certificates)
    }

    fn finish(
        &self,
        result: Result<(), SignatureCheckError>,
        sp: &ServiceProvider,
        binding: BindingType,
    ) -> Result<(), SamlRequestError> {
        match result {
            Ok(()) => {
                tracing::debug!(sp = %sp.entity_id, %binding, message = M::MESSAGE_NAME, "Signature verified");
                Ok(())
            }
            Err(err) => {
                tracing::warn!(
                    sp = %sp.entity_id,
                    %binding,
                    message = M::MESSAGE_NAME,
                    reason = %err,
                    "Signature verification failed"
                );
                Err(SamlRequestError::requester("Invalid signature"))
            }
        }
    }
}
