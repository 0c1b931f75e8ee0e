//! Enveloped XML-DSig signature creation.

use base64::Engine;
use idp_crypto::RsaAlgorithm;

use super::{DigestAlgorithm, SigningCredential};
use crate::error::{SamlError, SamlResult};
use crate::types::{transform_algorithms, SAML_NS, XMLDSIG_NS};
use crate::xml::c14n::canonicalize;
use crate::xml::{Element, NodeId, XmlDocument};

fn ds(local_name: &str) -> Element {
    Element::new(Some("ds"), local_name, Some(XMLDSIG_NS))
}

/// Creates enveloped signatures over elements carrying an `ID` attribute.
///
/// The reference digest is taken over the exclusive canonical form of the
/// target before the signature is inserted, which is what a verifier sees
/// after applying the enveloped-signature transform.
#[derive(Debug, Clone, Copy)]
pub struct XmlSignatureEngine {
    algorithm: RsaAlgorithm,
    digest: DigestAlgorithm,
}

impl Default for XmlSignatureEngine {
    fn default() -> Self {
        Self {
            algorithm: RsaAlgorithm::RsaSha256,
            digest: DigestAlgorithm::Sha256,
        }
    }
}

impl XmlSignatureEngine {
    /// RSA-SHA256 with SHA-256 digests.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the signature algorithm.
    #[must_use]
    pub fn with_algorithm(mut self, algorithm: RsaAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Overrides the reference digest algorithm.
    #[must_use]
    pub fn with_digest(mut self, digest: DigestAlgorithm) -> Self {
        self.digest = digest;
        self
    }

    /// Signs `target` in place and returns the `ds:Signature` node.
    ///
    /// The signature is placed right after the target's `saml:Issuer`, or
    /// as its first child when there is no issuer.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::SignatureCreation`] if the target has no `ID`
    /// or the private key refuses to sign.
    pub fn sign_element(
        &self,
        doc: &mut XmlDocument,
        target: NodeId,
        credential: &SigningCredential,
    ) -> SamlResult<NodeId> {
        let id = doc
            .attribute(target, "ID")
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .ok_or_else(|| SamlError::SignatureCreation("element has no ID attribute".into()))?;

        let canonical = canonicalize(doc, target, None, &[]);
        let digest_value =
            base64::engine::general_purpose::STANDARD.encode(self.digest.digest(canonical.as_bytes()));

        let signature = doc.create_element(Element::declared("ds", "Signature", XMLDSIG_NS));
        let signed_info = doc.append_element(signature, ds("SignedInfo"));
        doc.append_element(
            signed_info,
            ds("CanonicalizationMethod").with_attribute("Algorithm", transform_algorithms::EXCLUSIVE_C14N),
        );
        doc.append_element(
            signed_info,
            ds("SignatureMethod").with_attribute("Algorithm", self.algorithm.xml_dsig_uri()),
        );
        let reference = doc.append_element(
            signed_info,
            ds("Reference").with_attribute("URI", format!("#{id}")),
        );
        let transforms = doc.append_element(reference, ds("Transforms"));
        doc.append_element(
            transforms,
            ds("Transform").with_attribute("Algorithm", transform_algorithms::ENVELOPED_SIGNATURE),
        );
        doc.append_element(
            transforms,
            ds("Transform").with_attribute("Algorithm", transform_algorithms::EXCLUSIVE_C14N),
        );
        doc.append_element(
            reference,
            ds("DigestMethod").with_attribute("Algorithm", self.digest.uri()),
        );
        doc.append_text_element(reference, ds("DigestValue"), digest_value);
        let signature_value = doc.append_element(signature, ds("SignatureValue"));
        let key_info = doc.append_element(signature, ds("KeyInfo"));
        let x509_data = doc.append_element(key_info, ds("X509Data"));
        doc.append_text_element(
            x509_data,
            ds("X509Certificate"),
            credential.certificate.to_base64(),
        );

        match doc.find_child(target, SAML_NS, "Issuer") {
            Some(issuer) => doc.insert_after(issuer, signature),
            None => doc.insert_child(target, 0, signature),
        }

        let canonical_signed_info = canonicalize(doc, signed_info, None, &[]);
        let value = credential
            .private_key
            .sign(canonical_signed_info.as_bytes(), self.algorithm)
            .map_err(|e| SamlError::SignatureCreation(e.to_string()))?;
        doc.set_text(
            signature_value,
            base64::engine::general_purpose::STANDARD.encode(value),
        );

        tracing::debug!(reference = %id, algorithm = self.algorithm.xml_dsig_uri(), "Signed element");
        Ok(signature)
    }

    /// Signs the document root.
    ///
    /// # Errors
    ///
    /// See [`Self::sign_element`].
    pub fn sign_root(&self, doc: &mut XmlDocument, credential: &SigningCredential) -> SamlResult<NodeId> {
        let root = doc.root();
        self.sign_element(doc, root, credential)
    }
}
