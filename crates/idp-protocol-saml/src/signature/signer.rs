//! Outbound message signing.
//!
//! The signing credential is fetched from the [`KeyMaterialProvider`] for
//! every call, never cached here.

use std::sync::Arc;

use idp_crypto::RsaAlgorithm;

use super::XmlSignatureEngine;
use crate::bindings::{HttpRedirectBinding, SamlMessageType};
use crate::error::{SamlError, SamlResult};
use crate::provider::KeyMaterialProvider;
use crate::types::{ServiceProvider, SigningBehavior, SAML_NS};
use crate::xml::{SecureXmlParser, XmlDocument};

/// Ceiling for documents this IdP produced itself.
pub(crate) const OUTBOUND_MAX_SIZE: usize = 16 * 1024 * 1024;

pub(crate) fn outbound_parser() -> SecureXmlParser {
    SecureXmlParser::new().with_max_size(OUTBOUND_MAX_SIZE)
}

/// Signs the root of any outbound protocol message.
#[derive(Clone)]
pub struct MessageSigner {
    keys: Arc<dyn KeyMaterialProvider>,
    engine: XmlSignatureEngine,
}

impl std::fmt::Debug for MessageSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageSigner")
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}

impl MessageSigner {
    /// Creates a signer.
    #[must_use]
    pub fn new(keys: Arc<dyn KeyMaterialProvider>) -> Self {
        Self {
            keys,
            engine: XmlSignatureEngine::new(),
        }
    }

    /// Signs the root of `doc` in place.
    ///
    /// # Errors
    ///
    /// Fails if no credential is available or signing fails.
    pub async fn sign_document(&self, doc: &mut XmlDocument) -> SamlResult<()> {
        let credential = self.keys.signing_credential().await?;
        self.engine.sign_root(doc, &credential)?;
        Ok(())
    }

    /// Parses `xml`, signs its root and returns the serialized result.
    ///
    /// # Errors
    ///
    /// Fails if `xml` does not parse, no credential is available or
    /// signing fails.
    pub async fn sign(&self, xml: &str) -> SamlResult<String> {
        let mut doc = outbound_parser().parse_str(xml)?;
        self.sign_document(&mut doc).await?;
        Ok(doc.serialize())
    }

    /// Builds a Redirect-binding URL with a detached RSA-SHA256 signature.
    ///
    /// # Errors
    ///
    /// Fails if no credential is available or encoding fails.
    pub async fn redirect_url(
        &self,
        xml: &str,
        destination: &str,
        relay_state: Option<&str>,
        message_type: SamlMessageType,
    ) -> SamlResult<String> {
        let credential = self.keys.signing_credential().await?;
        HttpRedirectBinding::encode_signed(
            xml,
            destination,
            relay_state,
            message_type,
            &credential.private_key,
            RsaAlgorithm::RsaSha256,
        )
    }
}

/// Applies an SP's [`SigningBehavior`] to a `samlp:Response`.
#[derive(Clone)]
pub struct ResponseSigner {
    keys: Arc<dyn KeyMaterialProvider>,
    engine: XmlSignatureEngine,
}

impl std::fmt::Debug for ResponseSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseSigner")
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}

impl ResponseSigner {
    /// Creates a signer.
    #[must_use]
    pub fn new(keys: Arc<dyn KeyMaterialProvider>) -> Self {
        Self {
            keys,
            engine: XmlSignatureEngine::new(),
        }
    }

    /// Signs `response_xml` as the SP's policy requires.
    ///
    /// With [`SigningBehavior::SignBoth`] the assertion is signed first and
    /// the response signature then covers it.
    ///
    /// # Errors
    ///
    /// Fails on unparseable input, a missing assertion when one must be
    /// signed, or unavailable key material.
    pub async fn sign(&self, response_xml: &str, sp: &ServiceProvider) -> SamlResult<String> {
        let result = match sp.signing_behavior {
            SigningBehavior::DoNotSign => Ok(response_xml.to_string()),
            SigningBehavior::SignResponse => self.sign_response(response_xml).await,
            SigningBehavior::SignAssertion => self.sign_assertion(response_xml).await,
            SigningBehavior::SignBoth => match self.sign_assertion(response_xml).await {
                Ok(signed) => self.sign_response(&signed).await,
                Err(err) => Err(err),
            },
        };
        if let Err(err) = &result {
            tracing::error!(sp = %sp.entity_id, behavior = ?sp.signing_behavior, error = %err, "Failed to sign response");
        }
        result
    }

    /// Signs the first `saml:Assertion` child of the response root.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::MissingElement`] if there is no assertion.
    pub async fn sign_assertion(&self, response_xml: &str) -> SamlResult<String> {
        let mut doc = outbound_parser().parse_str(response_xml)?;
        let assertion = doc
            .find_child(doc.root(), SAML_NS, "Assertion")
            .ok_or_else(|| SamlError::MissingElement("Assertion".into()))?;
        let credential = self.keys.signing_credential().await?;
        self.engine.sign_element(&mut doc, assertion, &credential)?;
        Ok(doc.serialize())
    }

    /// Signs the response root.
    ///
    /// # Errors
    ///
    /// Fails on unparseable input or unavailable key material.
    pub async fn sign_response(&self, response_xml: &str) -> SamlResult<String> {
        let mut doc = outbound_parser().parse_str(response_xml)?;
        let credential = self.keys.signing_credential().await?;
        self.engine.sign_root(&mut doc, &credential)?;
        Ok(doc.serialize())
    }
}
