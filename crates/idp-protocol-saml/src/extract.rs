//! Binding-aware extraction of inbound protocol messages.
//!
//! [`MessageExtractor`] turns an [`InboundRequest`] into a
//! [`RequestEnvelope`]: the typed message, the hardened DOM it came from,
//! and whatever the binding needs later for signature verification.

use std::marker::PhantomData;

use axum::http::Method;
use idp_core::SamlConfig;

use crate::bindings::{
    BindingType, HttpPostBinding, HttpRedirectBinding, InboundRequest, PostForm, QueryValue,
    RedirectQuery,
};
use crate::error::{ExtractionError, ExtractionErrorKind};
use crate::message::SamlMessage;
use crate::types::XMLDSIG_NS;
use crate::xml::{SecureXmlParser, XmlDocument, DEFAULT_MAX_SIZE};

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Detached signature material of a Redirect-bound message.
///
/// The encoded values are kept byte-for-byte as received because the
/// signature covers them, not their decoded forms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectSignatureData {
    /// `SAMLRequest` exactly as it appeared in the query.
    pub encoded_message: String,
    /// `RelayState` exactly as it appeared in the query.
    pub encoded_relay_state: Option<String>,
    /// `SigAlg` exactly as it appeared in the query.
    pub encoded_sig_alg: Option<String>,
    /// Decoded `SigAlg`.
    pub sig_alg: Option<String>,
    /// Decoded (still base64) `Signature`.
    pub signature: Option<String>,
}

/// How the message arrived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingData {
    /// HTTP-Redirect with its detached signature data.
    Redirect(RedirectSignatureData),
    /// HTTP-POST; any signature is embedded in the document.
    Post,
}

/// A typed inbound message together with everything needed to verify it.
#[derive(Debug, Clone)]
pub struct RequestEnvelope<M> {
    message: M,
    document: XmlDocument,
    raw_xml: Vec<u8>,
    binding: BindingData,
    relay_state: Option<String>,
}

impl<M: SamlMessage> RequestEnvelope<M> {
    pub(crate) fn new(
        message: M,
        document: XmlDocument,
        raw_xml: Vec<u8>,
        binding: BindingData,
        relay_state: Option<String>,
    ) -> Self {
        Self {
            message,
            document,
            raw_xml,
            binding,
            relay_state,
        }
    }

    /// The parsed message.
    #[must_use]
    pub fn message(&self) -> &M {
        &self.message
    }

    /// The document the message was parsed from.
    #[must_use]
    pub fn document(&self) -> &XmlDocument {
        &self.document
    }

    /// Decoded XML bytes as received.
    #[must_use]
    pub fn raw_xml(&self) -> &[u8] {
        &self.raw_xml
    }

    /// Binding the message arrived on.
    #[must_use]
    pub fn binding(&self) -> BindingType {
        match self.binding {
            BindingData::Redirect(_) => BindingType::Redirect,
            BindingData::Post => BindingType::Post,
        }
    }

    /// Binding-specific data.
    #[must_use]
    pub fn binding_data(&self) -> &BindingData {
        &self.binding
    }

    /// Redirect signature data, for Redirect-bound messages.
    #[must_use]
    pub fn redirect_signature(&self) -> Option<&RedirectSignatureData> {
        match &self.binding {
            BindingData::Redirect(data) => Some(data),
            BindingData::Post => None,
        }
    }

    /// `RelayState`, echoed back unmodified.
    #[must_use]
    pub fn relay_state(&self) -> Option<&str> {
        self.relay_state.as_deref()
    }

    /// Whether the sender attached a signature of any kind.
    #[must_use]
    pub fn has_signature(&self) -> bool {
        match &self.binding {
            BindingData::Redirect(data) => data.signature.is_some() || data.sig_alg.is_some(),
            BindingData::Post => self
                .document
                .find_child(self.document.root(), XMLDSIG_NS, "Signature")
                .is_some(),
        }
    }
}

/// Extracts `M` from either binding.
#[derive(Debug, Clone)]
pub struct MessageExtractor<M> {
    parser: SecureXmlParser,
    _message: PhantomData<fn() -> M>,
}

impl<M: SamlMessage> Default for MessageExtractor<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: SamlMessage> MessageExtractor<M> {
    /// Creates an extractor with the default 1 MiB ceiling.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_message_size(DEFAULT_MAX_SIZE)
    }

    /// Creates an extractor with a custom ceiling on decoded XML.
    #[must_use]
    pub fn with_max_message_size(limit: usize) -> Self {
        Self {
            parser: SecureXmlParser::new().with_max_size(limit),
            _message: PhantomData,
        }
    }

    /// Creates an extractor from configuration.
    #[must_use]
    pub fn from_config(config: &SamlConfig) -> Self {
        Self::with_max_message_size(config.max_message_size)
    }

    /// Extracts the message according to the request's method.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractionError`] naming `M::MESSAGE_NAME` and the reason.
    pub fn extract(&self, request: &InboundRequest) -> Result<RequestEnvelope<M>, ExtractionError> {
        let method = request.method();
        let result = if *method == Method::GET {
            self.extract_redirect(request)
        } else if *method == Method::POST {
            self.extract_post(request)
        } else {
            Err(ExtractionErrorKind::UnsupportedMethod(method.clone()))
        };

        match result {
            Ok(envelope) => {
                tracing::debug!(
                    message = M::MESSAGE_NAME,
                    binding = %envelope.binding(),
                    issuer = envelope.message().issuer(),
                    "Extracted SAML message"
                );
                Ok(envelope)
            }
            Err(kind) => {
                let err = ExtractionError::new(M::MESSAGE_NAME, kind);
                tracing::warn!(message = M::MESSAGE_NAME, error = %err, "Rejected SAML message");
                Err(err)
            }
        }
    }

    fn extract_redirect(&self, request: &InboundRequest) -> Result<RequestEnvelope<M>, ExtractionErrorKind> {
        let query = RedirectQuery::parse(request.query().unwrap_or_default())?;
        let saml_request = query
            .saml_request
            .filter(|v| !v.value.is_empty())
            .ok_or(ExtractionErrorKind::MissingParameter("SAMLRequest"))?;

        let xml = HttpRedirectBinding::decode_message(&saml_request.value, self.parser.max_size())?;
        let (message, document) = self.parse(&xml)?;

        let binding = BindingData::Redirect(RedirectSignatureData {
            encoded_message: saml_request.raw,
            encoded_relay_state: query.relay_state.as_ref().map(|v| v.raw.clone()),
            encoded_sig_alg: query.sig_alg.as_ref().map(|v| v.raw.clone()),
            sig_alg: query.sig_alg.map(|v| v.value),
            signature: query.signature.map(|v| v.value),
        });
        let relay_state = query.relay_state.map(|QueryValue { value, .. }| value);
        Ok(RequestEnvelope::new(message, document, xml, binding, relay_state))
    }

    fn extract_post(&self, request: &InboundRequest) -> Result<RequestEnvelope<M>, ExtractionErrorKind> {
        if request.media_type().as_deref() != Some(FORM_CONTENT_TYPE) {
            return Err(ExtractionErrorKind::UnsupportedContentType(
                request.content_type().map(String::from),
            ));
        }
        let form = PostForm::parse(request.body())?;
        let encoded = form
            .saml_request
            .filter(|v| !v.is_empty())
            .ok_or(ExtractionErrorKind::MissingParameter("SAMLRequest"))?;

        let xml = HttpPostBinding::decode_message(&encoded, self.parser.max_size())?;
        let (message, document) = self.parse(&xml)?;
        Ok(RequestEnvelope::new(
            message,
            document,
            xml,
            BindingData::Post,
            form.relay_state,
        ))
    }

    fn parse(&self, xml: &[u8]) -> Result<(M, XmlDocument), ExtractionErrorKind> {
        let document = self.parser.parse_bytes(xml)?;
        let message = M::parse(&document)?;
        Ok((message, document))
    }
}
