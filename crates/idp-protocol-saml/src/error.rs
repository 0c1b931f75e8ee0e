//! SAML error types.
//!
//! Two families of failure exist. [`SamlError`] and [`ExtractionError`] are
//! local: malformed transport, configuration or crypto problems that are
//! never forwarded to a service provider. [`SamlRequestError`] is a protocol
//! error that is rendered back to the SP as a SAML `Status`.

use axum::http::Method;
use thiserror::Error;

use crate::types::{status_codes, StatusCode};
use crate::xml::ParseError;

/// Result type for SAML operations.
pub type SamlResult<T> = Result<T, SamlError>;

/// Local SAML failures.
#[derive(Debug, Error)]
pub enum SamlError {
    /// Inbound message could not be extracted.
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    /// HTTP body could not be read.
    #[error("failed to read request body: {0}")]
    RequestBody(String),

    /// XML rejected by the hardened parser.
    #[error("XML parsing error: {0}")]
    XmlParse(#[from] ParseError),

    /// Missing required element or attribute.
    #[error("missing required element: {0}")]
    MissingElement(String),

    /// XML signature creation failed.
    #[error("signature creation failed: {0}")]
    SignatureCreation(String),

    /// No encryption certificate passed validation.
    #[error("no usable encryption certificate for {0}")]
    NoEncryptionCertificate(String),

    /// Assertion encryption failed.
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// Signing credential could not be obtained.
    #[error("key material unavailable: {0}")]
    KeyMaterial(String),

    /// Service provider store failure.
    #[error("service provider store error: {0}")]
    Store(String),

    /// Base64 decoding error.
    #[error("base64 decode error: {0}")]
    Base64Decode(String),

    /// Deflate compression error.
    #[error("deflate error: {0}")]
    Deflate(String),

    /// Cryptographic operation error.
    #[error("crypto error: {0}")]
    Crypto(#[from] idp_crypto::CryptoError),

    /// The SP registers no endpoint a response can be sent to.
    #[error("no response endpoint registered for {0}")]
    NoResponseEndpoint(String),
}

impl SamlError {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        match self {
            Self::Extraction(_)
            | Self::RequestBody(_)
            | Self::XmlParse(_)
            | Self::Base64Decode(_)
            | Self::Deflate(_) => 400,
            _ => 500,
        }
    }
}

impl From<base64::DecodeError> for SamlError {
    fn from(err: base64::DecodeError) -> Self {
        Self::Base64Decode(err.to_string())
    }
}

/// Failure to turn an HTTP request into a typed SAML message.
#[derive(Debug, Error)]
#[error("invalid {message_type}: {kind}")]
pub struct ExtractionError {
    /// Name of the expected message type, e.g. `AuthnRequest`.
    pub message_type: &'static str,
    /// What went wrong.
    pub kind: ExtractionErrorKind,
}

impl ExtractionError {
    pub(crate) fn new(message_type: &'static str, kind: ExtractionErrorKind) -> Self {
        Self { message_type, kind }
    }
}

/// Extraction failure reasons.
#[derive(Debug, Error)]
pub enum ExtractionErrorKind {
    /// HTTP method other than GET or POST.
    #[error("unsupported HTTP method {0}")]
    UnsupportedMethod(Method),

    /// POST without a form content type.
    #[error("unsupported content type {0:?}")]
    UnsupportedContentType(Option<String>),

    /// Required parameter absent or empty.
    #[error("missing {0} parameter")]
    MissingParameter(&'static str),

    /// Parameter given more than once.
    #[error("duplicate {0} parameter")]
    DuplicateParameter(&'static str),

    /// Message parameter is not valid base64.
    #[error("invalid base64 encoding: {0}")]
    Base64(String),

    /// DEFLATE stream invalid.
    #[error("decompression failed: {0}")]
    Decompression(String),

    /// Decoded message larger than the ceiling.
    #[error("message exceeds the {limit} byte limit")]
    TooLarge {
        /// Configured ceiling in bytes.
        limit: usize,
    },

    /// Hardened parser rejected the XML.
    #[error("XML rejected: {0}")]
    Parse(#[from] ParseError),

    /// Well-formed XML that is not a valid message of the expected kind.
    #[error("{0}")]
    Format(#[from] MessageFormatError),
}

/// Structural problem in an otherwise well-formed message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct MessageFormatError(pub String);

impl MessageFormatError {
    /// Creates a format error.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Protocol error reported back to the service provider.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct SamlRequestError {
    /// Top-level status code URI.
    pub status_code: String,
    /// Optional second-level status code URI.
    pub sub_status_code: Option<String>,
    /// Human-readable status message.
    pub message: String,
}

impl SamlRequestError {
    fn new(status_code: &str, message: impl Into<String>) -> Self {
        Self {
            status_code: status_code.to_string(),
            sub_status_code: None,
            message: message.into(),
        }
    }

    /// The request was malformed or not acceptable.
    pub fn requester(message: impl Into<String>) -> Self {
        Self::new(status_codes::REQUESTER, message)
    }

    /// The IdP could not process an otherwise acceptable request.
    pub fn responder(message: impl Into<String>) -> Self {
        Self::new(status_codes::RESPONDER, message)
    }

    /// The request's SAML version is not supported.
    pub fn version_mismatch(message: impl Into<String>) -> Self {
        Self::new(status_codes::VERSION_MISMATCH, message)
    }

    /// Adds a second-level status code.
    #[must_use]
    pub fn with_sub_status(mut self, sub_status_code: impl Into<String>) -> Self {
        self.sub_status_code = Some(sub_status_code.into());
        self
    }

    /// Returns the nested SAML status code.
    #[must_use]
    pub fn to_status_code(&self) -> StatusCode {
        let code = StatusCode::new(self.status_code.clone());
        match &self.sub_status_code {
            Some(sub) => code.with_sub_status(StatusCode::new(sub.clone())),
            None => code,
        }
    }
}
