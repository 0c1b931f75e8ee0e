//! SAML 2.0 IdP protocol message security pipeline.
//!
//! This crate turns inbound SAML requests into trusted, typed messages and
//! secures the responses sent back:
//!
//! - **Hardened XML** - no DTDs, no entities, bounded size and depth
//! - **Redirect and POST bindings** - bounded decoding, exact signed-query reconstruction
//! - **Field validation** - version, freshness window and destination
//! - **Signature verification** - detached and enveloped, with wrapping defenses
//! - **Response signing and assertion encryption** - XML-DSig and XML-Enc
//!
//! # Architecture
//!
//! - [`xml`] - Secure parser, DOM and exclusive canonicalization
//! - [`bindings`] - POST and Redirect encoders/decoders, auto-post page
//! - [`extract`] - Typed message extraction from an HTTP request
//! - [`validation`] - Protocol field checks
//! - [`signature`] - XML signature creation and verification
//! - [`encryption`] - Assertion encryption
//! - [`processor`] - The per-request pipeline and message handlers
//! - [`dispatch`] / [`error_response`] - Outbound success and error responses
//! - [`provider`] / [`replay`] - External collaborators
//! - [`types`] - SAML messages, assertions and SP configuration
//! - [`error`] - Error types
//!
//! # Example
//!
//! ```rust,ignore
//! use idp_protocol_saml::processor::{AuthnRequestHandler, ProtocolMessageProcessor};
//!
//! let processor = ProtocolMessageProcessor::new(
//!     AuthnRequestHandler::from_config(&config),
//!     &config,
//!     clock,
//!     store,
//! );
//! match processor.process_request(&request).await {
//!     Ok(validated) => dispatcher.deliver(&response, &validated).await?,
//!     Err(failure) => { /* render or reject */ }
//! }
//! ```
//!
//! # SAML Specifications
//!
//! - [SAML 2.0 Core](https://docs.oasis-open.org/security/saml/v2.0/saml-core-2.0-os.pdf)
//! - [SAML 2.0 Bindings](https://docs.oasis-open.org/security/saml/v2.0/saml-bindings-2.0-os.pdf)
//! - [XML Signature](https://www.w3.org/TR/xmldsig-core1/)
//! - [XML Encryption](https://www.w3.org/TR/xmlenc-core1/)
//! - [Exclusive XML Canonicalization](https://www.w3.org/TR/xml-exc-c14n/)

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod bindings;
pub mod dispatch;
pub mod encryption;
pub mod error;
pub mod error_response;
pub mod extract;
pub mod message;
pub mod processor;
pub mod provider;
pub mod replay;
pub mod signature;
pub mod types;
pub mod validation;
pub mod xml;

pub use dispatch::ResponseDispatcher;
pub use encryption::AssertionEncryptor;
pub use error::{ExtractionError, ExtractionErrorKind, SamlError, SamlRequestError, SamlResult};
pub use error_response::{ErrorResponseDelivery, ErrorResponseRenderer};
pub use extract::{MessageExtractor, RequestEnvelope};
pub use message::SamlMessage;
pub use processor::{ProcessingFailure, ProtocolFailure, ProtocolMessageProcessor, ValidationOutcome};
pub use provider::{KeyMaterialProvider, ServiceProviderStore};
pub use replay::ReplayCache;
pub use signature::{MessageSigner, ResponseSigner, SignatureVerifier, SigningCredential, XmlSignatureEngine};
pub use types::*;
pub use validation::RequestFieldValidator;
