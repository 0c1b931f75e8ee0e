//! The inbound request pipeline.
//!
//! [`ProtocolMessageProcessor`] runs one pass per request, in order:
//!
//! 1. resolve the SP named by `Issuer`
//! 2. check version, freshness and destination
//! 3. verify the signature when the handler requires one
//! 4. refuse replayed `(Issuer, ID)` pairs among signature-verified requests
//! 5. run the handler's own checks
//! 6. hand the request to the handler's success path
//!
//! Failures in step 1, and a missing signing certificate in step 3, are
//! local: the SP is not trusted yet, so nothing is sent back. Every later
//! failure is a [`ProtocolFailure`] to be rendered to the SP.

mod authn;
mod logout;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use idp_core::{Clock, SamlConfig};

pub use authn::*;
pub use logout::*;

use crate::bindings::InboundRequest;
use crate::error::{ExtractionError, SamlRequestError};
use crate::extract::{MessageExtractor, RequestEnvelope};
use crate::message::SamlMessage;
use crate::provider::ServiceProviderStore;
use crate::replay::{replay_key, InMemoryReplayCache, ReplayCache};
use crate::signature::SignatureVerifier;
use crate::types::ServiceProvider;
use crate::validation::RequestFieldValidator;

/// Message-kind specific hooks plugged into the shared pipeline.
#[async_trait]
pub trait ProtocolMessageHandler: Send + Sync {
    /// The inbound message kind.
    type Message: SamlMessage;

    /// What a fully validated request turns into.
    type Success: Send;

    /// URL this IdP expects in the message's `Destination`.
    fn expected_destination(&self) -> &str;

    /// Whether `envelope` from `sp` must carry a valid signature.
    fn requires_signature(&self, envelope: &RequestEnvelope<Self::Message>, sp: &ServiceProvider) -> bool;

    /// Checks specific to this message kind. `None` means valid.
    fn validate_message(
        &self,
        envelope: &RequestEnvelope<Self::Message>,
        sp: &ServiceProvider,
        now: DateTime<Utc>,
    ) -> Option<SamlRequestError>;

    /// Success path for a request that passed every check.
    async fn process_validated(
        &self,
        sp: ServiceProvider,
        envelope: RequestEnvelope<Self::Message>,
    ) -> Result<Self::Success, SamlRequestError>;
}

/// A failure that must be answered with a SAML error response.
#[derive(Debug, Clone)]
pub struct ProtocolFailure<M> {
    /// The SP the error goes back to.
    pub service_provider: ServiceProvider,
    /// The rejected request.
    pub request: M,
    /// `RelayState` to echo.
    pub relay_state: Option<String>,
    /// Status to report.
    pub error: SamlRequestError,
}

/// Result of running every check without the success path.
#[derive(Debug, Clone)]
pub enum ValidationOutcome<M> {
    /// All checks passed for this SP.
    Valid(ServiceProvider),
    /// Local failure. Nothing is sent to the SP.
    ValidationFailure {
        /// Reason, for logs and the local error page.
        message: String,
    },
    /// Failure reported to the SP.
    ProtocolFailure(ProtocolFailure<M>),
}

/// Why [`ProtocolMessageProcessor::process`] did not succeed.
#[derive(Debug, Clone)]
pub enum ProcessingFailure<M> {
    /// The HTTP request did not carry a usable message.
    Extraction(Arc<ExtractionError>),
    /// Local failure. Nothing is sent to the SP.
    Validation {
        /// Reason, for logs and the local error page.
        message: String,
    },
    /// Failure reported to the SP.
    Protocol(ProtocolFailure<M>),
}

impl<M> ProcessingFailure<M> {
    /// The protocol failure, if this is one.
    #[must_use]
    pub fn protocol(&self) -> Option<&ProtocolFailure<M>> {
        match self {
            Self::Protocol(failure) => Some(failure),
            _ => None,
        }
    }
}

fn validation_failure<M>(message: impl Into<String>) -> ValidationOutcome<M> {
    ValidationOutcome::ValidationFailure {
        message: message.into(),
    }
}

/// Runs the shared pipeline for one message kind.
pub struct ProtocolMessageProcessor<H: ProtocolMessageHandler> {
    handler: H,
    store: Arc<dyn ServiceProviderStore>,
    extractor: MessageExtractor<H::Message>,
    validator: RequestFieldValidator,
    verifier: SignatureVerifier<H::Message>,
    replay_cache: Option<Arc<dyn ReplayCache>>,
}

impl<H: ProtocolMessageHandler> std::fmt::Debug for ProtocolMessageProcessor<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolMessageProcessor")
            .field("message", &H::Message::MESSAGE_NAME)
            .field("validator", &self.validator)
            .field("replay_protection", &self.replay_cache.is_some())
            .finish_non_exhaustive()
    }
}

impl<H: ProtocolMessageHandler> ProtocolMessageProcessor<H> {
    /// Creates a processor. With `replay_protection` enabled an in-memory
    /// replay cache is used until [`Self::with_replay_cache`] replaces it.
    #[must_use]
    pub fn new(
        handler: H,
        config: &SamlConfig,
        clock: Arc<dyn Clock>,
        store: Arc<dyn ServiceProviderStore>,
    ) -> Self {
        let replay_cache: Option<Arc<dyn ReplayCache>> = config
            .replay_protection
            .then(|| Arc::new(InMemoryReplayCache::new()) as Arc<dyn ReplayCache>);
        Self {
            handler,
            store,
            extractor: MessageExtractor::from_config(config),
            validator: RequestFieldValidator::new(config, Arc::clone(&clock)),
            verifier: SignatureVerifier::from_config(config, clock),
            replay_cache,
        }
    }

    /// Uses a shared replay cache.
    #[must_use]
    pub fn with_replay_cache(mut self, cache: Arc<dyn ReplayCache>) -> Self {
        self.replay_cache = Some(cache);
        self
    }

    /// The handler.
    #[must_use]
    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Extracts the message from `request` and processes it.
    ///
    /// # Errors
    ///
    /// See [`ProcessingFailure`].
    pub async fn process_request(
        &self,
        request: &InboundRequest,
    ) -> Result<H::Success, ProcessingFailure<H::Message>> {
        let envelope = self
            .extractor
            .extract(request)
            .map_err(|e| ProcessingFailure::Extraction(Arc::new(e)))?;
        self.process(envelope).await
    }

    /// Validates `envelope` and, on success, runs the handler's success path.
    ///
    /// # Errors
    ///
    /// See [`ProcessingFailure`].
    pub async fn process(
        &self,
        envelope: RequestEnvelope<H::Message>,
    ) -> Result<H::Success, ProcessingFailure<H::Message>> {
        let sp = match self.validate(&envelope).await {
            ValidationOutcome::Valid(sp) => sp,
            ValidationOutcome::ValidationFailure { message } => {
                return Err(ProcessingFailure::Validation { message });
            }
            ValidationOutcome::ProtocolFailure(failure) => {
                return Err(ProcessingFailure::Protocol(failure));
            }
        };

        let request = envelope.message().clone();
        let relay_state = envelope.relay_state().map(String::from);
        let entity_id = sp.entity_id.clone();
        match self.handler.process_validated(sp.clone(), envelope).await {
            Ok(success) => {
                tracing::info!(sp = %entity_id, message = H::Message::MESSAGE_NAME, id = request.id(), "Request accepted");
                Ok(success)
            }
            Err(error) => {
                tracing::warn!(sp = %entity_id, message = H::Message::MESSAGE_NAME, error = %error, "Request processing failed");
                Err(ProcessingFailure::Protocol(ProtocolFailure {
                    service_provider: sp,
                    request,
                    relay_state,
                    error,
                }))
            }
        }
    }

    /// Runs every check, stopping at the first failure.
    pub async fn validate(&self, envelope: &RequestEnvelope<H::Message>) -> ValidationOutcome<H::Message> {
        let message = envelope.message();
        let issuer = message.issuer();

        let sp = match self.store.find_by_entity_id(issuer).await {
            Ok(Some(sp)) if sp.enabled => sp,
            Ok(Some(_)) => {
                tracing::warn!(sp = issuer, message = H::Message::MESSAGE_NAME, "Service provider disabled");
                return validation_failure(format!("Service provider {issuer} is disabled"));
            }
            Ok(None) => {
                tracing::warn!(sp = issuer, message = H::Message::MESSAGE_NAME, "Unknown service provider");
                return validation_failure(format!("Unknown service provider {issuer}"));
            }
            Err(err) => {
                tracing::error!(sp = issuer, error = %err, "Service provider lookup failed");
                return validation_failure("Service provider lookup failed");
            }
        };

        let protocol_failure = |sp: ServiceProvider, error: SamlRequestError| {
            ValidationOutcome::ProtocolFailure(ProtocolFailure {
                service_provider: sp,
                request: message.clone(),
                relay_state: envelope.relay_state().map(String::from),
                error,
            })
        };

        if let Some(error) = self
            .validator
            .validate_message(message, &sp, self.handler.expected_destination())
        {
            return protocol_failure(sp, error);
        }

        let verified = self.handler.requires_signature(envelope, &sp);
        if verified {
            if sp.signing_certificates.is_empty() {
                tracing::warn!(sp = %sp.entity_id, "Signature required but no signing certificate configured");
                return validation_failure(format!(
                    "No signing certificate configured for {}",
                    sp.entity_id
                ));
            }
            if let Err(error) = self.verifier.verify(envelope, &sp) {
                return protocol_failure(sp, error);
            }
        }

        // Unsigned requests can be forged at will, so only verified ones are recorded.
        if verified {
            if let Some(error) = self.check_replay(message, &sp).await {
                return protocol_failure(sp, error);
            }
        }

        let now = self.validator.clock().now();
        if let Some(error) = self.handler.validate_message(envelope, &sp, now) {
            tracing::warn!(sp = %sp.entity_id, message = H::Message::MESSAGE_NAME, error = %error, "Message rejected");
            return protocol_failure(sp, error);
        }

        tracing::debug!(sp = %sp.entity_id, message = H::Message::MESSAGE_NAME, binding = %envelope.binding(), "Request validated");
        ValidationOutcome::Valid(sp)
    }

    async fn check_replay(&self, message: &H::Message, sp: &ServiceProvider) -> Option<SamlRequestError> {
        let cache = self.replay_cache.as_ref()?;
        let now = self.validator.clock().now();
        let expires_at = now
            + self.validator.effective_max_request_age(sp)
            + self.validator.effective_clock_skew(sp);

        match cache
            .check_and_insert(&replay_key(message.issuer(), message.id()), expires_at, now)
            .await
        {
            Ok(true) => None,
            Ok(false) => {
                tracing::warn!(sp = %sp.entity_id, id = message.id(), "Replayed request");
                Some(SamlRequestError::requester("Request was replayed"))
            }
            Err(err) => {
                tracing::error!(sp = %sp.entity_id, error = %err, "Replay cache failure");
                Some(SamlRequestError::responder("Unable to process request"))
            }
        }
    }
}
