//! AuthnRequest handling.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use idp_core::SamlConfig;

use super::ProtocolMessageHandler;
use crate::error::SamlRequestError;
use crate::extract::RequestEnvelope;
use crate::types::{
    authn_context_classes, sub_status_codes, AcsEndpoint, Assertion, AuthnRequest, AuthnStatement, Conditions,
    NameId, Response, SamlAttribute, SamlBinding, ServiceProvider, Subject, SubjectConfirmation,
    SubjectConfirmationData,
};

/// An AuthnRequest that passed every check, with its resolved ACS.
#[derive(Debug, Clone)]
pub struct ValidatedAuthnRequest {
    /// The requesting SP.
    pub service_provider: ServiceProvider,
    /// The request.
    pub request: AuthnRequest,
    /// Where the response is posted.
    pub acs_url: String,
    /// `RelayState` to echo.
    pub relay_state: Option<String>,
}

impl ValidatedAuthnRequest {
    /// A success `Response` carrying a bearer assertion for `name_id`.
    ///
    /// The assertion is restricted to the requesting SP and confirmable at
    /// the resolved ACS for `validity`.
    #[must_use]
    pub fn success_response(
        &self,
        idp_entity_id: &str,
        name_id: NameId,
        attributes: Vec<SamlAttribute>,
        validity: Duration,
    ) -> Response {
        let confirmation = SubjectConfirmation::bearer().with_data(SubjectConfirmationData::for_request(
            &self.request.id,
            &self.acs_url,
            validity,
        ));
        let assertion = attributes.into_iter().fold(
            Assertion::new(idp_entity_id)
                .with_subject(Subject::new(name_id).with_confirmation(confirmation))
                .with_conditions(Conditions::with_validity(validity).with_audience(&self.service_provider.entity_id))
                .with_authn_statement(AuthnStatement::new(authn_context_classes::PASSWORD_PROTECTED_TRANSPORT)),
            Assertion::with_attribute,
        );
        Response::success(idp_entity_id)
            .in_response_to(&self.request.id)
            .with_destination(&self.acs_url)
            .with_assertion(assertion)
    }
}

/// Hooks for `samlp:AuthnRequest` on the SSO endpoint.
#[derive(Debug, Clone)]
pub struct AuthnRequestHandler {
    sso_url: String,
}

impl AuthnRequestHandler {
    /// Creates a handler for requests addressed to `sso_url`.
    #[must_use]
    pub fn new(sso_url: impl Into<String>) -> Self {
        Self { sso_url: sso_url.into() }
    }

    /// Creates a handler for the configured SSO URL.
    #[must_use]
    pub fn from_config(config: &SamlConfig) -> Self {
        Self::new(config.sso_url.clone())
    }

    /// Picks the ACS endpoint for `request`.
    ///
    /// An explicit URL must match a registered endpoint exactly, an index
    /// must exist, and otherwise the SP's default endpoint is used.
    ///
    /// # Errors
    ///
    /// Requester error when no endpoint can be resolved, or the resolved
    /// endpoint is not HTTP-POST.
    pub fn resolve_acs<'a>(
        request: &AuthnRequest,
        sp: &'a ServiceProvider,
    ) -> Result<&'a AcsEndpoint, SamlRequestError> {
        let endpoint = if let Some(url) = &request.assertion_consumer_service_url {
            sp.acs_by_url(url).ok_or_else(|| {
                SamlRequestError::requester(format!("Invalid AssertionConsumerServiceURL {url}"))
            })?
        } else if let Some(index) = request.assertion_consumer_service_index {
            sp.acs_by_index(index).ok_or_else(|| {
                SamlRequestError::requester(format!("Invalid AssertionConsumerServiceIndex {index}"))
            })?
        } else {
            sp.default_acs().ok_or_else(|| {
                SamlRequestError::requester("No assertion consumer service registered")
            })?
        };

        if endpoint.binding != SamlBinding::HttpPost {
            return Err(SamlRequestError::requester("Assertion consumer service must use HTTP-POST")
                .with_sub_status(sub_status_codes::UNSUPPORTED_BINDING));
        }
        Ok(endpoint)
    }
}

#[async_trait]
impl ProtocolMessageHandler for AuthnRequestHandler {
    type Message = AuthnRequest;
    type Success = ValidatedAuthnRequest;

    fn expected_destination(&self) -> &str {
        &self.sso_url
    }

    fn requires_signature(&self, envelope: &RequestEnvelope<AuthnRequest>, sp: &ServiceProvider) -> bool {
        sp.want_authn_requests_signed || envelope.has_signature()
    }

    fn validate_message(
        &self,
        envelope: &RequestEnvelope<AuthnRequest>,
        sp: &ServiceProvider,
        _now: DateTime<Utc>,
    ) -> Option<SamlRequestError> {
        let request = envelope.message();
        if let Some(binding) = &request.protocol_binding {
            if SamlBinding::from_uri(binding) != Some(SamlBinding::HttpPost) {
                return Some(
                    SamlRequestError::requester(format!("Unsupported ProtocolBinding {binding}"))
                        .with_sub_status(sub_status_codes::UNSUPPORTED_BINDING),
                );
            }
        }
        Self::resolve_acs(request, sp).err()
    }

    async fn process_validated(
        &self,
        sp: ServiceProvider,
        envelope: RequestEnvelope<AuthnRequest>,
    ) -> Result<ValidatedAuthnRequest, SamlRequestError> {
        let acs_url = Self::resolve_acs(envelope.message(), &sp)?.url.clone();
        Ok(ValidatedAuthnRequest {
            request: envelope.message().clone(),
            relay_state: envelope.relay_state().map(String::from),
            service_provider: sp,
            acs_url,
        })
    }
}
