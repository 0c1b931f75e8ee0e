//! LogoutRequest handling.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use idp_core::SamlConfig;

use super::ProtocolMessageHandler;
use crate::error::SamlRequestError;
use crate::extract::RequestEnvelope;
use crate::types::{LogoutRequest, LogoutResponse, ServiceProvider};

/// A LogoutRequest that passed every check.
#[derive(Debug, Clone)]
pub struct ValidatedLogoutRequest {
    /// The requesting SP.
    pub service_provider: ServiceProvider,
    /// The request.
    pub request: LogoutRequest,
    /// `RelayState` to echo.
    pub relay_state: Option<String>,
}

impl ValidatedLogoutRequest {
    /// Where the `LogoutResponse` goes, the SP's preferred SLO endpoint.
    #[must_use]
    pub fn response_destination(&self) -> Option<&str> {
        self.service_provider.slo_url()
    }

    /// A success `LogoutResponse` from `idp_entity_id` answering this request.
    #[must_use]
    pub fn success_response(&self, idp_entity_id: &str) -> LogoutResponse {
        let response = LogoutResponse::success(idp_entity_id).in_response_to(&self.request.id);
        match self.response_destination() {
            Some(url) => response.with_destination(url),
            None => response,
        }
    }
}

/// Hooks for `samlp:LogoutRequest` on the SLO endpoint.
///
/// Logout requests are always signed since they end sessions.
#[derive(Debug, Clone)]
pub struct LogoutRequestHandler {
    slo_url: String,
}

impl LogoutRequestHandler {
    /// Creates a handler for requests addressed to `slo_url`.
    #[must_use]
    pub fn new(slo_url: impl Into<String>) -> Self {
        Self { slo_url: slo_url.into() }
    }

    /// Creates a handler for the configured SLO URL.
    #[must_use]
    pub fn from_config(config: &SamlConfig) -> Self {
        Self::new(config.slo_url.clone())
    }
}

#[async_trait]
impl ProtocolMessageHandler for LogoutRequestHandler {
    type Message = LogoutRequest;
    type Success = ValidatedLogoutRequest;

    fn expected_destination(&self) -> &str {
        &self.slo_url
    }

    fn requires_signature(&self, _envelope: &RequestEnvelope<LogoutRequest>, _sp: &ServiceProvider) -> bool {
        true
    }

    fn validate_message(
        &self,
        envelope: &RequestEnvelope<LogoutRequest>,
        _sp: &ServiceProvider,
        now: DateTime<Utc>,
    ) -> Option<SamlRequestError> {
        let request = envelope.message();
        if request.not_on_or_after.is_some_and(|limit| limit <= now) {
            return Some(SamlRequestError::requester("LogoutRequest is expired"));
        }
        if request.name_id.value.trim().is_empty() {
            return Some(SamlRequestError::requester("NameID is empty"));
        }
        None
    }

    async fn process_validated(
        &self,
        sp: ServiceProvider,
        envelope: RequestEnvelope<LogoutRequest>,
    ) -> Result<ValidatedLogoutRequest, SamlRequestError> {
        Ok(ValidatedLogoutRequest {
            request: envelope.message().clone(),
            relay_state: envelope.relay_state().map(String::from),
            service_provider: sp,
        })
    }
}
