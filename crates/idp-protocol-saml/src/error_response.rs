//! Rendering protocol failures back to the service provider.
//!
//! The destination is always an endpoint the SP registered, never a URL
//! taken from the failed request, and the endpoint's binding decides how
//! the response travels.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response as HttpResponse};
use idp_core::SamlConfig;

use crate::bindings::{AutoPostPage, HttpRedirectBinding, SamlMessageType};
use crate::error::{SamlError, SamlResult};
use crate::message::SamlMessage;
use crate::processor::ProtocolFailure;
use crate::signature::MessageSigner;
use crate::types::{LogoutRequest, LogoutResponse, Response, SamlBinding, ServiceProvider, SigningBehavior, Status};

/// An error response ready to be sent.
#[derive(Debug, Clone)]
pub enum ErrorResponseDelivery {
    /// Auto-submitting form for an HTTP-POST endpoint.
    Post(AutoPostPage),
    /// Redirect URL for an HTTP-Redirect endpoint.
    Redirect(String),
}

impl ErrorResponseDelivery {
    /// The form page, for POST delivery.
    #[must_use]
    pub fn post_page(&self) -> Option<&AutoPostPage> {
        match self {
            Self::Post(page) => Some(page),
            Self::Redirect(_) => None,
        }
    }

    /// The full redirect URL, for Redirect delivery.
    #[must_use]
    pub fn location(&self) -> Option<&str> {
        match self {
            Self::Post(_) => None,
            Self::Redirect(location) => Some(location.as_str()),
        }
    }
}

impl IntoResponse for ErrorResponseDelivery {
    fn into_response(self) -> HttpResponse {
        match self {
            Self::Post(page) => page.into_response(),
            Self::Redirect(location) => match HeaderValue::from_str(&location) {
                Ok(location) => (
                    StatusCode::FOUND,
                    [
                        (header::LOCATION, location),
                        (header::CACHE_CONTROL, HeaderValue::from_static("no-cache, no-store")),
                        (header::PRAGMA, HeaderValue::from_static("no-cache")),
                    ],
                )
                    .into_response(),
                Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
            },
        }
    }
}

fn deliverable(binding: SamlBinding) -> bool {
    matches!(binding, SamlBinding::HttpPost | SamlBinding::HttpRedirect)
}

/// Picks the registered endpoint a failure of `M` is answered at.
///
/// Logout failures go to an SLO endpoint, POST preferred. Everything else
/// goes to the default ACS, or the first ACS with a usable binding.
///
/// # Errors
///
/// Returns [`SamlError::NoResponseEndpoint`] if the SP registers none.
pub fn response_endpoint<M: SamlMessage>(sp: &ServiceProvider) -> SamlResult<(&str, SamlBinding)> {
    let endpoint = if M::MESSAGE_NAME == LogoutRequest::MESSAGE_NAME {
        sp.slo_endpoints
            .iter()
            .filter(|e| deliverable(e.binding))
            .min_by_key(|e| e.binding != SamlBinding::HttpPost)
            .map(|e| (e.url.as_str(), e.binding))
    } else {
        sp.default_acs()
            .into_iter()
            .chain(&sp.acs_endpoints)
            .find(|e| deliverable(e.binding))
            .map(|e| (e.url.as_str(), e.binding))
    };
    endpoint.ok_or_else(|| {
        tracing::error!(sp = %sp.entity_id, message = M::MESSAGE_NAME, "No endpoint to send the error response to");
        SamlError::NoResponseEndpoint(sp.entity_id.clone())
    })
}

/// Turns a [`ProtocolFailure`] into an error response for the SP.
///
/// Logout requests are answered with `samlp:LogoutResponse`, everything
/// else with `samlp:Response`. The response is signed whenever the SP's
/// policy signs anything, since an error response has no assertion.
#[derive(Debug, Clone)]
pub struct ErrorResponseRenderer {
    idp_entity_id: String,
    content_security_policy: bool,
    signer: MessageSigner,
}

impl ErrorResponseRenderer {
    /// Creates a renderer.
    #[must_use]
    pub fn new(config: &SamlConfig, signer: MessageSigner) -> Self {
        Self {
            idp_entity_id: config.idp_entity_id.clone(),
            content_security_policy: config.content_security_policy,
            signer,
        }
    }

    /// Builds the unsigned error response XML.
    #[must_use]
    pub fn build_xml<M: SamlMessage>(&self, failure: &ProtocolFailure<M>, destination: &str) -> String {
        let error = &failure.error;
        let status = Status::from_code(error.to_status_code()).with_message(error.message.clone());

        if M::MESSAGE_NAME == LogoutRequest::MESSAGE_NAME {
            LogoutResponse::new(&self.idp_entity_id, status)
                .in_response_to(failure.request.id())
                .with_destination(destination)
                .to_xml()
        } else {
            Response::error(&self.idp_entity_id, status)
                .in_response_to(failure.request.id())
                .with_destination(destination)
                .to_xml()
        }
    }

    /// Builds the error response, signs it per SP policy and encodes it
    /// for the SP's registered endpoint.
    ///
    /// POST endpoints get an enveloped signature inside an auto-post page.
    /// Redirect endpoints get a detached signature in the query string.
    ///
    /// # Errors
    ///
    /// Fails if the SP registers no usable endpoint, or if signing is
    /// required and the credential is unavailable.
    pub async fn render<M: SamlMessage>(&self, failure: &ProtocolFailure<M>) -> SamlResult<ErrorResponseDelivery> {
        let sp = &failure.service_provider;
        let (destination, binding) = response_endpoint::<M>(sp)?;
        let xml = self.build_xml(failure, destination);
        let sign = sp.signing_behavior != SigningBehavior::DoNotSign;
        let relay_state = failure.relay_state.as_deref();

        let delivery = if binding == SamlBinding::HttpRedirect {
            let encoded = if sign {
                self.signer
                    .redirect_url(&xml, destination, relay_state, SamlMessageType::Response)
                    .await
            } else {
                HttpRedirectBinding::encode(&xml, destination, relay_state, SamlMessageType::Response)
            };
            let location = encoded.inspect_err(|err| {
                tracing::error!(sp = %sp.entity_id, error = %err, "Failed to encode error response");
            })?;
            ErrorResponseDelivery::Redirect(location)
        } else {
            let xml = if sign {
                self.signer.sign(&xml).await.inspect_err(|err| {
                    tracing::error!(sp = %sp.entity_id, error = %err, "Failed to sign error response");
                })?
            } else {
                xml
            };
            ErrorResponseDelivery::Post(
                AutoPostPage::new(destination, SamlMessageType::Response, &xml)
                    .with_relay_state(relay_state)
                    .with_content_security_policy(self.content_security_policy),
            )
        };

        tracing::info!(
            sp = %sp.entity_id,
            status = %failure.error.status_code,
            message = %failure.error.message,
            request = failure.request.id(),
            %destination,
            "Sending error response"
        );
        Ok(delivery)
    }
}
