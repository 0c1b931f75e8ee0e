//! Request pipeline tests.
//!
//! Runs complete inbound requests through the processor: SP lookup, field
//! checks, signature verification, replay detection and handler rules.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use idp_core::Clock;
use idp_protocol_saml::processor::{AuthnRequestHandler, ProcessingFailure, ProtocolMessageProcessor, ValidationOutcome};
use idp_protocol_saml::replay::InMemoryReplayCache;
use idp_protocol_saml::{
    status_codes, sub_status_codes, AuthnRequest, MessageExtractor, ReplayCache, SamlBinding, SamlError,
    SamlResult, ServiceProvider, ServiceProviderStore,
};

use crate::common::{self, TestEnv};

fn protocol_error<M>(result: Result<impl Sized, ProcessingFailure<M>>) -> (String, String) {
    match result {
        Err(ProcessingFailure::Protocol(failure)) => (failure.error.status_code, failure.error.message),
        Err(ProcessingFailure::Validation { message }) => panic!("unexpected validation failure: {message}"),
        Err(ProcessingFailure::Extraction(err)) => panic!("unexpected extraction failure: {err}"),
        Ok(_) => panic!("request unexpectedly accepted"),
    }
}

fn validation_message<M>(result: Result<impl Sized, ProcessingFailure<M>>) -> String {
    match result {
        Err(ProcessingFailure::Validation { message }) => message,
        Err(ProcessingFailure::Protocol(failure)) => {
            panic!("unexpected protocol failure: {}", failure.error.message)
        }
        Err(ProcessingFailure::Extraction(err)) => panic!("unexpected extraction failure: {err}"),
        Ok(_) => panic!("request unexpectedly accepted"),
    }
}

/// A signed Redirect AuthnRequest from a registered SP is accepted and
/// resolved to its ACS.
#[tokio::test]
async fn test_signed_redirect_authn_request() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    let processor = env.authn_processor();
    let request = env.authn_request();
    let inbound = env.signed_redirect(&request.to_xml(), Some("relay-1"))?;

    let envelope = MessageExtractor::<AuthnRequest>::from_config(&env.config).extract(&inbound)?;
    match processor.validate(&envelope).await {
        ValidationOutcome::Valid(sp) => assert_eq!(sp.entity_id, common::SP_ENTITY_ID),
        other => panic!("expected a valid request, got {other:?}"),
    }

    // A fresh processor so the replay cache has not seen this request.
    let validated = env
        .authn_processor()
        .process_request(&inbound)
        .await
        .map_err(|e| anyhow::anyhow!("{e:?}"))?;
    assert_eq!(validated.request, request);
    assert_eq!(validated.acs_url, common::ACS_URL);
    assert_eq!(validated.relay_state.as_deref(), Some("relay-1"));
    assert_eq!(validated.service_provider.entity_id, common::SP_ENTITY_ID);
    Ok(())
}

/// An RSA-SHA512 Redirect signature is accepted as well.
#[tokio::test]
async fn test_signed_redirect_sha512() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    let query = env.signed_redirect_query_with(
        &env.authn_request().to_xml(),
        None,
        idp_crypto::RsaAlgorithm::RsaSha512,
    )?;

    let result = env
        .authn_processor()
        .process_request(&idp_protocol_saml::bindings::InboundRequest::get(query))
        .await;
    assert!(result.is_ok(), "{:?}", result.err());
    Ok(())
}

/// A signed POST AuthnRequest is accepted.
#[tokio::test]
async fn test_signed_post_authn_request() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    let request = env.authn_request();
    let xml = env.signed_xml(request.to_document())?;

    let validated = env
        .authn_processor()
        .process_request(&common::post_request(&xml, None))
        .await
        .map_err(|e| anyhow::anyhow!("{e:?}"))?;
    assert_eq!(validated.request.id, request.id);
    assert_eq!(validated.relay_state, None);
    Ok(())
}

/// An unsigned request is refused when the SP must sign.
#[tokio::test]
async fn test_unsigned_request_rejected() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    let processor = env.authn_processor();
    let xml = env.authn_request().to_xml();

    let (status, message) = protocol_error(
        processor
            .process_request(&env.unsigned_redirect(&xml, None)?)
            .await,
    );
    assert_eq!(status, status_codes::REQUESTER);
    assert_eq!(message, "Invalid signature");

    let (_, message) = protocol_error(
        processor
            .process_request(&common::post_request(&env.authn_request().to_xml(), None))
            .await,
    );
    assert_eq!(message, "Invalid signature");
    Ok(())
}

/// Without `WantAuthnRequestsSigned` an unsigned request passes, but a
/// signature that is present must still verify.
#[tokio::test]
async fn test_optional_signature() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    env.register(common::acme_sp().want_authn_requests_signed(false));
    let processor = env.authn_processor();

    let unsigned = env.unsigned_redirect(&env.authn_request().to_xml(), None)?;
    assert!(processor.process_request(&unsigned).await.is_ok());

    let query = env.signed_redirect_query(&env.authn_request().to_xml(), Some("abc"))?;
    let tampered = common::replace_param(&query, "RelayState", "abd");
    let (_, message) = protocol_error(
        processor
            .process_request(&idp_protocol_saml::bindings::InboundRequest::get(tampered))
            .await,
    );
    assert_eq!(message, "Invalid signature");
    Ok(())
}

/// Unknown and disabled SPs are local failures.
#[tokio::test]
async fn test_unknown_and_disabled_sp() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    let processor = env.authn_processor();

    let stranger = AuthnRequest::new("urn:sp:stranger")
        .with_issue_instant(common::now())
        .with_destination(common::SSO_URL);
    let message = validation_message(
        processor
            .process_request(&env.unsigned_redirect(&stranger.to_xml(), None)?)
            .await,
    );
    assert!(message.contains("urn:sp:stranger"), "{message}");

    env.register(common::acme_sp().enabled(false));
    let message = validation_message(
        processor
            .process_request(&env.signed_redirect(&env.authn_request().to_xml(), None)?)
            .await,
    );
    assert!(message.contains("disabled"), "{message}");
    Ok(())
}

/// An SP that must sign but has no certificate registered cannot be
/// answered at all.
#[tokio::test]
async fn test_missing_signing_certificate() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    let mut sp = common::acme_sp();
    sp.signing_certificates.clear();
    env.register(sp);

    let message = validation_message(
        env.authn_processor()
            .process_request(&env.signed_redirect(&env.authn_request().to_xml(), None)?)
            .await,
    );
    assert!(message.contains("No signing certificate"), "{message}");
    Ok(())
}

/// Certificates outside their validity window are never used.
#[tokio::test]
async fn test_expired_and_future_certificates() -> anyhow::Result<()> {
    let env = TestEnv::new()?;

    for pem in [common::EXPIRED_CERT, common::FUTURE_CERT] {
        let mut sp = common::acme_sp();
        sp.signing_certificates = vec![common::certificate(pem)];
        env.register(sp);

        let (status, message) = protocol_error(
            env.authn_processor()
                .process_request(&env.signed_redirect(&env.authn_request().to_xml(), None)?)
                .await,
        );
        assert_eq!(status, status_codes::RESPONDER);
        assert_eq!(message, "No valid certificates");
    }

    // One expired and one current certificate: the current one verifies.
    let mut sp = common::acme_sp();
    sp.signing_certificates.insert(0, common::certificate(common::EXPIRED_CERT));
    env.register(sp);
    let result = env
        .authn_processor()
        .process_request(&env.signed_redirect(&env.authn_request().to_xml(), None)?)
        .await;
    assert!(result.is_ok(), "{:?}", result.err());
    Ok(())
}

/// A signature by a key the SP never registered is refused.
#[tokio::test]
async fn test_signature_by_unregistered_key() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    let mut sp = common::acme_sp();
    sp.signing_certificates = vec![common::certificate(common::IDP_CERT)];
    env.register(sp);

    let (status, message) = protocol_error(
        env.authn_processor()
            .process_request(&env.signed_redirect(&env.authn_request().to_xml(), None)?)
            .await,
    );
    assert_eq!(status, status_codes::REQUESTER);
    assert_eq!(message, "Invalid signature");
    Ok(())
}

/// `IssueInstant` may lead the clock by at most the skew.
#[tokio::test]
async fn test_clock_skew_boundary() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    let processor = env.authn_processor();

    let at_skew = env
        .authn_request()
        .with_issue_instant(common::now() + Duration::seconds(300));
    let result = processor
        .process_request(&env.signed_redirect(&at_skew.to_xml(), None)?)
        .await;
    assert!(result.is_ok(), "{:?}", result.err());

    let past_skew = env
        .authn_request()
        .with_issue_instant(common::now() + Duration::seconds(301));
    let (status, message) = protocol_error(
        processor
            .process_request(&env.signed_redirect(&past_skew.to_xml(), None)?)
            .await,
    );
    assert_eq!(status, status_codes::REQUESTER);
    assert!(message.contains("future"), "{message}");

    let stale = env
        .authn_request()
        .with_issue_instant(common::now() - Duration::seconds(601));
    let (_, message) = protocol_error(
        processor
            .process_request(&env.signed_redirect(&stale.to_xml(), None)?)
            .await,
    );
    assert!(message.contains("expired"), "{message}");
    Ok(())
}

/// Destinations compare case-insensitively, without normalization.
#[tokio::test]
async fn test_destination_policy() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    let processor = env.authn_processor();

    let shouting = env
        .authn_request()
        .with_destination(common::SSO_URL.to_ascii_uppercase());
    let result = processor
        .process_request(&env.signed_redirect(&shouting.to_xml(), None)?)
        .await;
    assert!(result.is_ok(), "{:?}", result.err());

    let trailing = env
        .authn_request()
        .with_destination(format!("{}/", common::SSO_URL));
    let (status, message) = protocol_error(
        processor
            .process_request(&env.signed_redirect(&trailing.to_xml(), None)?)
            .await,
    );
    assert_eq!(status, status_codes::REQUESTER);
    assert_eq!(message, format!("Invalid destination, expected {}", common::SSO_URL));
    Ok(())
}

/// Field checks run before signature checks.
#[tokio::test]
async fn test_field_checks_precede_signature() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    let mut stale = env.authn_request();
    stale.version = "1.1".to_string();

    let (status, _) = protocol_error(
        env.authn_processor()
            .process_request(&env.unsigned_redirect(&stale.to_xml(), None)?)
            .await,
    );
    assert_eq!(status, status_codes::VERSION_MISMATCH);
    Ok(())
}

/// The same `(Issuer, ID)` is accepted once.
#[tokio::test]
async fn test_replay_rejected() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    let processor = env.authn_processor();
    let inbound = env.signed_redirect(&env.authn_request().to_xml(), None)?;

    assert!(processor.process_request(&inbound).await.is_ok());
    let (status, message) = protocol_error(processor.process_request(&inbound).await);
    assert_eq!(status, status_codes::REQUESTER);
    assert_eq!(message, "Request was replayed");

    // A different ID from the same SP is unaffected.
    let other = env.signed_redirect(&env.authn_request().to_xml(), None)?;
    assert!(processor.process_request(&other).await.is_ok());
    Ok(())
}

/// Replay protection can be switched off.
#[tokio::test]
async fn test_replay_protection_disabled() -> anyhow::Result<()> {
    let mut env = TestEnv::new()?;
    env.config.replay_protection = false;
    let processor = env.authn_processor();
    let inbound = env.signed_redirect(&env.authn_request().to_xml(), None)?;

    assert!(processor.process_request(&inbound).await.is_ok());
    assert!(processor.process_request(&inbound).await.is_ok());
    Ok(())
}

/// ACS selection by URL, by index and by default.
#[tokio::test]
async fn test_acs_resolution() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    let second = "https://acme.example.com/saml/acs2";
    env.register(common::acme_sp().with_acs(idp_protocol_saml::AcsEndpoint::post(second, 1)));
    let processor = env.authn_processor();

    let by_index = AuthnRequest::new(common::SP_ENTITY_ID)
        .with_issue_instant(common::now())
        .with_destination(common::SSO_URL)
        .with_acs_index(1);
    let validated = processor
        .process_request(&env.signed_redirect(&by_index.to_xml(), None)?)
        .await
        .map_err(|e| anyhow::anyhow!("{e:?}"))?;
    assert_eq!(validated.acs_url, second);

    let by_default = AuthnRequest::new(common::SP_ENTITY_ID)
        .with_issue_instant(common::now())
        .with_destination(common::SSO_URL);
    let validated = processor
        .process_request(&env.signed_redirect(&by_default.to_xml(), None)?)
        .await
        .map_err(|e| anyhow::anyhow!("{e:?}"))?;
    assert_eq!(validated.acs_url, common::ACS_URL);

    let unknown = env.authn_request().with_acs_url("https://evil.example.com/acs");
    let (status, message) = protocol_error(
        processor
            .process_request(&env.signed_redirect(&unknown.to_xml(), None)?)
            .await,
    );
    assert_eq!(status, status_codes::REQUESTER);
    assert!(message.contains("AssertionConsumerServiceURL"), "{message}");
    Ok(())
}

/// Responses can only be delivered over HTTP-POST.
#[tokio::test]
async fn test_redirect_protocol_binding_rejected() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    let request = env.authn_request().with_binding(SamlBinding::HttpRedirect);

    match env
        .authn_processor()
        .process_request(&env.signed_redirect(&request.to_xml(), None)?)
        .await
    {
        Err(ProcessingFailure::Protocol(failure)) => {
            assert_eq!(failure.error.status_code, status_codes::REQUESTER);
            assert_eq!(
                failure.error.sub_status_code.as_deref(),
                Some(sub_status_codes::UNSUPPORTED_BINDING)
            );
        }
        other => panic!("expected a protocol failure, got {other:?}"),
    }
    Ok(())
}

/// Logout requests must always be signed.
#[tokio::test]
async fn test_logout_request() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    let processor = env.logout_processor();
    let request = env.logout_request();

    let validated = processor
        .process_request(&env.signed_redirect(&request.to_xml(), Some("bye"))?)
        .await
        .map_err(|e| anyhow::anyhow!("{e:?}"))?;
    assert_eq!(validated.request, request);
    assert_eq!(validated.relay_state.as_deref(), Some("bye"));
    assert_eq!(validated.response_destination(), Some(common::SP_SLO_URL));

    let response = validated.success_response(common::IDP_ENTITY_ID);
    assert_eq!(response.in_response_to.as_deref(), Some(request.id.as_str()));

    let (_, message) = protocol_error(
        processor
            .process_request(&env.unsigned_redirect(&env.logout_request().to_xml(), None)?)
            .await,
    );
    assert_eq!(message, "Invalid signature");

    // Logout is addressed to the SLO endpoint, not SSO.
    let misaddressed = env.logout_request().with_destination(common::SSO_URL);
    let (_, message) = protocol_error(
        processor
            .process_request(&env.signed_redirect(&misaddressed.to_xml(), None)?)
            .await,
    );
    assert!(message.contains("Invalid destination"), "{message}");
    Ok(())
}

/// An expired `NotOnOrAfter` ends the logout request.
#[tokio::test]
async fn test_expired_logout_request() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    let request = env
        .logout_request()
        .with_not_on_or_after(common::now() - Duration::seconds(1));

    let (status, message) = protocol_error(
        env.logout_processor()
            .process_request(&env.signed_redirect(&request.to_xml(), None)?)
            .await,
    );
    assert_eq!(status, status_codes::REQUESTER);
    assert_eq!(message, "LogoutRequest is expired");
    Ok(())
}

/// Per-SP windows override the configured defaults.
#[tokio::test]
async fn test_sp_window_override() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    let strict: ServiceProvider = common::acme_sp().with_clock_skew(Duration::seconds(5));
    env.register(strict);

    let ahead = env
        .authn_request()
        .with_issue_instant(common::now() + Duration::seconds(6));
    let (_, message) = protocol_error(
        env.authn_processor()
            .process_request(&env.signed_redirect(&ahead.to_xml(), None)?)
            .await,
    );
    assert!(message.contains("future"), "{message}");
    Ok(())
}

struct UnavailableStore;

#[async_trait]
impl ServiceProviderStore for UnavailableStore {
    async fn find_by_entity_id(&self, _entity_id: &str) -> SamlResult<Option<ServiceProvider>> {
        Err(SamlError::Store("connection refused".into()))
    }
}

struct UnavailableReplayCache;

#[async_trait]
impl ReplayCache for UnavailableReplayCache {
    async fn check_and_insert(&self, _key: &str, _expires_at: DateTime<Utc>, _now: DateTime<Utc>) -> SamlResult<bool> {
        Err(SamlError::Store("connection refused".into()))
    }
}

/// Processors sharing one cache see each other's requests.
#[tokio::test]
async fn test_shared_replay_cache() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    let cache = Arc::new(InMemoryReplayCache::new());
    let first = env.authn_processor().with_replay_cache(cache.clone());
    let second = env.authn_processor().with_replay_cache(cache.clone());
    let inbound = env.signed_redirect(&env.authn_request().to_xml(), None)?;

    assert!(first.process_request(&inbound).await.is_ok());
    let (_, message) = protocol_error(second.process_request(&inbound).await);
    assert_eq!(message, "Request was replayed");
    assert_eq!(cache.len(), 1);

    // Once the window has passed the entry can be purged.
    env.clock.advance(Duration::seconds(901));
    cache.purge_expired(env.clock.now());
    assert!(cache.is_empty());
    Ok(())
}

/// Only signature-verified requests are recorded against replay.
#[tokio::test]
async fn test_unsigned_request_not_recorded() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    env.register(common::acme_sp().want_authn_requests_signed(false));
    let cache = Arc::new(InMemoryReplayCache::new());
    let processor = env.authn_processor().with_replay_cache(cache.clone());

    let unsigned = env.unsigned_redirect(&env.authn_request().to_xml(), None)?;
    assert!(processor.process_request(&unsigned).await.is_ok());
    assert!(cache.is_empty());

    let signed = env.signed_redirect(&env.authn_request().to_xml(), None)?;
    assert!(processor.process_request(&signed).await.is_ok());
    assert_eq!(cache.len(), 1);
    Ok(())
}

/// A failing replay cache fails closed.
#[tokio::test]
async fn test_replay_cache_failure() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    let processor = env
        .authn_processor()
        .with_replay_cache(Arc::new(UnavailableReplayCache));

    let (status, message) = protocol_error(
        processor
            .process_request(&env.signed_redirect(&env.authn_request().to_xml(), None)?)
            .await,
    );
    assert_eq!(status, status_codes::RESPONDER);
    assert_eq!(message, "Unable to process request");
    Ok(())
}

/// An unreachable SP store is a local failure.
#[tokio::test]
async fn test_store_failure() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    let processor = ProtocolMessageProcessor::new(
        AuthnRequestHandler::from_config(&env.config),
        &env.config,
        env.clock.clone(),
        Arc::new(UnavailableStore),
    );

    let message = validation_message(
        processor
            .process_request(&env.signed_redirect(&env.authn_request().to_xml(), None)?)
            .await,
    );
    assert_eq!(message, "Service provider lookup failed");
    Ok(())
}
