//! Binding extraction tests.
//!
//! Messages built the way an SP would build them, carried over each
//! binding and extracted back into typed requests.

use idp_protocol_saml::bindings::{BindingType, HttpPostBinding, InboundRequest};
use idp_protocol_saml::{AuthnRequest, ExtractionErrorKind, LogoutRequest, MessageExtractor};

use crate::common::{self, TestEnv};

/// A Redirect-bound request survives deflate, base64 and URL encoding.
#[tokio::test]
async fn test_redirect_roundtrip() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    let request = env.authn_request().with_provider_name("Acme & Co");
    let relay_state = "https://acme.example.com/app?x=1&y=\u{e9}";

    let inbound = env.signed_redirect(&request.to_xml(), Some(relay_state))?;
    let envelope = MessageExtractor::<AuthnRequest>::from_config(&env.config).extract(&inbound)?;

    assert_eq!(envelope.binding(), BindingType::Redirect);
    assert_eq!(envelope.message(), &request);
    assert_eq!(envelope.relay_state(), Some(relay_state));
    assert!(envelope.has_signature());

    let data = envelope.redirect_signature().expect("redirect data");
    let query = inbound.query().unwrap_or_default();
    assert_eq!(Some(data.encoded_message.as_str()), common::param(query, "SAMLRequest"));
    assert_eq!(data.encoded_relay_state.as_deref(), common::param(query, "RelayState"));
    assert_eq!(data.encoded_sig_alg.as_deref(), common::param(query, "SigAlg"));
    Ok(())
}

/// A POST-bound request keeps its embedded signature and relay state.
#[tokio::test]
async fn test_post_roundtrip() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    let request = env.authn_request();
    let xml = env.signed_xml(request.to_document())?;

    let inbound = common::post_request(&xml, Some("state&123"));
    let envelope = MessageExtractor::<AuthnRequest>::from_config(&env.config).extract(&inbound)?;

    assert_eq!(envelope.binding(), BindingType::Post);
    assert_eq!(envelope.message(), &request);
    assert_eq!(envelope.relay_state(), Some("state&123"));
    assert_eq!(envelope.raw_xml(), xml.as_bytes());
    assert!(envelope.has_signature());
    Ok(())
}

/// Logout requests travel the same bindings.
#[tokio::test]
async fn test_logout_request_roundtrip() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    let request = env.logout_request();

    let inbound = env.unsigned_redirect(&request.to_xml(), None)?;
    let envelope = MessageExtractor::<LogoutRequest>::from_config(&env.config).extract(&inbound)?;

    assert_eq!(envelope.message(), &request);
    assert!(!envelope.has_signature());
    Ok(())
}

/// A DOCTYPE is refused before any entity could be expanded.
#[tokio::test]
async fn test_doctype_rejected() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    let xml = format!(
        r#"<?xml version="1.0"?>
<!DOCTYPE samlp:AuthnRequest [<!ENTITY xxe SYSTEM "file:///etc/passwd">]>
<samlp:AuthnRequest xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="_x" Version="2.0" IssueInstant="2030-06-01T12:00:00Z"><saml:Issuer>&xxe;</saml:Issuer></samlp:AuthnRequest>"#
    );
    let extractor = MessageExtractor::<AuthnRequest>::from_config(&env.config);

    for inbound in [
        common::post_request(&xml, None),
        env.unsigned_redirect(&xml, None)?,
    ] {
        let err = extractor.extract(&inbound).unwrap_err();
        assert!(
            matches!(err.kind, ExtractionErrorKind::Parse(_)),
            "unexpected error: {err}"
        );
    }
    Ok(())
}

/// Decoding stops at the configured ceiling.
#[tokio::test]
async fn test_oversized_message_rejected() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    let request = env
        .authn_request()
        .with_provider_name("a".repeat(8 * 1024));
    let extractor = MessageExtractor::<AuthnRequest>::with_max_message_size(4 * 1024);

    for inbound in [
        common::post_request(&request.to_xml(), None),
        env.unsigned_redirect(&request.to_xml(), None)?,
    ] {
        let err = extractor.extract(&inbound).unwrap_err();
        assert!(
            matches!(err.kind, ExtractionErrorKind::TooLarge { limit: 4096 }),
            "unexpected error: {err}"
        );
    }
    Ok(())
}

/// Malformed transports never reach the parser.
#[tokio::test]
async fn test_malformed_transport() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    let extractor = MessageExtractor::<AuthnRequest>::from_config(&env.config);

    let err = extractor.extract(&InboundRequest::get("RelayState=abc")).unwrap_err();
    assert!(matches!(err.kind, ExtractionErrorKind::MissingParameter("SAMLRequest")));

    let encoded = urlencoding::encode(&HttpPostBinding::encode("<a/>")).into_owned();
    let err = extractor
        .extract(&InboundRequest::post_form(format!("SAMLRequest={encoded}&SAMLRequest={encoded}")))
        .unwrap_err();
    assert!(matches!(err.kind, ExtractionErrorKind::DuplicateParameter("SAMLRequest")));

    let err = extractor
        .extract(&InboundRequest::get("SAMLRequest=%%%"))
        .unwrap_err();
    assert!(
        matches!(err.kind, ExtractionErrorKind::Base64(_) | ExtractionErrorKind::Decompression(_)),
        "unexpected error: {err}"
    );
    Ok(())
}
