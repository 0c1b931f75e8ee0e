//! Outbound response tests.
//!
//! Success responses signed and encrypted per SP policy, and error
//! responses rendered for failed requests, checked the way an SP would.

use chrono::Duration;
use idp_crypto::pem::pem_to_der;
use idp_protocol_saml::bindings::{AutoPostPage, RedirectQuery};
use idp_protocol_saml::encryption::decrypt_assertion;
use idp_protocol_saml::processor::{ProcessingFailure, ValidatedAuthnRequest};
use idp_protocol_saml::signature::verify_enveloped_signature;
use idp_protocol_saml::xml::XmlDocument;
use idp_protocol_saml::{
    status_codes, AcsEndpoint, NameId, SamlAttribute, SamlBinding, SamlError, ServiceProvider, SigningBehavior,
    SAMLP_NS, SAML_NS, XMLDSIG_NS,
};

use crate::common::{self, TestEnv};

async fn validated(env: &TestEnv, relay_state: Option<&str>) -> anyhow::Result<ValidatedAuthnRequest> {
    env.authn_processor()
        .process_request(&env.signed_redirect(&env.authn_request().to_xml(), relay_state)?)
        .await
        .map_err(|e| anyhow::anyhow!("{e:?}"))
}

async fn deliver(env: &TestEnv, request: &ValidatedAuthnRequest) -> anyhow::Result<AutoPostPage> {
    let response = request.success_response(
        common::IDP_ENTITY_ID,
        NameId::email("user@example.com"),
        vec![SamlAttribute::new("role", vec!["admin".into(), "auditor".into()])],
        Duration::minutes(5),
    );
    Ok(env.dispatcher().deliver(&response, request).await?)
}

fn posted(page: &AutoPostPage) -> anyhow::Result<XmlDocument> {
    let encoded = page
        .field("SAMLResponse")
        .ok_or_else(|| anyhow::anyhow!("page carries no SAMLResponse"))?;
    common::decode_response(encoded)
}

/// The default policy signs the response root only.
#[tokio::test]
async fn test_sso_signed_response() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    let request = validated(&env, Some("relay-1")).await?;
    let page = deliver(&env, &request).await?;

    assert_eq!(page.action(), common::ACS_URL);
    assert_eq!(page.field("RelayState"), Some("relay-1"));
    assert!(page.html().contains("Content-Security-Policy"));

    let doc = posted(&page)?;
    let root = doc.root();
    assert!(doc.root_element().is(SAMLP_NS, "Response"));
    assert_eq!(doc.attribute(root, "InResponseTo"), Some(request.request.id.as_str()));
    assert_eq!(doc.attribute(root, "Destination"), Some(common::ACS_URL));

    let idp_cert = common::certificate(common::IDP_CERT);
    verify_enveloped_signature(&doc, root, [&idp_cert])?;

    let assertion = doc
        .find_child(root, SAML_NS, "Assertion")
        .expect("plaintext assertion");
    assert!(doc.find_child(assertion, XMLDSIG_NS, "Signature").is_none());
    let xml = doc.serialize();
    assert!(xml.contains(common::SP_ENTITY_ID));
    assert!(xml.contains("auditor"));
    Ok(())
}

/// `SignAssertion` leaves the root unsigned.
#[tokio::test]
async fn test_sso_signed_assertion() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    env.register(common::acme_sp().with_signing_behavior(SigningBehavior::SignAssertion));
    let request = validated(&env, None).await?;
    let doc = posted(&deliver(&env, &request).await?)?;
    let root = doc.root();

    assert!(doc.find_child(root, XMLDSIG_NS, "Signature").is_none());
    let assertion = doc
        .find_child(root, SAML_NS, "Assertion")
        .expect("plaintext assertion");
    let idp_cert = common::certificate(common::IDP_CERT);
    verify_enveloped_signature(&doc, assertion, [&idp_cert])?;
    Ok(())
}

/// `DoNotSign` sends no signature at all.
#[tokio::test]
async fn test_sso_unsigned_response() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    env.register(common::acme_sp().with_signing_behavior(SigningBehavior::DoNotSign));
    let request = validated(&env, None).await?;
    let doc = posted(&deliver(&env, &request).await?)?;

    assert!(doc.find_descendant(doc.root(), XMLDSIG_NS, "Signature").is_none());
    Ok(())
}

/// Signed assertion, encrypted, inside a signed response.
#[tokio::test]
async fn test_sso_encrypted_assertion() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    env.register(
        common::acme_sp()
            .with_signing_behavior(SigningBehavior::SignBoth)
            .with_encryption_certificate(common::certificate(common::ENC_CERT)),
    );
    let request = validated(&env, None).await?;
    let doc = posted(&deliver(&env, &request).await?)?;
    let root = doc.root();
    let idp_cert = common::certificate(common::IDP_CERT);

    assert!(doc.find_child(root, SAML_NS, "Assertion").is_none());
    assert!(!doc.serialize().contains("user@example.com"));
    verify_enveloped_signature(&doc, root, [&idp_cert])?;

    let encrypted = doc
        .find_child(root, SAML_NS, "EncryptedAssertion")
        .expect("encrypted assertion");
    let key = pem_to_der(common::ENC_KEY, "PRIVATE KEY")?;
    let assertion = decrypt_assertion(&doc, encrypted, &key)?;

    assert!(assertion.root_element().is(SAML_NS, "Assertion"));
    assert!(assertion.serialize().contains("user@example.com"));
    verify_enveloped_signature(&assertion, assertion.root(), [&idp_cert])?;

    // Only the SP's encryption key opens it.
    let wrong = pem_to_der(common::SP_KEY, "PRIVATE KEY")?;
    assert!(decrypt_assertion(&doc, encrypted, &wrong).is_err());
    Ok(())
}

/// A 1024-bit encryption certificate is never used, and the response is
/// not sent in plaintext instead.
#[tokio::test]
async fn test_weak_encryption_certificate_refused() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    env.register(common::acme_sp().with_encryption_certificate(common::certificate(common::WEAK_CERT)));
    let request = validated(&env, None).await?;

    let response = request.success_response(
        common::IDP_ENTITY_ID,
        NameId::email("user@example.com"),
        Vec::new(),
        Duration::minutes(5),
    );
    let err = env.dispatcher().deliver(&response, &request).await.unwrap_err();
    assert!(matches!(err, SamlError::NoEncryptionCertificate(ref sp) if sp == common::SP_ENTITY_ID));

    // A usable certificate next to the weak one is picked instead.
    let mut sp: ServiceProvider = request.service_provider.clone();
    sp.encryption_certificates.push(common::certificate(common::ENC_CERT));
    let xml = env.dispatcher().finalize(&response.to_xml(), &sp).await?;
    assert!(xml.contains("EncryptedAssertion"));
    Ok(())
}

/// A failed request is answered with a signed error response to its ACS.
#[tokio::test]
async fn test_error_response_for_failed_request() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    let request = env
        .authn_request()
        .with_destination(format!("{}/", common::SSO_URL));

    let failure = match env
        .authn_processor()
        .process_request(&env.signed_redirect(&request.to_xml(), Some("relay-2"))?)
        .await
    {
        Err(ProcessingFailure::Protocol(failure)) => failure,
        other => panic!("expected a protocol failure, got {other:?}"),
    };
    assert_eq!(failure.relay_state.as_deref(), Some("relay-2"));

    let delivery = env.renderer().render(&failure).await?;
    let page = delivery.post_page().expect("POST endpoint");
    assert_eq!(page.action(), common::ACS_URL);
    assert_eq!(page.field("RelayState"), Some("relay-2"));

    let doc = posted(page)?;
    let root = doc.root();
    assert!(doc.root_element().is(SAMLP_NS, "Response"));
    assert_eq!(doc.attribute(root, "InResponseTo"), Some(request.id.as_str()));
    assert!(doc.find_child(root, SAML_NS, "Assertion").is_none());

    let xml = doc.serialize();
    assert!(xml.contains(status_codes::REQUESTER));
    assert!(xml.contains("Invalid destination"));

    let idp_cert = common::certificate(common::IDP_CERT);
    verify_enveloped_signature(&doc, root, [&idp_cert])?;
    Ok(())
}

/// A failed logout request is answered with a `LogoutResponse`.
#[tokio::test]
async fn test_error_response_for_failed_logout() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    let request = env
        .logout_request()
        .with_not_on_or_after(common::now() - Duration::seconds(30));

    let failure = match env
        .logout_processor()
        .process_request(&env.signed_redirect(&request.to_xml(), None)?)
        .await
    {
        Err(ProcessingFailure::Protocol(failure)) => failure,
        other => panic!("expected a protocol failure, got {other:?}"),
    };

    let delivery = env.renderer().render(&failure).await?;
    let page = delivery.post_page().expect("POST endpoint");
    assert_eq!(page.action(), common::SP_SLO_URL);
    let doc = posted(page)?;
    assert!(doc.root_element().is(SAMLP_NS, "LogoutResponse"));
    assert_eq!(doc.attribute(doc.root(), "InResponseTo"), Some(request.id.as_str()));
    assert!(doc.serialize().contains("LogoutRequest is expired"));
    assert_eq!(page.field("RelayState"), None);
    Ok(())
}

/// Error pages follow the configured CSP switch.
#[tokio::test]
async fn test_error_page_without_csp() -> anyhow::Result<()> {
    let mut env = TestEnv::new()?;
    env.config.content_security_policy = false;
    env.register(common::acme_sp().with_signing_behavior(SigningBehavior::DoNotSign));

    let request = env.authn_request().with_destination("https://elsewhere.example.com/sso");
    let failure = match env
        .authn_processor()
        .process_request(&env.signed_redirect(&request.to_xml(), None)?)
        .await
    {
        Err(ProcessingFailure::Protocol(failure)) => failure,
        other => panic!("expected a protocol failure, got {other:?}"),
    };

    let delivery = env.renderer().render(&failure).await?;
    let page = delivery.post_page().expect("POST endpoint");
    assert!(!page.html().contains("Content-Security-Policy"));
    let doc = posted(page)?;
    assert!(doc.find_child(doc.root(), XMLDSIG_NS, "Signature").is_none());
    Ok(())
}

/// The error goes to the registered ACS, not to the URL the request named.
#[tokio::test]
async fn test_error_response_ignores_requested_acs() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    let request = env
        .authn_request()
        .with_destination("https://elsewhere.example.com/sso")
        .with_acs_url("https://evil.example.com/acs");

    let failure = match env
        .authn_processor()
        .process_request(&env.signed_redirect(&request.to_xml(), None)?)
        .await
    {
        Err(ProcessingFailure::Protocol(failure)) => failure,
        other => panic!("expected a protocol failure, got {other:?}"),
    };

    let delivery = env.renderer().render(&failure).await?;
    let page = delivery.post_page().expect("POST endpoint");
    assert_eq!(page.action(), common::ACS_URL);
    let doc = posted(page)?;
    assert_eq!(doc.attribute(doc.root(), "Destination"), Some(common::ACS_URL));
    assert!(!doc.serialize().contains("evil.example.com"));
    Ok(())
}

/// A Redirect SLO endpoint gets the error in the query string.
#[tokio::test]
async fn test_logout_error_over_redirect() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    env.register(
        ServiceProvider::new(common::SP_ENTITY_ID)
            .with_signing_certificate(common::certificate(common::SP_CERT))
            .with_acs(AcsEndpoint::post(common::ACS_URL, 0).as_default())
            .with_slo(common::SP_SLO_URL, SamlBinding::HttpRedirect),
    );
    let request = env
        .logout_request()
        .with_not_on_or_after(common::now() - Duration::seconds(30));

    let failure = match env
        .logout_processor()
        .process_request(&env.signed_redirect(&request.to_xml(), Some("relay-3"))?)
        .await
    {
        Err(ProcessingFailure::Protocol(failure)) => failure,
        other => panic!("expected a protocol failure, got {other:?}"),
    };

    let delivery = env.renderer().render(&failure).await?;
    assert!(delivery.post_page().is_none());
    let location = delivery.location().expect("redirect location");
    let (base, query) = location.split_once('?').expect("query string");
    assert_eq!(base, common::SP_SLO_URL);

    let query = RedirectQuery::parse(query)?;
    assert_eq!(query.relay_state.map(|v| v.value).as_deref(), Some("relay-3"));
    assert!(query.sig_alg.is_some());
    assert!(query.signature.is_some());
    assert!(query.saml_response.is_some());
    Ok(())
}

/// An SP with nowhere to receive the error gets nothing.
#[tokio::test]
async fn test_error_response_without_endpoint() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    env.register(ServiceProvider::new(common::SP_ENTITY_ID).with_signing_certificate(common::certificate(common::SP_CERT)));
    let request = env.authn_request().with_destination("https://elsewhere.example.com/sso");

    let failure = match env
        .authn_processor()
        .process_request(&env.signed_redirect(&request.to_xml(), None)?)
        .await
    {
        Err(ProcessingFailure::Protocol(failure)) => failure,
        other => panic!("expected a protocol failure, got {other:?}"),
    };

    let err = env.renderer().render(&failure).await.unwrap_err();
    assert!(matches!(err, SamlError::NoResponseEndpoint(ref sp) if sp == common::SP_ENTITY_ID));
    Ok(())
}
