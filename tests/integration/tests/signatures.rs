//! Inbound signature tests.
//!
//! Tampering with any signed part of a Redirect query, and the classic
//! signature-wrapping rearrangements of a POST document.

use idp_protocol_saml::bindings::{HttpRedirectBinding, InboundRequest, SamlMessageType};
use idp_protocol_saml::processor::ProcessingFailure;
use idp_protocol_saml::xml::{Element, SecureXmlParser, XmlDocument};
use idp_protocol_saml::{status_codes, AuthnRequest, SAMLP_NS, SAML_NS, XMLDSIG_NS};

use crate::common::{self, TestEnv};

async fn rejection(env: &TestEnv, inbound: &InboundRequest) -> String {
    match env.authn_processor().process_request(inbound).await {
        Err(ProcessingFailure::Protocol(failure)) => {
            assert_eq!(failure.error.status_code, status_codes::REQUESTER);
            failure.error.message
        }
        other => panic!("expected a protocol failure, got {other:?}"),
    }
}

/// Swapping in another validly encoded message breaks the signature.
#[tokio::test]
async fn test_tampered_saml_request() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    let query = env.signed_redirect_query(&env.authn_request().to_xml(), Some("abc"))?;

    let substitute = HttpRedirectBinding::encode(
        &env.authn_request().to_xml(),
        common::SSO_URL,
        None,
        SamlMessageType::Request,
    )?;
    let substitute = common::param(common::query_of(&substitute), "SAMLRequest").unwrap_or_default();
    let tampered = common::replace_param(&query, "SAMLRequest", substitute);

    assert_eq!(rejection(&env, &InboundRequest::get(tampered)).await, "Invalid signature");
    Ok(())
}

/// `RelayState` is covered by the signature.
#[tokio::test]
async fn test_tampered_relay_state() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    let query = env.signed_redirect_query(&env.authn_request().to_xml(), Some("abc"))?;

    let tampered = common::replace_param(&query, "RelayState", "abd");
    assert_eq!(rejection(&env, &InboundRequest::get(tampered)).await, "Invalid signature");

    // Dropping it is tampering too.
    let dropped: String = query
        .split('&')
        .filter(|pair| !pair.starts_with("RelayState="))
        .collect::<Vec<_>>()
        .join("&");
    assert_eq!(rejection(&env, &InboundRequest::get(dropped)).await, "Invalid signature");
    Ok(())
}

/// `SigAlg` is covered by the signature, and unknown algorithms are refused.
#[tokio::test]
async fn test_tampered_sig_alg() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    let query = env.signed_redirect_query(&env.authn_request().to_xml(), None)?;

    let sha512 = urlencoding::encode("http://www.w3.org/2001/04/xmldsig-more#rsa-sha512").into_owned();
    let tampered = common::replace_param(&query, "SigAlg", &sha512);
    assert_eq!(rejection(&env, &InboundRequest::get(tampered)).await, "Invalid signature");

    let sha1 = urlencoding::encode("http://www.w3.org/2000/09/xmldsig#rsa-sha1").into_owned();
    let downgraded = common::replace_param(&query, "SigAlg", &sha1);
    assert_eq!(rejection(&env, &InboundRequest::get(downgraded)).await, "Invalid signature");
    Ok(())
}

/// The signed string uses the received encoding, not a re-encoding.
#[tokio::test]
async fn test_reencoded_query_rejected() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    let query = env.signed_redirect_query(&env.authn_request().to_xml(), Some("a b/c"))?;
    assert_eq!(common::param(&query, "RelayState"), Some("a%20b%2Fc"));

    // Same decoded value, different bytes on the wire.
    let reencoded = common::replace_param(&query, "RelayState", "a+b%2fc");
    assert_eq!(rejection(&env, &InboundRequest::get(reencoded)).await, "Invalid signature");

    assert!(env
        .authn_processor()
        .process_request(&InboundRequest::get(query))
        .await
        .is_ok());
    Ok(())
}

/// A corrupted signature value is refused.
#[tokio::test]
async fn test_corrupted_signature_value() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    let query = env.signed_redirect_query(&env.authn_request().to_xml(), None)?;

    let tampered = common::replace_param(&query, "Signature", "AAAA");
    assert_eq!(rejection(&env, &InboundRequest::get(tampered)).await, "Invalid signature");
    Ok(())
}

fn signed_document(env: &TestEnv, request: &AuthnRequest) -> anyhow::Result<XmlDocument> {
    let xml = env.signed_xml(request.to_document())?;
    Ok(SecureXmlParser::new().parse_str(&xml)?)
}

/// A forged root carrying the signature of an embedded legitimate request.
///
/// The signature still verifies over the embedded element, so only the
/// reference-to-root rule stops it.
#[tokio::test]
async fn test_wrapped_signature_rejected() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    let legit = signed_document(&env, &env.authn_request())?;
    let legit_root = legit.root();
    let signature = legit
        .find_child(legit_root, XMLDSIG_NS, "Signature")
        .expect("signed request has a signature");

    let mut forged = env
        .authn_request()
        .with_acs_url("https://evil.example.com/acs")
        .to_document();
    let forged_root = forged.root();
    let issuer = forged
        .find_child(forged_root, SAML_NS, "Issuer")
        .expect("request has an issuer");
    let copied = forged.import(&legit, signature);
    forged.insert_after(issuer, copied);

    let mut unsigned_legit = legit.clone();
    unsigned_legit.detach(signature);
    let embedded = forged.import(&unsigned_legit, unsigned_legit.root());
    let extensions = forged.append_element(forged_root, Element::new(Some("samlp"), "Extensions", Some(SAMLP_NS)));
    forged.append_child(extensions, embedded);

    let inbound = common::post_request(&forged.serialize(), None);
    assert_eq!(rejection(&env, &inbound).await, "Invalid signature");
    Ok(())
}

/// A second element reusing the signed ID is refused even though the
/// signed root itself is untouched.
#[tokio::test]
async fn test_duplicate_id_rejected() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    let request = env.authn_request();
    let mut doc = signed_document(&env, &request)?;
    let root = doc.root();
    doc.append_element(
        root,
        Element::new(Some("samlp"), "Extensions", Some(SAMLP_NS)).with_attribute("ID", request.id.clone()),
    );

    let inbound = common::post_request(&doc.serialize(), None);
    assert_eq!(rejection(&env, &inbound).await, "Invalid signature");
    Ok(())
}

/// Two signatures on the root is ambiguous and refused.
#[tokio::test]
async fn test_second_signature_rejected() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    let mut doc = signed_document(&env, &env.authn_request())?;
    let root = doc.root();
    let signature = doc
        .find_child(root, XMLDSIG_NS, "Signature")
        .expect("signed request has a signature");

    let source = doc.clone();
    let copy = doc.import(&source, signature);
    doc.append_child(root, copy);

    let inbound = common::post_request(&doc.serialize(), None);
    assert_eq!(rejection(&env, &inbound).await, "Invalid signature");
    Ok(())
}

/// Editing signed content after signing breaks the digest.
#[tokio::test]
async fn test_modified_post_content_rejected() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    let xml = env.signed_xml(env.authn_request().to_document())?;
    let modified = xml.replace(common::ACS_URL, "https://acme.example.com/saml/ACS");
    assert_ne!(xml, modified);

    let inbound = common::post_request(&modified, None);
    assert_eq!(rejection(&env, &inbound).await, "Invalid signature");
    Ok(())
}
