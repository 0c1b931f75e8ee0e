//! Common test utilities and fixtures.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use idp_core::{FixedClock, SamlConfig};
use idp_crypto::{Certificate, RsaAlgorithm};
use idp_protocol_saml::bindings::{HttpPostBinding, HttpRedirectBinding, InboundRequest, SamlMessageType};
use idp_protocol_saml::processor::{AuthnRequestHandler, LogoutRequestHandler, ProtocolMessageProcessor};
use idp_protocol_saml::provider::{InMemoryServiceProviderStore, StaticKeyMaterialProvider};
use idp_protocol_saml::signature::{MessageSigner, SigningCredential, XmlSignatureEngine};
use idp_protocol_saml::xml::{SecureXmlParser, XmlDocument};
use idp_protocol_saml::{
    AcsEndpoint, AuthnRequest, ErrorResponseRenderer, LogoutRequest, NameId, ResponseDispatcher, SamlBinding,
    ServiceProvider,
};

pub const IDP_KEY: &str = include_str!("../../../testdata/idp-key.pem");
pub const IDP_CERT: &str = include_str!("../../../testdata/idp-cert.pem");
pub const SP_KEY: &str = include_str!("../../../testdata/sp-signing-key.pem");
pub const SP_CERT: &str = include_str!("../../../testdata/sp-signing-cert.pem");
pub const ENC_KEY: &str = include_str!("../../../testdata/sp-encryption-key.pem");
pub const ENC_CERT: &str = include_str!("../../../testdata/sp-encryption-cert.pem");
pub const WEAK_CERT: &str = include_str!("../../../testdata/sp-weak-cert.pem");
pub const EXPIRED_CERT: &str = include_str!("../../../testdata/sp-expired-cert.pem");
pub const FUTURE_CERT: &str = include_str!("../../../testdata/sp-future-cert.pem");

pub const IDP_ENTITY_ID: &str = "https://idp.example.com/saml";
pub const SSO_URL: &str = "https://idp.example.com/saml/sso";
pub const SLO_URL: &str = "https://idp.example.com/saml/slo";

pub const SP_ENTITY_ID: &str = "urn:sp:acme";
pub const ACS_URL: &str = "https://acme.example.com/saml/acs";
pub const SP_SLO_URL: &str = "https://acme.example.com/saml/slo";

/// The instant every test runs at.
pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2030, 6, 1, 12, 0, 0).unwrap()
}

pub fn config() -> SamlConfig {
    SamlConfig {
        idp_entity_id: IDP_ENTITY_ID.to_string(),
        sso_url: SSO_URL.to_string(),
        slo_url: SLO_URL.to_string(),
        ..SamlConfig::default()
    }
}

pub fn certificate(pem: &str) -> Certificate {
    Certificate::from_pem(pem).unwrap()
}

/// `urn:sp:acme` with one valid signing certificate and a default POST ACS.
pub fn acme_sp() -> ServiceProvider {
    ServiceProvider::new(SP_ENTITY_ID)
        .with_signing_certificate(certificate(SP_CERT))
        .with_acs(AcsEndpoint::post(ACS_URL, 0).as_default())
        .with_slo(SP_SLO_URL, SamlBinding::HttpPost)
}

/// Pipeline wiring around an in-memory SP store and a pinned clock.
pub struct TestEnv {
    pub config: SamlConfig,
    pub clock: Arc<FixedClock>,
    pub store: Arc<InMemoryServiceProviderStore>,
    pub keys: Arc<StaticKeyMaterialProvider>,
    pub sp_credential: SigningCredential,
}

impl TestEnv {
    /// Creates an environment with `urn:sp:acme` registered.
    pub fn new() -> anyhow::Result<Self> {
        // Initialize tracing for tests
        let _ = tracing_subscriber::fmt()
            .with_env_filter("idp_protocol_saml=debug")
            .with_test_writer()
            .try_init();

        let store = Arc::new(InMemoryServiceProviderStore::new());
        store.insert(acme_sp());

        Ok(Self {
            config: config(),
            clock: Arc::new(FixedClock::new(now())),
            store,
            keys: Arc::new(StaticKeyMaterialProvider::new(SigningCredential::from_pem(
                IDP_KEY, IDP_CERT,
            )?)),
            sp_credential: SigningCredential::from_pem(SP_KEY, SP_CERT)?,
        })
    }

    /// Replaces the registered SP.
    pub fn register(&self, sp: ServiceProvider) {
        self.store.insert(sp);
    }

    pub fn authn_processor(&self) -> ProtocolMessageProcessor<AuthnRequestHandler> {
        ProtocolMessageProcessor::new(
            AuthnRequestHandler::from_config(&self.config),
            &self.config,
            self.clock.clone(),
            self.store.clone(),
        )
    }

    pub fn logout_processor(&self) -> ProtocolMessageProcessor<LogoutRequestHandler> {
        ProtocolMessageProcessor::new(
            LogoutRequestHandler::from_config(&self.config),
            &self.config,
            self.clock.clone(),
            self.store.clone(),
        )
    }

    pub fn dispatcher(&self) -> ResponseDispatcher {
        ResponseDispatcher::new(&self.config, self.keys.clone(), self.clock.clone())
    }

    pub fn renderer(&self) -> ErrorResponseRenderer {
        ErrorResponseRenderer::new(&self.config, MessageSigner::new(self.keys.clone()))
    }

    /// A fresh request from `urn:sp:acme` addressed to the SSO endpoint.
    pub fn authn_request(&self) -> AuthnRequest {
        AuthnRequest::new(SP_ENTITY_ID)
            .with_issue_instant(now())
            .with_destination(SSO_URL)
            .with_acs_url(ACS_URL)
    }

    /// A fresh logout request from `urn:sp:acme` addressed to the SLO endpoint.
    pub fn logout_request(&self) -> LogoutRequest {
        LogoutRequest::new(SP_ENTITY_ID, NameId::email("user@example.com"))
            .with_issue_instant(now())
            .with_destination(SLO_URL)
            .with_session_index("session-1")
    }

    /// Raw query of a Redirect-bound message signed with the SP key.
    pub fn signed_redirect_query(&self, xml: &str, relay_state: Option<&str>) -> anyhow::Result<String> {
        self.signed_redirect_query_with(xml, relay_state, RsaAlgorithm::RsaSha256)
    }

    pub fn signed_redirect_query_with(
        &self,
        xml: &str,
        relay_state: Option<&str>,
        algorithm: RsaAlgorithm,
    ) -> anyhow::Result<String> {
        let url = HttpRedirectBinding::encode_signed(
            xml,
            SSO_URL,
            relay_state,
            SamlMessageType::Request,
            &self.sp_credential.private_key,
            algorithm,
        )?;
        Ok(query_of(&url).to_string())
    }

    /// A GET carrying a signed Redirect-bound message.
    pub fn signed_redirect(&self, xml: &str, relay_state: Option<&str>) -> anyhow::Result<InboundRequest> {
        Ok(InboundRequest::get(self.signed_redirect_query(xml, relay_state)?))
    }

    /// A GET carrying an unsigned Redirect-bound message.
    pub fn unsigned_redirect(&self, xml: &str, relay_state: Option<&str>) -> anyhow::Result<InboundRequest> {
        let url = HttpRedirectBinding::encode(xml, SSO_URL, relay_state, SamlMessageType::Request)?;
        Ok(InboundRequest::get(query_of(&url)))
    }

    /// `doc` with an enveloped signature by the SP key over its root.
    pub fn sign_document(&self, doc: &mut XmlDocument) -> anyhow::Result<()> {
        XmlSignatureEngine::new().sign_root(doc, &self.sp_credential)?;
        Ok(())
    }

    /// Serialized `doc` after signing its root with the SP key.
    pub fn signed_xml(&self, mut doc: XmlDocument) -> anyhow::Result<String> {
        self.sign_document(&mut doc)?;
        Ok(doc.serialize())
    }
}

/// A POST form carrying `xml`.
pub fn post_request(xml: &str, relay_state: Option<&str>) -> InboundRequest {
    let mut body = format!(
        "SAMLRequest={}",
        urlencoding::encode(&HttpPostBinding::encode(xml))
    );
    if let Some(rs) = relay_state {
        body.push_str("&RelayState=");
        body.push_str(&urlencoding::encode(rs));
    }
    InboundRequest::post_form(body)
}

/// The part of `url` after `?`.
pub fn query_of(url: &str) -> &str {
    url.split_once('?').map_or("", |(_, query)| query)
}

/// Replaces the raw value of `name` in a query string.
pub fn replace_param(query: &str, name: &str, raw_value: &str) -> String {
    query
        .split('&')
        .map(|pair| match pair.split_once('=') {
            Some((key, _)) if key == name => format!("{key}={raw_value}"),
            _ => pair.to_string(),
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// Raw value of `name` in a query string.
pub fn param<'a>(query: &'a str, name: &str) -> Option<&'a str> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
}

/// Parses a base64 `SAMLResponse` form value.
pub fn decode_response(encoded: &str) -> anyhow::Result<XmlDocument> {
    let xml = HttpPostBinding::decode_message(encoded, 1024 * 1024)?;
    Ok(SecureXmlParser::new().parse_bytes(&xml)?)
}
