//! SAML AuthnRequest types.
//!
//! Authentication request message sent by a service provider to an identity provider.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{NameIdPolicy, SamlBinding, SAMLP_NS, SAML_NS, SAML_VERSION};
use crate::error::MessageFormatError;
use crate::message::{
    bool_attribute, expect_root, format_instant, now_truncated, optional_attribute, optional_u32,
    required_attribute, required_instant, required_issuer, SamlMessage,
};
use crate::xml::{Element, XmlDocument};

/// SAML Authentication Request.
///
/// An authentication request message sent from a service provider to an
/// identity provider requesting authentication of a principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthnRequest {
    /// Unique identifier for this request.
    pub id: String,

    /// Version of the SAML protocol.
    pub version: String,

    /// Timestamp when this request was issued.
    pub issue_instant: DateTime<Utc>,

    /// The entity ID of the service provider issuing the request.
    pub issuer: String,

    /// The URL where the response should be sent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assertion_consumer_service_url: Option<String>,

    /// Index into the SP's assertion consumer service list.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assertion_consumer_service_index: Option<u32>,

    /// The IdP endpoint this request was sent to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,

    /// Binding to use for the response.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol_binding: Option<String>,

    /// Name ID policy constraints.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_id_policy: Option<NameIdPolicy>,

    /// Whether the IdP must authenticate the user directly.
    #[serde(default)]
    pub force_authn: bool,

    /// Whether the IdP must not interact with the user.
    #[serde(default)]
    pub is_passive: bool,

    /// A human-readable name for the requester.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_name: Option<String>,
}

impl AuthnRequest {
    /// Creates a new authentication request.
    #[must_use]
    pub fn new(issuer: impl Into<String>) -> Self {
        Self {
            id: format!("_id{}", uuid::Uuid::new_v4()),
            version: SAML_VERSION.to_string(),
            issue_instant: now_truncated(),
            issuer: issuer.into(),
            assertion_consumer_service_url: None,
            assertion_consumer_service_index: None,
            destination: None,
            protocol_binding: None,
            name_id_policy: None,
            force_authn: false,
            is_passive: false,
            provider_name: None,
        }
    }

    /// Sets the request ID.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Sets the issue instant.
    #[must_use]
    pub fn with_issue_instant(mut self, instant: DateTime<Utc>) -> Self {
        self.issue_instant = instant;
        self
    }

    /// Sets the assertion consumer service URL.
    #[must_use]
    pub fn with_acs_url(mut self, url: impl Into<String>) -> Self {
        self.assertion_consumer_service_url = Some(url.into());
        self
    }

    /// Sets the assertion consumer service index.
    #[must_use]
    pub fn with_acs_index(mut self, index: u32) -> Self {
        self.assertion_consumer_service_index = Some(index);
        self
    }

    /// Sets the destination URL.
    #[must_use]
    pub fn with_destination(mut self, url: impl Into<String>) -> Self {
        self.destination = Some(url.into());
        self
    }

    /// Sets the protocol binding for the response.
    #[must_use]
    pub fn with_binding(mut self, binding: SamlBinding) -> Self {
        self.protocol_binding = Some(binding.uri().to_string());
        self
    }

    /// Sets the name ID policy.
    #[must_use]
    pub fn with_name_id_policy(mut self, policy: NameIdPolicy) -> Self {
        self.name_id_policy = Some(policy);
        self
    }

    /// Sets force authentication.
    #[must_use]
    pub const fn force_authn(mut self, force: bool) -> Self {
        self.force_authn = force;
        self
    }

    /// Sets passive authentication.
    #[must_use]
    pub const fn is_passive(mut self, passive: bool) -> Self {
        self.is_passive = passive;
        self
    }

    /// Sets the provider name.
    #[must_use]
    pub fn with_provider_name(mut self, name: impl Into<String>) -> Self {
        self.provider_name = Some(name.into());
        self
    }

    /// Returns the parsed protocol binding.
    #[must_use]
    pub fn parsed_binding(&self) -> Option<SamlBinding> {
        self.protocol_binding.as_deref().and_then(SamlBinding::from_uri)
    }

    /// Builds the `samlp:AuthnRequest` document.
    #[must_use]
    pub fn to_document(&self) -> XmlDocument {
        let root = Element::declared("samlp", "AuthnRequest", SAMLP_NS)
            .with_namespace(Some("saml"), SAML_NS)
            .with_attribute("ID", &*self.id)
            .with_attribute("Version", &*self.version)
            .with_attribute("IssueInstant", format_instant(self.issue_instant))
            .with_optional_attribute("Destination", self.destination.clone())
            .with_optional_attribute(
                "AssertionConsumerServiceURL",
                self.assertion_consumer_service_url.clone(),
            )
            .with_optional_attribute(
                "AssertionConsumerServiceIndex",
                self.assertion_consumer_service_index.map(|i| i.to_string()),
            )
            .with_optional_attribute("ProtocolBinding", self.protocol_binding.clone())
            .with_optional_attribute("ProviderName", self.provider_name.clone())
            .with_optional_attribute("ForceAuthn", self.force_authn.then_some("true"))
            .with_optional_attribute("IsPassive", self.is_passive.then_some("true"));

        let mut doc = XmlDocument::new(root);
        let root = doc.root();
        doc.append_text_element(
            root,
            Element::new(Some("saml"), "Issuer", Some(SAML_NS)),
            self.issuer.clone(),
        );
        if let Some(policy) = &self.name_id_policy {
            policy.append_to(&mut doc, root);
        }
        doc
    }

    /// Serializes the request to XML.
    #[must_use]
    pub fn to_xml(&self) -> String {
        self.to_document().serialize()
    }
}

impl SamlMessage for AuthnRequest {
    const MESSAGE_NAME: &'static str = "AuthnRequest";

    fn id(&self) -> &str {
        &self.id
    }

    fn issuer(&self) -> &str {
        &self.issuer
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn issue_instant(&self) -> DateTime<Utc> {
        self.issue_instant
    }

    fn destination(&self) -> Option<&str> {
        self.destination.as_deref()
    }

    fn parse(document: &XmlDocument) -> Result<Self, MessageFormatError> {
        let root = expect_root(document, SAMLP_NS, Self::MESSAGE_NAME)?;
        let name_id_policy = match document.find_child(root, SAMLP_NS, "NameIDPolicy") {
            Some(node) => Some(NameIdPolicy {
                format: optional_attribute(document, node, "Format"),
                allow_create: bool_attribute(document, node, "AllowCreate", false)?,
            }),
            None => None,
        };

        Ok(Self {
            id: required_attribute(document, root, "ID")?,
            version: required_attribute(document, root, "Version")?,
            issue_instant: required_instant(document, root, "IssueInstant")?,
            issuer: required_issuer(document)?,
            assertion_consumer_service_url: optional_attribute(
                document,
                root,
                "AssertionConsumerServiceURL",
            ),
            assertion_consumer_service_index: optional_u32(
                document,
                root,
                "AssertionConsumerServiceIndex",
            )?,
            destination: optional_attribute(document, root, "Destination"),
            protocol_binding: optional_attribute(document, root, "ProtocolBinding"),
            name_id_policy,
            force_authn: bool_attribute(document, root, "ForceAuthn", false)?,
            is_passive: bool_attribute(document, root, "IsPassive", false)?,
            provider_name: optional_attribute(document, root, "ProviderName"),
        })
    }
}
