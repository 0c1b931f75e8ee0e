//! SAML Assertion types.
//!
//! Assertions contain statements about a subject made by an issuer. The IdP
//! only ever builds them, so these types carry XML writers but no parsers.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::{confirmation_methods, NameId, SAML_NS, SAML_VERSION, XSI_NS, XS_NS};
use crate::message::{format_instant, now_truncated};
use crate::xml::{Element, NodeId, XmlDocument};

fn saml(local_name: &str) -> Element {
    Element::new(Some("saml"), local_name, Some(SAML_NS))
}

/// SAML Assertion.
///
/// A package of information that supplies one or more statements made
/// by a SAML authority (the issuer).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assertion {
    /// Unique identifier for this assertion.
    pub id: String,

    /// Version of the SAML protocol.
    pub version: String,

    /// Timestamp when this assertion was issued.
    pub issue_instant: DateTime<Utc>,

    /// The entity ID of the identity provider that issued this assertion.
    pub issuer: String,

    /// The subject of this assertion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<Subject>,

    /// Conditions that must be evaluated for the assertion to be valid.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conditions: Option<Conditions>,

    /// Authentication statement describing how the subject authenticated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authn_statement: Option<AuthnStatement>,

    /// Attributes about the subject.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<SamlAttribute>,
}

impl Assertion {
    /// Creates a new assertion.
    #[must_use]
    pub fn new(issuer: impl Into<String>) -> Self {
        Self {
            id: format!("_id{}", uuid::Uuid::new_v4()),
            version: SAML_VERSION.to_string(),
            issue_instant: now_truncated(),
            issuer: issuer.into(),
            subject: None,
            conditions: None,
            authn_statement: None,
            attributes: Vec::new(),
        }
    }

    /// Sets the issue instant.
    #[must_use]
    pub fn with_issue_instant(mut self, instant: DateTime<Utc>) -> Self {
        self.issue_instant = instant;
        self
    }

    /// Sets the subject.
    #[must_use]
    pub fn with_subject(mut self, subject: Subject) -> Self {
        self.subject = Some(subject);
        self
    }

    /// Sets the conditions.
    #[must_use]
    pub fn with_conditions(mut self, conditions: Conditions) -> Self {
        self.conditions = Some(conditions);
        self
    }

    /// Sets the authentication statement.
    #[must_use]
    pub fn with_authn_statement(mut self, statement: AuthnStatement) -> Self {
        self.authn_statement = Some(statement);
        self
    }

    /// Adds an attribute.
    #[must_use]
    pub fn with_attribute(mut self, attribute: SamlAttribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// Appends `<saml:Assertion>` under `parent`.
    pub fn append_to(&self, doc: &mut XmlDocument, parent: NodeId) -> NodeId {
        let assertion = doc.append_element(parent, self.root_element());
        self.write_children(doc, assertion);
        assertion
    }

    /// Builds a standalone assertion document.
    #[must_use]
    pub fn to_document(&self) -> XmlDocument {
        let mut doc = XmlDocument::new(self.root_element().with_namespace(Some("saml"), SAML_NS));
        let root = doc.root();
        self.write_children(&mut doc, root);
        doc
    }

    fn root_element(&self) -> Element {
        let element = saml("Assertion")
            .with_attribute("ID", &*self.id)
            .with_attribute("Version", &*self.version)
            .with_attribute("IssueInstant", format_instant(self.issue_instant));
        if self.attributes.is_empty() {
            element
        } else {
            element
                .with_namespace(Some("xs"), XS_NS)
                .with_namespace(Some("xsi"), XSI_NS)
        }
    }

    fn write_children(&self, doc: &mut XmlDocument, assertion: NodeId) {
        doc.append_text_element(assertion, saml("Issuer"), self.issuer.clone());
        if let Some(subject) = &self.subject {
            subject.append_to(doc, assertion);
        }
        if let Some(conditions) = &self.conditions {
            conditions.append_to(doc, assertion);
        }
        if let Some(statement) = &self.authn_statement {
            statement.append_to(doc, assertion);
        }
        if !self.attributes.is_empty() {
            let statement = doc.append_element(assertion, saml("AttributeStatement"));
            for attribute in &self.attributes {
                attribute.append_to(doc, statement);
            }
        }
    }
}

/// Subject of an assertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    /// The name identifier for the subject.
    pub name_id: NameId,

    /// Subject confirmations.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subject_confirmations: Vec<SubjectConfirmation>,
}

impl Subject {
    /// Creates a new subject with a name ID.
    #[must_use]
    pub fn new(name_id: NameId) -> Self {
        Self {
            name_id,
            subject_confirmations: Vec::new(),
        }
    }

    /// Adds a subject confirmation.
    #[must_use]
    pub fn with_confirmation(mut self, confirmation: SubjectConfirmation) -> Self {
        self.subject_confirmations.push(confirmation);
        self
    }

    fn append_to(&self, doc: &mut XmlDocument, parent: NodeId) {
        let subject = doc.append_element(parent, saml("Subject"));
        self.name_id.append_to(doc, subject);
        for confirmation in &self.subject_confirmations {
            let node = doc.append_element(
                subject,
                saml("SubjectConfirmation").with_attribute("Method", &*confirmation.method),
            );
            if let Some(data) = &confirmation.subject_confirmation_data {
                doc.append_element(
                    node,
                    saml("SubjectConfirmationData")
                        .with_optional_attribute("InResponseTo", data.in_response_to.clone())
                        .with_optional_attribute("NotOnOrAfter", data.not_on_or_after.map(format_instant))
                        .with_optional_attribute("Recipient", data.recipient.clone()),
                );
            }
        }
    }
}

/// Subject confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectConfirmation {
    /// The confirmation method.
    pub method: String,

    /// Additional confirmation data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject_confirmation_data: Option<SubjectConfirmationData>,
}

impl SubjectConfirmation {
    /// Creates a bearer confirmation.
    #[must_use]
    pub fn bearer() -> Self {
        Self {
            method: confirmation_methods::BEARER.to_string(),
            subject_confirmation_data: None,
        }
    }

    /// Sets the confirmation data.
    #[must_use]
    pub fn with_data(mut self, data: SubjectConfirmationData) -> Self {
        self.subject_confirmation_data = Some(data);
        self
    }
}

/// Subject confirmation data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectConfirmationData {
    /// The request ID that this assertion responds to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_response_to: Option<String>,

    /// Time after which the subject can no longer be confirmed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_on_or_after: Option<DateTime<Utc>>,

    /// The location to which the assertion can be presented.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
}

impl SubjectConfirmationData {
    /// Creates confirmation data for a request, valid for `validity`.
    #[must_use]
    pub fn for_request(
        request_id: impl Into<String>,
        recipient: impl Into<String>,
        validity: Duration,
    ) -> Self {
        Self {
            in_response_to: Some(request_id.into()),
            recipient: Some(recipient.into()),
            not_on_or_after: Some(now_truncated() + validity),
        }
    }
}

/// Conditions for assertion validity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conditions {
    /// Time before which the assertion is not valid.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_before: Option<DateTime<Utc>>,

    /// Time at or after which the assertion is not valid.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_on_or_after: Option<DateTime<Utc>>,

    /// Audiences allowed to consume the assertion.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub audiences: Vec<String>,
}

impl Conditions {
    /// Creates conditions valid from now for `validity`.
    #[must_use]
    pub fn with_validity(validity: Duration) -> Self {
        let now = now_truncated();
        Self {
            not_before: Some(now),
            not_on_or_after: Some(now + validity),
            audiences: Vec::new(),
        }
    }

    /// Adds an audience restriction.
    #[must_use]
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audiences.push(audience.into());
        self
    }

    fn append_to(&self, doc: &mut XmlDocument, parent: NodeId) {
        let conditions = doc.append_element(
            parent,
            saml("Conditions")
                .with_optional_attribute("NotBefore", self.not_before.map(format_instant))
                .with_optional_attribute("NotOnOrAfter", self.not_on_or_after.map(format_instant)),
        );
        if !self.audiences.is_empty() {
            let restriction = doc.append_element(conditions, saml("AudienceRestriction"));
            for audience in &self.audiences {
                doc.append_text_element(restriction, saml("Audience"), audience.clone());
            }
        }
    }
}

/// Authentication statement.
///
/// Describes the act of authentication performed by the subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthnStatement {
    /// The time of authentication.
    pub authn_instant: DateTime<Utc>,

    /// The session index (for session management).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_index: Option<String>,

    /// Authentication context class reference.
    pub authn_context_class_ref: String,
}

impl AuthnStatement {
    /// Creates a new authentication statement with a fresh session index.
    #[must_use]
    pub fn new(context_class_ref: impl Into<String>) -> Self {
        Self {
            authn_instant: now_truncated(),
            session_index: Some(format!("_session{}", uuid::Uuid::new_v4())),
            authn_context_class_ref: context_class_ref.into(),
        }
    }

    fn append_to(&self, doc: &mut XmlDocument, parent: NodeId) {
        let statement = doc.append_element(
            parent,
            saml("AuthnStatement")
                .with_attribute("AuthnInstant", format_instant(self.authn_instant))
                .with_optional_attribute("SessionIndex", self.session_index.clone()),
        );
        let context = doc.append_element(statement, saml("AuthnContext"));
        doc.append_text_element(
            context,
            saml("AuthnContextClassRef"),
            self.authn_context_class_ref.clone(),
        );
    }
}

/// SAML attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamlAttribute {
    /// Attribute name.
    pub name: String,

    /// Attribute name format.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_format: Option<String>,

    /// Human-readable name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub friendly_name: Option<String>,

    /// String values.
    #[serde(default)]
    pub values: Vec<String>,
}

impl SamlAttribute {
    /// Basic attribute name format.
    pub const FORMAT_BASIC: &'static str = "urn:oasis:names:tc:SAML:2.0:attrname-format:basic";

    /// Creates a basic-format attribute.
    #[must_use]
    pub fn new(name: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            name: name.into(),
            name_format: Some(Self::FORMAT_BASIC.to_string()),
            friendly_name: None,
            values,
        }
    }

    fn append_to(&self, doc: &mut XmlDocument, parent: NodeId) {
        let attribute = doc.append_element(
            parent,
            saml("Attribute")
                .with_attribute("Name", &*self.name)
                .with_optional_attribute("NameFormat", self.name_format.clone())
                .with_optional_attribute("FriendlyName", self.friendly_name.clone()),
        );
        for value in &self.values {
            doc.append_text_element(
                attribute,
                saml("AttributeValue").with_qualified_attribute("xsi", "type", XSI_NS, "xs:string"),
                value.clone(),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::authn_context_classes;
    use crate::xml::SecureXmlParser;

    fn sample() -> Assertion {
        Assertion::new("https://idp.example.com")
            .with_subject(
                Subject::new(NameId::email("user@example.com")).with_confirmation(
                    SubjectConfirmation::bearer().with_data(SubjectConfirmationData::for_request(
                        "_req1",
                        "https://sp.example.com/acs",
                        Duration::minutes(5),
                    )),
                ),
            )
            .with_conditions(Conditions::with_validity(Duration::minutes(5)).with_audience("urn:sp:acme"))
            .with_authn_statement(AuthnStatement::new(
                authn_context_classes::PASSWORD_PROTECTED_TRANSPORT,
            ))
            .with_attribute(SamlAttribute::new("email", vec!["user@example.com".to_string()]))
    }

    #[test]
    fn assertion_document_structure() {
        let assertion = sample();
        let xml = assertion.to_document().serialize();
        let doc = SecureXmlParser::new().parse_str(&xml).unwrap();
        let root = doc.root();

        assert!(doc.root_element().is(SAML_NS, "Assertion"));
        assert_eq!(doc.attribute(root, "ID"), Some(assertion.id.as_str()));

        let children: Vec<_> = doc
            .child_elements(root)
            .map(|c| doc.element(c).unwrap().local_name.clone())
            .collect();
        assert_eq!(
            children,
            ["Issuer", "Subject", "Conditions", "AuthnStatement", "AttributeStatement"]
        );

        let audience = doc.find_descendant(root, SAML_NS, "Audience").unwrap();
        assert_eq!(doc.text_content(audience), "urn:sp:acme");

        let value = doc.find_descendant(root, SAML_NS, "AttributeValue").unwrap();
        let type_attr = doc
            .element(value)
            .unwrap()
            .attributes
            .iter()
            .find(|a| a.local_name == "type")
            .unwrap();
        assert_eq!(type_attr.namespace.as_deref(), Some(XSI_NS));
        assert_eq!(type_attr.value, "xs:string");
    }

    #[test]
    fn embedded_assertion_inherits_namespaces() {
        let mut doc = XmlDocument::new(Element::declared("saml", "Wrapper", SAML_NS));
        let root = doc.root();
        let node = sample().append_to(&mut doc, root);

        let standalone = doc.serialize_node(node);
        assert!(standalone.starts_with("<saml:Assertion xmlns:saml="));
        assert!(SecureXmlParser::new().parse_str(&standalone).is_ok());
    }
}
