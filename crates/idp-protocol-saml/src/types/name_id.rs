//! SAML Name ID types.
//!
//! Name identifiers are used to identify subjects in SAML assertions and
//! logout requests.

use serde::{Deserialize, Serialize};

use super::{NameIdFormat, SAML_NS, SAMLP_NS};
use crate::xml::{Element, NodeId, XmlDocument};

/// SAML Name ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameId {
    /// The actual identifier value.
    pub value: String,

    /// The format of the name identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,

    /// The security or administrative domain that qualifies the name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_qualifier: Option<String>,

    /// The service provider's entity ID that qualifies the name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sp_name_qualifier: Option<String>,
}

impl NameId {
    /// Creates a new name ID with the given value.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            format: None,
            name_qualifier: None,
            sp_name_qualifier: None,
        }
    }

    /// Creates a new email name ID.
    #[must_use]
    pub fn email(email: impl Into<String>) -> Self {
        Self::new(email).with_format(NameIdFormat::Email)
    }

    /// Creates a new persistent name ID.
    #[must_use]
    pub fn persistent(value: impl Into<String>) -> Self {
        Self::new(value).with_format(NameIdFormat::Persistent)
    }

    /// Creates a new transient name ID.
    #[must_use]
    pub fn transient(value: impl Into<String>) -> Self {
        Self::new(value).with_format(NameIdFormat::Transient)
    }

    /// Sets the format.
    #[must_use]
    pub fn with_format(mut self, format: NameIdFormat) -> Self {
        self.format = Some(format.uri().to_string());
        self
    }

    /// Sets the SP name qualifier.
    #[must_use]
    pub fn with_sp_name_qualifier(mut self, qualifier: impl Into<String>) -> Self {
        self.sp_name_qualifier = Some(qualifier.into());
        self
    }

    /// Reads a `saml:NameID` element.
    #[must_use]
    pub fn from_element(doc: &XmlDocument, node: NodeId) -> Self {
        Self {
            value: doc.text_content(node).trim().to_string(),
            format: doc.attribute(node, "Format").map(String::from),
            name_qualifier: doc.attribute(node, "NameQualifier").map(String::from),
            sp_name_qualifier: doc.attribute(node, "SPNameQualifier").map(String::from),
        }
    }

    /// Appends a `saml:NameID` element under `parent`.
    pub fn append_to(&self, doc: &mut XmlDocument, parent: NodeId) -> NodeId {
        let element = Element::new(Some("saml"), "NameID", Some(SAML_NS))
            .with_optional_attribute("Format", self.format.clone())
            .with_optional_attribute("NameQualifier", self.name_qualifier.clone())
            .with_optional_attribute("SPNameQualifier", self.sp_name_qualifier.clone());
        doc.append_text_element(parent, element, self.value.clone())
    }
}

/// Name ID policy from an authentication request.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NameIdPolicy {
    /// Requested name ID format.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,

    /// Whether the IdP may create a new identifier.
    #[serde(default)]
    pub allow_create: bool,
}

impl NameIdPolicy {
    /// Creates a policy requesting `format`.
    #[must_use]
    pub fn new(format: NameIdFormat) -> Self {
        Self {
            format: Some(format.uri().to_string()),
            allow_create: false,
        }
    }

    /// Sets `AllowCreate`.
    #[must_use]
    pub fn allow_create(mut self, allow: bool) -> Self {
        self.allow_create = allow;
        self
    }

    pub(crate) fn append_to(&self, doc: &mut XmlDocument, parent: NodeId) {
        let element = Element::new(Some("samlp"), "NameIDPolicy", Some(SAMLP_NS))
            .with_optional_attribute("Format", self.format.clone())
            .with_attribute("AllowCreate", self.allow_create.to_string());
        doc.append_element(parent, element);
    }
}
