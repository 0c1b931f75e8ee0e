//! SAML Logout types.
//!
//! Single Logout (SLO) request and response messages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{NameId, Status, SAMLP_NS, SAML_NS, SAML_VERSION};
use crate::error::MessageFormatError;
use crate::message::{
    expect_root, format_instant, now_truncated, optional_attribute, optional_instant,
    required_attribute, required_instant, required_issuer, SamlMessage,
};
use crate::xml::{Element, XmlDocument};

/// SAML Logout Request.
///
/// A request to terminate an existing session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogoutRequest {
    /// Unique identifier for this request.
    pub id: String,

    /// Version of the SAML protocol.
    pub version: String,

    /// Timestamp when this request was issued.
    pub issue_instant: DateTime<Utc>,

    /// The entity ID of the requester.
    pub issuer: String,

    /// The URL where this request was sent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,

    /// The name identifier of the principal to log out.
    pub name_id: NameId,

    /// Session indexes to terminate.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub session_indexes: Vec<String>,

    /// Reason for the logout.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Time after which the request is no longer valid.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_on_or_after: Option<DateTime<Utc>>,
}

impl LogoutRequest {
    /// User logout reason.
    pub const REASON_USER: &'static str = "urn:oasis:names:tc:SAML:2.0:logout:user";

    /// Admin logout reason.
    pub const REASON_ADMIN: &'static str = "urn:oasis:names:tc:SAML:2.0:logout:admin";

    /// Creates a new logout request.
    #[must_use]
    pub fn new(issuer: impl Into<String>, name_id: NameId) -> Self {
        Self {
            id: format!("_id{}", uuid::Uuid::new_v4()),
            version: SAML_VERSION.to_string(),
            issue_instant: now_truncated(),
            issuer: issuer.into(),
            destination: None,
            name_id,
            session_indexes: Vec::new(),
            reason: None,
            not_on_or_after: None,
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

    /// Sets the destination URL.
    #[must_use]
    pub fn with_destination(mut self, url: impl Into<String>) -> Self {
        self.destination = Some(url.into());
        self
    }

    /// Adds a session index to terminate.
    #[must_use]
    pub fn with_session_index(mut self, index: impl Into<String>) -> Self {
        self.session_indexes.push(index.into());
        self
    }

    /// Sets the logout reason.
    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Sets `NotOnOrAfter`.
    #[must_use]
    pub fn with_not_on_or_after(mut self, instant: DateTime<Utc>) -> Self {
        self.not_on_or_after = Some(instant);
        self
    }

    /// Builds the `samlp:LogoutRequest` document.
    #[must_use]
    pub fn to_document(&self) -> XmlDocument {
        let root = Element::declared("samlp", "LogoutRequest", SAMLP_NS)
            .with_namespace(Some("saml"), SAML_NS)
            .with_attribute("ID", &*self.id)
            .with_attribute("Version", &*self.version)
            .with_attribute("IssueInstant", format_instant(self.issue_instant))
            .with_optional_attribute("Destination", self.destination.clone())
            .with_optional_attribute("Reason", self.reason.clone())
            .with_optional_attribute("NotOnOrAfter", self.not_on_or_after.map(format_instant));

        let mut doc = XmlDocument::new(root);
        let root = doc.root();
        doc.append_text_element(
            root,
            Element::new(Some("saml"), "Issuer", Some(SAML_NS)),
            self.issuer.clone(),
        );
        self.name_id.append_to(&mut doc, root);
        for index in &self.session_indexes {
            doc.append_text_element(
                root,
                Element::new(Some("samlp"), "SessionIndex", Some(SAMLP_NS)),
                index.clone(),
            );
        }
        doc
    }

    /// Serializes the request to XML.
    #[must_use]
    pub fn to_xml(&self) -> String {
        self.to_document().serialize()
    }
}

impl SamlMessage for LogoutRequest {
    const MESSAGE_NAME: &'static str = "LogoutRequest";

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
        let name_id = document
            .find_child(root, SAML_NS, "NameID")
            .map(|node| NameId::from_element(document, node))
            .ok_or_else(|| MessageFormatError::new("missing NameID"))?;
        let session_indexes = document
            .find_children(root, SAMLP_NS, "SessionIndex")
            .into_iter()
            .map(|node| document.text_content(node).trim().to_string())
            .collect();

        Ok(Self {
            id: required_attribute(document, root, "ID")?,
            version: required_attribute(document, root, "Version")?,
            issue_instant: required_instant(document, root, "IssueInstant")?,
            issuer: required_issuer(document)?,
            destination: optional_attribute(document, root, "Destination"),
            name_id,
            session_indexes,
            reason: optional_attribute(document, root, "Reason"),
            not_on_or_after: optional_instant(document, root, "NotOnOrAfter")?,
        })
    }
}

/// SAML Logout Response.
///
/// The reply to a logout request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogoutResponse {
    /// Unique identifier for this response.
    pub id: String,

    /// ID of the request this responds to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_response_to: Option<String>,

    /// Version of the SAML protocol.
    pub version: String,

    /// Timestamp when this response was issued.
    pub issue_instant: DateTime<Utc>,

    /// The entity ID of the responder.
    pub issuer: String,

    /// The URL where this response is sent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,

    /// Logout status.
    pub status: Status,
}

impl LogoutResponse {
    /// Creates a logout response with the given status.
    #[must_use]
    pub fn new(issuer: impl Into<String>, status: Status) -> Self {
        Self {
            id: format!("_id{}", uuid::Uuid::new_v4()),
            in_response_to: None,
            version: SAML_VERSION.to_string(),
            issue_instant: now_truncated(),
            issuer: issuer.into(),
            destination: None,
            status,
        }
    }

    /// Creates a successful logout response.
    #[must_use]
    pub fn success(issuer: impl Into<String>) -> Self {
        Self::new(issuer, Status::success())
    }

    /// Sets the request ID being answered.
    #[must_use]
    pub fn in_response_to(mut self, request_id: impl Into<String>) -> Self {
        self.in_response_to = Some(request_id.into());
        self
    }

    /// Sets the destination URL.
    #[must_use]
    pub fn with_destination(mut self, url: impl Into<String>) -> Self {
        self.destination = Some(url.into());
        self
    }

    /// Sets the issue instant.
    #[must_use]
    pub fn with_issue_instant(mut self, instant: DateTime<Utc>) -> Self {
        self.issue_instant = instant;
        self
    }

    /// Builds the `samlp:LogoutResponse` document.
    #[must_use]
    pub fn to_document(&self) -> XmlDocument {
        let root = Element::declared("samlp", "LogoutResponse", SAMLP_NS)
            .with_namespace(Some("saml"), SAML_NS)
            .with_attribute("ID", &*self.id)
            .with_optional_attribute("InResponseTo", self.in_response_to.clone())
            .with_attribute("Version", &*self.version)
            .with_attribute("IssueInstant", format_instant(self.issue_instant))
            .with_optional_attribute("Destination", self.destination.clone());

        let mut doc = XmlDocument::new(root);
        let root = doc.root();
        doc.append_text_element(
            root,
            Element::new(Some("saml"), "Issuer", Some(SAML_NS)),
            self.issuer.clone(),
        );
        self.status.append_to(&mut doc, root);
        doc
    }

    /// Serializes the response to XML.
    #[must_use]
    pub fn to_xml(&self) -> String {
        self.to_document().serialize()
    }
}
