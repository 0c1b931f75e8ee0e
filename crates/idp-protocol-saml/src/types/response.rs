//! SAML Response types.
//!
//! Response messages sent by an identity provider to a service provider.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Assertion, Status, SAMLP_NS, SAML_NS, SAML_VERSION};
use crate::message::{format_instant, now_truncated};
use crate::xml::{Element, XmlDocument};

/// SAML Response.
///
/// A response message sent from an identity provider to a service provider
/// containing authentication results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    /// Unique identifier for this response.
    pub id: String,

    /// Version of the SAML protocol.
    pub version: String,

    /// Timestamp when this response was issued.
    pub issue_instant: DateTime<Utc>,

    /// The entity ID of the identity provider that issued this response.
    pub issuer: String,

    /// The ID of the request this response is for.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_response_to: Option<String>,

    /// The URL where this response is sent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,

    /// The status of the response.
    pub status: Status,

    /// The assertions in this response.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub assertions: Vec<Assertion>,
}

impl Response {
    /// Creates a new success response.
    #[must_use]
    pub fn success(issuer: impl Into<String>) -> Self {
        Self::error(issuer, Status::success())
    }

    /// Creates a response carrying `status` and no assertion.
    #[must_use]
    pub fn error(issuer: impl Into<String>, status: Status) -> Self {
        Self {
            id: format!("_id{}", uuid::Uuid::new_v4()),
            version: SAML_VERSION.to_string(),
            issue_instant: now_truncated(),
            issuer: issuer.into(),
            in_response_to: None,
            destination: None,
            status,
            assertions: Vec::new(),
        }
    }

    /// Sets the request ID this response is for.
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

    /// Adds an assertion to this response.
    #[must_use]
    pub fn with_assertion(mut self, assertion: Assertion) -> Self {
        self.assertions.push(assertion);
        self
    }

    /// Returns true if this response indicates success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Builds the `samlp:Response` document.
    #[must_use]
    pub fn to_document(&self) -> XmlDocument {
        let root = Element::declared("samlp", "Response", SAMLP_NS)
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
        for assertion in &self.assertions {
            assertion.append_to(&mut doc, root);
        }
        doc
    }

    /// Serializes the response to XML.
    #[must_use]
    pub fn to_xml(&self) -> String {
        self.to_document().serialize()
    }
}
