//! SAML Status types.
//!
//! Status information returned in SAML protocol responses.

use serde::{Deserialize, Serialize};

use super::{status_codes, SAMLP_NS};
use crate::xml::{Element, NodeId, XmlDocument};

/// SAML protocol status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    /// The status code.
    pub status_code: StatusCode,

    /// Optional status message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
}

impl Status {
    /// Creates a success status.
    #[must_use]
    pub fn success() -> Self {
        Self {
            status_code: StatusCode::success(),
            status_message: None,
        }
    }

    /// Creates a status from a (possibly nested) code.
    #[must_use]
    pub fn from_code(status_code: StatusCode) -> Self {
        Self {
            status_code,
            status_message: None,
        }
    }

    /// Creates a requester error status.
    #[must_use]
    pub fn requester_error(message: impl Into<String>) -> Self {
        Self::from_code(StatusCode::requester()).with_message(message)
    }

    /// Creates a responder error status.
    #[must_use]
    pub fn responder_error(message: impl Into<String>) -> Self {
        Self::from_code(StatusCode::responder()).with_message(message)
    }

    /// Returns true if this status indicates success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status_code.is_success()
    }

    /// Sets the status message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.status_message = Some(message.into());
        self
    }

    /// Appends `<samlp:Status>` under `parent`.
    pub fn append_to(&self, doc: &mut XmlDocument, parent: NodeId) -> NodeId {
        let status = doc.append_element(parent, Element::new(Some("samlp"), "Status", Some(SAMLP_NS)));
        self.status_code.append_to(doc, status);
        if let Some(message) = &self.status_message {
            doc.append_text_element(
                status,
                Element::new(Some("samlp"), "StatusMessage", Some(SAMLP_NS)),
                message.clone(),
            );
        }
        status
    }
}

impl Default for Status {
    fn default() -> Self {
        Self::success()
    }
}

/// SAML status code.
///
/// Status codes can be nested, with a top-level code and optional sub-code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCode {
    /// The status code URI value.
    pub value: String,

    /// Optional nested status code providing more detail.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<Box<StatusCode>>,
}

impl StatusCode {
    /// Creates a new status code with the given value.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            status_code: None,
        }
    }

    /// Creates a success status code.
    #[must_use]
    pub fn success() -> Self {
        Self::new(status_codes::SUCCESS)
    }

    /// Creates a requester error status code.
    #[must_use]
    pub fn requester() -> Self {
        Self::new(status_codes::REQUESTER)
    }

    /// Creates a responder error status code.
    #[must_use]
    pub fn responder() -> Self {
        Self::new(status_codes::RESPONDER)
    }

    /// Creates a version mismatch status code.
    #[must_use]
    pub fn version_mismatch() -> Self {
        Self::new(status_codes::VERSION_MISMATCH)
    }

    /// Adds a sub-status code.
    #[must_use]
    pub fn with_sub_status(mut self, sub: StatusCode) -> Self {
        self.status_code = Some(Box::new(sub));
        self
    }

    /// Returns true if this is a success status code.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.value == status_codes::SUCCESS
    }

    /// Returns the sub-status code value if present.
    #[must_use]
    pub fn sub_status_value(&self) -> Option<&str> {
        self.status_code.as_ref().map(|s| s.value.as_str())
    }

    fn append_to(&self, doc: &mut XmlDocument, parent: NodeId) {
        let code = doc.append_element(
            parent,
            Element::new(Some("samlp"), "StatusCode", Some(SAMLP_NS)).with_attribute("Value", &*self.value),
        );
        if let Some(sub) = &self.status_code {
            sub.append_to(doc, code);
        }
    }
}
