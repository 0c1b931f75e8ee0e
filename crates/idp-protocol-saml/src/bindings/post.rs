//! HTTP-POST Binding implementation.
//!
//! Inbound messages arrive base64-encoded in a form body. Outbound messages
//! are delivered through an HTML page that posts itself to the SP.

use std::io::Cursor;

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use base64::Engine;

use super::bounded::{BoundedReadStream, LimitExceeded};
use super::SamlMessageType;
use crate::error::ExtractionErrorKind;

/// The only script the auto-post page runs.
const AUTO_SUBMIT_SCRIPT: &str = "document.forms[0].submit();";

/// SAML fields of a POST-binding form body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostForm {
    /// `SAMLRequest`.
    pub saml_request: Option<String>,
    /// `SAMLResponse`.
    pub saml_response: Option<String>,
    /// `RelayState`.
    pub relay_state: Option<String>,
}

impl PostForm {
    /// Parses an `application/x-www-form-urlencoded` body.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractionErrorKind::DuplicateParameter`] if a SAML field
    /// appears more than once.
    pub fn parse(body: &[u8]) -> Result<Self, ExtractionErrorKind> {
        let mut form = Self::default();
        for (key, value) in url::form_urlencoded::parse(body) {
            let (slot, name) = match key.as_ref() {
                "SAMLRequest" => (&mut form.saml_request, "SAMLRequest"),
                "SAMLResponse" => (&mut form.saml_response, "SAMLResponse"),
                "RelayState" => (&mut form.relay_state, "RelayState"),
                _ => continue,
            };
            if slot.is_some() {
                return Err(ExtractionErrorKind::DuplicateParameter(name));
            }
            *slot = Some(value.into_owned());
        }
        Ok(form)
    }
}

/// HTTP-POST binding encoder/decoder.
pub struct HttpPostBinding;

impl HttpPostBinding {
    /// Base64-encodes a message for a form field.
    #[must_use]
    pub fn encode(xml: &str) -> String {
        base64::engine::general_purpose::STANDARD.encode(xml)
    }

    /// Decodes a form field into XML bytes, never producing more than `limit` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractionErrorKind::Base64`] or [`ExtractionErrorKind::TooLarge`].
    pub fn decode_message(encoded: &str, limit: usize) -> Result<Vec<u8>, ExtractionErrorKind> {
        let compact: String = encoded.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        let decoder = base64::read::DecoderReader::new(
            Cursor::new(compact.into_bytes()),
            &base64::engine::general_purpose::STANDARD,
        );
        BoundedReadStream::new(decoder, limit)
            .read_all()
            .map_err(|e| match LimitExceeded::from_io(&e) {
                Some(limit) => ExtractionErrorKind::TooLarge { limit },
                None => ExtractionErrorKind::Base64(e.to_string()),
            })
    }
}

/// Self-submitting HTML form carrying a SAML message to `action`.
#[derive(Debug, Clone)]
pub struct AutoPostPage {
    action: String,
    fields: Vec<(&'static str, String)>,
    content_security_policy: bool,
}

impl AutoPostPage {
    /// Creates a page posting `xml` as `SAMLRequest` or `SAMLResponse`.
    #[must_use]
    pub fn new(action: impl Into<String>, message_type: SamlMessageType, xml: &str) -> Self {
        Self {
            action: action.into(),
            fields: vec![(message_type.form_param(), HttpPostBinding::encode(xml))],
            content_security_policy: true,
        }
    }

    /// Adds `RelayState` when present.
    #[must_use]
    pub fn with_relay_state(mut self, relay_state: Option<&str>) -> Self {
        if let Some(rs) = relay_state {
            self.fields.push(("RelayState", rs.to_string()));
        }
        self
    }

    /// Toggles the CSP meta tag.
    #[must_use]
    pub fn with_content_security_policy(mut self, enabled: bool) -> Self {
        self.content_security_policy = enabled;
        self
    }

    /// Form target.
    #[must_use]
    pub fn action(&self) -> &str {
        &self.action
    }

    /// Value of a hidden field.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Policy allowing only the inline submit script.
    #[must_use]
    pub fn content_security_policy() -> String {
        let hash = base64::engine::general_purpose::STANDARD
            .encode(idp_crypto::sha256(AUTO_SUBMIT_SCRIPT.as_bytes()));
        format!("default-src 'none'; script-src 'sha256-{hash}'")
    }

    /// Renders the page.
    #[must_use]
    pub fn html(&self) -> String {
        let csp = if self.content_security_policy {
            format!(
                r#"
    <meta http-equiv="Content-Security-Policy" content="{}">"#,
                html_escape(&Self::content_security_policy())
            )
        } else {
            String::new()
        };
        let inputs: String = self
            .fields
            .iter()
            .map(|(name, value)| {
                format!(
                    r#"
        <input type="hidden" name="{name}" value="{}"/>"#,
                    html_escape(value)
                )
            })
            .collect();

        format!(
            r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="UTF-8">{csp}
    <title>SAML POST Binding</title>
</head>
<body>
    <noscript>
        <p>JavaScript is disabled. Click the button below to continue.</p>
    </noscript>
    <form method="post" action="{action}">{inputs}
        <noscript>
            <input type="submit" value="Continue"/>
        </noscript>
    </form>
    <script>{AUTO_SUBMIT_SCRIPT}</script>
</body>
</html>"#,
            action = html_escape(&self.action),
        )
    }
}

impl IntoResponse for AutoPostPage {
    fn into_response(self) -> Response {
        (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, HeaderValue::from_static("text/html; charset=utf-8")),
                (header::CACHE_CONTROL, HeaderValue::from_static("no-cache, no-store")),
                (header::PRAGMA, HeaderValue::from_static("no-cache")),
            ],
            self.html(),
        )
            .into_response()
    }
}

/// Escapes HTML special characters.
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}
