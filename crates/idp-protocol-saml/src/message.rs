//! Parsed inbound protocol messages.
//!
//! Every request kind the IdP accepts implements [`SamlMessage`], which
//! exposes the fields the shared pipeline needs and a `parse` hook that
//! builds the typed message from a hardened DOM.

use chrono::{DateTime, NaiveDateTime, SubsecRound, Utc};

use crate::error::MessageFormatError;
use crate::types::SAML_NS;
use crate::xml::{NodeId, XmlDocument};

/// Instant layout used on the wire: `YYYY-MM-DDThh:mm:ss[.fraction]Z`.
const INSTANT_PARSE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.fZ";

/// Instant layout used when writing messages.
const INSTANT_WRITE_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// A typed inbound SAML protocol message.
pub trait SamlMessage: Clone + Send + Sync + Sized + 'static {
    /// Local name of the root element, e.g. `AuthnRequest`.
    const MESSAGE_NAME: &'static str;

    /// Message `ID`.
    fn id(&self) -> &str;

    /// Entity ID from the `Issuer` element.
    fn issuer(&self) -> &str;

    /// Protocol `Version`.
    fn version(&self) -> &str;

    /// `IssueInstant`.
    fn issue_instant(&self) -> DateTime<Utc>;

    /// `Destination`, when the sender set one.
    fn destination(&self) -> Option<&str>;

    /// Builds the message from a parsed document.
    ///
    /// # Errors
    ///
    /// Returns [`MessageFormatError`] when the root element is not this
    /// message kind or a required attribute or element is missing or
    /// malformed.
    fn parse(document: &XmlDocument) -> Result<Self, MessageFormatError>;
}

/// Formats an instant the way outbound messages carry it.
#[must_use]
pub fn format_instant(instant: DateTime<Utc>) -> String {
    instant.format(INSTANT_WRITE_FORMAT).to_string()
}

/// Parses a wire instant. Only the UTC `Z` form is accepted.
///
/// # Errors
///
/// Returns [`MessageFormatError`] if `value` does not match the layout.
pub fn parse_instant(value: &str) -> Result<DateTime<Utc>, MessageFormatError> {
    NaiveDateTime::parse_from_str(value, INSTANT_PARSE_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|_| MessageFormatError::new(format!("invalid date/time value '{value}'")))
}

/// Current time truncated to whole seconds, matching what goes on the wire.
#[must_use]
pub fn now_truncated() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(0)
}

/// Checks the root element's namespace and local name.
pub(crate) fn expect_root(
    document: &XmlDocument,
    namespace: &str,
    local_name: &str,
) -> Result<NodeId, MessageFormatError> {
    let root = document.root_element();
    if root.is(namespace, local_name) {
        Ok(document.root())
    } else {
        Err(MessageFormatError::new(format!(
            "expected {local_name} root element, found {}",
            root.qualified_name()
        )))
    }
}

/// Returns an attribute that must be present and non-blank.
pub(crate) fn required_attribute(
    document: &XmlDocument,
    node: NodeId,
    name: &str,
) -> Result<String, MessageFormatError> {
    match document.attribute(node, name) {
        Some(value) if !value.trim().is_empty() => Ok(value.to_string()),
        _ => Err(MessageFormatError::new(format!(
            "missing required attribute {name}"
        ))),
    }
}

/// Returns an attribute if present and non-blank.
pub(crate) fn optional_attribute(document: &XmlDocument, node: NodeId, name: &str) -> Option<String> {
    document
        .attribute(node, name)
        .filter(|value| !value.trim().is_empty())
        .map(String::from)
}

pub(crate) fn required_instant(
    document: &XmlDocument,
    node: NodeId,
    name: &str,
) -> Result<DateTime<Utc>, MessageFormatError> {
    parse_instant(&required_attribute(document, node, name)?)
}

pub(crate) fn optional_instant(
    document: &XmlDocument,
    node: NodeId,
    name: &str,
) -> Result<Option<DateTime<Utc>>, MessageFormatError> {
    optional_attribute(document, node, name)
        .map(|value| parse_instant(&value))
        .transpose()
}

/// Parses an `xs:boolean` attribute, falling back to `default` when absent.
pub(crate) fn bool_attribute(
    document: &XmlDocument,
    node: NodeId,
    name: &str,
    default: bool,
) -> Result<bool, MessageFormatError> {
    match optional_attribute(document, node, name).as_deref() {
        None => Ok(default),
        Some("true" | "1") => Ok(true),
        Some("false" | "0") => Ok(false),
        Some(other) => Err(MessageFormatError::new(format!(
            "invalid boolean value '{other}' for {name}"
        ))),
    }
}

pub(crate) fn optional_u32(
    document: &XmlDocument,
    node: NodeId,
    name: &str,
) -> Result<Option<u32>, MessageFormatError> {
    optional_attribute(document, node, name)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| MessageFormatError::new(format!("invalid integer value for {name}")))
        })
        .transpose()
}

/// Returns the trimmed text of the root's `saml:Issuer` child.
pub(crate) fn required_issuer(document: &XmlDocument) -> Result<String, MessageFormatError> {
    let issuer = document
        .find_child(document.root(), SAML_NS, "Issuer")
        .map(|node| document.text_content(node).trim().to_string())
        .unwrap_or_default();
    if issuer.is_empty() {
        return Err(MessageFormatError::new("missing Issuer"));
    }
    Ok(issuer)
}
