//! Hardened XML loading.
//!
//! Every component that touches untrusted XML goes through
//! [`SecureXmlParser`]. The parser refuses document type declarations
//! outright, so no DTD is processed, no external entity is resolved and no
//! entity expansion happens beyond the five predefined entities and
//! character references. Size is checked before tokenizing; nesting depth is
//! checked while building the tree. Comments and processing instructions
//! are dropped on load.

use std::io::Read;

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use thiserror::Error;

use super::document::{Attribute, Element, NamespaceDecl, NodeId, NodeKind, XmlDocument};

/// Default maximum document size (1 MiB).
pub const DEFAULT_MAX_SIZE: usize = 1024 * 1024;

/// Default maximum element nesting depth.
pub const DEFAULT_MAX_DEPTH: usize = 128;

const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

/// Rejection raised while loading XML.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// Input larger than the configured ceiling.
    #[error("document exceeds the {limit} byte limit")]
    TooLarge {
        /// Configured ceiling in bytes.
        limit: usize,
    },

    /// A `<!DOCTYPE ...>` declaration was present.
    #[error("document type declarations are not allowed")]
    DoctypeForbidden,

    /// Reference to an entity other than the predefined ones.
    #[error("unresolvable entity reference: {0}")]
    Entity(String),

    /// Element or attribute prefix without a declaration in scope.
    #[error("undeclared namespace prefix: {0}")]
    UndeclaredPrefix(String),

    /// Input is not UTF-8.
    #[error("document is not valid UTF-8")]
    Encoding,

    /// Element nesting beyond the configured depth.
    #[error("element nesting exceeds {0} levels")]
    TooDeep(usize),

    /// No root element.
    #[error("document has no root element")]
    NoRoot,

    /// Anything other than whitespace outside the root element.
    #[error("content outside the root element")]
    ContentOutsideRoot,

    /// Any other well-formedness violation.
    #[error("malformed XML: {0}")]
    Malformed(String),
}

/// Hardened XML parser.
#[derive(Debug, Clone, Copy)]
pub struct SecureXmlParser {
    max_size: usize,
    max_depth: usize,
}

impl Default for SecureXmlParser {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MAX_SIZE,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl SecureXmlParser {
    /// Creates a parser with the default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum document size in bytes.
    #[must_use]
    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    /// Sets the maximum element nesting depth.
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Returns the configured size ceiling.
    #[must_use]
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Parses raw bytes, which must be UTF-8.
    ///
    /// # Errors
    ///
    /// Returns a [`ParseError`] for oversized, non-UTF-8 or rejected input.
    pub fn parse_bytes(&self, bytes: &[u8]) -> Result<XmlDocument, ParseError> {
        if bytes.len() > self.max_size {
            return Err(ParseError::TooLarge {
                limit: self.max_size,
            });
        }
        let text = std::str::from_utf8(bytes).map_err(|_| ParseError::Encoding)?;
        self.parse_str(text)
    }

    /// Reads at most the configured ceiling from `reader` and parses it.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::TooLarge`] if the stream holds more than the
    /// ceiling, or any other [`ParseError`] from parsing.
    pub fn parse_reader<R: Read>(&self, reader: R) -> Result<XmlDocument, ParseError> {
        let mut buffer = Vec::new();
        let ceiling = u64::try_from(self.max_size).unwrap_or(u64::MAX).saturating_add(1);
        reader
            .take(ceiling)
            .read_to_end(&mut buffer)
            .map_err(|e| ParseError::Malformed(e.to_string()))?;
        self.parse_bytes(&buffer)
    }

    /// Parses a string.
    ///
    /// # Errors
    ///
    /// Returns a [`ParseError`] for oversized or rejected input.
    pub fn parse_str(&self, text: &str) -> Result<XmlDocument, ParseError> {
        if text.len() > self.max_size {
            return Err(ParseError::TooLarge {
                limit: self.max_size,
            });
        }
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);

        let mut reader = Reader::from_str(text);
        reader.config_mut().check_end_names = true;

        let mut builder = TreeBuilder::new(self.max_depth);
        loop {
            match reader.read_event() {
                Ok(Event::Start(start)) => builder.open(&start, false)?,
                Ok(Event::Empty(start)) => builder.open(&start, true)?,
                Ok(Event::End(_)) => builder.close(),
                Ok(Event::Text(text)) => {
                    let raw = text.into_inner();
                    let raw = std::str::from_utf8(&raw).map_err(|_| ParseError::Encoding)?;
                    builder.text(&unescape(&normalize_newlines(raw))?)?;
                }
                Ok(Event::CData(data)) => {
                    let raw = data.into_inner();
                    let raw = std::str::from_utf8(&raw).map_err(|_| ParseError::Encoding)?;
                    builder.text(&normalize_newlines(raw))?;
                }
                Ok(Event::DocType(_)) => return Err(ParseError::DoctypeForbidden),
                Ok(Event::Decl(_) | Event::PI(_) | Event::Comment(_)) => {}
                Ok(Event::Eof) => break,
                Err(e) => return Err(map_reader_error(&e)),
            }
        }

        builder.finish()
    }
}

struct TreeBuilder {
    document: Option<XmlDocument>,
    open: Vec<NodeId>,
    scopes: Vec<Vec<NamespaceDecl>>,
    max_depth: usize,
    closed_root: bool,
}

impl TreeBuilder {
    fn new(max_depth: usize) -> Self {
        Self {
            document: None,
            open: Vec::new(),
            scopes: Vec::new(),
            max_depth,
            closed_root: false,
        }
    }

    fn open(&mut self, start: &BytesStart<'_>, empty: bool) -> Result<(), ParseError> {
        if self.closed_root {
            return Err(ParseError::ContentOutsideRoot);
        }
        if self.open.len() >= self.max_depth {
            return Err(ParseError::TooDeep(self.max_depth));
        }

        let qname = std::str::from_utf8(start.name().as_ref())
            .map_err(|_| ParseError::Encoding)?
            .to_string();

        let mut decls = Vec::new();
        let mut raw_attrs = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(|e| ParseError::Malformed(e.to_string()))?;
            let key = std::str::from_utf8(attr.key.as_ref())
                .map_err(|_| ParseError::Encoding)?
                .to_string();
            let raw = std::str::from_utf8(&attr.value).map_err(|_| ParseError::Encoding)?;
            let value = unescape(&normalize_attribute(raw))?;

            if key == "xmlns" {
                decls.push(NamespaceDecl { prefix: None, uri: value });
            } else if let Some(prefix) = key.strip_prefix("xmlns:") {
                if value.is_empty() {
                    return Err(ParseError::Malformed(format!(
                        "prefix {prefix} bound to an empty namespace"
                    )));
                }
                decls.push(NamespaceDecl {
                    prefix: Some(prefix.to_string()),
                    uri: value,
                });
            } else {
                raw_attrs.push((key, value));
            }
        }
        self.scopes.push(decls.clone());

        let (prefix, local_name) = split_qname(&qname);
        let namespace = match prefix {
            Some(p) => Some(self.resolve(Some(p))?),
            None => self.resolve(None).ok().filter(|uri| !uri.is_empty()),
        };

        let mut attributes = Vec::with_capacity(raw_attrs.len());
        for (key, value) in raw_attrs {
            let (attr_prefix, attr_local) = split_qname(&key);
            let attr_namespace = match attr_prefix {
                Some(p) => Some(self.resolve(Some(p))?),
                None => None,
            };
            attributes.push(Attribute {
                prefix: attr_prefix.map(String::from),
                local_name: attr_local.to_string(),
                namespace: attr_namespace,
                value,
            });
        }

        let element = Element {
            prefix: prefix.map(String::from),
            local_name: local_name.to_string(),
            namespace,
            attributes,
            namespace_decls: decls,
        };

        let id = match (&mut self.document, self.open.last()) {
            (None, _) => {
                let document = XmlDocument::new(element);
                let root = document.root();
                self.document = Some(document);
                root
            }
            (Some(document), Some(parent)) => document.append_element(*parent, element),
            (Some(_), None) => return Err(ParseError::ContentOutsideRoot),
        };

        if empty {
            self.scopes.pop();
            if self.open.is_empty() {
                self.closed_root = true;
            }
        } else {
            self.open.push(id);
        }
        Ok(())
    }

    fn close(&mut self) {
        self.open.pop();
        self.scopes.pop();
        if self.open.is_empty() {
            self.closed_root = true;
        }
    }

    fn text(&mut self, text: &str) -> Result<(), ParseError> {
        match (&mut self.document, self.open.last()) {
            (Some(document), Some(parent)) => {
                let parent = *parent;
                // Merge adjacent character data (text followed by CDATA).
                if let Some(last) = document.children(parent).last().copied() {
                    if let NodeKind::Text(existing) = document.kind(last) {
                        let merged = format!("{existing}{text}");
                        document.detach(last);
                        document.append_text(parent, merged);
                        return Ok(());
                    }
                }
                document.append_text(parent, text);
                Ok(())
            }
            _ if text.chars().all(|c| matches!(c, ' ' | '\t' | '\n' | '\r')) => Ok(()),
            _ => Err(ParseError::ContentOutsideRoot),
        }
    }

    fn resolve(&self, prefix: Option<&str>) -> Result<String, ParseError> {
        if prefix == Some("xml") {
            return Ok(XML_NS.to_string());
        }
        self.scopes
            .iter()
            .rev()
            .flat_map(|scope| scope.iter().rev())
            .find(|decl| decl.prefix.as_deref() == prefix)
            .map(|decl| decl.uri.clone())
            .ok_or_else(|| ParseError::UndeclaredPrefix(prefix.unwrap_or("").to_string()))
    }

    fn finish(self) -> Result<XmlDocument, ParseError> {
        if !self.open.is_empty() {
            return Err(ParseError::Malformed("unclosed element".to_string()));
        }
        self.document.ok_or(ParseError::NoRoot)
    }
}

fn split_qname(qname: &str) -> (Option<&str>, &str) {
    match qname.split_once(':') {
        Some((prefix, local)) => (Some(prefix), local),
        None => (None, qname),
    }
}

/// Line-end normalization: CRLF and lone CR become LF.
fn normalize_newlines(raw: &str) -> String {
    raw.replace("\r\n", "\n").replace('\r', "\n")
}

/// Attribute-value normalization for literal whitespace.
fn normalize_attribute(raw: &str) -> String {
    normalize_newlines(raw).replace(['\t', '\n'], " ")
}

fn unescape(raw: &str) -> Result<String, ParseError> {
    let value = quick_xml::escape::unescape(raw)
        .map_err(|e| ParseError::Entity(e.to_string()))?
        .into_owned();
    if let Some(c) = value
        .chars()
        .find(|c| c.is_control() && !matches!(c, '\t' | '\n' | '\r'))
    {
        return Err(ParseError::Malformed(format!(
            "forbidden character U+{:04X}",
            u32::from(c)
        )));
    }
    Ok(value)
}

fn map_reader_error(err: &quick_xml::Error) -> ParseError {
    let message = err.to_string();
    if message.contains("DOCTYPE") || message.contains("DocType") {
        ParseError::DoctypeForbidden
    } else {
        ParseError::Malformed(message)
    }
}
