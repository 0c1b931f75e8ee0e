//! XML infrastructure: hardened parsing, an owned document tree, and
//! exclusive canonicalization.
//!
//! - [`SecureXmlParser`] - loads untrusted XML with DTDs and entities refused
//! - [`XmlDocument`] - arena tree used for inspection, signing and encryption
//! - [`c14n`] - Exclusive XML Canonicalization 1.0

pub mod c14n;
mod document;
mod escape;
mod parser;

pub use document::{Attribute, Element, NamespaceDecl, NodeId, NodeKind, XmlDocument};
pub use parser::{ParseError, SecureXmlParser, DEFAULT_MAX_DEPTH, DEFAULT_MAX_SIZE};
