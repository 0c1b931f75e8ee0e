//! Exclusive Canonical XML 1.0, without comments.
//!
//! Algorithm URI: `http://www.w3.org/2001/10/xml-exc-c14n#`
//!
//! Only visibly utilized namespace declarations are rendered: the prefix of
//! the element itself, prefixes of its attributes, and prefixes named in the
//! `InclusiveNamespaces PrefixList`. A declaration is emitted only when the
//! nearest rendered ancestor did not already emit the same binding.

use std::collections::BTreeMap;

use super::document::{NodeId, NodeKind, XmlDocument};
use super::escape::{escape_attribute, escape_text};

/// Canonicalizes the subtree rooted at `apex`.
///
/// `excluded` names a subtree to omit, which is how the enveloped-signature
/// transform drops the `<ds:Signature>` element. `inclusive_prefixes` uses
/// `#default` for the default namespace.
#[must_use]
pub fn canonicalize(
    doc: &XmlDocument,
    apex: NodeId,
    excluded: Option<NodeId>,
    inclusive_prefixes: &[String],
) -> String {
    let ctx = Context {
        doc,
        excluded,
        inclusive: inclusive_prefixes
            .iter()
            .map(|p| if p == "#default" { String::new() } else { p.clone() })
            .collect(),
    };
    let mut output = String::new();
    ctx.process(apex, &BTreeMap::new(), &mut output);
    output
}

struct Context<'a> {
    doc: &'a XmlDocument,
    excluded: Option<NodeId>,
    inclusive: Vec<String>,
}

impl Context<'_> {
    fn process(&self, id: NodeId, rendered: &BTreeMap<String, String>, out: &mut String) {
        if Some(id) == self.excluded {
            return;
        }
        let element = match self.doc.kind(id) {
            NodeKind::Text(text) => {
                out.push_str(&escape_text(text));
                return;
            }
            NodeKind::Element(element) => element,
        };

        // Bindings this element needs, keyed by prefix ("" for default).
        let mut needed: BTreeMap<String, String> = BTreeMap::new();
        needed.insert(
            element.prefix.clone().unwrap_or_default(),
            element.namespace.clone().unwrap_or_default(),
        );
        for attr in &element.attributes {
            if let (Some(prefix), Some(ns)) = (&attr.prefix, &attr.namespace) {
                needed.insert(prefix.clone(), ns.clone());
            }
        }
        if !self.inclusive.is_empty() {
            let scope = self.doc.in_scope_namespaces(id);
            for prefix in &self.inclusive {
                let key = if prefix.is_empty() {
                    None
                } else {
                    Some(prefix.clone())
                };
                if let Some(uri) = scope.get(&key) {
                    needed.entry(prefix.clone()).or_insert_with(|| uri.clone());
                }
            }
        }
        needed.remove("xml");

        let mut next = rendered.clone();
        out.push('<');
        out.push_str(&element.qualified_name());

        for (prefix, uri) in &needed {
            let current = rendered.get(prefix).map(String::as_str);
            let emit = if prefix.is_empty() {
                current.unwrap_or("") != uri
            } else {
                current != Some(uri.as_str())
            };
            if !emit {
                continue;
            }
            if prefix.is_empty() {
                out.push_str(" xmlns=\"");
            } else {
                out.push_str(" xmlns:");
                out.push_str(prefix);
                out.push_str("=\"");
            }
            out.push_str(&escape_attribute(uri));
            out.push('"');
            next.insert(prefix.clone(), uri.clone());
        }

        let mut attributes: Vec<_> = element.attributes.iter().collect();
        attributes.sort_by(|a, b| {
            let a_key = (a.namespace.as_deref().unwrap_or(""), a.local_name.as_str());
            let b_key = (b.namespace.as_deref().unwrap_or(""), b.local_name.as_str());
            a_key.cmp(&b_key)
        });
        for attr in attributes {
            out.push(' ');
            out.push_str(&attr.qualified_name());
            out.push_str("=\"");
            out.push_str(&escape_attribute(&attr.value));
            out.push('"');
        }
        out.push('>');

        for child in self.doc.children(id) {
            self.process(*child, &next, out);
        }

        out.push_str("</");
        out.push_str(&element.qualified_name());
        out.push('>');
    }
}
