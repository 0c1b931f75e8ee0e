//! Arena-backed XML document model.
//!
//! Nodes live in a flat arena addressed by [`NodeId`]. Detached nodes stay in
//! the arena until the document is dropped, which keeps ids stable across
//! insertions and replacements.

use std::collections::BTreeMap;

use super::escape::{escape_attribute, escape_text};

/// Handle to a node inside an [`XmlDocument`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// A namespace declaration (`xmlns` or `xmlns:prefix`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceDecl {
    /// Declared prefix; `None` for the default namespace.
    pub prefix: Option<String>,
    /// Namespace URI; empty undeclares the default namespace.
    pub uri: String,
}

/// A non-namespace attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Prefix as written in the source.
    pub prefix: Option<String>,
    /// Local name.
    pub local_name: String,
    /// Resolved namespace URI; unprefixed attributes have none.
    pub namespace: Option<String>,
    /// Normalized, unescaped value.
    pub value: String,
}

impl Attribute {
    /// Returns the qualified name as written.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        qualify(self.prefix.as_deref(), &self.local_name)
    }
}

/// An element node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Prefix as written in the source.
    pub prefix: Option<String>,
    /// Local name.
    pub local_name: String,
    /// Resolved namespace URI.
    pub namespace: Option<String>,
    /// Attributes in document order.
    pub attributes: Vec<Attribute>,
    /// Namespace declarations made on this element.
    pub namespace_decls: Vec<NamespaceDecl>,
}

impl Element {
    /// Creates an element in `namespace` written with `prefix`.
    #[must_use]
    pub fn new(prefix: Option<&str>, local_name: &str, namespace: Option<&str>) -> Self {
        Self {
            prefix: prefix.map(String::from),
            local_name: local_name.to_string(),
            namespace: namespace.map(String::from),
            attributes: Vec::new(),
            namespace_decls: Vec::new(),
        }
    }

    /// Creates a prefixed element and declares the prefix on it.
    #[must_use]
    pub fn declared(prefix: &str, local_name: &str, namespace: &str) -> Self {
        Self::new(Some(prefix), local_name, Some(namespace)).with_namespace(Some(prefix), namespace)
    }

    /// Adds an unprefixed attribute.
    #[must_use]
    pub fn with_attribute(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set_attribute(name, value);
        self
    }

    /// Adds an unprefixed attribute when `value` is present.
    #[must_use]
    pub fn with_optional_attribute(self, name: &str, value: Option<impl Into<String>>) -> Self {
        match value {
            Some(v) => self.with_attribute(name, v),
            None => self,
        }
    }

    /// Adds a namespace-qualified attribute such as `xsi:type`.
    #[must_use]
    pub fn with_qualified_attribute(
        mut self,
        prefix: &str,
        local_name: &str,
        namespace: &str,
        value: impl Into<String>,
    ) -> Self {
        self.attributes.push(Attribute {
            prefix: Some(prefix.to_string()),
            local_name: local_name.to_string(),
            namespace: Some(namespace.to_string()),
            value: value.into(),
        });
        self
    }

    /// Declares a namespace on this element.
    #[must_use]
    pub fn with_namespace(mut self, prefix: Option<&str>, uri: &str) -> Self {
        self.namespace_decls.push(NamespaceDecl {
            prefix: prefix.map(String::from),
            uri: uri.to_string(),
        });
        self
    }

    /// Returns true if the element has the given namespace and local name.
    #[must_use]
    pub fn is(&self, namespace: &str, local_name: &str) -> bool {
        self.local_name == local_name && self.namespace.as_deref() == Some(namespace)
    }

    /// Returns the value of an unprefixed attribute.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.namespace.is_none() && a.local_name == name)
            .map(|a| a.value.as_str())
    }

    /// Sets (or replaces) an unprefixed attribute.
    pub fn set_attribute(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        if let Some(existing) = self
            .attributes
            .iter_mut()
            .find(|a| a.namespace.is_none() && a.local_name == name)
        {
            existing.value = value;
        } else {
            self.attributes.push(Attribute {
                prefix: None,
                local_name: name.to_string(),
                namespace: None,
                value,
            });
        }
    }

    /// Returns the qualified name as written.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        qualify(self.prefix.as_deref(), &self.local_name)
    }
}

/// Node payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// Element node.
    Element(Element),
    /// Character data (CDATA sections are merged into text).
    Text(String),
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// An XML document: a single root element and its descendants.
///
/// Comments, processing instructions and the XML declaration are not
/// represented.
#[derive(Debug, Clone)]
pub struct XmlDocument {
    nodes: Vec<Node>,
    root: NodeId,
}

impl XmlDocument {
    /// Creates a document with the given root element.
    #[must_use]
    pub fn new(root: Element) -> Self {
        Self {
            nodes: vec![Node {
                kind: NodeKind::Element(root),
                parent: None,
                children: Vec::new(),
            }],
            root: NodeId(0),
        }
    }

    /// Returns the root element id.
    #[must_use]
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Returns the root element.
    #[must_use]
    pub fn root_element(&self) -> &Element {
        match &self.nodes[self.root.0].kind {
            NodeKind::Element(element) => element,
            NodeKind::Text(_) => unreachable!("document root is always an element"),
        }
    }

    /// Returns the payload of a node.
    #[must_use]
    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.0].kind
    }

    /// Returns the element at `id`, if it is one.
    #[must_use]
    pub fn element(&self, id: NodeId) -> Option<&Element> {
        match &self.nodes[id.0].kind {
            NodeKind::Element(element) => Some(element),
            NodeKind::Text(_) => None,
        }
    }

    /// Returns the element at `id` mutably, if it is one.
    pub fn element_mut(&mut self, id: NodeId) -> Option<&mut Element> {
        match &mut self.nodes[id.0].kind {
            NodeKind::Element(element) => Some(element),
            NodeKind::Text(_) => None,
        }
    }

    /// Returns the parent of a node.
    #[must_use]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    /// Returns all children of a node.
    #[must_use]
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    /// Returns the element children of a node.
    pub fn child_elements(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes[id.0]
            .children
            .iter()
            .copied()
            .filter(|c| matches!(self.nodes[c.0].kind, NodeKind::Element(_)))
    }

    /// Finds the first child element with the given name.
    #[must_use]
    pub fn find_child(&self, parent: NodeId, namespace: &str, local_name: &str) -> Option<NodeId> {
        self.child_elements(parent)
            .find(|c| self.element(*c).is_some_and(|e| e.is(namespace, local_name)))
    }

    /// Returns all child elements with the given name.
    #[must_use]
    pub fn find_children(&self, parent: NodeId, namespace: &str, local_name: &str) -> Vec<NodeId> {
        self.child_elements(parent)
            .filter(|c| self.element(*c).is_some_and(|e| e.is(namespace, local_name)))
            .collect()
    }

    /// Returns `id` and all its descendant elements in document order.
    #[must_use]
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if self.element(current).is_none() {
                continue;
            }
            out.push(current);
            for child in self.nodes[current.0].children.iter().rev() {
                stack.push(*child);
            }
        }
        out
    }

    /// Finds the first descendant element (excluding `id`) with the given name.
    #[must_use]
    pub fn find_descendant(&self, id: NodeId, namespace: &str, local_name: &str) -> Option<NodeId> {
        self.descendants(id)
            .into_iter()
            .skip(1)
            .find(|d| self.element(*d).is_some_and(|e| e.is(namespace, local_name)))
    }

    /// Returns the concatenated text of all descendant text nodes.
    #[must_use]
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        match &self.nodes[id.0].kind {
            NodeKind::Text(text) => out.push_str(text),
            NodeKind::Element(_) => {
                for child in &self.nodes[id.0].children {
                    self.collect_text(*child, out);
                }
            }
        }
    }

    /// Returns the value of an unprefixed attribute on an element.
    #[must_use]
    pub fn attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        self.element(id).and_then(|e| e.attribute(name))
    }

    fn push(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            kind,
            parent: None,
            children: Vec::new(),
        });
        id
    }

    /// Creates a detached element.
    pub fn create_element(&mut self, element: Element) -> NodeId {
        self.push(NodeKind::Element(element))
    }

    /// Creates a detached text node.
    pub fn create_text(&mut self, text: impl Into<String>) -> NodeId {
        self.push(NodeKind::Text(text.into()))
    }

    /// Inserts a detached node as the `index`-th child of `parent`.
    pub fn insert_child(&mut self, parent: NodeId, index: usize, child: NodeId) {
        self.detach(child);
        let children = &mut self.nodes[parent.0].children;
        let index = index.min(children.len());
        children.insert(index, child);
        self.nodes[child.0].parent = Some(parent);
    }

    /// Appends a node as the last child of `parent`.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        let len = self.nodes[parent.0].children.len();
        self.insert_child(parent, len, child);
    }

    /// Inserts `node` immediately after `sibling`.
    pub fn insert_after(&mut self, sibling: NodeId, node: NodeId) {
        if let Some(parent) = self.nodes[sibling.0].parent {
            let position = self.nodes[parent.0]
                .children
                .iter()
                .position(|c| *c == sibling)
                .map_or(0, |p| p + 1);
            self.insert_child(parent, position, node);
        }
    }

    /// Appends a new element under `parent` and returns its id.
    pub fn append_element(&mut self, parent: NodeId, element: Element) -> NodeId {
        let id = self.create_element(element);
        self.append_child(parent, id);
        id
    }

    /// Appends a new element holding only `text` under `parent`.
    pub fn append_text_element(
        &mut self,
        parent: NodeId,
        element: Element,
        text: impl Into<String>,
    ) -> NodeId {
        let id = self.append_element(parent, element);
        let text = self.create_text(text);
        self.append_child(id, text);
        id
    }

    /// Appends a text node under `parent`.
    pub fn append_text(&mut self, parent: NodeId, text: impl Into<String>) -> NodeId {
        let id = self.create_text(text);
        self.append_child(parent, id);
        id
    }

    /// Replaces the text content of an element with `text`.
    pub fn set_text(&mut self, id: NodeId, text: impl Into<String>) {
        let children = std::mem::take(&mut self.nodes[id.0].children);
        for child in children {
            self.nodes[child.0].parent = None;
        }
        self.append_text(id, text);
    }

    /// Removes a node from its parent. The node stays in the arena.
    pub fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id.0].parent.take() {
            self.nodes[parent.0].children.retain(|c| *c != id);
        }
    }

    /// Replaces `old` with the detached node `new` at the same position.
    ///
    /// Replacing the root promotes `new` (which must be an element) to root.
    pub fn replace(&mut self, old: NodeId, new: NodeId) {
        match self.nodes[old.0].parent {
            Some(parent) => {
                let position = self.nodes[parent.0]
                    .children
                    .iter()
                    .position(|c| *c == old)
                    .unwrap_or(0);
                self.detach(old);
                self.insert_child(parent, position, new);
            }
            None if old == self.root && self.element(new).is_some() => {
                self.detach(new);
                self.root = new;
            }
            None => {}
        }
    }

    /// Deep-copies `node` from `other` into this arena, detached.
    pub fn import(&mut self, other: &XmlDocument, node: NodeId) -> NodeId {
        let id = self.push(other.nodes[node.0].kind.clone());
        for child in other.children(node).to_vec() {
            let copied = self.import(other, child);
            self.append_child(id, copied);
        }
        id
    }

    /// Returns namespace bindings in scope at `id`, from its own and its
    /// ancestors' declarations.
    #[must_use]
    pub fn in_scope_namespaces(&self, id: NodeId) -> BTreeMap<Option<String>, String> {
        let mut chain = Vec::new();
        let mut current = Some(id);
        while let Some(node) = current {
            chain.push(node);
            current = self.nodes[node.0].parent;
        }

        let mut scope = BTreeMap::new();
        for node in chain.into_iter().rev() {
            if let Some(element) = self.element(node) {
                for decl in &element.namespace_decls {
                    scope.insert(decl.prefix.clone(), decl.uri.clone());
                }
            }
        }
        scope
    }

    /// Serializes the whole document (without an XML declaration).
    #[must_use]
    pub fn serialize(&self) -> String {
        self.serialize_node(self.root)
    }

    /// Serializes a subtree so it is namespace-complete on its own.
    ///
    /// Declarations inherited from ancestors are re-declared on the subtree's
    /// top element, so QName-valued content such as `xsi:type` keeps resolving.
    #[must_use]
    pub fn serialize_node(&self, id: NodeId) -> String {
        let inherited: Vec<NamespaceDecl> = match self.nodes[id.0].parent {
            Some(parent) => self
                .in_scope_namespaces(parent)
                .into_iter()
                .map(|(prefix, uri)| NamespaceDecl { prefix, uri })
                .collect(),
            None => Vec::new(),
        };
        let mut out = String::new();
        self.write_node(id, &BTreeMap::new(), &inherited, &mut out);
        out
    }

    fn write_node(
        &self,
        id: NodeId,
        written: &BTreeMap<Option<String>, String>,
        inherited: &[NamespaceDecl],
        out: &mut String,
    ) {
        let element = match &self.nodes[id.0].kind {
            NodeKind::Text(text) => {
                out.push_str(&escape_text(text));
                return;
            }
            NodeKind::Element(element) => element,
        };

        let mut scope = written.clone();
        let mut decls: Vec<NamespaceDecl> = Vec::new();
        let mut declare = |prefix: Option<String>, uri: String| {
            if scope.get(&prefix).map_or(uri.is_empty(), |bound| *bound == uri) {
                return;
            }
            scope.insert(prefix.clone(), uri.clone());
            decls.retain(|d| d.prefix != prefix);
            decls.push(NamespaceDecl { prefix, uri });
        };

        for decl in inherited.iter().chain(&element.namespace_decls) {
            declare(decl.prefix.clone(), decl.uri.clone());
        }

        // Bindings the element relies on but nothing above declared.
        if element.prefix.as_deref() != Some("xml") {
            declare(
                element.prefix.clone(),
                element.namespace.clone().unwrap_or_default(),
            );
        }
        for attr in &element.attributes {
            if let (Some(prefix), Some(ns)) = (&attr.prefix, &attr.namespace) {
                if prefix != "xml" {
                    declare(Some(prefix.clone()), ns.clone());
                }
            }
        }

        out.push('<');
        out.push_str(&element.qualified_name());
        for decl in &decls {
            match &decl.prefix {
                Some(prefix) => {
                    out.push_str(" xmlns:");
                    out.push_str(prefix);
                }
                None => out.push_str(" xmlns"),
            }
            out.push_str("=\"");
            out.push_str(&escape_attribute(&decl.uri));
            out.push('"');
        }
        for attr in &element.attributes {
            out.push(' ');
            out.push_str(&attr.qualified_name());
            out.push_str("=\"");
            out.push_str(&escape_attribute(&attr.value));
            out.push('"');
        }

        let children = &self.nodes[id.0].children;
        if children.is_empty() {
            out.push_str("/>");
            return;
        }
        out.push('>');
        for child in children {
            self.write_node(*child, &scope, &[], out);
        }
        out.push_str("</");
        out.push_str(&element.qualified_name());
        out.push('>');
    }
}

pub(crate) fn qualify(prefix: Option<&str>, local_name: &str) -> String {
    match prefix {
        Some(prefix) => format!("{prefix}:{local_name}"),
        None => local_name.to_string(),
    }
}
