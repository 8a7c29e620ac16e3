//! XML Document - arena-based DOM representation
//!
//! The document owns every node rooted in it. Nodes are addressed by
//! `NodeId` indices; tree links are mutated in place. Detached subtrees
//! stay alive in the arena until the document drops, so back-references
//! (parent, owner element) never extend lifetimes.

use std::cmp::Ordering;

use crate::error::{Error, Result};

use super::names::{self, NameTable};
use super::namespace::{XMLNS_NS_URI, XML_NS_URI};
use super::node::{Node, NodeId, NodeKind, Payload, QualifiedName, DOCUMENT_NODE};

/// An XML document stored in arena format.
#[derive(Debug)]
pub struct Document {
    nodes: Vec<Node>,
    pub names: NameTable,
    /// Monotone mutation counter; bumped by every public mutation.
    version: u64,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Create an empty document containing only the document node.
    pub fn new() -> Self {
        let mut doc = Document {
            nodes: Vec::with_capacity(64),
            names: NameTable::new(),
            version: 0,
        };
        doc.nodes.push(Node::new(Payload::Document));
        doc
    }

    /// Parse a UTF-8 XML document.
    pub fn parse_str(input: &str) -> Result<Document> {
        super::build::build_document(input)
    }

    /// Parse an XML document from bytes, honoring a UTF-16 BOM.
    pub fn parse_bytes(input: &[u8]) -> Result<Document> {
        let utf8 = super::encoding::convert_to_utf8(input.to_vec())?;
        let text = String::from_utf8(utf8).map_err(|e| {
            Error::parse(
                crate::error::Position::new(1, 1, e.utf8_error().valid_up_to()),
                "input is not valid UTF-8",
            )
        })?;
        Self::parse_str(&text)
    }

    // ------------------------------------------------------------------
    // Node access
    // ------------------------------------------------------------------

    /// Get a node by id.
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id as usize)
    }

    /// Number of nodes allocated in the arena (including detached ones).
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Mutation version; live views and XPath iterators use it to detect
    /// changes.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn kind(&self, id: NodeId) -> Option<NodeKind> {
        self.node(id).map(Node::kind)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).and_then(|n| n.parent)
    }

    pub fn first_child(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).and_then(|n| n.first_child)
    }

    pub fn last_child(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).and_then(|n| n.last_child)
    }

    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).and_then(|n| n.next_sibling)
    }

    pub fn previous_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).and_then(|n| n.prev_sibling)
    }

    /// Owning element of an attribute node.
    pub fn owner_element(&self, id: NodeId) -> Option<NodeId> {
        match self.node(id)?.payload {
            Payload::Attribute { owner, .. } => owner,
            _ => None,
        }
    }

    /// The unique element child of the document node.
    pub fn document_element(&self) -> Option<NodeId> {
        self.children(DOCUMENT_NODE)
            .find(|&c| self.nodes[c as usize].is_element())
    }

    /// The DocumentType child, if any.
    pub fn doctype(&self) -> Option<NodeId> {
        self.children(DOCUMENT_NODE)
            .find(|&c| self.nodes[c as usize].kind() == NodeKind::DocumentType)
    }

    /// Iterate over the children of a node.
    pub fn children(&self, id: NodeId) -> ChildIter<'_> {
        ChildIter {
            doc: self,
            next: self.first_child(id),
        }
    }

    /// Iterate over all descendants of a node in document order (the node
    /// itself is not yielded; attributes are not children).
    pub fn descendants(&self, id: NodeId) -> DescendantIter<'_> {
        let mut stack = Vec::new();
        let mut child = self.last_child(id);
        while let Some(c) = child {
            stack.push(c);
            child = self.previous_sibling(c);
        }
        DescendantIter { doc: self, stack }
    }

    /// DOM nodeName: "#document", tag name, "#text", and so on.
    pub fn node_name(&self, id: NodeId) -> String {
        let Some(node) = self.node(id) else {
            return String::new();
        };
        match &node.payload {
            Payload::Document => "#document".to_string(),
            Payload::DocumentFragment => "#document-fragment".to_string(),
            Payload::DocumentType { name, .. } => self.names.get(*name).to_string(),
            Payload::Element { name, .. } | Payload::Attribute { name, .. } => {
                self.qualified_name_str(name)
            }
            Payload::Text(_) => "#text".to_string(),
            Payload::CData(_) => "#cdata-section".to_string(),
            Payload::Comment(_) => "#comment".to_string(),
            Payload::ProcessingInstruction { target, .. } => self.names.get(*target).to_string(),
        }
    }

    /// DOM nodeValue: character data or attribute value.
    pub fn node_value(&self, id: NodeId) -> Option<&str> {
        match &self.node(id)?.payload {
            Payload::Attribute { value, .. } => Some(value.as_str()),
            Payload::Text(data) | Payload::CData(data) | Payload::Comment(data) => {
                Some(data.as_str())
            }
            Payload::ProcessingInstruction { data, .. } => Some(data.as_str()),
            _ => None,
        }
    }

    /// Local name of an element or attribute.
    pub fn local_name(&self, id: NodeId) -> Option<&str> {
        let q = self.node(id)?.qualified_name()?;
        Some(self.names.local_of(q.name))
    }

    /// Display prefix of an element or attribute.
    pub fn prefix(&self, id: NodeId) -> Option<&str> {
        let q = self.node(id)?.qualified_name()?;
        q.prefix.map(|p| self.names.get(p))
    }

    /// Namespace URI of an element or attribute.
    pub fn namespace_uri(&self, id: NodeId) -> Option<&str> {
        let q = self.node(id)?.qualified_name()?;
        self.names.uri_of(q.name)
    }

    pub(crate) fn qualified_name_str(&self, q: &QualifiedName) -> String {
        let local = self.names.local_of(q.name);
        match q.prefix {
            Some(p) => format!("{}:{}", self.names.get(p), local),
            None => local.to_string(),
        }
    }

    /// XPath string-value of a node: concatenated descendant character data
    /// for containers, the data or value itself for leaves.
    pub fn string_value(&self, id: NodeId) -> String {
        let Some(node) = self.node(id) else {
            return String::new();
        };
        match &node.payload {
            Payload::Attribute { value, .. } => value.clone(),
            Payload::Text(data) | Payload::CData(data) | Payload::Comment(data) => data.clone(),
            Payload::ProcessingInstruction { data, .. } => data.clone(),
            Payload::DocumentType { .. } => String::new(),
            Payload::Document | Payload::DocumentFragment | Payload::Element { .. } => {
                let mut out = String::new();
                for d in self.descendants(id) {
                    match &self.nodes[d as usize].payload {
                        Payload::Text(data) | Payload::CData(data) => out.push_str(data),
                        _ => {}
                    }
                }
                out
            }
        }
    }

    /// DOM textContent getter; identical to the string-value for every kind
    /// this data model has.
    pub fn text_content(&self, id: NodeId) -> String {
        self.string_value(id)
    }

    // ------------------------------------------------------------------
    // Factories
    // ------------------------------------------------------------------

    fn alloc(&mut self, payload: Payload) -> NodeId {
        let id = self.nodes.len() as NodeId;
        self.nodes.push(Node::new(payload));
        id
    }

    pub(crate) fn alloc_at(
        &mut self,
        payload: Payload,
        pos: Option<crate::error::Position>,
    ) -> NodeId {
        let id = self.alloc(payload);
        self.nodes[id as usize].pos = pos;
        id
    }

    /// Create an element with a literal tag name and no namespace.
    pub fn create_element(&mut self, tag_name: &str) -> Result<NodeId> {
        names::validate_name(tag_name)?;
        let local = self.names.intern(tag_name);
        let name = self.names.intern_name(None, local);
        Ok(self.alloc(Payload::Element {
            name: QualifiedName { name, prefix: None },
            attrs: Vec::new(),
        }))
    }

    /// Create an element with a namespace URI and a qualified name.
    pub fn create_element_ns(&mut self, uri: Option<&str>, qname: &str) -> Result<NodeId> {
        let (prefix, local) = names::split_qname(qname)?;
        check_ns_consistency(prefix, local, uri, false)?;
        let uri_sym = match uri {
            Some(u) if !u.is_empty() => Some(self.names.intern(u)),
            _ => None,
        };
        let prefix_sym = prefix.map(|p| self.names.intern(p));
        let local_sym = self.names.intern(local);
        let name = self.names.intern_name(uri_sym, local_sym);
        Ok(self.alloc(Payload::Element {
            name: QualifiedName {
                name,
                prefix: prefix_sym,
            },
            attrs: Vec::new(),
        }))
    }

    pub fn create_text(&mut self, data: &str) -> NodeId {
        self.alloc(Payload::Text(data.to_string()))
    }

    pub fn create_cdata(&mut self, data: &str) -> NodeId {
        self.alloc(Payload::CData(data.to_string()))
    }

    pub fn create_comment(&mut self, data: &str) -> NodeId {
        self.alloc(Payload::Comment(data.to_string()))
    }

    pub fn create_processing_instruction(&mut self, target: &str, data: &str) -> Result<NodeId> {
        names::validate_name(target)?;
        let target = self.names.intern(target);
        Ok(self.alloc(Payload::ProcessingInstruction {
            target,
            data: data.to_string(),
        }))
    }

    pub fn create_attribute(&mut self, qname: &str) -> Result<NodeId> {
        names::validate_name(qname)?;
        let local = self.names.intern(qname);
        let name = self.names.intern_name(None, local);
        Ok(self.alloc(Payload::Attribute {
            name: QualifiedName { name, prefix: None },
            value: String::new(),
            specified: true,
            owner: None,
        }))
    }

    pub fn create_attribute_ns(&mut self, uri: Option<&str>, qname: &str) -> Result<NodeId> {
        let (prefix, local) = names::split_qname(qname)?;
        check_ns_consistency(prefix, local, uri, true)?;
        let uri_sym = match uri {
            Some(u) if !u.is_empty() => Some(self.names.intern(u)),
            _ => None,
        };
        let prefix_sym = prefix.map(|p| self.names.intern(p));
        let local_sym = self.names.intern(local);
        let name = self.names.intern_name(uri_sym, local_sym);
        Ok(self.alloc(Payload::Attribute {
            name: QualifiedName {
                name,
                prefix: prefix_sym,
            },
            value: String::new(),
            specified: true,
            owner: None,
        }))
    }

    pub fn create_document_fragment(&mut self) -> NodeId {
        self.alloc(Payload::DocumentFragment)
    }

    pub(crate) fn create_document_type(
        &mut self,
        name: &str,
        public_id: Option<String>,
        system_id: Option<String>,
        internal_subset: Option<String>,
    ) -> Result<NodeId> {
        names::validate_name(name)?;
        let name = self.names.intern(name);
        Ok(self.alloc(Payload::DocumentType {
            name,
            public_id,
            system_id,
            internal_subset,
        }))
    }

    // ------------------------------------------------------------------
    // Mutation primitives
    // ------------------------------------------------------------------

    fn check(&self, id: NodeId) -> Result<()> {
        if (id as usize) < self.nodes.len() {
            Ok(())
        } else {
            // An id this arena never allocated belongs to another document.
            Err(Error::WrongDocument(format!(
                "node {} is not owned by this document",
                id
            )))
        }
    }

    fn bump(&mut self) {
        self.version += 1;
    }

    /// Is `a` on the ancestor-or-self chain of `b`?
    pub fn is_ancestor_or_self(&self, a: NodeId, b: NodeId) -> bool {
        let mut cur = Some(b);
        while let Some(c) = cur {
            if c == a {
                return true;
            }
            cur = self.nodes[c as usize].parent;
        }
        false
    }

    /// Insert `new_child` into `parent` before `ref_child` (append when
    /// `ref_child` is `None`). Returns the inserted node.
    pub fn insert_before(
        &mut self,
        parent: NodeId,
        new_child: NodeId,
        ref_child: Option<NodeId>,
    ) -> Result<NodeId> {
        self.check(parent)?;
        self.check(new_child)?;
        if let Some(r) = ref_child {
            self.check(r)?;
        }
        if ref_child == Some(new_child) {
            // Inserting a node before itself leaves the tree unchanged.
            return if self.nodes[new_child as usize].parent == Some(parent) {
                Ok(new_child)
            } else {
                Err(Error::NotFound("reference node is not a child".into()))
            };
        }
        if let Some(r) = ref_child {
            if self.nodes[r as usize].parent != Some(parent) {
                return Err(Error::NotFound("reference node is not a child".into()));
            }
        }
        self.validate_insert(parent, new_child, ref_child, None)?;

        if self.nodes[new_child as usize].kind() == NodeKind::DocumentFragment {
            let kids: Vec<NodeId> = self.children(new_child).collect();
            for kid in kids {
                self.detach(kid);
                self.link_before(parent, kid, ref_child);
            }
        } else {
            self.detach(new_child);
            self.link_before(parent, new_child, ref_child);
        }
        self.bump();
        Ok(new_child)
    }

    /// Append `new_child` as the last child of `parent`.
    pub fn append_child(&mut self, parent: NodeId, new_child: NodeId) -> Result<NodeId> {
        self.insert_before(parent, new_child, None)
    }

    /// Replace `old_child` with `new_child`; returns the removed node.
    pub fn replace_child(
        &mut self,
        parent: NodeId,
        new_child: NodeId,
        old_child: NodeId,
    ) -> Result<NodeId> {
        self.check(parent)?;
        self.check(new_child)?;
        self.check(old_child)?;
        if self.nodes[old_child as usize].parent != Some(parent) {
            return Err(Error::NotFound("node to replace is not a child".into()));
        }
        if new_child == old_child {
            return Ok(old_child);
        }
        self.validate_insert(parent, new_child, Some(old_child), Some(old_child))?;

        let anchor = self.nodes[old_child as usize].next_sibling;
        self.detach(old_child);
        if self.nodes[new_child as usize].kind() == NodeKind::DocumentFragment {
            let kids: Vec<NodeId> = self.children(new_child).collect();
            for kid in kids {
                self.detach(kid);
                self.link_before(parent, kid, anchor);
            }
        } else {
            self.detach(new_child);
            self.link_before(parent, new_child, anchor);
        }
        self.bump();
        Ok(old_child)
    }

    /// Remove `old_child` from `parent`; returns the removed node.
    pub fn remove_child(&mut self, parent: NodeId, old_child: NodeId) -> Result<NodeId> {
        self.check(parent)?;
        self.check(old_child)?;
        if self.nodes[old_child as usize].parent != Some(parent) {
            return Err(Error::NotFound("node to remove is not a child".into()));
        }
        self.detach(old_child);
        self.bump();
        Ok(old_child)
    }

    /// Check kind and structural constraints for inserting `child` into
    /// `parent` just before `point` (end when `None`). `exclude` is a child
    /// about to be replaced; it is ignored by uniqueness and ordering checks.
    fn validate_insert(
        &self,
        parent: NodeId,
        child: NodeId,
        point: Option<NodeId>,
        exclude: Option<NodeId>,
    ) -> Result<()> {
        let parent_kind = self.nodes[parent as usize].kind();
        if !parent_kind.is_container() {
            return Err(Error::HierarchyRequest(format!(
                "{:?} nodes cannot have children",
                parent_kind
            )));
        }
        if child == parent || self.is_ancestor_or_self(child, parent) {
            return Err(Error::HierarchyRequest(
                "a node cannot be inserted under itself or a descendant".into(),
            ));
        }
        let child_kind = self.nodes[child as usize].kind();
        if child_kind == NodeKind::DocumentFragment {
            // Validate the splice: every fragment child must be insertable.
            let mut elements = 0usize;
            for kid in self.children(child) {
                let kind = self.nodes[kid as usize].kind();
                if kind == NodeKind::Element {
                    elements += 1;
                }
                self.validate_child_kind(parent_kind, kind)?;
                if parent_kind == NodeKind::Document {
                    self.validate_document_slot(kind, point, exclude)?;
                }
            }
            if parent_kind == NodeKind::Document
                && elements > 0
                && (elements > 1 || self.document_element_excluding(exclude).is_some())
            {
                return Err(Error::HierarchyRequest(
                    "document already has a document element".into(),
                ));
            }
            return Ok(());
        }
        self.validate_child_kind(parent_kind, child_kind)?;
        if parent_kind == NodeKind::Document {
            self.validate_document_slot(child_kind, point, exclude)?;
            if child_kind == NodeKind::Element
                && self.document_element_excluding(exclude).is_some()
            {
                return Err(Error::HierarchyRequest(
                    "document already has a document element".into(),
                ));
            }
            if child_kind == NodeKind::DocumentType
                && self.doctype_excluding(exclude).is_some()
            {
                return Err(Error::HierarchyRequest(
                    "document already has a doctype".into(),
                ));
            }
        }
        Ok(())
    }

    fn validate_child_kind(&self, parent: NodeKind, child: NodeKind) -> Result<()> {
        let ok = match parent {
            NodeKind::Element | NodeKind::DocumentFragment => matches!(
                child,
                NodeKind::Element
                    | NodeKind::Text
                    | NodeKind::CData
                    | NodeKind::Comment
                    | NodeKind::ProcessingInstruction
            ),
            NodeKind::Document => matches!(
                child,
                NodeKind::Element
                    | NodeKind::DocumentType
                    | NodeKind::Comment
                    | NodeKind::ProcessingInstruction
            ),
            _ => false,
        };
        if ok {
            Ok(())
        } else {
            Err(Error::HierarchyRequest(format!(
                "{:?} is not a permitted child of {:?}",
                child, parent
            )))
        }
    }

    /// Prolog ordering: the doctype precedes the document element.
    fn validate_document_slot(
        &self,
        child: NodeKind,
        point: Option<NodeId>,
        exclude: Option<NodeId>,
    ) -> Result<()> {
        match child {
            NodeKind::Element => {
                if let Some(dt) = self.doctype_excluding(exclude) {
                    if !self.occurs_before_point(dt, point) {
                        return Err(Error::HierarchyRequest(
                            "document element cannot precede the doctype".into(),
                        ));
                    }
                }
            }
            NodeKind::DocumentType => {
                if let Some(el) = self.document_element_excluding(exclude) {
                    if self.occurs_before_point(el, point) {
                        return Err(Error::HierarchyRequest(
                            "doctype must precede the document element".into(),
                        ));
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn document_element_excluding(&self, exclude: Option<NodeId>) -> Option<NodeId> {
        self.children(DOCUMENT_NODE)
            .find(|&c| Some(c) != exclude && self.nodes[c as usize].is_element())
    }

    fn doctype_excluding(&self, exclude: Option<NodeId>) -> Option<NodeId> {
        self.children(DOCUMENT_NODE)
            .find(|&c| Some(c) != exclude && self.nodes[c as usize].kind() == NodeKind::DocumentType)
    }

    /// Does document child `child` occur strictly before the insertion point?
    fn occurs_before_point(&self, child: NodeId, point: Option<NodeId>) -> bool {
        for c in self.children(DOCUMENT_NODE) {
            if Some(c) == point {
                return false;
            }
            if c == child {
                return true;
            }
        }
        // Appending at the end: every existing child is before the point.
        point.is_none()
    }

    /// Unlink a node from its parent and siblings.
    fn detach(&mut self, id: NodeId) {
        let (parent, prev, next) = {
            let n = &self.nodes[id as usize];
            (n.parent, n.prev_sibling, n.next_sibling)
        };
        let Some(parent) = parent else { return };
        match prev {
            Some(p) => self.nodes[p as usize].next_sibling = next,
            None => self.nodes[parent as usize].first_child = next,
        }
        match next {
            Some(nx) => self.nodes[nx as usize].prev_sibling = prev,
            None => self.nodes[parent as usize].last_child = prev,
        }
        let n = &mut self.nodes[id as usize];
        n.parent = None;
        n.prev_sibling = None;
        n.next_sibling = None;
    }

    /// Link a detached node under `parent`, before `before` or at the end.
    fn link_before(&mut self, parent: NodeId, child: NodeId, before: Option<NodeId>) {
        match before {
            None => {
                let last = self.nodes[parent as usize].last_child;
                self.nodes[child as usize].parent = Some(parent);
                self.nodes[child as usize].prev_sibling = last;
                match last {
                    Some(l) => self.nodes[l as usize].next_sibling = Some(child),
                    None => self.nodes[parent as usize].first_child = Some(child),
                }
                self.nodes[parent as usize].last_child = Some(child);
            }
            Some(r) => {
                let prev = self.nodes[r as usize].prev_sibling;
                self.nodes[child as usize].parent = Some(parent);
                self.nodes[child as usize].prev_sibling = prev;
                self.nodes[child as usize].next_sibling = Some(r);
                self.nodes[r as usize].prev_sibling = Some(child);
                match prev {
                    Some(p) => self.nodes[p as usize].next_sibling = Some(child),
                    None => self.nodes[parent as usize].first_child = Some(child),
                }
            }
        }
    }

    /// Internal append used by the builder and cloning; skips validation.
    pub(crate) fn link_child(&mut self, parent: NodeId, child: NodeId) {
        self.link_before(parent, child, None);
    }

    // ------------------------------------------------------------------
    // Cloning
    // ------------------------------------------------------------------

    /// Clone a node. The clone has no parent and the same owner document;
    /// deep clones recurse over children. Element clones copy their
    /// attributes either way. Source positions propagate.
    pub fn clone_node(&mut self, id: NodeId, deep: bool) -> Result<NodeId> {
        self.check(id)?;
        Ok(self.clone_rec(id, deep))
    }

    fn clone_rec(&mut self, id: NodeId, deep: bool) -> NodeId {
        let pos = self.nodes[id as usize].pos;
        let payload = match &self.nodes[id as usize].payload {
            Payload::Element { name, .. } => Payload::Element {
                name: *name,
                attrs: Vec::new(),
            },
            Payload::Attribute {
                name,
                value,
                specified,
                ..
            } => Payload::Attribute {
                name: *name,
                value: value.clone(),
                specified: *specified,
                owner: None,
            },
            other => other.clone(),
        };
        let new_id = self.alloc_at(payload, pos);

        let attrs: Vec<NodeId> = match &self.nodes[id as usize].payload {
            Payload::Element { attrs, .. } => attrs.clone(),
            _ => Vec::new(),
        };
        for attr in attrs {
            let cloned = self.clone_rec(attr, deep);
            if let Payload::Attribute { owner, .. } = &mut self.nodes[cloned as usize].payload {
                *owner = Some(new_id);
            }
            if let Payload::Element { attrs, .. } = &mut self.nodes[new_id as usize].payload {
                attrs.push(cloned);
            }
        }
        if deep {
            let kids: Vec<NodeId> = self.children(id).collect();
            for kid in kids {
                let cloned = self.clone_rec(kid, true);
                self.link_child(new_id, cloned);
            }
        }
        new_id
    }

    // ------------------------------------------------------------------
    // Attributes
    // ------------------------------------------------------------------

    /// Attribute node ids of an element, in insertion order.
    pub fn attributes(&self, id: NodeId) -> &[NodeId] {
        match self.node(id).map(|n| &n.payload) {
            Some(Payload::Element { attrs, .. }) => attrs,
            _ => &[],
        }
    }

    fn require_element(&self, id: NodeId) -> Result<()> {
        self.check(id)?;
        if self.nodes[id as usize].is_element() {
            Ok(())
        } else {
            Err(Error::HierarchyRequest(
                "attributes live only on elements".into(),
            ))
        }
    }

    /// Find an attribute node by qualified (display) name.
    pub fn get_attribute_node(&self, elem: NodeId, qname: &str) -> Option<NodeId> {
        self.attributes(elem).iter().copied().find(|&a| {
            self.nodes[a as usize]
                .qualified_name()
                .is_some_and(|q| self.qualified_name_str(q) == qname)
        })
    }

    /// Find an attribute node by expanded name.
    pub fn get_attribute_node_ns(
        &self,
        elem: NodeId,
        uri: Option<&str>,
        local: &str,
    ) -> Option<NodeId> {
        self.attributes(elem).iter().copied().find(|&a| {
            let Some(q) = self.nodes[a as usize].qualified_name() else {
                return false;
            };
            self.names.local_of(q.name) == local && self.names.uri_of(q.name) == uri
        })
    }

    /// Attribute value by qualified name.
    pub fn get_attribute(&self, elem: NodeId, qname: &str) -> Option<&str> {
        let attr = self.get_attribute_node(elem, qname)?;
        self.nodes[attr as usize].as_attribute().map(|(_, v)| v)
    }

    /// Attribute value by expanded name.
    pub fn get_attribute_ns(&self, elem: NodeId, uri: Option<&str>, local: &str) -> Option<&str> {
        let attr = self.get_attribute_node_ns(elem, uri, local)?;
        self.nodes[attr as usize].as_attribute().map(|(_, v)| v)
    }

    pub fn has_attribute(&self, elem: NodeId, qname: &str) -> bool {
        self.get_attribute_node(elem, qname).is_some()
    }

    pub fn has_attribute_ns(&self, elem: NodeId, uri: Option<&str>, local: &str) -> bool {
        self.get_attribute_node_ns(elem, uri, local).is_some()
    }

    /// Set an attribute through the qualified-name view.
    pub fn set_attribute(&mut self, elem: NodeId, qname: &str, value: &str) -> Result<()> {
        self.require_element(elem)?;
        names::validate_name(qname)?;
        if let Some(attr) = self.get_attribute_node(elem, qname) {
            if let Payload::Attribute {
                value: v,
                specified,
                ..
            } = &mut self.nodes[attr as usize].payload
            {
                *v = value.to_string();
                *specified = true;
            }
        } else {
            let attr = self.create_attribute(qname)?;
            self.set_attr_value(attr, value);
            self.push_attr(elem, attr);
        }
        self.bump();
        Ok(())
    }

    /// Set an attribute through the expanded-name view.
    pub fn set_attribute_ns(
        &mut self,
        elem: NodeId,
        uri: Option<&str>,
        qname: &str,
        value: &str,
    ) -> Result<()> {
        self.require_element(elem)?;
        let (prefix, local) = names::split_qname(qname)?;
        check_ns_consistency(prefix, local, uri, true)?;
        if let Some(attr) = self.get_attribute_node_ns(elem, uri, local) {
            let prefix_sym = prefix.map(|p| self.names.intern(p));
            if let Payload::Attribute {
                name,
                value: v,
                specified,
                ..
            } = &mut self.nodes[attr as usize].payload
            {
                name.prefix = prefix_sym;
                *v = value.to_string();
                *specified = true;
            }
        } else {
            let attr = self.create_attribute_ns(uri, qname)?;
            self.set_attr_value(attr, value);
            self.push_attr(elem, attr);
        }
        self.bump();
        Ok(())
    }

    /// Remove an attribute by qualified name; a missing key is a no-op.
    pub fn remove_attribute(&mut self, elem: NodeId, qname: &str) -> Result<()> {
        self.require_element(elem)?;
        if let Some(attr) = self.get_attribute_node(elem, qname) {
            self.unlink_attr(elem, attr);
            self.bump();
        }
        Ok(())
    }

    /// Remove an attribute by expanded name; a missing key is a no-op.
    pub fn remove_attribute_ns(
        &mut self,
        elem: NodeId,
        uri: Option<&str>,
        local: &str,
    ) -> Result<()> {
        self.require_element(elem)?;
        if let Some(attr) = self.get_attribute_node_ns(elem, uri, local) {
            self.unlink_attr(elem, attr);
            self.bump();
        }
        Ok(())
    }

    /// Attach an attribute node to an element, replacing any attribute with
    /// the same expanded name. Returns the replaced node.
    pub fn set_attribute_node(&mut self, elem: NodeId, attr: NodeId) -> Result<Option<NodeId>> {
        self.require_element(elem)?;
        self.check(attr)?;
        let Payload::Attribute { name, owner, .. } = &self.nodes[attr as usize].payload else {
            return Err(Error::HierarchyRequest("node is not an attribute".into()));
        };
        if owner.is_some() {
            return Err(Error::HierarchyRequest(
                "attribute is already in use on another element".into(),
            ));
        }
        let key = name.name;
        let existing = self.attributes(elem).iter().copied().find(|&a| {
            self.nodes[a as usize]
                .qualified_name()
                .is_some_and(|q| q.name == key)
        });
        if let Some(old) = existing {
            let idx = self
                .attributes(elem)
                .iter()
                .position(|&a| a == old)
                .unwrap_or(0);
            if let Payload::Attribute { owner, .. } = &mut self.nodes[old as usize].payload {
                *owner = None;
            }
            if let Payload::Element { attrs, .. } = &mut self.nodes[elem as usize].payload {
                attrs[idx] = attr;
            }
            if let Payload::Attribute { owner, .. } = &mut self.nodes[attr as usize].payload {
                *owner = Some(elem);
            }
            self.bump();
            Ok(Some(old))
        } else {
            self.push_attr(elem, attr);
            self.bump();
            Ok(None)
        }
    }

    fn set_attr_value(&mut self, attr: NodeId, value: &str) {
        if let Payload::Attribute { value: v, .. } = &mut self.nodes[attr as usize].payload {
            *v = value.to_string();
        }
    }

    pub(crate) fn push_attr(&mut self, elem: NodeId, attr: NodeId) {
        if let Payload::Attribute { owner, .. } = &mut self.nodes[attr as usize].payload {
            *owner = Some(elem);
        }
        if let Payload::Element { attrs, .. } = &mut self.nodes[elem as usize].payload {
            attrs.push(attr);
        }
    }

    fn unlink_attr(&mut self, elem: NodeId, attr: NodeId) {
        if let Payload::Element { attrs, .. } = &mut self.nodes[elem as usize].payload {
            attrs.retain(|&a| a != attr);
        }
        if let Payload::Attribute { owner, .. } = &mut self.nodes[attr as usize].payload {
            *owner = None;
        }
    }

    // ------------------------------------------------------------------
    // Content helpers
    // ------------------------------------------------------------------

    /// DOM textContent setter: replaces all children with one Text node.
    pub fn set_text_content(&mut self, id: NodeId, text: &str) -> Result<()> {
        self.check(id)?;
        match self.nodes[id as usize].kind() {
            NodeKind::Element | NodeKind::DocumentFragment => {
                let kids: Vec<NodeId> = self.children(id).collect();
                for kid in kids {
                    self.detach(kid);
                }
                if !text.is_empty() {
                    let t = self.create_text(text);
                    self.link_child(id, t);
                }
            }
            NodeKind::Text | NodeKind::CData | NodeKind::Comment => {
                if let Payload::Text(data) | Payload::CData(data) | Payload::Comment(data) =
                    &mut self.nodes[id as usize].payload
                {
                    *data = text.to_string();
                }
            }
            NodeKind::ProcessingInstruction => {
                if let Payload::ProcessingInstruction { data, .. } =
                    &mut self.nodes[id as usize].payload
                {
                    *data = text.to_string();
                }
            }
            NodeKind::Attribute => self.set_attr_value(id, text),
            kind => {
                return Err(Error::HierarchyRequest(format!(
                    "textContent cannot be set on {:?}",
                    kind
                )))
            }
        }
        self.bump();
        Ok(())
    }

    /// Merge adjacent Text siblings and drop empty Text nodes, recursively.
    pub fn normalize(&mut self, id: NodeId) -> Result<()> {
        self.check(id)?;
        let mut stack = vec![id];
        while let Some(node) = stack.pop() {
            let mut cur = self.first_child(node);
            while let Some(c) = cur {
                let next = self.next_sibling(c);
                if self.nodes[c as usize].is_text() {
                    if self.nodes[c as usize]
                        .as_char_data()
                        .is_some_and(str::is_empty)
                    {
                        self.detach(c);
                        cur = next;
                        continue;
                    }
                    if let Some(n) = next {
                        if self.nodes[n as usize].is_text() {
                            let extra = self.nodes[n as usize]
                                .as_char_data()
                                .unwrap_or_default()
                                .to_string();
                            if let Payload::Text(data) = &mut self.nodes[c as usize].payload {
                                data.push_str(&extra);
                            }
                            self.detach(n);
                            // Stay on this node: more text may follow.
                            continue;
                        }
                    }
                }
                stack.push(c);
                cur = next;
            }
        }
        self.bump();
        Ok(())
    }

    // ------------------------------------------------------------------
    // Namespace lookup
    // ------------------------------------------------------------------

    /// Resolve a prefix against the in-scope `xmlns` declarations of a node.
    /// `None` resolves the default namespace. An empty declaration value
    /// undeclares the binding.
    pub fn lookup_namespace(&self, node: NodeId, prefix: Option<&str>) -> Option<String> {
        match prefix {
            Some("xml") => return Some(XML_NS_URI.to_string()),
            Some("xmlns") => return Some(XMLNS_NS_URI.to_string()),
            _ => {}
        }
        let mut cur = match self.node(node)?.payload {
            Payload::Attribute { owner, .. } => owner,
            _ => Some(node),
        };
        while let Some(c) = cur {
            if self.nodes[c as usize].is_element() {
                for &attr in self.attributes(c) {
                    let Some((q, value)) = self.nodes[attr as usize].as_attribute() else {
                        continue;
                    };
                    // Compare on the display name so declarations made through
                    // either attribute view are honored.
                    let qname = self.qualified_name_str(q);
                    let matches = match prefix {
                        Some(p) => {
                            qname.strip_prefix("xmlns:").is_some_and(|rest| rest == p)
                        }
                        None => qname == "xmlns",
                    };
                    if matches {
                        return if value.is_empty() {
                            None
                        } else {
                            Some(value.to_string())
                        };
                    }
                }
            }
            cur = self.nodes[c as usize].parent;
        }
        None
    }

    // ------------------------------------------------------------------
    // Document order
    // ------------------------------------------------------------------

    /// Rank every node reachable from the document node in document order:
    /// pre-order, with an element's attributes visited between its open tag
    /// and its first child, in attribute-map insertion order. Unreachable
    /// (detached) nodes sort after everything, by id.
    pub fn document_order(&self) -> DocOrder {
        let mut rank = vec![u32::MAX; self.nodes.len()];
        let mut counter = 0u32;
        let mut stack = vec![DOCUMENT_NODE];
        while let Some(id) = stack.pop() {
            rank[id as usize] = counter;
            counter += 1;
            for &attr in self.attributes(id) {
                rank[attr as usize] = counter;
                counter += 1;
            }
            let mut child = self.last_child(id);
            while let Some(c) = child {
                stack.push(c);
                child = self.previous_sibling(c);
            }
        }
        DocOrder { rank }
    }

    // ------------------------------------------------------------------
    // Pre-order stepping (used by traversal services)
    // ------------------------------------------------------------------

    /// Next node in pre-order within the subtree rooted at `root`.
    pub fn preorder_next(&self, id: NodeId, root: NodeId) -> Option<NodeId> {
        if let Some(c) = self.first_child(id) {
            return Some(c);
        }
        let mut cur = id;
        loop {
            if cur == root {
                return None;
            }
            if let Some(s) = self.next_sibling(cur) {
                return Some(s);
            }
            cur = self.parent(cur)?;
        }
    }

    /// Previous node in pre-order within the subtree rooted at `root`.
    pub fn preorder_prev(&self, id: NodeId, root: NodeId) -> Option<NodeId> {
        if id == root {
            return None;
        }
        match self.previous_sibling(id) {
            Some(mut cur) => {
                while let Some(last) = self.last_child(cur) {
                    cur = last;
                }
                Some(cur)
            }
            None => self.parent(id),
        }
    }
}

/// Snapshot of document-order ranks, valid until the next mutation.
pub struct DocOrder {
    rank: Vec<u32>,
}

impl DocOrder {
    pub fn rank(&self, id: NodeId) -> u32 {
        self.rank.get(id as usize).copied().unwrap_or(u32::MAX)
    }

    pub fn cmp(&self, a: NodeId, b: NodeId) -> Ordering {
        (self.rank(a), a).cmp(&(self.rank(b), b))
    }

    /// Sort a node-set into document order.
    pub fn sort(&self, nodes: &mut [NodeId]) {
        nodes.sort_unstable_by(|&a, &b| self.cmp(a, b));
    }
}

/// Iterator over child nodes.
pub struct ChildIter<'d> {
    doc: &'d Document,
    next: Option<NodeId>,
}

impl Iterator for ChildIter<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = self.doc.next_sibling(current);
        Some(current)
    }
}

/// Iterator over descendant nodes (depth-first pre-order).
pub struct DescendantIter<'d> {
    doc: &'d Document,
    stack: Vec<NodeId>,
}

impl Iterator for DescendantIter<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.stack.pop()?;
        let mut child = self.doc.last_child(current);
        while let Some(c) = child {
            self.stack.push(c);
            child = self.doc.previous_sibling(c);
        }
        Some(current)
    }
}

/// Consistency rules from XML Namespaces for qualified names supplied to
/// the NS-aware factories.
fn check_ns_consistency(
    prefix: Option<&str>,
    local: &str,
    uri: Option<&str>,
    is_attribute: bool,
) -> Result<()> {
    let uri = uri.filter(|u| !u.is_empty());
    if prefix.is_some() && uri.is_none() {
        return Err(Error::Namespace(
            "a prefixed name requires a namespace URI".into(),
        ));
    }
    if prefix == Some("xml") && uri != Some(XML_NS_URI) {
        return Err(Error::Namespace(format!(
            "prefix \"xml\" is bound to {}",
            XML_NS_URI
        )));
    }
    let is_xmlns_name = prefix == Some("xmlns") || (prefix.is_none() && local == "xmlns");
    if is_xmlns_name {
        if !is_attribute || uri != Some(XMLNS_NS_URI) {
            return Err(Error::Namespace(
                "\"xmlns\" is reserved for namespace declarations".into(),
            ));
        }
    } else if uri == Some(XMLNS_NS_URI) {
        return Err(Error::Namespace(format!(
            "{} is reserved for xmlns attributes",
            XMLNS_NS_URI
        )));
    }
    Ok(())
}
