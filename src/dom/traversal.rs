//! Traversal services
//!
//! Live `NodeList`/`NamedNodeMap` views plus `TreeWalker` and
//! `NodeIterator`. Views hold node ids and a test, never cached results:
//! each access recomputes against the current tree, which is what makes
//! them live.

use super::document::Document;
use super::node::{NodeId, NodeKind};

/// whatToShow bit for each node kind.
pub const SHOW_ELEMENT: u32 = 0x1;
pub const SHOW_ATTRIBUTE: u32 = 0x2;
pub const SHOW_TEXT: u32 = 0x4;
pub const SHOW_CDATA_SECTION: u32 = 0x8;
pub const SHOW_PROCESSING_INSTRUCTION: u32 = 0x40;
pub const SHOW_COMMENT: u32 = 0x80;
pub const SHOW_DOCUMENT: u32 = 0x100;
pub const SHOW_DOCUMENT_TYPE: u32 = 0x200;
pub const SHOW_DOCUMENT_FRAGMENT: u32 = 0x400;
pub const SHOW_ALL: u32 = !0;

fn show_bit(kind: NodeKind) -> u32 {
    match kind {
        NodeKind::Element => SHOW_ELEMENT,
        NodeKind::Attribute => SHOW_ATTRIBUTE,
        NodeKind::Text => SHOW_TEXT,
        NodeKind::CData => SHOW_CDATA_SECTION,
        NodeKind::ProcessingInstruction => SHOW_PROCESSING_INSTRUCTION,
        NodeKind::Comment => SHOW_COMMENT,
        NodeKind::Document => SHOW_DOCUMENT,
        NodeKind::DocumentType => SHOW_DOCUMENT_TYPE,
        NodeKind::DocumentFragment => SHOW_DOCUMENT_FRAGMENT,
    }
}

/// Verdict of a traversal filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterDecision {
    Accept,
    /// Prune the node and its subtree (TreeWalker only; NodeIterator
    /// treats this as Skip).
    Reject,
    /// Hide the node but descend into its children.
    Skip,
}

/// Optional traversal filter callback.
pub type NodeFilter = Box<dyn Fn(&Document, NodeId) -> FilterDecision>;

// ----------------------------------------------------------------------
// Live NodeList
// ----------------------------------------------------------------------

enum ListTest {
    ChildNodes,
    TagName(String),
    TagNameNs { uri: String, local: String },
}

/// A live list of nodes. Length and items reflect the document state at
/// the moment of each call.
pub struct NodeList {
    root: NodeId,
    test: ListTest,
}

impl NodeList {
    /// Live view of a node's children.
    pub fn children_of(parent: NodeId) -> NodeList {
        NodeList {
            root: parent,
            test: ListTest::ChildNodes,
        }
    }

    /// Live view of descendant elements matching a qualified name
    /// (`"*"` matches every element).
    pub fn elements_by_tag_name(root: NodeId, name: &str) -> NodeList {
        NodeList {
            root,
            test: ListTest::TagName(name.to_string()),
        }
    }

    /// Live view of descendant elements matching an expanded name; either
    /// component may be `"*"`. An empty URI matches no-namespace elements.
    pub fn elements_by_tag_name_ns(root: NodeId, uri: &str, local: &str) -> NodeList {
        NodeList {
            root,
            test: ListTest::TagNameNs {
                uri: uri.to_string(),
                local: local.to_string(),
            },
        }
    }

    fn matches(&self, doc: &Document, id: NodeId) -> bool {
        match &self.test {
            ListTest::ChildNodes => true,
            ListTest::TagName(name) => {
                doc.node(id).is_some_and(|n| n.is_element())
                    && (name == "*" || doc.node_name(id) == *name)
            }
            ListTest::TagNameNs { uri, local } => {
                if !doc.node(id).is_some_and(|n| n.is_element()) {
                    return false;
                }
                let node_uri = doc.namespace_uri(id).unwrap_or("");
                let node_local = doc.local_name(id).unwrap_or("");
                (uri == "*" || node_uri == *uri) && (local == "*" || node_local == *local)
            }
        }
    }

    fn nth(&self, doc: &Document, index: usize) -> Option<NodeId> {
        match self.test {
            ListTest::ChildNodes => doc.children(self.root).nth(index),
            _ => doc
                .descendants(self.root)
                .filter(|&d| self.matches(doc, d))
                .nth(index),
        }
    }

    pub fn length(&self, doc: &Document) -> usize {
        match self.test {
            ListTest::ChildNodes => doc.children(self.root).count(),
            _ => doc
                .descendants(self.root)
                .filter(|&d| self.matches(doc, d))
                .count(),
        }
    }

    pub fn item(&self, doc: &Document, index: usize) -> Option<NodeId> {
        self.nth(doc, index)
    }

    /// Collect the current members; a snapshot, not live.
    pub fn to_vec(&self, doc: &Document) -> Vec<NodeId> {
        match self.test {
            ListTest::ChildNodes => doc.children(self.root).collect(),
            _ => doc
                .descendants(self.root)
                .filter(|&d| self.matches(doc, d))
                .collect(),
        }
    }
}

// ----------------------------------------------------------------------
// Live NamedNodeMap
// ----------------------------------------------------------------------

/// Live name-indexed view of an element's attributes.
pub struct NamedNodeMap {
    owner: NodeId,
}

impl NamedNodeMap {
    pub fn of(elem: NodeId) -> NamedNodeMap {
        NamedNodeMap { owner: elem }
    }

    pub fn length(&self, doc: &Document) -> usize {
        doc.attributes(self.owner).len()
    }

    pub fn item(&self, doc: &Document, index: usize) -> Option<NodeId> {
        doc.attributes(self.owner).get(index).copied()
    }

    pub fn get_named_item(&self, doc: &Document, qname: &str) -> Option<NodeId> {
        doc.get_attribute_node(self.owner, qname)
    }

    pub fn get_named_item_ns(
        &self,
        doc: &Document,
        uri: Option<&str>,
        local: &str,
    ) -> Option<NodeId> {
        doc.get_attribute_node_ns(self.owner, uri, local)
    }
}

impl Document {
    /// Live view of a node's children.
    pub fn child_nodes(&self, parent: NodeId) -> NodeList {
        NodeList::children_of(parent)
    }

    /// Live view of descendant elements matching a qualified name.
    pub fn get_elements_by_tag_name(&self, root: NodeId, name: &str) -> NodeList {
        NodeList::elements_by_tag_name(root, name)
    }

    /// Live view of descendant elements matching an expanded name.
    pub fn get_elements_by_tag_name_ns(&self, root: NodeId, uri: &str, local: &str) -> NodeList {
        NodeList::elements_by_tag_name_ns(root, uri, local)
    }

    /// Live name-indexed view of an element's attributes.
    pub fn attribute_map(&self, elem: NodeId) -> NamedNodeMap {
        NamedNodeMap::of(elem)
    }
}

// ----------------------------------------------------------------------
// TreeWalker
// ----------------------------------------------------------------------

/// Stateful walker over the filtered pre-order view of a subtree.
pub struct TreeWalker {
    root: NodeId,
    what_to_show: u32,
    filter: Option<NodeFilter>,
    current: NodeId,
}

impl TreeWalker {
    pub fn new(root: NodeId, what_to_show: u32, filter: Option<NodeFilter>) -> TreeWalker {
        TreeWalker {
            root,
            what_to_show,
            filter,
            current: root,
        }
    }

    pub fn current_node(&self) -> NodeId {
        self.current
    }

    pub fn set_current_node(&mut self, node: NodeId) {
        self.current = node;
    }

    fn accept(&self, doc: &Document, node: NodeId) -> FilterDecision {
        let Some(kind) = doc.kind(node) else {
            return FilterDecision::Reject;
        };
        if self.what_to_show & show_bit(kind) == 0 {
            return FilterDecision::Skip;
        }
        match &self.filter {
            Some(f) => f(doc, node),
            None => FilterDecision::Accept,
        }
    }

    pub fn parent_node(&mut self, doc: &Document) -> Option<NodeId> {
        let mut node = self.current;
        while node != self.root {
            node = doc.parent(node)?;
            if self.accept(doc, node) == FilterDecision::Accept {
                self.current = node;
                return Some(node);
            }
        }
        None
    }

    pub fn first_child(&mut self, doc: &Document) -> Option<NodeId> {
        self.traverse_children(doc, true)
    }

    pub fn last_child(&mut self, doc: &Document) -> Option<NodeId> {
        self.traverse_children(doc, false)
    }

    pub fn next_sibling(&mut self, doc: &Document) -> Option<NodeId> {
        self.traverse_siblings(doc, true)
    }

    pub fn previous_sibling(&mut self, doc: &Document) -> Option<NodeId> {
        self.traverse_siblings(doc, false)
    }

    fn traverse_children(&mut self, doc: &Document, first: bool) -> Option<NodeId> {
        let pick = |n: NodeId| {
            if first {
                doc.first_child(n)
            } else {
                doc.last_child(n)
            }
        };
        let mut node = pick(self.current)?;
        loop {
            match self.accept(doc, node) {
                FilterDecision::Accept => {
                    self.current = node;
                    return Some(node);
                }
                FilterDecision::Skip => {
                    if let Some(child) = pick(node) {
                        node = child;
                        continue;
                    }
                }
                FilterDecision::Reject => {}
            }
            loop {
                let sibling = if first {
                    doc.next_sibling(node)
                } else {
                    doc.previous_sibling(node)
                };
                if let Some(s) = sibling {
                    node = s;
                    break;
                }
                match doc.parent(node) {
                    None => return None,
                    Some(p) if p == self.root || p == self.current => return None,
                    Some(p) => node = p,
                }
            }
        }
    }

    fn traverse_siblings(&mut self, doc: &Document, next: bool) -> Option<NodeId> {
        let forward_sibling = |n: NodeId| {
            if next {
                doc.next_sibling(n)
            } else {
                doc.previous_sibling(n)
            }
        };
        let into_child = |n: NodeId| {
            if next {
                doc.first_child(n)
            } else {
                doc.last_child(n)
            }
        };
        let mut node = self.current;
        if node == self.root {
            return None;
        }
        loop {
            let mut sibling = forward_sibling(node);
            while let Some(s) = sibling {
                node = s;
                let result = self.accept(doc, node);
                if result == FilterDecision::Accept {
                    self.current = node;
                    return Some(node);
                }
                // Skipped nodes expose their children as siblings.
                sibling = into_child(node);
                if result == FilterDecision::Reject || sibling.is_none() {
                    sibling = forward_sibling(node);
                }
            }
            node = doc.parent(node)?;
            if node == self.root {
                return None;
            }
            if self.accept(doc, node) == FilterDecision::Accept {
                return None;
            }
        }
    }

    pub fn next_node(&mut self, doc: &Document) -> Option<NodeId> {
        let mut node = self.current;
        let mut result = FilterDecision::Accept;
        loop {
            while result != FilterDecision::Reject {
                let Some(child) = doc.first_child(node) else {
                    break;
                };
                node = child;
                result = self.accept(doc, node);
                if result == FilterDecision::Accept {
                    self.current = node;
                    return Some(node);
                }
            }
            let mut temp = node;
            node = loop {
                if temp == self.root {
                    return None;
                }
                if let Some(s) = doc.next_sibling(temp) {
                    break s;
                }
                temp = doc.parent(temp)?;
            };
            result = self.accept(doc, node);
            if result == FilterDecision::Accept {
                self.current = node;
                return Some(node);
            }
        }
    }

    pub fn previous_node(&mut self, doc: &Document) -> Option<NodeId> {
        let mut node = self.current;
        while node != self.root {
            let mut sibling = doc.previous_sibling(node);
            while let Some(s) = sibling {
                node = s;
                let mut result = self.accept(doc, node);
                while result != FilterDecision::Reject {
                    let Some(last) = doc.last_child(node) else {
                        break;
                    };
                    node = last;
                    result = self.accept(doc, node);
                }
                if result == FilterDecision::Accept {
                    self.current = node;
                    return Some(node);
                }
                sibling = doc.previous_sibling(node);
            }
            if node == self.root {
                return None;
            }
            node = doc.parent(node)?;
            if self.accept(doc, node) == FilterDecision::Accept {
                self.current = node;
                return Some(node);
            }
        }
        None
    }
}

// ----------------------------------------------------------------------
// NodeIterator
// ----------------------------------------------------------------------

/// Flat filtered iterator over the pre-order view of a subtree. Unlike
/// `TreeWalker`, a Reject verdict does not prune: it behaves like Skip.
pub struct NodeIterator {
    root: NodeId,
    what_to_show: u32,
    filter: Option<NodeFilter>,
    reference: NodeId,
    before_reference: bool,
}

impl NodeIterator {
    pub fn new(root: NodeId, what_to_show: u32, filter: Option<NodeFilter>) -> NodeIterator {
        NodeIterator {
            root,
            what_to_show,
            filter,
            reference: root,
            before_reference: true,
        }
    }

    fn accepts(&self, doc: &Document, node: NodeId) -> bool {
        let Some(kind) = doc.kind(node) else {
            return false;
        };
        if self.what_to_show & show_bit(kind) == 0 {
            return false;
        }
        match &self.filter {
            Some(f) => f(doc, node) == FilterDecision::Accept,
            None => true,
        }
    }

    pub fn next_node(&mut self, doc: &Document) -> Option<NodeId> {
        let mut node = self.reference;
        let mut before = self.before_reference;
        loop {
            if before {
                before = false;
            } else {
                node = doc.preorder_next(node, self.root)?;
            }
            if self.accepts(doc, node) {
                self.reference = node;
                self.before_reference = false;
                return Some(node);
            }
        }
    }

    pub fn previous_node(&mut self, doc: &Document) -> Option<NodeId> {
        let mut node = self.reference;
        let mut before = self.before_reference;
        loop {
            if !before {
                before = true;
            } else {
                node = doc.preorder_prev(node, self.root)?;
            }
            if self.accepts(doc, node) {
                self.reference = node;
                self.before_reference = true;
                return Some(node);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::node::DOCUMENT_NODE;

    fn doc() -> Document {
        Document::parse_str("<r><a><b>x</b></a><c/><a id=\"2\"/></r>").unwrap()
    }

    #[test]
    fn node_list_is_live() {
        let mut doc = doc();
        let root = doc.document_element().unwrap();
        let list = doc.get_elements_by_tag_name(root, "a");
        assert_eq!(list.length(&doc), 2);
        let extra = doc.create_element("a").unwrap();
        doc.append_child(root, extra).unwrap();
        assert_eq!(list.length(&doc), 3);
        doc.remove_child(root, extra).unwrap();
        assert_eq!(list.length(&doc), 2);
    }

    #[test]
    fn node_list_star_and_items() {
        let doc = doc();
        let root = doc.document_element().unwrap();
        let all = NodeList::elements_by_tag_name(root, "*");
        assert_eq!(all.length(&doc), 4);
        let names: Vec<String> = (0..all.length(&doc))
            .filter_map(|i| all.item(&doc, i))
            .map(|n| doc.node_name(n))
            .collect();
        assert_eq!(names, vec!["a", "b", "c", "a"]);
        assert!(all.item(&doc, 9).is_none());
    }

    #[test]
    fn node_list_by_expanded_name() {
        let doc = Document::parse_str(
            r#"<r xmlns:p="urn:p"><p:x/><x/><p:y/></r>"#,
        )
        .unwrap();
        let root = doc.document_element().unwrap();
        let ns = doc.get_elements_by_tag_name_ns(root, "urn:p", "*");
        assert_eq!(ns.length(&doc), 2);
        let no_ns = NodeList::elements_by_tag_name_ns(root, "", "x");
        assert_eq!(no_ns.length(&doc), 1);
        let any = NodeList::elements_by_tag_name_ns(root, "*", "x");
        assert_eq!(any.length(&doc), 2);
    }

    #[test]
    fn child_nodes_view() {
        let mut doc = doc();
        let root = doc.document_element().unwrap();
        let kids = doc.child_nodes(root);
        assert_eq!(kids.length(&doc), 3);
        let t = doc.create_text("tail");
        doc.append_child(root, t).unwrap();
        assert_eq!(kids.length(&doc), 4);
        assert_eq!(kids.item(&doc, 3), Some(t));
    }

    #[test]
    fn named_node_map_is_live() {
        let mut doc = doc();
        let root = doc.document_element().unwrap();
        let map = doc.attribute_map(root);
        assert_eq!(map.length(&doc), 0);
        doc.set_attribute(root, "k", "v").unwrap();
        assert_eq!(map.length(&doc), 1);
        let attr = map.get_named_item(&doc, "k").unwrap();
        assert_eq!(doc.node_value(attr), Some("v"));
        assert_eq!(map.item(&doc, 0), Some(attr));
    }

    #[test]
    fn tree_walker_elements_only() {
        let doc = doc();
        let mut walker = TreeWalker::new(DOCUMENT_NODE, SHOW_ELEMENT, None);
        let mut seen = Vec::new();
        while let Some(n) = walker.next_node(&doc) {
            seen.push(doc.node_name(n));
        }
        assert_eq!(seen, vec!["r", "a", "b", "c", "a"]);
    }

    #[test]
    fn tree_walker_reject_prunes_subtree() {
        let doc = doc();
        let filter: NodeFilter = Box::new(|doc, n| {
            if doc.node_name(n) == "a" {
                FilterDecision::Reject
            } else {
                FilterDecision::Accept
            }
        });
        let mut walker = TreeWalker::new(DOCUMENT_NODE, SHOW_ELEMENT, Some(filter));
        let mut seen = Vec::new();
        while let Some(n) = walker.next_node(&doc) {
            seen.push(doc.node_name(n));
        }
        // Both <a> subtrees are pruned, hiding <b> as well.
        assert_eq!(seen, vec!["r", "c"]);
    }

    #[test]
    fn tree_walker_skip_descends() {
        let doc = doc();
        let filter: NodeFilter = Box::new(|doc, n| {
            if doc.node_name(n) == "a" {
                FilterDecision::Skip
            } else {
                FilterDecision::Accept
            }
        });
        let mut walker = TreeWalker::new(DOCUMENT_NODE, SHOW_ELEMENT, Some(filter));
        let mut seen = Vec::new();
        while let Some(n) = walker.next_node(&doc) {
            seen.push(doc.node_name(n));
        }
        assert_eq!(seen, vec!["r", "b", "c"]);
    }

    #[test]
    fn tree_walker_family_moves() {
        let doc = doc();
        let root = doc.document_element().unwrap();
        let mut walker = TreeWalker::new(root, SHOW_ELEMENT, None);
        let a = walker.first_child(&doc).unwrap();
        assert_eq!(doc.node_name(a), "a");
        let b = walker.first_child(&doc).unwrap();
        assert_eq!(doc.node_name(b), "b");
        assert_eq!(walker.parent_node(&doc), Some(a));
        let c = walker.next_sibling(&doc).unwrap();
        assert_eq!(doc.node_name(c), "c");
        assert_eq!(walker.previous_sibling(&doc), Some(a));
        let last = {
            walker.set_current_node(root);
            walker.last_child(&doc).unwrap()
        };
        assert_eq!(doc.get_attribute(last, "id"), Some("2"));
        let prev = walker.previous_node(&doc).unwrap();
        assert_eq!(doc.node_name(prev), "c");
    }

    #[test]
    fn node_iterator_treats_reject_as_skip() {
        let doc = doc();
        let filter: NodeFilter = Box::new(|doc, n| {
            if doc.node_name(n) == "a" {
                FilterDecision::Reject
            } else {
                FilterDecision::Accept
            }
        });
        let mut iter = NodeIterator::new(DOCUMENT_NODE, SHOW_ELEMENT, Some(filter));
        let mut seen = Vec::new();
        while let Some(n) = iter.next_node(&doc) {
            seen.push(doc.node_name(n));
        }
        // <b> is still visited: rejection does not prune here.
        assert_eq!(seen, vec!["r", "b", "c"]);
    }

    #[test]
    fn node_iterator_walks_both_ways() {
        let doc = doc();
        let mut iter = NodeIterator::new(DOCUMENT_NODE, SHOW_ELEMENT, None);
        assert_eq!(iter.next_node(&doc).map(|n| doc.node_name(n)), Some("r".into()));
        assert_eq!(iter.next_node(&doc).map(|n| doc.node_name(n)), Some("a".into()));
        assert_eq!(iter.next_node(&doc).map(|n| doc.node_name(n)), Some("b".into()));
        assert_eq!(iter.previous_node(&doc).map(|n| doc.node_name(n)), Some("b".into()));
        assert_eq!(iter.previous_node(&doc).map(|n| doc.node_name(n)), Some("a".into()));
        assert_eq!(iter.previous_node(&doc).map(|n| doc.node_name(n)), Some("r".into()));
        assert_eq!(iter.previous_node(&doc), None);
    }

    #[test]
    fn what_to_show_masks_kinds() {
        let doc = Document::parse_str("<r>t<!--c--><?p d?></r>").unwrap();
        let mut iter = NodeIterator::new(DOCUMENT_NODE, SHOW_COMMENT, None);
        let n = iter.next_node(&doc).unwrap();
        assert_eq!(doc.kind(n), Some(NodeKind::Comment));
        assert!(iter.next_node(&doc).is_none());
        let mut iter = NodeIterator::new(DOCUMENT_NODE, SHOW_TEXT | SHOW_PROCESSING_INSTRUCTION, None);
        assert_eq!(iter.next_node(&doc).map(|n| doc.kind(n).unwrap()), Some(NodeKind::Text));
        assert_eq!(
            iter.next_node(&doc).map(|n| doc.kind(n).unwrap()),
            Some(NodeKind::ProcessingInstruction)
        );
    }
}
