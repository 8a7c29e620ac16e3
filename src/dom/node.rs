//! DOM nodes
//!
//! Nodes live in a `Document` arena and reference each other through
//! `NodeId` indices. Tree links are uniform across kinds; everything
//! kind-specific sits in the tagged `Payload` variant.

use crate::error::Position;

use super::names::{ExpandedNameId, Sym};

/// Compact node identifier (index into the document arena).
pub type NodeId = u32;

/// The document node always occupies slot 0 of its arena.
pub const DOCUMENT_NODE: NodeId = 0;

/// Kind of DOM node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Document,
    DocumentFragment,
    DocumentType,
    Element,
    Attribute,
    Text,
    CData,
    Comment,
    ProcessingInstruction,
}

impl NodeKind {
    /// True for kinds that may hold child nodes.
    pub fn is_container(self) -> bool {
        matches!(
            self,
            NodeKind::Document | NodeKind::DocumentFragment | NodeKind::Element
        )
    }
}

/// Expanded name plus the display prefix used at parse or construction time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QualifiedName {
    pub name: ExpandedNameId,
    pub prefix: Option<Sym>,
}

/// Kind-specific node payload.
#[derive(Debug, Clone)]
pub enum Payload {
    Document,
    DocumentFragment,
    DocumentType {
        name: Sym,
        public_id: Option<String>,
        system_id: Option<String>,
        internal_subset: Option<String>,
    },
    Element {
        name: QualifiedName,
        /// Attr node ids, insertion order preserved for serialization.
        attrs: Vec<NodeId>,
    },
    Attribute {
        name: QualifiedName,
        value: String,
        specified: bool,
        /// Owning element; non-owning back-reference.
        owner: Option<NodeId>,
    },
    Text(String),
    CData(String),
    Comment(String),
    ProcessingInstruction {
        target: Sym,
        data: String,
    },
}

/// A DOM node in the arena.
#[derive(Debug, Clone)]
pub struct Node {
    pub parent: Option<NodeId>,
    pub prev_sibling: Option<NodeId>,
    pub next_sibling: Option<NodeId>,
    pub first_child: Option<NodeId>,
    pub last_child: Option<NodeId>,
    /// Source position, when the node came from a parse.
    pub pos: Option<Position>,
    pub payload: Payload,
}

impl Node {
    pub fn new(payload: Payload) -> Self {
        Node {
            parent: None,
            prev_sibling: None,
            next_sibling: None,
            first_child: None,
            last_child: None,
            pos: None,
            payload,
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self.payload {
            Payload::Document => NodeKind::Document,
            Payload::DocumentFragment => NodeKind::DocumentFragment,
            Payload::DocumentType { .. } => NodeKind::DocumentType,
            Payload::Element { .. } => NodeKind::Element,
            Payload::Attribute { .. } => NodeKind::Attribute,
            Payload::Text(_) => NodeKind::Text,
            Payload::CData(_) => NodeKind::CData,
            Payload::Comment(_) => NodeKind::Comment,
            Payload::ProcessingInstruction { .. } => NodeKind::ProcessingInstruction,
        }
    }

    #[inline]
    pub fn is_element(&self) -> bool {
        matches!(self.payload, Payload::Element { .. })
    }

    #[inline]
    pub fn is_text(&self) -> bool {
        matches!(self.payload, Payload::Text(_))
    }

    #[inline]
    pub fn is_attribute(&self) -> bool {
        matches!(self.payload, Payload::Attribute { .. })
    }

    #[inline]
    pub fn has_children(&self) -> bool {
        self.first_child.is_some()
    }

    /// Element view: (qualified name, attribute ids).
    pub fn as_element(&self) -> Option<(&QualifiedName, &[NodeId])> {
        match &self.payload {
            Payload::Element { name, attrs } => Some((name, attrs)),
            _ => None,
        }
    }

    /// Attribute view: (qualified name, value).
    pub fn as_attribute(&self) -> Option<(&QualifiedName, &str)> {
        match &self.payload {
            Payload::Attribute { name, value, .. } => Some((name, value.as_str())),
            _ => None,
        }
    }

    /// Character data of Text, CDATA, and Comment nodes.
    pub fn as_char_data(&self) -> Option<&str> {
        match &self.payload {
            Payload::Text(data) | Payload::CData(data) | Payload::Comment(data) => {
                Some(data.as_str())
            }
            _ => None,
        }
    }

    /// Qualified name of an element or attribute node.
    pub fn qualified_name(&self) -> Option<&QualifiedName> {
        match &self.payload {
            Payload::Element { name, .. } | Payload::Attribute { name, .. } => Some(name),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_follows_payload() {
        let node = Node::new(Payload::Text("hi".into()));
        assert_eq!(node.kind(), NodeKind::Text);
        assert!(node.is_text());
        assert!(!node.is_element());
        assert_eq!(node.as_char_data(), Some("hi"));
    }

    #[test]
    fn container_kinds() {
        assert!(NodeKind::Document.is_container());
        assert!(NodeKind::Element.is_container());
        assert!(NodeKind::DocumentFragment.is_container());
        assert!(!NodeKind::Attribute.is_container());
        assert!(!NodeKind::Text.is_container());
    }

    #[test]
    fn fresh_node_is_detached() {
        let node = Node::new(Payload::Comment("c".into()));
        assert!(node.parent.is_none());
        assert!(node.first_child.is_none());
        assert!(node.next_sibling.is_none());
    }
}
