//! DOM Module - arena-based XML document
//!
//! An efficient mutable DOM representation:
//! - arena allocation for nodes, NodeId (u32) indices
//! - name interning for elements, attributes, and namespace URIs
//! - builder over an external tokenizer with source positions
//! - live traversal views, TreeWalker, NodeIterator
//! - Marshal / MarshalIndent serialization

pub mod build;
pub mod document;
pub mod encoding;
pub mod names;
pub mod namespace;
pub mod node;
pub mod serialize;
pub mod traversal;

pub use document::{ChildIter, DescendantIter, DocOrder, Document};
pub use names::{ExpandedNameId, NameTable, Sym};
pub use namespace::{XMLNS_NS_URI, XML_NS_URI};
pub use node::{Node, NodeId, NodeKind, Payload, QualifiedName, DOCUMENT_NODE};
pub use serialize::{escape_text, marshal, marshal_indent, marshal_node, marshal_node_indent};
pub use traversal::{
    FilterDecision, NamedNodeMap, NodeFilter, NodeIterator, NodeList, TreeWalker, SHOW_ALL,
    SHOW_ATTRIBUTE, SHOW_CDATA_SECTION, SHOW_COMMENT, SHOW_DOCUMENT, SHOW_DOCUMENT_FRAGMENT,
    SHOW_DOCUMENT_TYPE, SHOW_ELEMENT, SHOW_PROCESSING_INSTRUCTION, SHOW_TEXT,
};
