//! xmldom - W3C DOM tree with an XPath 1.0 engine
//!
//! An in-memory, mutable XML document model following DOM Level 3 Core,
//! plus an XPath 1.0 compiler and evaluator over it.
//!
//! ```
//! use xmldom::{marshal, Document, DOCUMENT_NODE};
//!
//! let doc = Document::parse_str(r#"<books><book id="1"><title>Go</title></book></books>"#)?;
//! let title = xmldom::xpath::evaluate(&doc, DOCUMENT_NODE, "//book[@id='1']/title")?;
//! assert_eq!(title.string_value(&doc), "Go");
//! assert!(marshal(&doc)?.starts_with("<?xml version=\"1.0\"?>"));
//! # Ok::<(), xmldom::Error>(())
//! ```
//!
//! Concurrency: a `Document` is a single aliasing domain. Concurrent
//! reads (traversal, XPath evaluation) are safe; concurrent mutation is
//! the caller's to serialize. The XPath expression cache is shared and
//! internally synchronized.

pub mod dom;
pub mod error;
pub mod xpath;

pub use dom::{
    marshal, marshal_indent, marshal_node, marshal_node_indent, Document, NamedNodeMap, Node,
    NodeId, NodeIterator, NodeKind, NodeList, Payload, TreeWalker, DOCUMENT_NODE,
};
pub use error::{Error, Position, Result};
pub use xpath::{EvalOptions, Value, XPathResult};

/// Parse an XML document from bytes; UTF-16 input is detected by BOM.
pub fn unmarshal(data: &[u8]) -> Result<Document> {
    Document::parse_bytes(data)
}
