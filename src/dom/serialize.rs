//! Serialization (Marshal / MarshalIndent)
//!
//! Emits UTF-8 XML. Empty elements are always written as `<name></name>`,
//! never self-closed, for consumers that are strict about paired tags.

use memchr::memchr3;

use crate::error::{Error, Result};

use super::document::Document;
use super::node::{NodeId, NodeKind, Payload};

/// Serialize a whole document, including the XML declaration.
pub fn marshal(doc: &Document) -> Result<String> {
    marshal_indent(doc, "", "", false)
}

/// Serialize a whole document with indentation options. `preserve_whitespace`
/// leaves newlines and tabs unescaped inside text and attribute values.
pub fn marshal_indent(
    doc: &Document,
    prefix: &str,
    indent: &str,
    preserve_whitespace: bool,
) -> Result<String> {
    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\"?>");
    if !indent.is_empty() {
        out.push('\n');
    }
    if let Some(root) = doc.document_element() {
        let w = Writer {
            doc,
            prefix,
            indent,
            preserve_whitespace,
        };
        w.element(&mut out, root, 0);
    }
    Ok(out)
}

/// Serialize any subtree without an XML declaration.
pub fn marshal_node(doc: &Document, node: NodeId) -> Result<String> {
    marshal_node_indent(doc, node, "", "", false)
}

/// Serialize any subtree with indentation options.
pub fn marshal_node_indent(
    doc: &Document,
    node: NodeId,
    prefix: &str,
    indent: &str,
    preserve_whitespace: bool,
) -> Result<String> {
    if doc.node(node).is_none() {
        return Err(Error::WrongDocument(format!(
            "node {} is not owned by this document",
            node
        )));
    }
    let w = Writer {
        doc,
        prefix,
        indent,
        preserve_whitespace,
    };
    let mut out = String::new();
    match doc.node(node).map(|n| n.kind()) {
        Some(NodeKind::Document) => {
            if let Some(root) = doc.document_element() {
                w.element(&mut out, root, 0);
            }
        }
        Some(NodeKind::DocumentFragment) => {
            for child in doc.children(node) {
                w.node(&mut out, child, 0);
            }
        }
        _ => w.node(&mut out, node, 0),
    }
    Ok(out)
}

struct Writer<'d> {
    doc: &'d Document,
    prefix: &'d str,
    indent: &'d str,
    preserve_whitespace: bool,
}

impl Writer<'_> {
    fn indenting(&self) -> bool {
        !self.indent.is_empty()
    }

    fn pad(&self, out: &mut String, depth: usize) {
        if self.indenting() {
            out.push_str(self.prefix);
            for _ in 0..depth {
                out.push_str(self.indent);
            }
        }
    }

    fn newline(&self, out: &mut String) {
        if self.indenting() {
            out.push('\n');
        }
    }

    fn element(&self, out: &mut String, elem: NodeId, depth: usize) {
        let tag = self.doc.node_name(elem);
        self.pad(out, depth);
        out.push('<');
        out.push_str(&tag);
        for &attr in self.doc.attributes(elem) {
            let Some(node) = self.doc.node(attr) else {
                continue;
            };
            let Some((q, value)) = node.as_attribute() else {
                continue;
            };
            out.push(' ');
            out.push_str(&self.doc.qualified_name_str(q));
            // A value holding double quotes switches to single quotes so
            // embedded JSON stays readable; quotes inside are escaped
            // either way.
            if value.contains('"') {
                out.push_str("='");
                escape_into(out, value, Escape::SingleQuotedAttr, self.preserve_whitespace);
                out.push('\'');
            } else {
                out.push_str("=\"");
                escape_into(out, value, Escape::DoubleQuotedAttr, self.preserve_whitespace);
                out.push('"');
            }
        }
        if !self.doc.node(elem).is_some_and(|n| n.has_children()) {
            out.push_str("></");
            out.push_str(&tag);
            out.push('>');
            self.newline(out);
            return;
        }
        out.push('>');
        self.newline(out);
        for child in self.doc.children(elem) {
            self.node(out, child, depth + 1);
        }
        self.pad(out, depth);
        out.push_str("</");
        out.push_str(&tag);
        out.push('>');
        self.newline(out);
    }

    fn node(&self, out: &mut String, node: NodeId, depth: usize) {
        let Some(n) = self.doc.node(node) else { return };
        match &n.payload {
            Payload::Element { .. } => self.element(out, node, depth),
            Payload::Text(data) => {
                // Whitespace-only text is elided when indenting.
                if self.indenting() && data.trim().is_empty() {
                    return;
                }
                self.pad(out, depth);
                escape_into(out, data, Escape::Text, self.preserve_whitespace);
                self.newline(out);
            }
            Payload::CData(data) => {
                self.pad(out, depth);
                out.push_str("<![CDATA[");
                out.push_str(data);
                out.push_str("]]>");
                self.newline(out);
            }
            Payload::Comment(data) => {
                self.pad(out, depth);
                out.push_str("<!--");
                out.push_str(data);
                out.push_str("-->");
                self.newline(out);
            }
            Payload::ProcessingInstruction { target, data } => {
                self.pad(out, depth);
                out.push_str("<?");
                out.push_str(self.doc.names.get(*target));
                if !data.is_empty() {
                    out.push(' ');
                    out.push_str(data);
                }
                out.push_str("?>");
                self.newline(out);
            }
            // Attr, doctype, document, and fragment nodes have no direct
            // serialized form inside content.
            _ => {}
        }
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Escape {
    Text,
    DoubleQuotedAttr,
    SingleQuotedAttr,
}

fn escape_into(out: &mut String, s: &str, mode: Escape, preserve_whitespace: bool) {
    let bytes = s.as_bytes();
    // With whitespace preserved outside attributes only `& < >` can need
    // escaping, which is a straight memchr scan.
    if preserve_whitespace && mode == Escape::Text {
        let mut start = 0;
        while let Some(rel) = memchr3(b'&', b'<', b'>', &bytes[start..]) {
            let at = start + rel;
            out.push_str(&s[start..at]);
            out.push_str(match bytes[at] {
                b'&' => "&amp;",
                b'<' => "&lt;",
                _ => "&gt;",
            });
            start = at + 1;
        }
        out.push_str(&s[start..]);
        return;
    }

    let mut start = 0;
    for (i, &b) in bytes.iter().enumerate() {
        let esc: Option<&str> = match b {
            b'&' => Some("&amp;"),
            b'<' => Some("&lt;"),
            b'>' => Some("&gt;"),
            b'"' if mode == Escape::DoubleQuotedAttr => Some("&quot;"),
            b'\'' if mode != Escape::Text => Some("&apos;"),
            b'\n' if !preserve_whitespace => Some("&#xA;"),
            b'\t' if !preserve_whitespace => Some("&#x9;"),
            b'\r' if !preserve_whitespace => Some("&#xD;"),
            _ => None,
        };
        if let Some(esc) = esc {
            out.push_str(&s[start..i]);
            out.push_str(esc);
            start = i + 1;
        }
    }
    out.push_str(&s[start..]);
}

/// Escape a string for use in XML text content.
pub fn escape_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    escape_into(&mut out, s, Escape::Text, false);
    out
}
