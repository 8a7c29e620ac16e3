//! Parser/Builder
//!
//! Consumes tokenizer events and assembles a `Document`, maintaining a
//! stack of open elements and the in-scope namespace bindings. Every
//! created node records the source position of its markup.

use log::debug;
use memchr::memchr_iter;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::{Error, Position, Result};

use super::document::Document;
use super::names::Sym;
use super::namespace::{NamespaceResolver, XMLNS_NS_URI};
use super::node::{NodeId, Payload, QualifiedName, DOCUMENT_NODE};

/// Parse a UTF-8 document into a DOM tree.
pub(crate) fn build_document(input: &str) -> Result<Document> {
    let mut doc = Document::new();
    let ns = NamespaceResolver::new(&mut doc.names);
    let mut builder = TreeBuilder {
        doc,
        ns,
        input,
        lines: LineTracker::new(input),
        stack: vec![DOCUMENT_NODE],
        pending_text: String::new(),
        pending_pos: None,
        seen_doctype: false,
    };

    let mut reader = Reader::from_str(input);
    reader.config_mut().check_end_names = true;

    loop {
        let start = reader.buffer_position() as usize;
        match reader.read_event() {
            Err(e) => {
                let at = reader.error_position() as usize;
                let pos = builder.lines.position(at.min(input.len()));
                return Err(Error::parse(pos, e.to_string()));
            }
            Ok(Event::Eof) => break,
            Ok(event) => builder.handle(event, start)?,
        }
    }
    builder.finish()
}

/// Translates byte offsets into 1-based line/column positions.
/// Offsets must be fed in non-decreasing order.
struct LineTracker<'i> {
    input: &'i str,
    offset: usize,
    line: u32,
    line_start: usize,
}

impl<'i> LineTracker<'i> {
    fn new(input: &'i str) -> Self {
        LineTracker {
            input,
            offset: 0,
            line: 1,
            line_start: 0,
        }
    }

    fn position(&mut self, offset: usize) -> Position {
        let offset = offset.min(self.input.len());
        if offset > self.offset {
            let slice = &self.input.as_bytes()[self.offset..offset];
            for nl in memchr_iter(b'\n', slice) {
                self.line += 1;
                self.line_start = self.offset + nl + 1;
            }
            self.offset = offset;
        }
        let col_start = self.line_start.min(offset);
        let column = self
            .input
            .get(col_start..offset)
            .map(|s| s.chars().count())
            .unwrap_or(offset - col_start) as u32
            + 1;
        Position::new(self.line, column, offset)
    }
}

struct TreeBuilder<'i> {
    doc: Document,
    ns: NamespaceResolver,
    input: &'i str,
    lines: LineTracker<'i>,
    /// Open containers; the bottom entry is the document node.
    stack: Vec<NodeId>,
    /// Consecutive character-data events merge into one Text node.
    pending_text: String,
    pending_pos: Option<Position>,
    seen_doctype: bool,
}

impl TreeBuilder<'_> {
    fn handle(&mut self, event: Event<'_>, offset: usize) -> Result<()> {
        let pos = self.lines.position(offset);
        match event {
            Event::Start(e) => {
                self.flush_text()?;
                self.open_element(&e, pos, false)
            }
            Event::Empty(e) => {
                self.flush_text()?;
                self.open_element(&e, pos, true)
            }
            Event::End(_) => {
                self.flush_text()?;
                if self.stack.len() <= 1 {
                    return Err(Error::parse(pos, "end tag without matching start tag"));
                }
                self.stack.pop();
                self.ns.pop_scope();
                Ok(())
            }
            Event::Text(e) => {
                let text = e
                    .unescape()
                    .map_err(|err| Error::parse(pos, err.to_string()))?;
                if self.at_document_level() {
                    if !text.bytes().all(|b| matches!(b, b' ' | b'\t' | b'\n' | b'\r')) {
                        return Err(Error::parse(
                            pos,
                            "character data is not allowed outside the document element",
                        ));
                    }
                    return Ok(());
                }
                if self.pending_text.is_empty() {
                    self.pending_pos = Some(pos);
                }
                self.pending_text.push_str(&text);
                Ok(())
            }
            Event::CData(e) => {
                self.flush_text()?;
                if self.at_document_level() {
                    return Err(Error::parse(
                        pos,
                        "CDATA section is not allowed outside the document element",
                    ));
                }
                let data = std::str::from_utf8(&e.into_inner())
                    .map_err(|_| Error::parse(pos, "CDATA section is not valid UTF-8"))?
                    .to_string();
                let id = self.doc.alloc_at(Payload::CData(data), Some(pos));
                self.append(id);
                Ok(())
            }
            Event::Comment(e) => {
                self.flush_text()?;
                let data = std::str::from_utf8(e.as_ref())
                    .map_err(|_| Error::parse(pos, "comment is not valid UTF-8"))?
                    .to_string();
                let id = self.doc.alloc_at(Payload::Comment(data), Some(pos));
                self.append(id);
                Ok(())
            }
            Event::PI(e) => {
                self.flush_text()?;
                let target = std::str::from_utf8(e.target())
                    .map_err(|_| Error::parse(pos, "processing instruction target"))?;
                let data = std::str::from_utf8(e.content())
                    .map_err(|_| Error::parse(pos, "processing instruction data"))?
                    .trim_start()
                    .to_string();
                let target = self.doc.names.intern(target);
                let id = self
                    .doc
                    .alloc_at(Payload::ProcessingInstruction { target, data }, Some(pos));
                self.append(id);
                Ok(())
            }
            Event::DocType(e) => {
                if self.seen_doctype {
                    return Err(Error::parse(pos, "multiple DOCTYPE declarations"));
                }
                if !self.at_document_level() || self.doc.document_element().is_some() {
                    return Err(Error::parse(
                        pos,
                        "DOCTYPE must precede the document element",
                    ));
                }
                self.seen_doctype = true;
                let raw = std::str::from_utf8(e.as_ref())
                    .map_err(|_| Error::parse(pos, "DOCTYPE is not valid UTF-8"))?;
                let (name, public_id, system_id, subset) = parse_doctype(raw, pos)?;
                let name = self.doc.names.intern(&name);
                let id = self.doc.alloc_at(
                    Payload::DocumentType {
                        name,
                        public_id,
                        system_id,
                        internal_subset: subset,
                    },
                    Some(pos),
                );
                self.append(id);
                Ok(())
            }
            Event::Decl(_) => Ok(()),
            Event::Eof => Ok(()),
        }
    }

    fn at_document_level(&self) -> bool {
        self.stack.len() == 1
    }

    fn append(&mut self, id: NodeId) {
        let parent = *self.stack.last().unwrap_or(&DOCUMENT_NODE);
        self.doc.link_child(parent, id);
    }

    fn flush_text(&mut self) -> Result<()> {
        if self.pending_text.is_empty() {
            return Ok(());
        }
        let data = std::mem::take(&mut self.pending_text);
        let pos = self.pending_pos.take();
        let id = self.doc.alloc_at(Payload::Text(data), pos);
        self.append(id);
        Ok(())
    }

    fn open_element(&mut self, e: &BytesStart<'_>, pos: Position, is_empty: bool) -> Result<()> {
        if self.at_document_level() && self.doc.document_element().is_some() {
            return Err(Error::parse(pos, "content after the document element"));
        }
        self.ns.push_scope();

        let tag = std::str::from_utf8(e.name().as_ref())
            .map_err(|_| Error::parse(pos, "element name is not valid UTF-8"))?
            .to_string();

        // Collect attributes up front: declarations must be in scope before
        // any name on this tag is resolved.
        let mut raw_attrs: Vec<(String, String)> = Vec::new();
        for attr in e.attributes() {
            let attr = attr.map_err(|err| Error::parse(pos, err.to_string()))?;
            let key = std::str::from_utf8(attr.key.as_ref())
                .map_err(|_| Error::parse(pos, "attribute name is not valid UTF-8"))?
                .to_string();
            let value = attr
                .unescape_value()
                .map_err(|err| Error::parse(pos, err.to_string()))?
                .into_owned();
            raw_attrs.push((key, value));
        }
        for (key, value) in &raw_attrs {
            if key == "xmlns" {
                let uri = self.doc.names.intern(value);
                self.ns
                    .declare_default(uri)
                    .map_err(|err| Error::parse(pos, err.to_string()))?;
            } else if let Some(prefix) = key.strip_prefix("xmlns:") {
                if prefix.is_empty() {
                    return Err(Error::parse(pos, "namespace declaration without a prefix"));
                }
                let prefix = self.doc.names.intern(prefix);
                let uri = self.doc.names.intern(value);
                self.ns
                    .declare(prefix, uri)
                    .map_err(|err| Error::parse(pos, err.to_string()))?;
            }
        }

        let name = self.resolve_element_name(&tag, pos)?;
        let elem = self.doc.alloc_at(
            Payload::Element {
                name,
                attrs: Vec::new(),
            },
            Some(pos),
        );

        let mut seen_keys: Vec<u32> = Vec::with_capacity(raw_attrs.len());
        for (key, value) in &raw_attrs {
            let name = self.resolve_attribute_name(key, pos)?;
            if seen_keys.contains(&name.name) {
                return Err(Error::parse(
                    pos,
                    format!("duplicate attribute {:?}", key),
                ));
            }
            seen_keys.push(name.name);
            let attr = self.doc.alloc_at(
                Payload::Attribute {
                    name,
                    value: value.clone(),
                    specified: true,
                    owner: None,
                },
                Some(pos),
            );
            self.doc.push_attr(elem, attr);
        }

        self.append(elem);
        if is_empty {
            self.ns.pop_scope();
        } else {
            self.stack.push(elem);
        }
        Ok(())
    }

    fn resolve_element_name(&mut self, tag: &str, pos: Position) -> Result<QualifiedName> {
        match tag.split_once(':') {
            Some((prefix, local)) if !prefix.is_empty() && !local.is_empty() => {
                let prefix_sym = self.doc.names.intern(prefix);
                let uri = self.ns.resolve(prefix_sym).ok_or_else(|| {
                    Error::parse(pos, format!("unbound namespace prefix {:?}", prefix))
                })?;
                let local_sym = self.doc.names.intern(local);
                let name = self.doc.names.intern_name(Some(uri), local_sym);
                Ok(QualifiedName {
                    name,
                    prefix: Some(prefix_sym),
                })
            }
            Some(_) => Err(Error::parse(pos, format!("malformed name {:?}", tag))),
            None => {
                let local_sym = self.doc.names.intern(tag);
                let uri = self.ns.resolve_default();
                let name = self.doc.names.intern_name(uri, local_sym);
                Ok(QualifiedName { name, prefix: None })
            }
        }
    }

    fn resolve_attribute_name(&mut self, key: &str, pos: Position) -> Result<QualifiedName> {
        match key.split_once(':') {
            Some((prefix, local)) if !prefix.is_empty() && !local.is_empty() => {
                let prefix_sym = self.doc.names.intern(prefix);
                let uri = self.ns.resolve(prefix_sym).ok_or_else(|| {
                    Error::parse(pos, format!("unbound namespace prefix {:?}", prefix))
                })?;
                let local_sym = self.doc.names.intern(local);
                let name = self.doc.names.intern_name(Some(uri), local_sym);
                Ok(QualifiedName {
                    name,
                    prefix: Some(prefix_sym),
                })
            }
            Some(_) => Err(Error::parse(pos, format!("malformed name {:?}", key))),
            None => {
                // Unprefixed attributes are in no namespace; the reserved
                // "xmlns" name itself lives in the xmlns namespace.
                let uri: Option<Sym> = if key == "xmlns" {
                    Some(self.doc.names.intern(XMLNS_NS_URI))
                } else {
                    None
                };
                let local_sym = self.doc.names.intern(key);
                let name = self.doc.names.intern_name(uri, local_sym);
                Ok(QualifiedName { name, prefix: None })
            }
        }
    }

    fn finish(mut self) -> Result<Document> {
        self.flush_text()?;
        if self.stack.len() != 1 {
            let pos = self.lines.position(self.input.len());
            return Err(Error::parse(pos, "unclosed element at end of input"));
        }
        if self.doc.document_element().is_none() {
            let pos = self.lines.position(self.input.len());
            return Err(Error::parse(pos, "document has no document element"));
        }
        debug!(
            "built document: {} nodes, {} interned names",
            self.doc.node_count(),
            self.doc.names.len()
        );
        Ok(self.doc)
    }
}

/// Split a raw `<!DOCTYPE …>` body into name, public/system ids, and the
/// internal subset source.
fn parse_doctype(
    raw: &str,
    pos: Position,
) -> Result<(String, Option<String>, Option<String>, Option<String>)> {
    let s = raw.trim();
    let name_end = s
        .find(|c: char| c.is_ascii_whitespace() || c == '[')
        .unwrap_or(s.len());
    let name = s[..name_end].to_string();
    if name.is_empty() {
        return Err(Error::parse(pos, "DOCTYPE without a name"));
    }
    let mut rest = s[name_end..].trim_start();

    let mut public_id = None;
    let mut system_id = None;
    if let Some(after) = rest.strip_prefix("PUBLIC") {
        let (lit, after) = read_quoted(after.trim_start(), pos)?;
        public_id = Some(lit);
        let after = after.trim_start();
        if after.starts_with('"') || after.starts_with('\'') {
            let (lit, after2) = read_quoted(after, pos)?;
            system_id = Some(lit);
            rest = after2;
        } else {
            rest = after;
        }
    } else if let Some(after) = rest.strip_prefix("SYSTEM") {
        let (lit, after) = read_quoted(after.trim_start(), pos)?;
        system_id = Some(lit);
        rest = after;
    }

    let internal_subset = match rest.find('[') {
        Some(open) => match rest.rfind(']') {
            Some(close) if close > open => Some(rest[open + 1..close].to_string()),
            _ => return Err(Error::parse(pos, "unterminated internal subset")),
        },
        None => None,
    };

    Ok((name, public_id, system_id, internal_subset))
}

fn read_quoted(s: &str, pos: Position) -> Result<(String, &str)> {
    let mut chars = s.chars();
    let quote = match chars.next() {
        Some(q @ ('"' | '\'')) => q,
        _ => return Err(Error::parse(pos, "expected quoted literal in DOCTYPE")),
    };
    match s[1..].find(quote) {
        Some(end) => Ok((s[1..1 + end].to_string(), &s[2 + end..])),
        None => Err(Error::parse(pos, "unterminated literal in DOCTYPE")),
    }
}
