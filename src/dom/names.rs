//! Name Table
//!
//! Interns strings and (namespace URI, local name) pairs so that element and
//! attribute identity is a single integer compare. The table is append-only
//! for the lifetime of its document; ids are never recycled.

use std::collections::HashMap;

/// Interned string id. Sym 0 is reserved for the empty string.
pub type Sym = u32;

/// Interned (namespace URI, local name) pair id.
pub type ExpandedNameId = u32;

/// String and expanded-name interning table, owned by a `Document`.
#[derive(Debug, Default)]
pub struct NameTable {
    /// All strings stored contiguously
    data: Vec<u8>,
    /// Map from string content to Sym
    index: HashMap<Box<str>, Sym>,
    /// Sym -> (offset, length) into `data`
    entries: Vec<(u32, u32)>,
    /// ExpandedNameId -> (namespace URI or none, local name)
    names: Vec<(Option<Sym>, Sym)>,
    /// Reverse map for expanded-name interning
    name_index: HashMap<(Option<Sym>, Sym), ExpandedNameId>,
}

impl NameTable {
    pub fn new() -> Self {
        let mut table = NameTable {
            data: Vec::with_capacity(1024),
            index: HashMap::new(),
            entries: Vec::with_capacity(64),
            names: Vec::with_capacity(32),
            name_index: HashMap::new(),
        };
        // Sym 0 is reserved for "no string"
        table.entries.push((0, 0));
        table
    }

    /// Intern a string, returning its Sym.
    ///
    /// Interning the same content twice returns the same id.
    pub fn intern(&mut self, s: &str) -> Sym {
        if s.is_empty() {
            return 0;
        }
        if let Some(&id) = self.index.get(s) {
            return id;
        }
        let offset = self.data.len() as u32;
        self.data.extend_from_slice(s.as_bytes());
        let id = self.entries.len() as Sym;
        self.entries.push((offset, s.len() as u32));
        self.index.insert(s.into(), id);
        id
    }

    /// Get the string for a Sym. Unknown ids resolve to the empty string.
    pub fn get(&self, id: Sym) -> &str {
        match self.entries.get(id as usize) {
            Some(&(offset, len)) => {
                let start = offset as usize;
                // The table only ever stores whole UTF-8 strings.
                std::str::from_utf8(&self.data[start..start + len as usize]).unwrap_or("")
            }
            None => "",
        }
    }

    /// Intern an expanded name, returning its id. Two ids compare equal
    /// exactly when both the URI and the local name compare equal.
    pub fn intern_name(&mut self, uri: Option<Sym>, local: Sym) -> ExpandedNameId {
        let key = (uri, local);
        if let Some(&id) = self.name_index.get(&key) {
            return id;
        }
        let id = self.names.len() as ExpandedNameId;
        self.names.push(key);
        self.name_index.insert(key, id);
        id
    }

    /// Decompose an expanded-name id back into its (URI, local) Syms.
    pub fn expanded(&self, id: ExpandedNameId) -> (Option<Sym>, Sym) {
        self.names.get(id as usize).copied().unwrap_or((None, 0))
    }

    /// Namespace URI of an expanded name, if any.
    pub fn uri_of(&self, id: ExpandedNameId) -> Option<&str> {
        let (uri, _) = self.expanded(id);
        uri.map(|u| self.get(u))
    }

    /// Local name of an expanded name.
    pub fn local_of(&self, id: ExpandedNameId) -> &str {
        let (_, local) = self.expanded(id);
        self.get(local)
    }

    /// Number of unique strings stored (including the reserved empty entry).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.len() <= 1
    }
}

// ----------------------------------------------------------------------
// XML Names validation
// ----------------------------------------------------------------------

/// NameStartChar from XML 1.0 fifth edition (the ':' is handled by callers).
fn is_name_start_char(c: char) -> bool {
    matches!(c,
        ':' | '_' | 'A'..='Z' | 'a'..='z'
        | '\u{C0}'..='\u{D6}' | '\u{D8}'..='\u{F6}' | '\u{F8}'..='\u{2FF}'
        | '\u{370}'..='\u{37D}' | '\u{37F}'..='\u{1FFF}'
        | '\u{200C}'..='\u{200D}' | '\u{2070}'..='\u{218F}'
        | '\u{2C00}'..='\u{2FEF}' | '\u{3001}'..='\u{D7FF}'
        | '\u{F900}'..='\u{FDCF}' | '\u{FDF0}'..='\u{FFFD}'
        | '\u{10000}'..='\u{EFFFF}')
}

fn is_name_char(c: char) -> bool {
    is_name_start_char(c)
        || matches!(c, '-' | '.' | '0'..='9' | '\u{B7}' | '\u{300}'..='\u{36F}' | '\u{203F}'..='\u{2040}')
}

/// Validate an XML Name (colons permitted).
pub(crate) fn validate_name(s: &str) -> crate::error::Result<()> {
    let mut chars = s.chars();
    let valid = match chars.next() {
        Some(first) => is_name_start_char(first) && chars.all(is_name_char),
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(crate::error::Error::InvalidCharacter(s.to_string()))
    }
}

fn validate_ncname(s: &str) -> crate::error::Result<()> {
    validate_name(s)?;
    if s.contains(':') {
        return Err(crate::error::Error::Namespace(format!(
            "{:?} must not contain a colon",
            s
        )));
    }
    Ok(())
}

/// Split a qualified name into (prefix, local) and validate both parts.
pub(crate) fn split_qname(qname: &str) -> crate::error::Result<(Option<&str>, &str)> {
    match qname.split_once(':') {
        Some((prefix, local)) => {
            if prefix.is_empty() || local.is_empty() {
                return Err(crate::error::Error::Namespace(format!(
                    "malformed qualified name {:?}",
                    qname
                )));
            }
            validate_ncname(prefix)?;
            validate_ncname(local)?;
            Ok((Some(prefix), local))
        }
        None => {
            validate_ncname(qname)?;
            Ok((None, qname))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intern_new() {
        let mut table = NameTable::new();
        let id = table.intern("title");
        assert!(id > 0);
        assert_eq!(table.get(id), "title");
    }

    #[test]
    fn intern_duplicate() {
        let mut table = NameTable::new();
        assert_eq!(table.intern("book"), table.intern("book"));
    }

    #[test]
    fn intern_different() {
        let mut table = NameTable::new();
        assert_ne!(table.intern("book"), table.intern("title"));
    }

    #[test]
    fn empty_string_is_sym_zero() {
        let mut table = NameTable::new();
        assert_eq!(table.intern(""), 0);
        assert_eq!(table.get(0), "");
    }

    #[test]
    fn expanded_name_identity() {
        let mut table = NameTable::new();
        let uri = table.intern("http://example.com/ns");
        let local = table.intern("item");
        let a = table.intern_name(Some(uri), local);
        let b = table.intern_name(Some(uri), local);
        let c = table.intern_name(None, local);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(table.local_of(a), "item");
        assert_eq!(table.uri_of(a), Some("http://example.com/ns"));
        assert_eq!(table.uri_of(c), None);
    }

    #[test]
    fn name_validation() {
        assert!(validate_name("book").is_ok());
        assert!(validate_name("_x-1.y").is_ok());
        assert!(validate_name("ns:book").is_ok());
        assert!(validate_name("1bad").is_err());
        assert!(validate_name("").is_err());
        assert!(validate_name("a b").is_err());
    }

    #[test]
    fn qname_splitting() {
        assert_eq!(split_qname("p:x").unwrap(), (Some("p"), "x"));
        assert_eq!(split_qname("x").unwrap(), (None, "x"));
        assert!(split_qname(":x").is_err());
        assert!(split_qname("p:").is_err());
        assert!(split_qname("a:b:c").is_err());
    }
}
