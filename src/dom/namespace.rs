//! Namespace Resolution
//!
//! Stack-based namespace resolver used by the builder while the element
//! stack is open. The `xml` and `xmlns` prefixes are pre-bound and their
//! reservations enforced.

use crate::error::{Error, Result};

use super::names::{NameTable, Sym};

/// Namespace URI permanently bound to the `xml` prefix.
pub const XML_NS_URI: &str = "http://www.w3.org/XML/1998/namespace";

/// Namespace URI of `xmlns` declarations themselves.
pub const XMLNS_NS_URI: &str = "http://www.w3.org/2000/xmlns/";

/// Namespace binding (prefix -> URI); prefix 0 is the default namespace.
#[derive(Debug, Clone, Copy)]
struct NsBinding {
    prefix: Sym,
    uri: Sym,
    depth: u16,
}

/// Stack-based namespace resolver.
#[derive(Debug)]
pub struct NamespaceResolver {
    bindings: Vec<NsBinding>,
    depth: u16,
    xml_prefix: Sym,
    xmlns_prefix: Sym,
    xml_uri: Sym,
    xmlns_uri: Sym,
}

impl NamespaceResolver {
    /// Create a resolver with the xml and xmlns prefixes pre-bound.
    pub fn new(names: &mut NameTable) -> Self {
        let xml_prefix = names.intern("xml");
        let xmlns_prefix = names.intern("xmlns");
        let xml_uri = names.intern(XML_NS_URI);
        let xmlns_uri = names.intern(XMLNS_NS_URI);

        let mut resolver = NamespaceResolver {
            bindings: Vec::with_capacity(16),
            depth: 0,
            xml_prefix,
            xmlns_prefix,
            xml_uri,
            xmlns_uri,
        };
        resolver.bindings.push(NsBinding {
            prefix: xml_prefix,
            uri: xml_uri,
            depth: 0,
        });
        resolver.bindings.push(NsBinding {
            prefix: xmlns_prefix,
            uri: xmlns_uri,
            depth: 0,
        });
        resolver
    }

    /// Enter a new element scope.
    pub fn push_scope(&mut self) {
        self.depth += 1;
    }

    /// Leave an element scope, dropping its bindings.
    pub fn pop_scope(&mut self) {
        while let Some(binding) = self.bindings.last() {
            if binding.depth < self.depth {
                break;
            }
            self.bindings.pop();
        }
        self.depth = self.depth.saturating_sub(1);
    }

    /// Declare a binding in the current scope, enforcing the xml/xmlns
    /// reservations. `uri == 0` undeclares (namespaces 1.1).
    pub fn declare(&mut self, prefix: Sym, uri: Sym) -> Result<()> {
        if prefix == self.xmlns_prefix {
            return Err(Error::Namespace(
                "the xmlns prefix cannot be redeclared".into(),
            ));
        }
        if prefix == self.xml_prefix && uri != self.xml_uri {
            return Err(Error::Namespace(format!(
                "the xml prefix is bound to {}",
                XML_NS_URI
            )));
        }
        if uri == self.xml_uri && prefix != self.xml_prefix {
            return Err(Error::Namespace(format!(
                "{} can only bind the xml prefix",
                XML_NS_URI
            )));
        }
        if uri == self.xmlns_uri {
            return Err(Error::Namespace(format!(
                "{} cannot be declared",
                XMLNS_NS_URI
            )));
        }
        self.bindings.push(NsBinding {
            prefix,
            uri,
            depth: self.depth,
        });
        Ok(())
    }

    /// Declare the default namespace for the current scope.
    pub fn declare_default(&mut self, uri: Sym) -> Result<()> {
        self.declare(0, uri)
    }

    /// Resolve a prefix to a namespace URI Sym. Sym 0 means unbound.
    pub fn resolve(&self, prefix: Sym) -> Option<Sym> {
        for binding in self.bindings.iter().rev() {
            if binding.prefix == prefix {
                return if binding.uri == 0 {
                    None
                } else {
                    Some(binding.uri)
                };
            }
        }
        None
    }

    /// Resolve the default namespace.
    pub fn resolve_default(&self) -> Option<Sym> {
        self.resolve(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prebound_prefixes() {
        let mut names = NameTable::new();
        let resolver = NamespaceResolver::new(&mut names);
        let xml = names.intern("xml");
        assert!(resolver.resolve(xml).is_some());
    }

    #[test]
    fn declare_and_resolve() {
        let mut names = NameTable::new();
        let mut resolver = NamespaceResolver::new(&mut names);
        let svg = names.intern("svg");
        let uri = names.intern("http://www.w3.org/2000/svg");
        resolver.push_scope();
        resolver.declare(svg, uri).unwrap();
        assert_eq!(resolver.resolve(svg), Some(uri));
    }

    #[test]
    fn scope_pop_drops_bindings() {
        let mut names = NameTable::new();
        let mut resolver = NamespaceResolver::new(&mut names);
        let p = names.intern("foo");
        let uri = names.intern("http://example.com/foo");
        resolver.push_scope();
        resolver.declare(p, uri).unwrap();
        assert_eq!(resolver.resolve(p), Some(uri));
        resolver.pop_scope();
        assert_eq!(resolver.resolve(p), None);
    }

    #[test]
    fn shadowing_and_undeclare() {
        let mut names = NameTable::new();
        let mut resolver = NamespaceResolver::new(&mut names);
        let p = names.intern("ns");
        let uri1 = names.intern("http://example.com/ns1");
        let uri2 = names.intern("http://example.com/ns2");
        resolver.push_scope();
        resolver.declare(p, uri1).unwrap();
        resolver.push_scope();
        resolver.declare(p, uri2).unwrap();
        assert_eq!(resolver.resolve(p), Some(uri2));
        resolver.pop_scope();
        assert_eq!(resolver.resolve(p), Some(uri1));
        resolver.push_scope();
        resolver.declare(p, 0).unwrap();
        assert_eq!(resolver.resolve(p), None);
    }

    #[test]
    fn reservations_enforced() {
        let mut names = NameTable::new();
        let mut resolver = NamespaceResolver::new(&mut names);
        let xmlns = names.intern("xmlns");
        let xml = names.intern("xml");
        let other = names.intern("other");
        let xml_uri = names.intern(XML_NS_URI);
        let xmlns_uri = names.intern(XMLNS_NS_URI);
        let plain = names.intern("urn:x");
        assert!(resolver.declare(xmlns, plain).is_err());
        assert!(resolver.declare(xml, plain).is_err());
        assert!(resolver.declare(xml, xml_uri).is_ok());
        assert!(resolver.declare(other, xml_uri).is_err());
        assert!(resolver.declare(other, xmlns_uri).is_err());
    }
}
