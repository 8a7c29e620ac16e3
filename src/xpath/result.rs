//! Caller-requested XPath result types
//!
//! Mirrors the DOM XPathResult surface: the caller asks for one of ten
//! result types and reads the matching accessor. Iterator results bind
//! the document's mutation version and go stale on any mutation;
//! snapshots are copies and stay valid.

use crate::dom::{Document, NodeId};
use crate::error::{Error, Result};

use super::eval::{evaluate_with, EvalOptions};
use super::value::Value;

/// Result-type constants. Values are contractual.
pub mod result_type {
    pub const ANY: u16 = 0;
    pub const NUMBER: u16 = 1;
    pub const STRING: u16 = 2;
    pub const BOOLEAN: u16 = 3;
    pub const UNORDERED_NODE_ITERATOR: u16 = 4;
    pub const ORDERED_NODE_ITERATOR: u16 = 5;
    pub const UNORDERED_NODE_SNAPSHOT: u16 = 6;
    pub const ORDERED_NODE_SNAPSHOT: u16 = 7;
    pub const ANY_UNORDERED_NODE: u16 = 8;
    pub const FIRST_ORDERED_NODE: u16 = 9;
}

use result_type::*;

#[derive(Debug, Clone)]
enum ResultValue {
    Number(f64),
    String(String),
    Boolean(bool),
    /// Snapshot or iterator backing store, in document order.
    Nodes(Vec<NodeId>),
    SingleNode(Option<NodeId>),
}

/// A typed XPath evaluation result.
#[derive(Debug, Clone)]
pub struct XPathResult {
    kind: u16,
    value: ResultValue,
    /// Document version captured at evaluation time (iterator kinds).
    doc_version: u64,
    cursor: usize,
}

/// Evaluate an expression and coerce the result to a requested type.
pub fn evaluate_as(
    doc: &Document,
    context: NodeId,
    source: &str,
    requested: u16,
    opts: &EvalOptions,
) -> Result<XPathResult> {
    let value = evaluate_with(doc, context, source, opts)?;
    XPathResult::from_value(doc, value, requested)
}

impl XPathResult {
    fn from_value(doc: &Document, value: Value, requested: u16) -> Result<XPathResult> {
        let kind = match requested {
            ANY => match &value {
                Value::NodeSet(_) => UNORDERED_NODE_ITERATOR,
                Value::Number(_) => NUMBER,
                Value::String(_) => STRING,
                Value::Boolean(_) => BOOLEAN,
            },
            k if k <= FIRST_ORDERED_NODE => k,
            other => {
                return Err(Error::Type(format!(
                    "unknown result type {}",
                    other
                )))
            }
        };

        let value = match kind {
            NUMBER => ResultValue::Number(value.number_value(doc)),
            STRING => ResultValue::String(value.string_value(doc)),
            BOOLEAN => ResultValue::Boolean(value.boolean_value()),
            _ => match value {
                Value::NodeSet(nodes) => match kind {
                    ANY_UNORDERED_NODE | FIRST_ORDERED_NODE => {
                        ResultValue::SingleNode(nodes.first().copied())
                    }
                    _ => ResultValue::Nodes(nodes),
                },
                other => {
                    return Err(Error::Type(format!(
                        "cannot coerce a {} to a node-set result",
                        other.type_name()
                    )))
                }
            },
        };

        Ok(XPathResult {
            kind,
            value,
            doc_version: doc.version(),
            cursor: 0,
        })
    }

    pub fn result_type(&self) -> u16 {
        self.kind
    }

    pub fn number_value(&self) -> Result<f64> {
        match &self.value {
            ResultValue::Number(n) => Ok(*n),
            _ => Err(Error::Type("result is not a number".into())),
        }
    }

    pub fn string_value(&self) -> Result<&str> {
        match &self.value {
            ResultValue::String(s) => Ok(s),
            _ => Err(Error::Type("result is not a string".into())),
        }
    }

    pub fn boolean_value(&self) -> Result<bool> {
        match &self.value {
            ResultValue::Boolean(b) => Ok(*b),
            _ => Err(Error::Type("result is not a boolean".into())),
        }
    }

    pub fn single_node_value(&self) -> Result<Option<NodeId>> {
        match &self.value {
            ResultValue::SingleNode(n) => Ok(*n),
            _ => Err(Error::Type("result is not a single node".into())),
        }
    }

    pub fn snapshot_length(&self) -> Result<usize> {
        match (&self.value, self.kind) {
            (ResultValue::Nodes(nodes), UNORDERED_NODE_SNAPSHOT | ORDERED_NODE_SNAPSHOT) => {
                Ok(nodes.len())
            }
            _ => Err(Error::Type("result is not a snapshot".into())),
        }
    }

    pub fn snapshot_item(&self, index: usize) -> Result<Option<NodeId>> {
        match (&self.value, self.kind) {
            (ResultValue::Nodes(nodes), UNORDERED_NODE_SNAPSHOT | ORDERED_NODE_SNAPSHOT) => {
                Ok(nodes.get(index).copied())
            }
            _ => Err(Error::Type("result is not a snapshot".into())),
        }
    }

    /// Advance an iterator result. Fails with INVALID_STATE once the
    /// underlying document has been mutated since evaluation.
    pub fn iterate_next(&mut self, doc: &Document) -> Result<Option<NodeId>> {
        match (&self.value, self.kind) {
            (ResultValue::Nodes(nodes), UNORDERED_NODE_ITERATOR | ORDERED_NODE_ITERATOR) => {
                if doc.version() != self.doc_version {
                    return Err(Error::InvalidState(
                        "iterator invalidated by document mutation".into(),
                    ));
                }
                let next = nodes.get(self.cursor).copied();
                if next.is_some() {
                    self.cursor += 1;
                }
                Ok(next)
            }
            _ => Err(Error::Type("result is not an iterator".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::DOCUMENT_NODE;

    fn doc() -> Document {
        Document::parse_str("<r><x>1</x><x>2</x><x>3</x></r>").unwrap()
    }

    fn opts() -> EvalOptions {
        EvalOptions::default()
    }

    #[test]
    fn number_string_boolean_coercions() {
        let d = doc();
        let r = evaluate_as(&d, DOCUMENT_NODE, "count(/r/x)", result_type::NUMBER, &opts()).unwrap();
        assert_eq!(r.number_value().unwrap(), 3.0);
        let r = evaluate_as(&d, DOCUMENT_NODE, "/r/x[2]", result_type::STRING, &opts()).unwrap();
        assert_eq!(r.string_value().unwrap(), "2");
        let r = evaluate_as(&d, DOCUMENT_NODE, "/r/missing", result_type::BOOLEAN, &opts()).unwrap();
        assert!(!r.boolean_value().unwrap());
        // Wrong accessor for the type.
        assert!(r.number_value().is_err());
    }

    #[test]
    fn snapshot_is_stable_under_mutation() {
        let mut d = doc();
        let r = evaluate_as(
            &d,
            DOCUMENT_NODE,
            "/r/x",
            result_type::ORDERED_NODE_SNAPSHOT,
            &opts(),
        )
        .unwrap();
        assert_eq!(r.snapshot_length().unwrap(), 3);
        let root = d.document_element().unwrap();
        let extra = d.create_element("x").unwrap();
        d.append_child(root, extra).unwrap();
        // Snapshot still reports the state at evaluation time.
        assert_eq!(r.snapshot_length().unwrap(), 3);
        let first = r.snapshot_item(0).unwrap().unwrap();
        assert_eq!(d.string_value(first), "1");
        assert!(r.snapshot_item(7).unwrap().is_none());
    }

    #[test]
    fn iterator_goes_stale_on_mutation() {
        let mut d = doc();
        let mut r = evaluate_as(
            &d,
            DOCUMENT_NODE,
            "/r/x",
            result_type::ORDERED_NODE_ITERATOR,
            &opts(),
        )
        .unwrap();
        let first = r.iterate_next(&d).unwrap().unwrap();
        assert_eq!(d.string_value(first), "1");
        let root = d.document_element().unwrap();
        d.set_attribute(root, "touched", "yes").unwrap();
        assert!(matches!(
            r.iterate_next(&d),
            Err(Error::InvalidState(_))
        ));
    }

    #[test]
    fn iterator_drains_in_document_order() {
        let d = doc();
        let mut r = evaluate_as(
            &d,
            DOCUMENT_NODE,
            "/r/x",
            result_type::ORDERED_NODE_ITERATOR,
            &opts(),
        )
        .unwrap();
        let mut values = Vec::new();
        while let Some(n) = r.iterate_next(&d).unwrap() {
            values.push(d.string_value(n));
        }
        assert_eq!(values, vec!["1", "2", "3"]);
    }

    #[test]
    fn first_ordered_node() {
        let d = doc();
        let r = evaluate_as(
            &d,
            DOCUMENT_NODE,
            "/r/x[last()]",
            result_type::FIRST_ORDERED_NODE,
            &opts(),
        )
        .unwrap();
        let node = r.single_node_value().unwrap().unwrap();
        assert_eq!(d.string_value(node), "3");
        let r = evaluate_as(
            &d,
            DOCUMENT_NODE,
            "/r/missing",
            result_type::ANY_UNORDERED_NODE,
            &opts(),
        )
        .unwrap();
        assert!(r.single_node_value().unwrap().is_none());
    }

    #[test]
    fn reverse_axis_snapshot_is_in_document_order() {
        let d = Document::parse_str("<r><a><b/></a></r>").unwrap();
        let b = match crate::xpath::evaluate(&d, DOCUMENT_NODE, "//b").unwrap() {
            Value::NodeSet(nodes) => nodes[0],
            other => panic!("expected node-set, got {:?}", other),
        };
        let r = evaluate_as(
            &d,
            b,
            "ancestor::*",
            result_type::ORDERED_NODE_SNAPSHOT,
            &opts(),
        )
        .unwrap();
        assert_eq!(r.snapshot_length().unwrap(), 2);
        let names: Vec<String> = (0..2)
            .map(|i| d.node_name(r.snapshot_item(i).unwrap().unwrap()))
            .collect();
        assert_eq!(names, vec!["r", "a"]);
    }

    #[test]
    fn any_resolves_to_natural_type() {
        let d = doc();
        let r = evaluate_as(&d, DOCUMENT_NODE, "1 + 1", result_type::ANY, &opts()).unwrap();
        assert_eq!(r.result_type(), result_type::NUMBER);
        let r = evaluate_as(&d, DOCUMENT_NODE, "/r/x", result_type::ANY, &opts()).unwrap();
        assert_eq!(r.result_type(), result_type::UNORDERED_NODE_ITERATOR);
    }

    #[test]
    fn primitive_as_nodeset_is_type_error() {
        let d = doc();
        assert!(matches!(
            evaluate_as(
                &d,
                DOCUMENT_NODE,
                "1 + 1",
                result_type::ORDERED_NODE_SNAPSHOT,
                &opts()
            ),
            Err(Error::Type(_))
        ));
    }

    #[test]
    fn number_result_formats_via_xpath_rules() {
        let d = doc();
        let r = evaluate_as(&d, DOCUMENT_NODE, "0 div 0", result_type::STRING, &opts()).unwrap();
        assert_eq!(r.string_value().unwrap(), "NaN");
        let r = evaluate_as(&d, DOCUMENT_NODE, "4 div 2", result_type::STRING, &opts()).unwrap();
        assert_eq!(r.string_value().unwrap(), "2");
    }
}
