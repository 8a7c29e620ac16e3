//! XPath Evaluation Engine
//!
//! Evaluates compiled expressions against a document. Steps apply their
//! predicates per context node in axis order, so position() counts from
//! the context end on reverse axes; every node-set pushed on the stack is
//! deduplicated and sorted into document order.

use std::collections::{HashMap, HashSet};

use crate::dom::{DocOrder, Document, NodeId, NodeKind, DOCUMENT_NODE};
use crate::error::{Error, Result};

use super::axes::navigate;
use super::compiler::{self, CompiledExpr, Op};
use super::functions;
use super::parser::{Axis, BinaryOp, NodeTest};
use super::value::{string_to_number, Value};

/// Caller-supplied evaluation options: a namespace-prefix resolver and
/// variable bindings. With no resolver, prefixes in name tests resolve
/// against the context node's in-scope declarations.
#[derive(Default)]
pub struct EvalOptions {
    pub namespaces: Option<HashMap<String, String>>,
    pub variables: Option<HashMap<String, Value>>,
}

/// Evaluation context threaded through the op interpreter.
pub(crate) struct EvalContext<'a> {
    pub doc: &'a Document,
    pub node: NodeId,
    pub position: usize,
    pub size: usize,
    pub opts: &'a EvalOptions,
    pub order: &'a DocOrder,
}

impl<'a> EvalContext<'a> {
    fn at(&self, node: NodeId, position: usize, size: usize) -> EvalContext<'a> {
        EvalContext {
            doc: self.doc,
            node,
            position,
            size,
            opts: self.opts,
            order: self.order,
        }
    }
}

/// Evaluate an expression from a context node with default options.
pub fn evaluate(doc: &Document, context: NodeId, source: &str) -> Result<Value> {
    evaluate_with(doc, context, source, &EvalOptions::default())
}

/// Evaluate an expression from a context node with options.
pub fn evaluate_with(
    doc: &Document,
    context: NodeId,
    source: &str,
    opts: &EvalOptions,
) -> Result<Value> {
    let compiled = compiler::compile(source)?;
    let order = doc.document_order();
    let ctx = EvalContext {
        doc,
        node: context,
        position: 1,
        size: 1,
        opts,
        order: &order,
    };
    eval_compiled(&compiled, &ctx)
}

/// A node test with its prefix resolved to a concrete URI.
enum ResolvedTest<'t> {
    Name {
        uri: Option<String>,
        local: Option<&'t str>,
    },
    /// A prefix with no in-scope binding: matches nothing.
    Nothing,
    Node,
    Text,
    Comment,
    Pi(Option<&'t str>),
}

pub(crate) fn eval_compiled(program: &CompiledExpr, ctx: &EvalContext<'_>) -> Result<Value> {
    let mut stack: Vec<Value> = Vec::with_capacity(4);

    for op in &program.ops {
        match op {
            Op::Root => stack.push(Value::NodeSet(vec![DOCUMENT_NODE])),
            Op::Context => stack.push(Value::NodeSet(vec![ctx.node])),

            Op::Step {
                axis,
                test,
                predicates,
            } => {
                let input = pop_nodeset(&mut stack, "location step")?;
                let mut seen: HashSet<NodeId> = HashSet::new();
                let mut result: Vec<NodeId> = Vec::new();
                for &context_node in &input {
                    let resolved = resolve_test(test, context_node, ctx)?;
                    let mut candidates: Vec<NodeId> = Vec::new();
                    for candidate in navigate(ctx.doc, context_node, *axis) {
                        if matches_test(ctx.doc, candidate, *axis, &resolved) {
                            candidates.push(candidate);
                        }
                    }
                    for predicate in predicates {
                        candidates = apply_predicate(candidates, predicate, ctx)?;
                    }
                    for c in candidates {
                        if seen.insert(c) {
                            result.push(c);
                        }
                    }
                }
                ctx.order.sort(&mut result);
                stack.push(Value::NodeSet(result));
            }

            Op::Predicate(predicate) => {
                let input = pop_nodeset(&mut stack, "predicate")?;
                let kept = apply_predicate(input, predicate, ctx)?;
                stack.push(Value::NodeSet(kept));
            }

            Op::Union => {
                let right = pop_nodeset(&mut stack, "union")?;
                let left = pop_nodeset(&mut stack, "union")?;
                let mut seen: HashSet<NodeId> = left.iter().copied().collect();
                let mut merged = left;
                for node in right {
                    if seen.insert(node) {
                        merged.push(node);
                    }
                }
                ctx.order.sort(&mut merged);
                stack.push(Value::NodeSet(merged));
            }

            Op::Number(n) => stack.push(Value::Number(*n)),
            Op::Literal(s) => stack.push(Value::String(s.clone())),

            Op::Variable(name) => {
                let value = ctx
                    .opts
                    .variables
                    .as_ref()
                    .and_then(|vars| vars.get(name))
                    .cloned()
                    .ok_or_else(|| Error::UnresolvedVariable(name.clone()))?;
                stack.push(value);
            }

            Op::Call(name, argc) => {
                let mut args = Vec::with_capacity(*argc);
                for _ in 0..*argc {
                    args.push(pop(&mut stack)?);
                }
                args.reverse();
                stack.push(functions::call(name, args, ctx)?);
            }

            Op::Binary(op) => {
                let right = pop(&mut stack)?;
                let left = pop(&mut stack)?;
                stack.push(binary_op(ctx, *op, left, right)?);
            }

            Op::And(rhs) => {
                let left = pop(&mut stack)?;
                let value = if left.boolean_value() {
                    eval_compiled(rhs, ctx)?.boolean_value()
                } else {
                    false
                };
                stack.push(Value::Boolean(value));
            }

            Op::Or(rhs) => {
                let left = pop(&mut stack)?;
                let value = if left.boolean_value() {
                    true
                } else {
                    eval_compiled(rhs, ctx)?.boolean_value()
                };
                stack.push(Value::Boolean(value));
            }

            Op::Negate => {
                let value = pop(&mut stack)?;
                stack.push(Value::Number(-value.number_value(ctx.doc)));
            }
        }
    }

    pop(&mut stack)
}

fn pop(stack: &mut Vec<Value>) -> Result<Value> {
    stack
        .pop()
        .ok_or_else(|| Error::Type("evaluation stack underflow".into()))
}

fn pop_nodeset(stack: &mut Vec<Value>, what: &str) -> Result<Vec<NodeId>> {
    match pop(stack)? {
        Value::NodeSet(nodes) => Ok(nodes),
        other => Err(Error::Type(format!(
            "{} requires a node-set, got a {}",
            what,
            other.type_name()
        ))),
    }
}

/// Evaluate one predicate over a candidate list, keeping the candidates it
/// selects. Positions count along the list as given, which is axis order.
fn apply_predicate(
    candidates: Vec<NodeId>,
    predicate: &CompiledExpr,
    ctx: &EvalContext<'_>,
) -> Result<Vec<NodeId>> {
    let size = candidates.len();
    let mut kept = Vec::with_capacity(size);
    for (index, &node) in candidates.iter().enumerate() {
        let sub = ctx.at(node, index + 1, size);
        let verdict = eval_compiled(predicate, &sub)?;
        let keep = match verdict {
            // A numeric predicate selects by position.
            Value::Number(n) => (index + 1) as f64 == n,
            other => other.boolean_value(),
        };
        if keep {
            kept.push(node);
        }
    }
    Ok(kept)
}

fn resolve_test<'t>(
    test: &'t NodeTest,
    context_node: NodeId,
    ctx: &EvalContext<'_>,
) -> Result<ResolvedTest<'t>> {
    Ok(match test {
        NodeTest::Name { prefix, local } => {
            let uri = match prefix {
                Some(p) => match resolve_prefix(p, context_node, ctx)? {
                    Some(uri) => Some(uri),
                    None => return Ok(ResolvedTest::Nothing),
                },
                // An unprefixed name test is in no namespace; the default
                // namespace never applies here.
                None => None,
            };
            ResolvedTest::Name {
                uri,
                local: local.as_deref(),
            }
        }
        NodeTest::Node => ResolvedTest::Node,
        NodeTest::Text => ResolvedTest::Text,
        NodeTest::Comment => ResolvedTest::Comment,
        NodeTest::Pi(target) => ResolvedTest::Pi(target.as_deref()),
    })
}

/// Resolve a name-test prefix. A supplied resolver is authoritative and
/// an unknown prefix there is an error; with none, the step context's
/// in-scope declarations decide, and an unbound prefix matches nothing.
fn resolve_prefix(
    prefix: &str,
    context_node: NodeId,
    ctx: &EvalContext<'_>,
) -> Result<Option<String>> {
    if let Some(map) = &ctx.opts.namespaces {
        return map
            .get(prefix)
            .cloned()
            .map(Some)
            .ok_or_else(|| Error::UnresolvedNamespace(prefix.to_string()));
    }
    Ok(ctx.doc.lookup_namespace(context_node, Some(prefix)))
}

fn matches_test(doc: &Document, node: NodeId, axis: Axis, test: &ResolvedTest<'_>) -> bool {
    let Some(kind) = doc.kind(node) else {
        return false;
    };
    match test {
        ResolvedTest::Name { uri, local } => {
            let principal = if axis.principal_is_attribute() {
                NodeKind::Attribute
            } else {
                NodeKind::Element
            };
            if kind != principal {
                return false;
            }
            if let Some(local) = *local {
                if doc.local_name(node) != Some(local) {
                    return false;
                }
            }
            if axis == Axis::Namespace {
                // Namespace stand-ins match on the declared prefix alone.
                return true;
            }
            doc.namespace_uri(node) == uri.as_deref()
        }
        ResolvedTest::Nothing => false,
        ResolvedTest::Node => true,
        ResolvedTest::Text => matches!(kind, NodeKind::Text | NodeKind::CData),
        ResolvedTest::Comment => kind == NodeKind::Comment,
        ResolvedTest::Pi(target) => {
            kind == NodeKind::ProcessingInstruction
                && target.is_none_or(|t| doc.node_name(node) == t)
        }
    }
}

fn binary_op(ctx: &EvalContext<'_>, op: BinaryOp, left: Value, right: Value) -> Result<Value> {
    let doc = ctx.doc;
    match op {
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
            let l = left.number_value(doc);
            let r = right.number_value(doc);
            let n = match op {
                BinaryOp::Add => l + r,
                BinaryOp::Sub => l - r,
                BinaryOp::Mul => l * r,
                // IEEE 754: division by zero is ±Infinity, 0 div 0 and
                // x mod 0 are NaN, never an error.
                BinaryOp::Div => l / r,
                _ => l % r,
            };
            Ok(Value::Number(n))
        }
        BinaryOp::Eq => Ok(Value::Boolean(equality(ctx, &left, &right, false))),
        BinaryOp::NotEq => Ok(Value::Boolean(equality(ctx, &left, &right, true))),
        BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq => {
            Ok(Value::Boolean(relational(ctx, op, &left, &right)))
        }
        // And/Or compile to their short-circuit ops.
        BinaryOp::And | BinaryOp::Or => Err(Error::Type("unexpected logical operator".into())),
    }
}

/// XPath 1.0 §3.4 equality: existential over node-sets, otherwise by the
/// stronger of the two types (boolean > number > string).
fn equality(ctx: &EvalContext<'_>, left: &Value, right: &Value, negate: bool) -> bool {
    let doc = ctx.doc;
    let cmp = |a: bool| if negate { !a } else { a };
    match (left, right) {
        (Value::NodeSet(ln), Value::NodeSet(rn)) => {
            let right_values: Vec<String> = rn.iter().map(|&n| doc.string_value(n)).collect();
            ln.iter().any(|&l| {
                let lv = doc.string_value(l);
                right_values.iter().any(|rv| cmp(lv == *rv))
            })
        }
        (Value::NodeSet(nodes), Value::Number(n)) | (Value::Number(n), Value::NodeSet(nodes)) => {
            nodes
                .iter()
                .any(|&node| cmp(string_to_number(&doc.string_value(node)) == *n))
        }
        (Value::NodeSet(nodes), Value::String(s)) | (Value::String(s), Value::NodeSet(nodes)) => {
            nodes.iter().any(|&node| cmp(doc.string_value(node) == *s))
        }
        (Value::NodeSet(_), Value::Boolean(b)) | (Value::Boolean(b), Value::NodeSet(_)) => {
            let set = if left.is_nodeset() { left } else { right };
            cmp(set.boolean_value() == *b)
        }
        (Value::Boolean(_), _) | (_, Value::Boolean(_)) => {
            cmp(left.boolean_value() == right.boolean_value())
        }
        (Value::Number(_), _) | (_, Value::Number(_)) => {
            cmp(left.number_value(doc) == right.number_value(doc))
        }
        (Value::String(l), Value::String(r)) => cmp(l == r),
    }
}

/// XPath 1.0 §3.4 relational comparison: numbers throughout, existential
/// over node-sets.
fn relational(ctx: &EvalContext<'_>, op: BinaryOp, left: &Value, right: &Value) -> bool {
    let doc = ctx.doc;
    let cmp = |l: f64, r: f64| match op {
        BinaryOp::Lt => l < r,
        BinaryOp::LtEq => l <= r,
        BinaryOp::Gt => l > r,
        _ => l >= r,
    };
    match (left, right) {
        (Value::NodeSet(ln), Value::NodeSet(rn)) => {
            let right_nums: Vec<f64> = rn
                .iter()
                .map(|&n| string_to_number(&doc.string_value(n)))
                .collect();
            ln.iter().any(|&l| {
                let lv = string_to_number(&doc.string_value(l));
                right_nums.iter().any(|&rv| cmp(lv, rv))
            })
        }
        (Value::NodeSet(nodes), other) => {
            let r = other.number_value(doc);
            nodes
                .iter()
                .any(|&n| cmp(string_to_number(&doc.string_value(n)), r))
        }
        (other, Value::NodeSet(nodes)) => {
            let l = other.number_value(doc);
            nodes
                .iter()
                .any(|&n| cmp(l, string_to_number(&doc.string_value(n))))
        }
        _ => cmp(left.number_value(doc), right.number_value(doc)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Document;

    fn eval(doc: &Document, expr: &str) -> Value {
        evaluate(doc, DOCUMENT_NODE, expr).unwrap()
    }

    fn eval_num(doc: &Document, expr: &str) -> f64 {
        match eval(doc, expr) {
            Value::Number(n) => n,
            other => panic!("expected number, got {:?}", other),
        }
    }

    fn eval_str(doc: &Document, expr: &str) -> String {
        eval(doc, expr).string_value(doc)
    }

    fn eval_set(doc: &Document, expr: &str) -> Vec<NodeId> {
        match eval(doc, expr) {
            Value::NodeSet(nodes) => nodes,
            other => panic!("expected node-set, got {:?}", other),
        }
    }

    #[test]
    fn count_and_name() {
        let doc = Document::parse_str("<r><a/><b/></r>").unwrap();
        assert_eq!(eval_num(&doc, "count(/r/*)"), 2.0);
        assert_eq!(eval_str(&doc, "name(/r/*[1])"), "a");
    }

    #[test]
    fn attribute_predicate_and_text() {
        let doc = Document::parse_str(
            r#"<books><book id="1"><title>Go</title></book><book id="2"><title>Rs</title></book></books>"#,
        )
        .unwrap();
        assert_eq!(eval_str(&doc, "//book[@id='2']/title/text()"), "Rs");
        assert_eq!(eval_set(&doc, "//book").len(), 2);
    }

    #[test]
    fn positional_predicates() {
        let doc = Document::parse_str("<r><x>1</x><x>2</x><x>3</x></r>").unwrap();
        assert_eq!(eval_str(&doc, "/r/x[last()]"), "3");
        assert_eq!(eval_str(&doc, "/r/x[position()=2]"), "2");
        assert_eq!(eval_str(&doc, "/r/x[2]"), "2");
    }

    #[test]
    fn positional_predicate_counts_per_context_node() {
        let doc =
            Document::parse_str("<r><g><x>a</x><x>b</x></g><g><x>c</x><x>d</x></g></r>").unwrap();
        let set = eval_set(&doc, "/r/g/x[1]");
        let values: Vec<String> = set.iter().map(|&n| doc.string_value(n)).collect();
        assert_eq!(values, vec!["a", "c"]);
    }

    #[test]
    fn reverse_axis_positions_count_outward() {
        let doc = Document::parse_str("<r><a><b><c/></b></a></r>").unwrap();
        let c = eval_set(&doc, "//c")[0];
        let first = evaluate(&doc, c, "ancestor::*[1]").unwrap();
        let names: Vec<String> = first
            .as_nodeset()
            .unwrap()
            .iter()
            .map(|&n| doc.node_name(n))
            .collect();
        assert_eq!(names, vec!["b"]);
        // Presented in document order despite the reverse axis.
        let all = eval_set(&doc, "//c/ancestor::*");
        let names: Vec<String> = all.iter().map(|&n| doc.node_name(n)).collect();
        assert_eq!(names, vec!["r", "a", "b"]);
    }

    #[test]
    fn union_dedupes_by_identity() {
        let doc = Document::parse_str("<r><a/><b/></r>").unwrap();
        let set = eval_set(&doc, "/r/a | /r/* | /r/b");
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn union_of_primitives_is_a_type_error() {
        let doc = Document::parse_str("<r/>").unwrap();
        let err = evaluate(&doc, DOCUMENT_NODE, "1 | /r").unwrap_err();
        assert!(matches!(err, Error::Type(_)));
    }

    #[test]
    fn arithmetic_ieee_semantics() {
        let doc = Document::parse_str("<r/>").unwrap();
        assert_eq!(eval_num(&doc, "1 div 0"), f64::INFINITY);
        assert_eq!(eval_num(&doc, "-1 div 0"), f64::NEG_INFINITY);
        assert!(eval_num(&doc, "0 div 0").is_nan());
        assert!(eval_num(&doc, "5 mod 0").is_nan());
        assert_eq!(eval_num(&doc, "5 mod 2"), 1.0);
        assert_eq!(eval_num(&doc, "-5 mod 2"), -1.0);
        assert_eq!(eval_num(&doc, "2 + 3 * 4"), 14.0);
        assert_eq!(eval_num(&doc, "-(2)"), -2.0);
    }

    #[test]
    fn existential_comparisons() {
        let doc = Document::parse_str("<r><v>1</v><v>2</v><v>3</v></r>").unwrap();
        assert_eq!(eval(&doc, "/r/v = 2"), Value::Boolean(true));
        assert_eq!(eval(&doc, "/r/v = 9"), Value::Boolean(false));
        // != is existential too: some v differs from 2.
        assert_eq!(eval(&doc, "/r/v != 2"), Value::Boolean(true));
        assert_eq!(eval(&doc, "/r/v > 2"), Value::Boolean(true));
        assert_eq!(eval(&doc, "/r/v < 1"), Value::Boolean(false));
        assert_eq!(eval(&doc, "'2' = /r/v"), Value::Boolean(true));
    }

    #[test]
    fn logical_short_circuit() {
        let doc = Document::parse_str("<r/>").unwrap();
        // The unknown function after a decisive lhs is never called.
        assert_eq!(
            eval(&doc, "false() and mystery()"),
            Value::Boolean(false)
        );
        assert_eq!(eval(&doc, "true() or mystery()"), Value::Boolean(true));
        assert!(matches!(
            evaluate(&doc, DOCUMENT_NODE, "true() and mystery()"),
            Err(Error::UnresolvedFunction(_))
        ));
    }

    #[test]
    fn variables_resolve_from_options() {
        let doc = Document::parse_str("<r/>").unwrap();
        let mut vars = HashMap::new();
        vars.insert("x".to_string(), Value::Number(40.0));
        let opts = EvalOptions {
            variables: Some(vars),
            ..Default::default()
        };
        let v = evaluate_with(&doc, DOCUMENT_NODE, "$x + 2", &opts).unwrap();
        assert_eq!(v, Value::Number(42.0));
        assert!(matches!(
            evaluate(&doc, DOCUMENT_NODE, "$missing"),
            Err(Error::UnresolvedVariable(_))
        ));
    }

    #[test]
    fn prefixes_resolve_via_options_or_scope() {
        let doc =
            Document::parse_str(r#"<r xmlns:p="urn:p"><p:x>in</p:x><x>out</x></r>"#).unwrap();
        // Caller-supplied resolver wins.
        let mut ns = HashMap::new();
        ns.insert("q".to_string(), "urn:p".to_string());
        let opts = EvalOptions {
            namespaces: Some(ns),
            ..Default::default()
        };
        let v = evaluate_with(&doc, DOCUMENT_NODE, "//q:x", &opts).unwrap();
        assert_eq!(v.as_nodeset().unwrap().len(), 1);
        // Unknown prefix in the supplied resolver is an error.
        assert!(matches!(
            evaluate_with(&doc, DOCUMENT_NODE, "//w:x", &opts),
            Err(Error::UnresolvedNamespace(_))
        ));
        // Without a resolver, in-scope declarations apply. The root
        // element context has p bound.
        let root = doc.document_element().unwrap();
        let v = evaluate(&doc, root, "p:x").unwrap();
        assert_eq!(v.as_nodeset().unwrap().len(), 1);
    }

    #[test]
    fn unprefixed_name_test_ignores_default_namespace() {
        let doc = Document::parse_str(r#"<r xmlns="urn:d"><x/></r>"#).unwrap();
        // Elements are in urn:d; the unprefixed test matches no namespace.
        assert_eq!(eval_set(&doc, "//x").len(), 0);
        assert_eq!(eval_set(&doc, "//*").len(), 2);
    }

    #[test]
    fn attribute_axis_matches_attributes() {
        let doc = Document::parse_str(r#"<r a="1" b="2"/>"#).unwrap();
        assert_eq!(eval_set(&doc, "/r/@*").len(), 2);
        assert_eq!(eval_str(&doc, "/r/@a"), "1");
        assert_eq!(eval_num(&doc, "count(/r/@*)"), 2.0);
    }

    #[test]
    fn filter_expr_predicates_and_trailing_path() {
        let doc = Document::parse_str("<r><x><y>1</y></x><x><y>2</y></x></r>").unwrap();
        let v = eval_str(&doc, "(/r/x)[2]/y");
        assert_eq!(v, "2");
    }

    #[test]
    fn step_on_primitive_is_type_error() {
        let doc = Document::parse_str("<r/>").unwrap();
        assert!(matches!(
            evaluate(&doc, DOCUMENT_NODE, "(1)/x"),
            Err(Error::Type(_))
        ));
    }

    #[test]
    fn double_slash_descendants() {
        let doc = Document::parse_str("<r><a><b/></a><c><b/></c></r>").unwrap();
        assert_eq!(eval_set(&doc, "//b").len(), 2);
        assert_eq!(eval_set(&doc, "/r//b").len(), 2);
    }

    #[test]
    fn consecutive_evaluations_agree() {
        let doc = Document::parse_str("<r><a/><a/><a/></r>").unwrap();
        let first = eval_set(&doc, "//a");
        let second = eval_set(&doc, "//a");
        assert_eq!(first, second);
    }
}
