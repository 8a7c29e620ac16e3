//! XPath 1.0 Functions
//!
//! The full core function library:
//!
//! Node-set: position(), last(), count(), id(), local-name(),
//! namespace-uri(), name()
//!
//! String: string(), concat(), starts-with(), contains(), substring(),
//! substring-before(), substring-after(), string-length(),
//! normalize-space(), translate()
//!
//! Boolean: boolean(), not(), true(), false(), lang()
//!
//! Number: number(), sum(), floor(), ceiling(), round()
//!
//! Unknown names fail with UNRESOLVED_FUNCTION at evaluation time.

use crate::dom::{NodeId, NodeKind, DOCUMENT_NODE, XML_NS_URI};
use crate::error::{Error, Result};

use super::eval::EvalContext;
use super::value::{string_to_number, Value};

/// Dispatch a function call.
pub(crate) fn call(name: &str, args: Vec<Value>, ctx: &EvalContext<'_>) -> Result<Value> {
    match name {
        // Node-set functions
        "position" => {
            arity(name, &args, 0, 0)?;
            Ok(Value::Number(ctx.position as f64))
        }
        "last" => {
            arity(name, &args, 0, 0)?;
            Ok(Value::Number(ctx.size as f64))
        }
        "count" => {
            arity(name, &args, 1, 1)?;
            let nodes = nodeset_arg(name, &args[0])?;
            Ok(Value::Number(nodes.len() as f64))
        }
        "id" => {
            arity(name, &args, 1, 1)?;
            fn_id(&args[0], ctx)
        }
        "local-name" => {
            arity(name, &args, 0, 1)?;
            let node = name_target(&args, ctx)?;
            Ok(Value::String(node.map_or_else(String::new, |n| {
                match ctx.doc.kind(n) {
                    Some(NodeKind::Element) | Some(NodeKind::Attribute) => {
                        ctx.doc.local_name(n).unwrap_or_default().to_string()
                    }
                    Some(NodeKind::ProcessingInstruction) => ctx.doc.node_name(n),
                    _ => String::new(),
                }
            })))
        }
        "namespace-uri" => {
            arity(name, &args, 0, 1)?;
            let node = name_target(&args, ctx)?;
            Ok(Value::String(
                node.and_then(|n| ctx.doc.namespace_uri(n).map(str::to_string))
                    .unwrap_or_default(),
            ))
        }
        "name" => {
            arity(name, &args, 0, 1)?;
            let node = name_target(&args, ctx)?;
            Ok(Value::String(node.map_or_else(String::new, |n| {
                match ctx.doc.kind(n) {
                    Some(NodeKind::Element)
                    | Some(NodeKind::Attribute)
                    | Some(NodeKind::ProcessingInstruction) => ctx.doc.node_name(n),
                    _ => String::new(),
                }
            })))
        }

        // String functions
        "string" => {
            arity(name, &args, 0, 1)?;
            Ok(Value::String(match args.first() {
                Some(v) => v.string_value(ctx.doc),
                None => ctx.doc.string_value(ctx.node),
            }))
        }
        "concat" => {
            if args.len() < 2 {
                return Err(Error::Type("concat() requires at least 2 arguments".into()));
            }
            let out: String = args.iter().map(|a| a.string_value(ctx.doc)).collect();
            Ok(Value::String(out))
        }
        "starts-with" => {
            arity(name, &args, 2, 2)?;
            let s = args[0].string_value(ctx.doc);
            let prefix = args[1].string_value(ctx.doc);
            Ok(Value::Boolean(s.starts_with(&prefix)))
        }
        "contains" => {
            arity(name, &args, 2, 2)?;
            let s = args[0].string_value(ctx.doc);
            let needle = args[1].string_value(ctx.doc);
            Ok(Value::Boolean(s.contains(&needle)))
        }
        "substring-before" => {
            arity(name, &args, 2, 2)?;
            let s = args[0].string_value(ctx.doc);
            let pat = args[1].string_value(ctx.doc);
            Ok(Value::String(
                s.find(&pat).map(|i| s[..i].to_string()).unwrap_or_default(),
            ))
        }
        "substring-after" => {
            arity(name, &args, 2, 2)?;
            let s = args[0].string_value(ctx.doc);
            let pat = args[1].string_value(ctx.doc);
            Ok(Value::String(
                s.find(&pat)
                    .map(|i| s[i + pat.len()..].to_string())
                    .unwrap_or_default(),
            ))
        }
        "substring" => {
            arity(name, &args, 2, 3)?;
            fn_substring(&args, ctx)
        }
        "string-length" => {
            arity(name, &args, 0, 1)?;
            let s = match args.first() {
                Some(v) => v.string_value(ctx.doc),
                None => ctx.doc.string_value(ctx.node),
            };
            Ok(Value::Number(s.chars().count() as f64))
        }
        "normalize-space" => {
            arity(name, &args, 0, 1)?;
            let s = match args.first() {
                Some(v) => v.string_value(ctx.doc),
                None => ctx.doc.string_value(ctx.node),
            };
            Ok(Value::String(
                s.split_whitespace().collect::<Vec<_>>().join(" "),
            ))
        }
        "translate" => {
            arity(name, &args, 3, 3)?;
            let s = args[0].string_value(ctx.doc);
            let from: Vec<char> = args[1].string_value(ctx.doc).chars().collect();
            let to: Vec<char> = args[2].string_value(ctx.doc).chars().collect();
            let out: String = s
                .chars()
                .filter_map(|c| match from.iter().position(|&f| f == c) {
                    Some(i) => to.get(i).copied(),
                    None => Some(c),
                })
                .collect();
            Ok(Value::String(out))
        }

        // Boolean functions
        "boolean" => {
            arity(name, &args, 1, 1)?;
            Ok(Value::Boolean(args[0].boolean_value()))
        }
        "not" => {
            arity(name, &args, 1, 1)?;
            Ok(Value::Boolean(!args[0].boolean_value()))
        }
        "true" => {
            arity(name, &args, 0, 0)?;
            Ok(Value::Boolean(true))
        }
        "false" => {
            arity(name, &args, 0, 0)?;
            Ok(Value::Boolean(false))
        }
        "lang" => {
            arity(name, &args, 1, 1)?;
            fn_lang(&args[0], ctx)
        }

        // Number functions
        "number" => {
            arity(name, &args, 0, 1)?;
            Ok(Value::Number(match args.first() {
                Some(v) => v.number_value(ctx.doc),
                None => string_to_number(&ctx.doc.string_value(ctx.node)),
            }))
        }
        "sum" => {
            arity(name, &args, 1, 1)?;
            let nodes = nodeset_arg(name, &args[0])?;
            let total = nodes
                .iter()
                .map(|&n| string_to_number(&ctx.doc.string_value(n)))
                .sum();
            Ok(Value::Number(total))
        }
        "floor" => {
            arity(name, &args, 1, 1)?;
            Ok(Value::Number(args[0].number_value(ctx.doc).floor()))
        }
        "ceiling" => {
            arity(name, &args, 1, 1)?;
            Ok(Value::Number(args[0].number_value(ctx.doc).ceil()))
        }
        "round" => {
            arity(name, &args, 1, 1)?;
            Ok(Value::Number(round_half_up(args[0].number_value(ctx.doc))))
        }

        _ => Err(Error::UnresolvedFunction(name.to_string())),
    }
}

fn arity(name: &str, args: &[Value], min: usize, max: usize) -> Result<()> {
    if args.len() < min || args.len() > max {
        Err(Error::Type(format!(
            "{}() called with {} arguments",
            name,
            args.len()
        )))
    } else {
        Ok(())
    }
}

fn nodeset_arg<'v>(name: &str, arg: &'v Value) -> Result<&'v [NodeId]> {
    arg.as_nodeset()
        .ok_or_else(|| Error::Type(format!("{}() requires a node-set argument", name)))
}

/// Target node for name()/local-name()/namespace-uri(): the context node
/// with no argument, else the first node of the argument set.
fn name_target(args: &[Value], ctx: &EvalContext<'_>) -> Result<Option<NodeId>> {
    match args.first() {
        None => Ok(Some(ctx.node)),
        Some(Value::NodeSet(nodes)) => Ok(nodes.first().copied()),
        Some(other) => Err(Error::Type(format!(
            "expected a node-set argument, got a {}",
            other.type_name()
        ))),
    }
}

/// XPath round: half rounds toward positive infinity; negative zero is
/// preserved for arguments in [-0.5, 0).
fn round_half_up(n: f64) -> f64 {
    if n.is_nan() || n.is_infinite() || n == 0.0 {
        return n;
    }
    if (-0.5..0.0).contains(&n) {
        return -0.0;
    }
    (n + 0.5).floor()
}

/// substring(s, start[, len]) with XPath rounding: 1-based character
/// positions p are kept when p >= round(start) and, with a length, when
/// p < round(start) + round(len). NaN comparisons keep nothing.
fn fn_substring(args: &[Value], ctx: &EvalContext<'_>) -> Result<Value> {
    let s = args[0].string_value(ctx.doc);
    let start = round_half_up(args[1].number_value(ctx.doc));
    let len = args.get(2).map(|v| round_half_up(v.number_value(ctx.doc)));
    let out: String = s
        .chars()
        .enumerate()
        .filter(|(i, _)| {
            let p = (*i + 1) as f64;
            p >= start && len.is_none_or(|l| p < start + l)
        })
        .map(|(_, c)| c)
        .collect();
    Ok(Value::String(out))
}

/// id(): whitespace-tokenize the argument (per node for node-sets), then
/// collect elements whose xml:id matches a token, in document order.
fn fn_id(arg: &Value, ctx: &EvalContext<'_>) -> Result<Value> {
    let mut tokens: Vec<String> = Vec::new();
    match arg {
        Value::NodeSet(nodes) => {
            for &n in nodes {
                let sv = ctx.doc.string_value(n);
                tokens.extend(sv.split_whitespace().map(str::to_string));
            }
        }
        other => tokens.extend(
            other
                .string_value(ctx.doc)
                .split_whitespace()
                .map(str::to_string),
        ),
    }
    let mut result: Vec<NodeId> = Vec::new();
    for node in ctx.doc.descendants(DOCUMENT_NODE) {
        if ctx.doc.kind(node) != Some(NodeKind::Element) {
            continue;
        }
        let id_value = ctx
            .doc
            .get_attribute_ns(node, Some(XML_NS_URI), "id")
            .or_else(|| ctx.doc.get_attribute(node, "xml:id"));
        if let Some(v) = id_value {
            if tokens.iter().any(|t| t == v) {
                result.push(node);
            }
        }
    }
    ctx.order.sort(&mut result);
    result.dedup();
    Ok(Value::NodeSet(result))
}

/// lang(): match the nearest xml:lang up the ancestor chain,
/// case-insensitive, exact or prefix followed by '-'.
fn fn_lang(arg: &Value, ctx: &EvalContext<'_>) -> Result<Value> {
    let target = arg.string_value(ctx.doc).to_ascii_lowercase();
    let mut node = match ctx.doc.kind(ctx.node) {
        Some(NodeKind::Attribute) => ctx.doc.owner_element(ctx.node),
        _ => Some(ctx.node),
    };
    while let Some(n) = node {
        let lang = ctx
            .doc
            .get_attribute_ns(n, Some(XML_NS_URI), "lang")
            .or_else(|| ctx.doc.get_attribute(n, "xml:lang"));
        if let Some(lang) = lang {
            let lang = lang.to_ascii_lowercase();
            let matches = lang == target
                || (lang.starts_with(&target)
                    && lang.as_bytes().get(target.len()) == Some(&b'-'));
            return Ok(Value::Boolean(matches));
        }
        node = ctx.doc.parent(n);
    }
    Ok(Value::Boolean(false))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Document;
    use crate::xpath::evaluate;

    fn eval(doc: &Document, expr: &str) -> Value {
        evaluate(doc, DOCUMENT_NODE, expr).unwrap()
    }

    fn num(doc: &Document, expr: &str) -> f64 {
        match eval(doc, expr) {
            Value::Number(n) => n,
            other => panic!("expected number, got {:?}", other),
        }
    }

    fn s(doc: &Document, expr: &str) -> String {
        match eval(doc, expr) {
            Value::String(s) => s,
            other => panic!("expected string, got {:?}", other),
        }
    }

    #[test]
    fn string_functions() {
        let doc = Document::parse_str("<r/>").unwrap();
        assert_eq!(s(&doc, "concat('a', '-', 'b')"), "a-b");
        assert_eq!(eval(&doc, "starts-with('hello', 'he')"), Value::Boolean(true));
        assert_eq!(eval(&doc, "contains('hello', 'ell')"), Value::Boolean(true));
        assert_eq!(s(&doc, "substring-before('1999/04/01', '/')"), "1999");
        assert_eq!(s(&doc, "substring-after('1999/04/01', '/')"), "04/01");
        assert_eq!(s(&doc, "normalize-space('  a   b  ')"), "a b");
        assert_eq!(s(&doc, "translate('bar', 'abc', 'ABC')"), "BAr");
        assert_eq!(s(&doc, "translate('--aaa--', 'abc-', 'ABC')"), "AAA");
        assert_eq!(num(&doc, "string-length('hello')"), 5.0);
    }

    #[test]
    fn substring_rounding() {
        let doc = Document::parse_str("<r/>").unwrap();
        assert_eq!(s(&doc, "substring('12345', 1.5, 2.6)"), "234");
        assert_eq!(s(&doc, "substring('12345', 2, 3)"), "234");
        assert_eq!(s(&doc, "substring('12345', 0, 3)"), "12");
        assert_eq!(s(&doc, "substring('12345', 2)"), "2345");
        assert_eq!(s(&doc, "substring('12345', 0 div 0, 3)"), "");
        assert_eq!(s(&doc, "substring('12345', 1, 0 div 0)"), "");
        assert_eq!(s(&doc, "substring('12345', -42, 1 div 0)"), "12345");
    }

    #[test]
    fn rounding_family() {
        let doc = Document::parse_str("<r/>").unwrap();
        assert_eq!(num(&doc, "floor(2.6)"), 2.0);
        assert_eq!(num(&doc, "ceiling(2.2)"), 3.0);
        assert_eq!(num(&doc, "round(2.5)"), 3.0);
        assert_eq!(num(&doc, "round(-1.5)"), -1.0);
        assert!(num(&doc, "round(0 div 0)").is_nan());
        let neg_zero = num(&doc, "round(-0.5)");
        assert_eq!(neg_zero, 0.0);
        assert!(neg_zero.is_sign_negative());
        assert_eq!(s(&doc, "string(round(-0.5))"), "0");
    }

    #[test]
    fn number_and_sum() {
        let doc = Document::parse_str("<r><v>1</v><v>2.5</v></r>").unwrap();
        assert_eq!(num(&doc, "number('  -3.14  ')"), -3.14);
        assert!(num(&doc, "number('abc')").is_nan());
        assert_eq!(num(&doc, "sum(/r/v)"), 3.5);
        let doc2 = Document::parse_str("<r><v>1</v><v>x</v></r>").unwrap();
        assert!(num(&doc2, "sum(/r/v)").is_nan());
    }

    #[test]
    fn boolean_family() {
        let doc = Document::parse_str("<r/>").unwrap();
        assert_eq!(eval(&doc, "boolean('x')"), Value::Boolean(true));
        assert_eq!(eval(&doc, "boolean('')"), Value::Boolean(false));
        assert_eq!(eval(&doc, "not(false())"), Value::Boolean(true));
        assert_eq!(eval(&doc, "boolean(/nothing)"), Value::Boolean(false));
    }

    #[test]
    fn lang_matches_ancestors() {
        let doc = Document::parse_str(r#"<p xml:lang="en-US"><c/></p>"#).unwrap();
        let c = doc
            .children(doc.document_element().unwrap())
            .next()
            .unwrap();
        assert_eq!(
            evaluate(&doc, c, "lang('en')").unwrap(),
            Value::Boolean(true)
        );
        assert_eq!(
            evaluate(&doc, c, "lang('EN-us')").unwrap(),
            Value::Boolean(true)
        );
        assert_eq!(
            evaluate(&doc, c, "lang('fr')").unwrap(),
            Value::Boolean(false)
        );
        // Prefix must end at a subtag boundary.
        assert_eq!(
            evaluate(&doc, c, "lang('e')").unwrap(),
            Value::Boolean(false)
        );
    }

    #[test]
    fn id_resolves_xml_id() {
        let doc = Document::parse_str(
            r#"<r><a xml:id="one"/><b xml:id="two"/><c xml:id="three"/></r>"#,
        )
        .unwrap();
        let set = eval(&doc, "id('two one')");
        let names: Vec<String> = set
            .as_nodeset()
            .unwrap()
            .iter()
            .map(|&n| doc.node_name(n))
            .collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(eval(&doc, "count(id('missing'))"), Value::Number(0.0));
    }

    #[test]
    fn name_functions() {
        let doc =
            Document::parse_str(r#"<r xmlns:p="urn:p"><p:x/></r>"#).unwrap();
        assert_eq!(s(&doc, "name(//p:x)"), "p:x");
        assert_eq!(s(&doc, "local-name(//p:x)"), "x");
        assert_eq!(s(&doc, "namespace-uri(//p:x)"), "urn:p");
        assert_eq!(s(&doc, "name(/nothing)"), "");
        assert_eq!(s(&doc, "namespace-uri(/r)"), "");
    }

    #[test]
    fn unknown_function_is_unresolved() {
        let doc = Document::parse_str("<r/>").unwrap();
        assert!(matches!(
            evaluate(&doc, DOCUMENT_NODE, "no-such-fn()"),
            Err(Error::UnresolvedFunction(_))
        ));
    }

    #[test]
    fn arity_violations_are_type_errors() {
        let doc = Document::parse_str("<r/>").unwrap();
        assert!(matches!(
            evaluate(&doc, DOCUMENT_NODE, "concat('only')"),
            Err(Error::Type(_))
        ));
        assert!(matches!(
            evaluate(&doc, DOCUMENT_NODE, "count(1)"),
            Err(Error::Type(_))
        ));
        assert!(matches!(
            evaluate(&doc, DOCUMENT_NODE, "not()"),
            Err(Error::Type(_))
        ));
    }
}
