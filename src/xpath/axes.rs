//! XPath Axes Implementation
//!
//! All 13 XPath 1.0 axes:
//! - child, parent, self
//! - descendant, descendant-or-self
//! - ancestor, ancestor-or-self
//! - following, following-sibling
//! - preceding, preceding-sibling
//! - attribute, namespace
//!
//! Candidates come back in axis order: forward axes in document order,
//! reverse axes from the context node outward.

use crate::dom::{Document, NodeId, NodeKind, DOCUMENT_NODE};

use super::parser::Axis;

/// Navigate along an axis from a context node.
pub fn navigate(doc: &Document, context: NodeId, axis: Axis) -> Vec<NodeId> {
    match axis {
        Axis::Child => doc.children(context).collect(),
        Axis::Descendant => doc.descendants(context).collect(),
        Axis::DescendantOrSelf => {
            let mut result = vec![context];
            result.extend(doc.descendants(context));
            result
        }
        Axis::Parent => xpath_parent(doc, context).into_iter().collect(),
        Axis::Ancestor => ancestor_axis(doc, context),
        Axis::AncestorOrSelf => {
            let mut result = vec![context];
            result.extend(ancestor_axis(doc, context));
            result
        }
        Axis::FollowingSibling => {
            let mut result = Vec::new();
            let mut sibling = doc.next_sibling(context);
            while let Some(s) = sibling {
                result.push(s);
                sibling = doc.next_sibling(s);
            }
            result
        }
        Axis::PrecedingSibling => {
            let mut result = Vec::new();
            let mut sibling = doc.previous_sibling(context);
            while let Some(s) = sibling {
                result.push(s);
                sibling = doc.previous_sibling(s);
            }
            result
        }
        Axis::Following => following_axis(doc, context),
        Axis::Preceding => preceding_axis(doc, context),
        Axis::SelfAxis => vec![context],
        Axis::Attribute => doc.attributes(context).to_vec(),
        Axis::Namespace => namespace_axis(doc, context),
    }
}

/// The XPath parent of an attribute is its owning element.
fn xpath_parent(doc: &Document, node: NodeId) -> Option<NodeId> {
    match doc.kind(node)? {
        NodeKind::Attribute => doc.owner_element(node),
        _ => doc.parent(node),
    }
}

fn ancestor_axis(doc: &Document, context: NodeId) -> Vec<NodeId> {
    let mut result = Vec::new();
    let mut current = xpath_parent(doc, context);
    while let Some(p) = current {
        result.push(p);
        current = xpath_parent(doc, p);
    }
    result
}

/// following:: - everything after the context node in document order,
/// excluding descendants, attribute, and namespace nodes.
fn following_axis(doc: &Document, context: NodeId) -> Vec<NodeId> {
    let mut result = Vec::new();
    // An attribute sorts after its element and before the element's
    // children, so those children are in its following axis.
    let anchor = match doc.kind(context) {
        Some(NodeKind::Attribute) => {
            let Some(owner) = doc.owner_element(context) else {
                return result;
            };
            result.extend(doc.descendants(owner));
            owner
        }
        _ => context,
    };
    let mut node = anchor;
    loop {
        let mut sibling = doc.next_sibling(node);
        while let Some(s) = sibling {
            result.push(s);
            result.extend(doc.descendants(s));
            sibling = doc.next_sibling(s);
        }
        match doc.parent(node) {
            Some(p) => node = p,
            None => break,
        }
    }
    result
}

/// preceding:: - everything before the context node in document order,
/// excluding ancestors, attribute, and namespace nodes. Presented in
/// reverse document order.
fn preceding_axis(doc: &Document, context: NodeId) -> Vec<NodeId> {
    let anchor = match doc.kind(context) {
        Some(NodeKind::Attribute) => match doc.owner_element(context) {
            Some(owner) => owner,
            None => return Vec::new(),
        },
        _ => context,
    };
    let mut ancestors = std::collections::HashSet::new();
    let mut cur = Some(anchor);
    while let Some(c) = cur {
        ancestors.insert(c);
        cur = doc.parent(c);
    }

    let mut result = Vec::new();
    let mut node = DOCUMENT_NODE;
    loop {
        if node == anchor {
            break;
        }
        if !ancestors.contains(&node) {
            result.push(node);
        }
        match doc.preorder_next(node, DOCUMENT_NODE) {
            Some(next) => node = next,
            None => break,
        }
    }
    // The document node itself is not on any axis output.
    result.retain(|&n| n != DOCUMENT_NODE);
    result.reverse();
    result
}

/// namespace:: - the in-scope namespace declaration attributes of the
/// context element, nearest declaration per prefix first. The data model
/// materializes declarations as Attr nodes; they stand in for namespace
/// nodes here.
fn namespace_axis(doc: &Document, context: NodeId) -> Vec<NodeId> {
    if doc.kind(context) != Some(NodeKind::Element) {
        return Vec::new();
    }
    let mut result = Vec::new();
    let mut seen: Vec<String> = Vec::new();
    let mut cur = Some(context);
    while let Some(c) = cur {
        if doc.node(c).is_some_and(|n| n.is_element()) {
            for &attr in doc.attributes(c) {
                let qname = doc.node_name(attr);
                let key = if qname == "xmlns" {
                    String::new()
                } else if let Some(prefix) = qname.strip_prefix("xmlns:") {
                    prefix.to_string()
                } else {
                    continue;
                };
                if seen.iter().any(|s| *s == key) {
                    continue;
                }
                seen.push(key);
                // An empty value undeclares; it hides outer bindings but
                // contributes no namespace node.
                if doc.node_value(attr).is_some_and(|v| !v.is_empty()) {
                    result.push(attr);
                }
            }
        }
        cur = doc.parent(c);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc() -> Document {
        Document::parse_str("<root><a><b/><c/></a><d><e/></d></root>").unwrap()
    }

    fn by_name(doc: &Document, name: &str) -> NodeId {
        std::iter::once(DOCUMENT_NODE)
            .chain(doc.descendants(DOCUMENT_NODE))
            .find(|&n| doc.node_name(n) == name)
            .unwrap()
    }

    fn names(doc: &Document, nodes: &[NodeId]) -> Vec<String> {
        nodes.iter().map(|&n| doc.node_name(n)).collect()
    }

    #[test]
    fn child_and_descendant() {
        let d = doc();
        let root = d.document_element().unwrap();
        assert_eq!(names(&d, &navigate(&d, root, Axis::Child)), vec!["a", "d"]);
        assert_eq!(
            names(&d, &navigate(&d, root, Axis::Descendant)),
            vec!["a", "b", "c", "d", "e"]
        );
        assert_eq!(
            names(&d, &navigate(&d, root, Axis::DescendantOrSelf)),
            vec!["root", "a", "b", "c", "d", "e"]
        );
    }

    #[test]
    fn ancestor_outward_order() {
        let d = doc();
        let b = by_name(&d, "b");
        assert_eq!(
            names(&d, &navigate(&d, b, Axis::Ancestor)),
            vec!["a", "root", "#document"]
        );
        assert_eq!(
            names(&d, &navigate(&d, b, Axis::AncestorOrSelf)),
            vec!["b", "a", "root", "#document"]
        );
    }

    #[test]
    fn sibling_axes() {
        let d = doc();
        let b = by_name(&d, "b");
        let c = by_name(&d, "c");
        assert_eq!(names(&d, &navigate(&d, b, Axis::FollowingSibling)), vec!["c"]);
        assert_eq!(names(&d, &navigate(&d, c, Axis::PrecedingSibling)), vec!["b"]);
    }

    #[test]
    fn following_excludes_descendants() {
        let d = doc();
        let a = by_name(&d, "a");
        assert_eq!(
            names(&d, &navigate(&d, a, Axis::Following)),
            vec!["d", "e"]
        );
    }

    #[test]
    fn preceding_excludes_ancestors_and_reverses() {
        let d = doc();
        let e = by_name(&d, "e");
        assert_eq!(
            names(&d, &navigate(&d, e, Axis::Preceding)),
            vec!["c", "b", "a"]
        );
    }

    #[test]
    fn attribute_axis_in_map_order() {
        let d = Document::parse_str(r#"<r b="2" a="1"/>"#).unwrap();
        let r = d.document_element().unwrap();
        assert_eq!(
            names(&d, &navigate(&d, r, Axis::Attribute)),
            vec!["b", "a"]
        );
    }

    #[test]
    fn attribute_context_parent_and_following() {
        let d = Document::parse_str(r#"<r a="1"><x/></r>"#).unwrap();
        let r = d.document_element().unwrap();
        let attr = d.attributes(r)[0];
        assert_eq!(navigate(&d, attr, Axis::Parent), vec![r]);
        assert_eq!(
            names(&d, &navigate(&d, attr, Axis::Following)),
            vec!["x"]
        );
        assert!(navigate(&d, attr, Axis::FollowingSibling).is_empty());
        assert!(navigate(&d, attr, Axis::Child).is_empty());
    }

    #[test]
    fn namespace_axis_collects_in_scope_declarations() {
        let d = Document::parse_str(
            r#"<r xmlns:p="urn:p"><c xmlns:q="urn:q" xmlns:p="urn:p2"><leaf/></c></r>"#,
        )
        .unwrap();
        let leaf = by_name(&d, "leaf");
        let ns = navigate(&d, leaf, Axis::Namespace);
        // Empty for non-element-rooted lookups only; leaf inherits both.
        let mut got: Vec<(String, String)> = ns
            .iter()
            .map(|&n| {
                (
                    d.node_name(n),
                    d.node_value(n).unwrap_or_default().to_string(),
                )
            })
            .collect();
        got.sort();
        assert_eq!(
            got,
            vec![
                ("xmlns:p".to_string(), "urn:p2".to_string()),
                ("xmlns:q".to_string(), "urn:q".to_string()),
            ]
        );
    }
}
