//! Rendered-SVG to document-node conversion.

use roxmltree::Document;

use crate::tree::{Node, Properties, PropertyValue};

/// Parse a rendered SVG document and convert its root element into a
/// document node, ready to splice into the tree.
///
/// Namespace declarations survive on the root element only (`xmlns`,
/// `xmlns:{prefix}`); re-declarations deeper in the document are dropped.
/// Rendered mermaid output declares everything on the root. Prefixed
/// attributes keep their prefix, so `xlink:href` on a `<use>` element
/// does not collapse to the bare local name.
pub(crate) fn to_node(svg: &str) -> Result<Node, roxmltree::Error> {
    let document = Document::parse(svg)?;
    let root = document.root_element();

    let mut properties = Properties::new();
    for namespace in root.namespaces() {
        let name = match namespace.name() {
            Some(prefix) => format!("xmlns:{prefix}"),
            None => "xmlns".to_owned(),
        };
        properties.insert(name, PropertyValue::from(namespace.uri()));
    }
    Ok(convert(root, properties))
}

fn convert(source: roxmltree::Node<'_, '_>, mut properties: Properties) -> Node {
    for attribute in source.attributes() {
        // attribute.name() is the local name; restore the prefix for
        // namespaced attributes such as xlink:href
        let name = match attribute.namespace().and_then(|uri| source.lookup_prefix(uri)) {
            Some(prefix) => format!("{prefix}:{}", attribute.name()),
            None => attribute.name().to_owned(),
        };
        properties.insert(name, PropertyValue::from(attribute.value()));
    }
    let children = source
        .children()
        .filter_map(|child| {
            if child.is_element() {
                Some(convert(child, Properties::new()))
            } else if child.is_text() {
                child.text().map(Node::text)
            } else if child.is_comment() {
                child.text().map(Node::comment)
            } else {
                None
            }
        })
        .collect();
    Node::element(source.tag_name().name(), properties, children)
}
