//! Diagram block collection.
//!
//! One pre-order walk over the document does three things:
//!
//! - matches candidate elements against the active [`Strategy`]
//!   (`pre.mermaid` containers and `language-mermaid` code blocks),
//! - resolves wrapped matches to their replaceable unit (a `code` inside an
//!   otherwise-empty `pre` collapses to the `pre`),
//! - opportunistically picks up the document's `meta[name="color-scheme"]`
//!   hint.
//!
//! The walk is pure: it records instances and never mutates the tree.
//! Mutation happens later, from the staged replacement list.

use tracing::debug;

use crate::consts::{COLOR_SCHEME_META, LANG_MERMAID_CLASS, LANGUAGE_MERMAID_CLASS, MERMAID_CLASS};
use crate::strategy::{ColorScheme, Strategy};
use crate::tree::{Element, Node, PropertyValue};

/// One diagram block queued for rendering and replacement.
#[derive(Debug)]
pub(crate) struct DiagramInstance {
    /// Literal diagram source: all descendant text of the matched node in
    /// document order, internal whitespace intact.
    pub(crate) source: String,
    /// The exact node to replace.
    pub(crate) node: Node,
    /// The parent whose child slot holds `node`.
    pub(crate) parent: Node,
    /// Inclusive chain from the document root down to `node`.
    pub(crate) ancestors: Vec<Node>,
}

impl DiagramInstance {
    /// Node labels of the ancestor chain, for positional error reporting.
    pub(crate) fn breadcrumbs(&self) -> Vec<String> {
        self.ancestors
            .iter()
            .map(|node| node.label().to_owned())
            .collect()
    }
}

/// Result of one collection walk.
#[derive(Debug)]
pub(crate) struct Collected {
    pub(crate) instances: Vec<DiagramInstance>,
    /// Theme hint found in the document, if detection was enabled.
    pub(crate) color_scheme: Option<ColorScheme>,
}

/// Walk the tree once, collecting diagram instances in document order.
///
/// Theme-hint detection is skipped entirely when the caller configured an
/// explicit scheme.
pub(crate) fn collect(
    tree: &Node,
    strategy: Strategy,
    explicit_scheme: Option<ColorScheme>,
) -> Collected {
    let mut collected = Collected {
        instances: Vec::new(),
        color_scheme: None,
    };
    let mut ancestors = Vec::new();
    visit(
        tree,
        &mut ancestors,
        strategy,
        explicit_scheme.is_none(),
        &mut collected,
    );
    debug!(
        count = collected.instances.len(),
        strategy = %strategy,
        "collected diagram blocks"
    );
    collected
}

fn visit(
    node: &Node,
    ancestors: &mut Vec<Node>,
    strategy: Strategy,
    detect_scheme: bool,
    out: &mut Collected,
) {
    if let Some(element) = node.as_element() {
        // first qualifying hint wins; later meta elements cannot override
        if detect_scheme && out.color_scheme.is_none() {
            out.color_scheme = color_scheme_hint(element);
        }
        if is_diagram_element(element, strategy) {
            if let Some(instance) = resolve_instance(node, ancestors) {
                out.instances.push(instance);
                // never descend into a matched node: a marked pre holding a
                // marked code block yields one instance, not two
                return;
            }
        }
    }
    ancestors.push(node.clone());
    for child in node.children() {
        visit(&child, ancestors, strategy, detect_scheme, out);
    }
    ancestors.pop();
}

/// Whether this element denotes a diagram block under the given strategy.
pub(crate) fn is_diagram_element(element: &Element, strategy: Strategy) -> bool {
    match element.tag_name.as_str() {
        // a bare pre marker is already the terminal form of the
        // pre-mermaid strategy; matching it again would re-process output
        "pre" => strategy != Strategy::PreMermaid && has_marker(element, MERMAID_CLASS),
        "code" => {
            has_marker(element, LANGUAGE_MERMAID_CLASS) || has_marker(element, LANG_MERMAID_CLASS)
        }
        _ => false,
    }
}

fn has_marker(element: &Element, marker: &str) -> bool {
    element
        .property("class")
        .is_some_and(|value| has_token(value, marker))
}

/// Token membership over both legitimate class shapes. Any other shape is a
/// non-match, never an error.
fn has_token(value: &PropertyValue, token: &str) -> bool {
    match value {
        PropertyValue::String(value) => value.split_whitespace().any(|t| t == token),
        PropertyValue::Tokens(tokens) => tokens.iter().any(|t| t == token),
        PropertyValue::Bool(_) | PropertyValue::Number(_) => false,
    }
}

/// Decide the replaceable unit for a matched node.
///
/// A match wrapped in a `pre` collapses to the `pre` itself, provided every
/// other child of the `pre` is whitespace-only text. Any other sibling
/// disqualifies the match entirely (no instance).
fn resolve_instance(node: &Node, ancestors: &[Node]) -> Option<DiagramInstance> {
    let parent = ancestors.last()?;
    let wrapped = parent
        .as_element()
        .is_some_and(|element| element.tag_name == "pre");

    if wrapped {
        for sibling in parent.children() {
            if let Some(text) = sibling.as_text() {
                if !is_whitespace_only(text) {
                    return None;
                }
            } else if sibling != *node {
                return None;
            }
        }
        if ancestors.len() < 2 {
            return None;
        }
        let grandparent = &ancestors[ancestors.len() - 2];
        Some(DiagramInstance {
            source: node.text_content(),
            node: parent.clone(),
            parent: grandparent.clone(),
            ancestors: ancestors.to_vec(),
        })
    } else {
        let mut chain = ancestors.to_vec();
        chain.push(node.clone());
        Some(DiagramInstance {
            source: node.text_content(),
            node: node.clone(),
            parent: parent.clone(),
            ancestors: chain,
        })
    }
}

/// Whitespace-only test for formatting text between a `pre` and its `code`.
///
/// A text node counts as whitespace-only when it contains no ASCII word
/// characters (letters, digits, underscore). Punctuation-only text is
/// deliberately treated as empty formatting; this is looser than a strict
/// Unicode whitespace test and is part of the matching contract.
fn is_whitespace_only(text: &str) -> bool {
    !text
        .chars()
        .any(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Theme hint from a `meta[name="color-scheme"]` element: the first
/// `light`/`dark` token of its `content` attribute.
fn color_scheme_hint(element: &Element) -> Option<ColorScheme> {
    if element.tag_name != "meta" {
        return None;
    }
    let is_scheme_meta = matches!(
        element.property("name"),
        Some(PropertyValue::String(name)) if name == COLOR_SCHEME_META
    );
    if !is_scheme_meta {
        return None;
    }
    match element.property("content")? {
        PropertyValue::String(content) => content.split_whitespace().find_map(ColorScheme::parse),
        PropertyValue::Tokens(tokens) => {
            tokens.iter().find_map(|token| ColorScheme::parse(token))
        }
        PropertyValue::Bool(_) | PropertyValue::Number(_) => None,
    }
}
