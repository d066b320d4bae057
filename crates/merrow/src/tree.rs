//! Document tree data model.
//!
//! The transformation pass operates on a caller-owned tree of typed nodes:
//! - [`Node::root`]: the document root
//! - [`Node::element`]: a tag name, a property map, and ordered children
//! - [`Node::text`]: literal character data
//! - [`Node::comment`] / [`Node::doctype`]: carried through untouched
//!
//! [`Node`] is a cheap handle (reference-counted), so ancestor chains and
//! staged replacements can hold the same underlying node without copying
//! subtrees. Equality is identity: two handles compare equal exactly when
//! they refer to the same node, which is what substitution relies on to
//! locate a child slot after earlier siblings were already replaced.
//!
//! The tree has an immutable shape from the caller's point of view; only the
//! children of specific parents are swapped in place when diagrams are
//! substituted.

use std::cell::{RefCell, RefMut};
use std::collections::BTreeMap;
use std::rc::Rc;

/// Property map of an element: attribute name to value.
pub type Properties = BTreeMap<String, PropertyValue>;

/// An element property value.
///
/// Class-like attributes legitimately occur in two shapes, a single
/// space-separated string or an already-tokenized sequence; both are
/// accepted wherever tokens are matched. Any other shape is treated as a
/// non-match there, never as an error.
#[derive(Clone, Debug, PartialEq)]
pub enum PropertyValue {
    Bool(bool),
    Number(f64),
    String(String),
    Tokens(Vec<String>),
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<u32> for PropertyValue {
    fn from(value: u32) -> Self {
        Self::Number(f64::from(value))
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<Vec<String>> for PropertyValue {
    fn from(value: Vec<String>) -> Self {
        Self::Tokens(value)
    }
}

impl From<Vec<&str>> for PropertyValue {
    fn from(value: Vec<&str>) -> Self {
        Self::Tokens(value.into_iter().map(str::to_owned).collect())
    }
}

/// Element payload: tag name, properties, children.
#[derive(Debug)]
pub struct Element {
    pub tag_name: String,
    pub properties: Properties,
    pub(crate) children: RefCell<Vec<Node>>,
}

impl Element {
    /// Look up a property value by attribute name.
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(name)
    }
}

#[derive(Debug)]
pub(crate) enum NodeKind {
    Root { children: RefCell<Vec<Node>> },
    Element(Element),
    Text { value: String },
    Comment { value: String },
    Doctype,
}

/// A handle to one node of the document tree.
///
/// Cloning a `Node` clones the handle, not the subtree. Two handles are
/// equal iff they point at the same node.
#[derive(Clone, Debug)]
pub struct Node(Rc<NodeKind>);

impl Node {
    /// Create a document root with the given children.
    #[must_use]
    pub fn root(children: Vec<Node>) -> Self {
        Self(Rc::new(NodeKind::Root {
            children: RefCell::new(children),
        }))
    }

    /// Create an element node.
    #[must_use]
    pub fn element(
        tag_name: impl Into<String>,
        properties: Properties,
        children: Vec<Node>,
    ) -> Self {
        Self(Rc::new(NodeKind::Element(Element {
            tag_name: tag_name.into(),
            properties,
            children: RefCell::new(children),
        })))
    }

    /// Create a text node.
    #[must_use]
    pub fn text(value: impl Into<String>) -> Self {
        Self(Rc::new(NodeKind::Text {
            value: value.into(),
        }))
    }

    /// Create a comment node.
    #[must_use]
    pub fn comment(value: impl Into<String>) -> Self {
        Self(Rc::new(NodeKind::Comment {
            value: value.into(),
        }))
    }

    /// Create a doctype node.
    #[must_use]
    pub fn doctype() -> Self {
        Self(Rc::new(NodeKind::Doctype))
    }

    /// Element payload, if this node is an element.
    #[must_use]
    pub fn as_element(&self) -> Option<&Element> {
        match &*self.0 {
            NodeKind::Element(element) => Some(element),
            _ => None,
        }
    }

    /// Text value, if this node is a text node.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match &*self.0 {
            NodeKind::Text { value } => Some(value),
            _ => None,
        }
    }

    /// Snapshot of this node's children. Empty for leaf nodes.
    #[must_use]
    pub fn children(&self) -> Vec<Node> {
        match &*self.0 {
            NodeKind::Root { children } => children.borrow().clone(),
            NodeKind::Element(element) => element.children.borrow().clone(),
            _ => Vec::new(),
        }
    }

    /// Mutable access to the child slots of a root or element node.
    pub(crate) fn children_mut(&self) -> Option<RefMut<'_, Vec<Node>>> {
        match &*self.0 {
            NodeKind::Root { children } => Some(children.borrow_mut()),
            NodeKind::Element(element) => Some(element.children.borrow_mut()),
            _ => None,
        }
    }

    /// Concatenate all descendant text in document order.
    ///
    /// Internal whitespace is preserved exactly; this is the literal diagram
    /// source when called on a matched block.
    #[must_use]
    pub fn text_content(&self) -> String {
        fn collect(node: &Node, out: &mut String) {
            match &*node.0 {
                NodeKind::Text { value } => out.push_str(value),
                NodeKind::Root { children } => {
                    for child in &*children.borrow() {
                        collect(child, out);
                    }
                }
                NodeKind::Element(element) => {
                    for child in &*element.children.borrow() {
                        collect(child, out);
                    }
                }
                NodeKind::Comment { .. } | NodeKind::Doctype => {}
            }
        }

        let mut out = String::new();
        collect(self, &mut out);
        out
    }

    /// Short label for positional breadcrumbs: `root`, the tag name, or the
    /// node kind.
    pub(crate) fn label(&self) -> &str {
        match &*self.0 {
            NodeKind::Root { .. } => "root",
            NodeKind::Element(element) => &element.tag_name,
            NodeKind::Text { .. } => "text",
            NodeKind::Comment { .. } => "comment",
            NodeKind::Doctype => "doctype",
        }
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Node {}
