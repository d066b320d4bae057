//! Mermaid diagram rendering pass for HTML document trees.
//!
//! This crate locates mermaid diagram blocks in a parsed document, renders
//! them through a pluggable backend, and splices the results back in place:
//! - matching covers `pre` elements with the `mermaid` marker and `code`
//!   elements with a `language-mermaid` (or `lang-mermaid`) class
//! - all diagrams of a document render in one batch per theme; light and
//!   dark batches run concurrently
//! - output form is chosen by [`Strategy`]: inline SVG, an `img` with a
//!   data URI, a responsive light/dark `picture` pair, or a normalized
//!   `pre` block for client-side rendering
//!
//! # Architecture
//!
//! A run is a strict pipeline: one read-only collection walk gathers the
//! diagram instances (and the document's `color-scheme` hint), the
//! [`DiagramRenderer`] collaborator renders every source per theme, each
//! instance's outcomes merge into a staged replacement, and the staged list
//! is applied to the tree only after every instance merged cleanly. Render
//! failures route through the optional [`ErrorFallback`]; without one the
//! first failure aborts the run with the document untouched.
//!
//! # Example
//!
//! Rewriting fenced code blocks into the form the client-side mermaid
//! loader expects needs no renderer at all:
//!
//! ```
//! use merrow::{MermaidProcessor, Node, Properties, PropertyValue, Strategy};
//!
//! let code = Node::element(
//!     "code",
//!     Properties::from([("class".to_owned(), PropertyValue::from("language-mermaid"))]),
//!     vec![Node::text("graph TD; A-->B")],
//! );
//! let tree = Node::root(vec![Node::element("body", Properties::new(), vec![code])]);
//!
//! let replaced = MermaidProcessor::new()
//!     .strategy(Strategy::PreMermaid)
//!     .process(&tree)?;
//!
//! assert_eq!(replaced, 1);
//! # Ok::<(), merrow::ProcessError>(())
//! ```
//!
//! The rendering strategies take a [`DiagramRenderer`] implementation, for
//! example the Kroki-backed one from the `merrow-kroki` crate.

mod collect;
mod consts;
mod datauri;
mod error;
mod merge;
mod processor;
mod renderer;
mod strategy;
mod substitute;
mod svg;
mod tree;

pub use error::{DiagramFailure, ProcessError, Result};
pub use processor::{DarkMode, MermaidProcessor};
pub use renderer::{
    DiagramRenderer, ErrorFallback, RenderError, RenderOptions, RenderOutcome, RenderedDiagram,
};
pub use strategy::{ColorScheme, Strategy};
pub use tree::{Element, Node, Properties, PropertyValue};
