//! Rendering collaborator interface.
//!
//! The transformation pass never renders diagrams itself; it hands every
//! collected source to a [`DiagramRenderer`] and splices the outcomes back
//! into the tree. `merrow-kroki` provides an HTTP-backed implementation;
//! tests use stubs.

use std::path::Path;

use serde_json::Value;

use crate::tree::Node;

/// Options for one rendering batch.
///
/// A run issues at most two batches: one for the light theme and, when dark
/// rendering is enabled under an image strategy, one for the dark theme with
/// a `-dark` id prefix and a dark theme configuration.
#[derive(Clone, Debug, Default)]
pub struct RenderOptions {
    /// Whether a raster screenshot payload is required in addition to SVG.
    pub screenshot: bool,
    /// Identifier prefix; rendered diagram ids take the form `{prefix}-{index}`.
    pub prefix: String,
    /// Mermaid configuration override for this batch.
    pub mermaid_config: Option<Value>,
    /// Extra CSS for renderers that can inject styles.
    pub css: Option<String>,
}

/// Success payload for one rendered diagram.
#[derive(Clone, Debug, Default)]
pub struct RenderedDiagram {
    /// The rendered SVG document.
    pub svg: String,
    /// Raster payload, present when [`RenderOptions::screenshot`] was set.
    pub screenshot: Option<Vec<u8>>,
    /// Pixel width, when the renderer could determine it.
    pub width: Option<u32>,
    /// Pixel height, when the renderer could determine it.
    pub height: Option<u32>,
    /// Identifier of the rendered diagram.
    pub id: Option<String>,
    /// Diagram title, when the source declares one.
    pub title: Option<String>,
    /// Accessible description, when the source declares one.
    pub description: Option<String>,
}

/// Failure reason for one diagram within a batch.
#[derive(Clone, Debug, thiserror::Error)]
#[error("{message}")]
pub struct RenderError {
    /// Human-readable reason, surfaced in fallbacks and fatal failures.
    pub message: String,
}

impl RenderError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Per-diagram outcome of one theme batch.
pub type RenderOutcome = std::result::Result<RenderedDiagram, RenderError>;

/// A diagram rendering engine.
///
/// Implementations must return exactly one outcome per input source, in
/// input order; reordering or dropping entries breaks the correlation with
/// collected instances and aborts the run. Failures are reported per item,
/// never by panicking or truncating the batch. A batch-level problem (for
/// example an unreachable service) is reported by failing every item.
pub trait DiagramRenderer: Send + Sync {
    /// Render every source with the given options.
    fn render(&self, sources: &[String], options: &RenderOptions) -> Vec<RenderOutcome>;
}

/// Recovery hook for diagrams that failed to render.
///
/// Returning a node substitutes it in place of the failed block; returning
/// `None` removes the block from the document. When no fallback is
/// configured, the first failure aborts the whole run instead.
pub trait ErrorFallback: Send + Sync {
    /// Decide the replacement for a failed diagram block.
    fn recover(
        &self,
        node: &Node,
        source: &str,
        error: &RenderError,
        file: Option<&Path>,
    ) -> Option<Node>;
}

impl<F> ErrorFallback for F
where
    F: Fn(&Node, &str, &RenderError, Option<&Path>) -> Option<Node> + Send + Sync,
{
    fn recover(
        &self,
        node: &Node,
        source: &str,
        error: &RenderError,
        file: Option<&Path>,
    ) -> Option<Node> {
        self(node, source, error, file)
    }
}
