//! Error types for the transformation pass.

use crate::consts::{DIAGNOSTIC_ORIGIN, DIAGNOSTIC_URL};
use crate::strategy::Strategy;

/// Result alias for transformation operations.
pub type Result<T> = std::result::Result<T, ProcessError>;

/// Errors that abort a transformation run.
///
/// Configuration errors surface before the tree walk begins; a
/// [`ProcessError::Diagram`] failure surfaces before any tree mutation, so
/// the input tree is returned unmodified in every error case.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    /// The strategy token is not one of the four valid tokens.
    #[error("unknown strategy `{found}`, expected one of: {}", Strategy::token_list())]
    UnknownStrategy { found: String },

    /// A render-requiring strategy was selected but no renderer configured.
    #[error("strategy `{strategy}` requires a diagram renderer")]
    MissingRenderer { strategy: Strategy },

    /// The renderer broke its contract of one outcome per input, in order.
    #[error("renderer returned {actual} outcomes for {expected} diagrams")]
    OutcomeMismatch { expected: usize, actual: usize },

    /// A diagram failed to render and no fallback was configured.
    #[error(transparent)]
    Diagram(#[from] DiagramFailure),
}

/// Fatal, document-level failure for one diagram.
///
/// Carries the positional context a caller needs to report the failure the
/// way a lint message would: the breadcrumb chain of node labels from the
/// document root down to the block that failed.
#[derive(Debug, thiserror::Error)]
#[error("{reason} (at {})", .ancestors.join(" > "))]
pub struct DiagramFailure {
    /// Failure reason as reported by the renderer.
    pub reason: String,
    /// Tag identifying the component that produced the message. Not named
    /// `source`: thiserror reserves that field name for the error cause.
    pub origin: &'static str,
    /// Rule identifier: the strategy token that was active.
    pub rule_id: &'static str,
    /// Always true; an unhandled render failure aborts the run.
    pub fatal: bool,
    /// Where the failure semantics are documented.
    pub url: &'static str,
    /// Node labels from the document root to the replaceable node.
    pub ancestors: Vec<String>,
}

impl DiagramFailure {
    pub(crate) fn new(
        reason: impl Into<String>,
        rule_id: &'static str,
        ancestors: Vec<String>,
    ) -> Self {
        Self {
            reason: reason.into(),
            origin: DIAGNOSTIC_ORIGIN,
            rule_id,
            fatal: true,
            url: DIAGNOSTIC_URL,
            ancestors,
        }
    }
}
