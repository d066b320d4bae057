//! Internal constants for diagram matching and diagnostics.

/// Class token marking a diagram container (`<pre class="mermaid">`).
pub const MERMAID_CLASS: &str = "mermaid";

/// Class token marking an inline diagram block (`<code class="language-mermaid">`).
pub const LANGUAGE_MERMAID_CLASS: &str = "language-mermaid";

/// Historical short spelling of the inline marker, still accepted.
pub const LANG_MERMAID_CLASS: &str = "lang-mermaid";

/// Metadata element name declaring the document color scheme.
pub const COLOR_SCHEME_META: &str = "color-scheme";

/// Default identifier prefix for rendered diagrams.
pub const DEFAULT_PREFIX: &str = "mermaid";

/// Origin tag attached to fatal diagram failures.
pub const DIAGNOSTIC_ORIGIN: &str = "merrow";

/// Documentation URL attached to fatal diagram failures.
pub const DIAGNOSTIC_URL: &str = "https://docs.rs/merrow";
