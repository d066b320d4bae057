//! Kroki-backed diagram renderer.
//!
//! [`KrokiRenderer`] implements [`merrow::DiagramRenderer`] against a Kroki
//! HTTP service:
//! - one POST per diagram and format, parallelized on the rayon thread pool
//! - theme configuration injected as a mermaid init directive
//! - SVG metadata (dimensions, title, description) recovered from the
//!   rendered document; PNG dimensions read from the IHDR chunk
//!
//! Kroki renders server-side without a browser, so the `css` render option
//! cannot be honored and is ignored.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use merrow::{MermaidProcessor, Strategy};
//! use merrow_kroki::KrokiRenderer;
//!
//! let renderer = Arc::new(KrokiRenderer::new().server_url("http://localhost:8000"));
//! let processor = MermaidProcessor::new()
//!     .strategy(Strategy::ImgSvg)
//!     .dark(true)
//!     .renderer(renderer);
//! ```

use std::time::Duration;

use merrow::{DiagramRenderer, RenderError, RenderOptions, RenderOutcome, RenderedDiagram};
use rayon::prelude::*;
use roxmltree::Document;
use serde_json::Value;
use tracing::warn;
use ureq::Agent;

/// Public Kroki instance, used when no server is configured.
const DEFAULT_SERVER_URL: &str = "https://kroki.io";

/// Global timeout applied to every request unless overridden.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Single diagram rendering error.
#[derive(Debug, thiserror::Error)]
pub enum KrokiError {
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("I/O error: {0}")]
    Io(String),
    #[error("invalid PNG data")]
    InvalidPng,
}

/// Renders mermaid diagrams by POSTing their sources to a Kroki service.
///
/// One agent is shared across all requests for connection pooling. The
/// renderer is `Send + Sync` and can be wrapped in an `Arc` once and reused
/// for any number of documents.
pub struct KrokiRenderer {
    agent: Agent,
    server_url: String,
}

impl Default for KrokiRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl KrokiRenderer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            agent: create_agent(DEFAULT_TIMEOUT),
            server_url: DEFAULT_SERVER_URL.to_owned(),
        }
    }

    /// Kroki server to talk to. A trailing slash is tolerated.
    #[must_use]
    pub fn server_url(mut self, url: impl Into<String>) -> Self {
        self.server_url = url.into();
        self
    }

    /// Global timeout applied to every request.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.agent = create_agent(timeout);
        self
    }

    fn render_one(
        &self,
        index: usize,
        source: &str,
        options: &RenderOptions,
    ) -> Result<RenderedDiagram, KrokiError> {
        let source = compose_source(source, options.mermaid_config.as_ref());

        let svg_bytes = self.send_request("svg", &source)?;
        let svg = String::from_utf8(svg_bytes)
            .map_err(|e| KrokiError::Io(format!("invalid UTF-8 in SVG: {e}")))?;
        let metadata = SvgMetadata::extract(&svg);

        let mut diagram = RenderedDiagram {
            svg,
            width: metadata.width,
            height: metadata.height,
            id: Some(format!("{}-{index}", options.prefix)),
            title: metadata.title,
            description: metadata.description,
            ..RenderedDiagram::default()
        };

        if options.screenshot {
            let png = self.send_request("png", &source)?;
            let (width, height) = png_dimensions(&png).ok_or(KrokiError::InvalidPng)?;
            diagram.width = Some(width);
            diagram.height = Some(height);
            diagram.screenshot = Some(png);
        }

        Ok(diagram)
    }

    /// Send one diagram to Kroki and return the response body.
    ///
    /// Handles HTTP errors by reading the response body for error details;
    /// for a rejected diagram Kroki explains the rejection in the body.
    fn send_request(&self, format: &str, source: &str) -> Result<Vec<u8>, KrokiError> {
        let url = endpoint(&self.server_url, format);

        let response = self
            .agent
            .post(&url)
            .header("Content-Type", "text/plain")
            .send(source.as_bytes())
            .map_err(|e| KrokiError::Http(e.to_string()))?;

        let status = response.status().as_u16();
        let mut body = response.into_body();

        if status >= 400 {
            let error_body = body
                .read_to_string()
                .unwrap_or_else(|_| String::from("(unable to read error body)"));
            return Err(KrokiError::Http(format!("HTTP {status}: {error_body}")));
        }

        body.read_to_vec().map_err(|e| KrokiError::Io(e.to_string()))
    }
}

impl DiagramRenderer for KrokiRenderer {
    fn render(&self, sources: &[String], options: &RenderOptions) -> Vec<RenderOutcome> {
        if options.css.is_some() {
            warn!("kroki renders without a browser, ignoring custom css");
        }
        sources
            .par_iter()
            .enumerate()
            .map(|(index, source)| {
                self.render_one(index, source, options)
                    .map_err(|error| RenderError::new(error.to_string()))
            })
            .collect()
    }
}

/// Create an HTTP agent with the specified timeout.
fn create_agent(timeout: Duration) -> Agent {
    Agent::config_builder()
        .timeout_global(Some(timeout))
        .http_status_as_error(false)
        .build()
        .into()
}

fn endpoint(server_url: &str, format: &str) -> String {
    let server_url = server_url.trim_end_matches('/');
    format!("{server_url}/mermaid/{format}")
}

/// Prepend an init directive carrying the per-batch mermaid configuration.
fn compose_source(source: &str, config: Option<&Value>) -> String {
    match config {
        Some(config) => format!("%%{{init: {config}}}%%\n{source}"),
        None => source.to_owned(),
    }
}

/// Extract width and height from PNG image data.
///
/// PNG format: 8-byte signature, then IHDR chunk with width/height at bytes
/// 16-24, big-endian.
fn png_dimensions(data: &[u8]) -> Option<(u32, u32)> {
    if data.len() < 24 {
        return None;
    }
    if &data[0..8] != b"\x89PNG\r\n\x1a\n" {
        return None;
    }
    let width = u32::from_be_bytes([data[16], data[17], data[18], data[19]]);
    let height = u32::from_be_bytes([data[20], data[21], data[22], data[23]]);
    Some((width, height))
}

/// Presentation metadata of a rendered SVG document.
#[derive(Debug, Default)]
struct SvgMetadata {
    width: Option<u32>,
    height: Option<u32>,
    title: Option<String>,
    description: Option<String>,
}

impl SvgMetadata {
    /// Pull metadata out of a rendered SVG document.
    ///
    /// A payload that does not parse yields empty metadata rather than an
    /// error; the SVG may still be usable downstream.
    fn extract(svg: &str) -> Self {
        let Ok(document) = Document::parse(svg) else {
            return Self::default();
        };
        let root = document.root_element();

        let (width, height) = explicit_dimensions(root)
            .or_else(|| view_box_dimensions(root))
            .unzip();

        Self {
            width,
            height,
            title: first_text(root, "title"),
            description: first_text(root, "desc"),
        }
    }
}

fn explicit_dimensions(root: roxmltree::Node<'_, '_>) -> Option<(u32, u32)> {
    let width = parse_length(root.attribute("width")?)?;
    let height = parse_length(root.attribute("height")?)?;
    Some((width, height))
}

/// Dimensions from the `viewBox` when explicit lengths are missing or
/// relative (mermaid emits `width="100%"` under `useMaxWidth`).
fn view_box_dimensions(root: roxmltree::Node<'_, '_>) -> Option<(u32, u32)> {
    let mut parts = root.attribute("viewBox")?.split_whitespace().skip(2);
    let width = parse_length(parts.next()?)?;
    let height = parse_length(parts.next()?)?;
    Some((width, height))
}

/// Whole-pixel prefix of a CSS length. Percentage lengths carry no pixel
/// information and yield `None`.
fn parse_length(value: &str) -> Option<u32> {
    let value = value.trim();
    if value.ends_with('%') {
        return None;
    }
    let end = value
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(value.len());
    value[..end].parse().ok()
}

/// Trimmed text of the first descendant with the given tag name.
fn first_text(root: roxmltree::Node<'_, '_>, name: &str) -> Option<String> {
    let node = root.descendants().find(|node| node.has_tag_name(name))?;
    let text = node.text()?.trim();
    if text.is_empty() {
        return None;
    }
    Some(text.to_owned())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn test_png_dimensions() {
        // Minimal valid PNG with 100x50 dimensions
        let mut png_data = vec![
            0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, // PNG signature
            0x00, 0x00, 0x00, 0x0D, // IHDR length
            b'I', b'H', b'D', b'R', // IHDR type
            0x00, 0x00, 0x00, 0x64, // width = 100
            0x00, 0x00, 0x00, 0x32, // height = 50
        ];
        png_data.extend_from_slice(&[0; 5]); // bit depth, color type, etc.

        assert_eq!(png_dimensions(&png_data), Some((100, 50)));
    }

    #[test]
    fn test_png_dimensions_rejects_other_data() {
        assert_eq!(png_dimensions(b"not a png"), None);
        assert_eq!(png_dimensions(b"\x89PNG\r\n\x1a\n"), None);
    }

    #[test]
    fn test_compose_source_injects_the_init_directive() {
        let composed = compose_source("graph TD;", Some(&json!({"theme": "dark"})));
        assert_eq!(composed, "%%{init: {\"theme\":\"dark\"}}%%\ngraph TD;");
    }

    #[test]
    fn test_compose_source_without_config_is_the_source() {
        assert_eq!(compose_source("graph TD;", None), "graph TD;");
    }

    #[test]
    fn test_endpoint_tolerates_trailing_slashes() {
        assert_eq!(endpoint("https://kroki.io/", "svg"), "https://kroki.io/mermaid/svg");
        assert_eq!(endpoint("https://kroki.io", "png"), "https://kroki.io/mermaid/png");
    }

    #[test]
    fn test_svg_metadata_prefers_explicit_dimensions() {
        let svg = concat!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="816.5px" height="420" viewBox="0 0 100 50">"#,
            "<title>Flow</title><desc>A to B</desc><g/></svg>",
        );
        let metadata = SvgMetadata::extract(svg);

        assert_eq!(metadata.width, Some(816));
        assert_eq!(metadata.height, Some(420));
        assert_eq!(metadata.title.as_deref(), Some("Flow"));
        assert_eq!(metadata.description.as_deref(), Some("A to B"));
    }

    #[test]
    fn test_svg_metadata_falls_back_to_the_view_box() {
        let svg = r#"<svg xmlns="http://www.w3.org/2000/svg" width="100%" viewBox="0 0 816 420"/>"#;
        let metadata = SvgMetadata::extract(svg);

        assert_eq!(metadata.width, Some(816));
        assert_eq!(metadata.height, Some(420));
        assert_eq!(metadata.title, None);
        assert_eq!(metadata.description, None);
    }

    #[test]
    fn test_svg_metadata_finds_nested_accessibility_elements() {
        let svg = concat!(
            r#"<svg xmlns="http://www.w3.org/2000/svg">"#,
            "<g><title>Nested title</title></g></svg>",
        );
        let metadata = SvgMetadata::extract(svg);

        assert_eq!(metadata.title.as_deref(), Some("Nested title"));
        assert_eq!(metadata.width, None);
    }

    #[test]
    fn test_svg_metadata_survives_unparseable_payloads() {
        let metadata = SvgMetadata::extract("Internal Server Error");

        assert_eq!(metadata.width, None);
        assert_eq!(metadata.height, None);
        assert_eq!(metadata.title, None);
        assert_eq!(metadata.description, None);
    }

    #[test]
    fn test_parse_length() {
        assert_eq!(parse_length("420"), Some(420));
        assert_eq!(parse_length("816.5px"), Some(816));
        assert_eq!(parse_length(" 42 "), Some(42));
        assert_eq!(parse_length("100%"), None);
        assert_eq!(parse_length("auto"), None);
        assert_eq!(parse_length(""), None);
    }
}
