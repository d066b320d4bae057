//! Run orchestration.
//!
//! [`MermaidProcessor`] wires the stages together: one collection walk,
//! at most two rendering batches, replacement construction, and finally
//! in-place substitution. Replacements are staged during merging and
//! applied only after every instance merged cleanly, so an unhandled
//! failure aborts with the document unmodified.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;

use crate::collect;
use crate::consts::DEFAULT_PREFIX;
use crate::error::{ProcessError, Result};
use crate::merge::{self, MergeContext, Replacement};
use crate::renderer::{DiagramRenderer, ErrorFallback, RenderOptions};
use crate::strategy::{ColorScheme, Strategy};
use crate::substitute;
use crate::tree::Node;

/// Dark-theme rendering mode.
#[derive(Clone, Debug, Default)]
pub enum DarkMode {
    /// Single-theme rendering.
    #[default]
    Disabled,
    /// Derive the dark configuration from the light one by forcing the
    /// mermaid `theme` field to `"dark"`.
    Auto,
    /// Caller-supplied dark mermaid configuration, used as-is.
    Config(Value),
}

impl From<bool> for DarkMode {
    fn from(enabled: bool) -> Self {
        if enabled { Self::Auto } else { Self::Disabled }
    }
}

impl From<Value> for DarkMode {
    fn from(config: Value) -> Self {
        Self::Config(config)
    }
}

/// Renders mermaid diagram blocks found in a document tree and splices the
/// results back in place.
///
/// Configured through builder methods; one configured processor can serve
/// any number of documents.
pub struct MermaidProcessor {
    strategy: Strategy,
    color_scheme: Option<ColorScheme>,
    dark: DarkMode,
    mermaid_config: Option<Value>,
    css: Option<String>,
    prefix: String,
    fallback: Option<Arc<dyn ErrorFallback>>,
    file_path: Option<PathBuf>,
    renderer: Option<Arc<dyn DiagramRenderer>>,
}

impl Default for MermaidProcessor {
    fn default() -> Self {
        Self {
            strategy: Strategy::default(),
            color_scheme: None,
            dark: DarkMode::default(),
            mermaid_config: None,
            css: None,
            prefix: DEFAULT_PREFIX.to_owned(),
            fallback: None,
            file_path: None,
            renderer: None,
        }
    }
}

impl MermaidProcessor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Output form for rendered diagrams.
    #[must_use]
    pub fn strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Explicit default color scheme. Suppresses detection of the
    /// document's `meta[name="color-scheme"]` hint.
    #[must_use]
    pub fn color_scheme(mut self, scheme: ColorScheme) -> Self {
        self.color_scheme = Some(scheme);
        self
    }

    /// Dark-theme rendering. Accepts `true` for the derived dark
    /// configuration or a full mermaid configuration object. Ignored by
    /// strategies that cannot express a light/dark pair.
    #[must_use]
    pub fn dark(mut self, dark: impl Into<DarkMode>) -> Self {
        self.dark = dark.into();
        self
    }

    /// Mermaid configuration forwarded to the renderer.
    #[must_use]
    pub fn mermaid_config(mut self, config: Value) -> Self {
        self.mermaid_config = Some(config);
        self
    }

    /// Extra CSS forwarded to the renderer.
    #[must_use]
    pub fn css(mut self, css: impl Into<String>) -> Self {
        self.css = Some(css.into());
        self
    }

    /// Identifier prefix for rendered diagrams. The dark batch derives its
    /// own prefix from this one.
    #[must_use]
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Per-instance failure handler. Without one, the first render failure
    /// aborts the whole run.
    #[must_use]
    pub fn fallback(mut self, fallback: impl ErrorFallback + 'static) -> Self {
        self.fallback = Some(Arc::new(fallback));
        self
    }

    /// File the document came from, forwarded to the fallback for
    /// reporting.
    #[must_use]
    pub fn file_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    /// Rendering collaborator. Required by every strategy except
    /// [`Strategy::PreMermaid`].
    #[must_use]
    pub fn renderer(mut self, renderer: Arc<dyn DiagramRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// Render every diagram block in the tree and splice the results in
    /// place.
    ///
    /// Returns the number of replacements applied, removals included. A
    /// document without diagram blocks is returned untouched without ever
    /// consulting the renderer.
    ///
    /// # Errors
    ///
    /// [`ProcessError::MissingRenderer`] when a rendering strategy has no
    /// renderer configured, [`ProcessError::OutcomeMismatch`] when the
    /// renderer broke the one-outcome-per-input contract, and
    /// [`ProcessError::Diagram`] for a render failure with no fallback to
    /// absorb it. On error the tree is left unmodified.
    pub fn process(&self, tree: &Node) -> Result<usize> {
        let collected = collect::collect(tree, self.strategy, self.color_scheme);
        if collected.instances.is_empty() {
            return Ok(0);
        }

        if self.strategy == Strategy::PreMermaid {
            let staged = collected
                .instances
                .iter()
                .map(|instance| {
                    let block = merge::client_block(&instance.source);
                    (instance, Replacement::Node(block))
                })
                .collect();
            return Ok(substitute::apply(staged));
        }

        let renderer = self
            .renderer
            .as_deref()
            .ok_or(ProcessError::MissingRenderer {
                strategy: self.strategy,
            })?;

        let sources: Vec<String> = collected
            .instances
            .iter()
            .map(|instance| instance.source.clone())
            .collect();
        let light_options = self.render_options(ColorScheme::Light);
        let dark_options = self.dark_options();

        debug!(
            instances = sources.len(),
            strategy = %self.strategy,
            dual_theme = dark_options.is_some(),
            "rendering diagram blocks"
        );

        let (light_outcomes, dark_outcomes) = match &dark_options {
            Some(options) => {
                let (light, dark) = rayon::join(
                    || renderer.render(&sources, &light_options),
                    || renderer.render(&sources, options),
                );
                (light, Some(dark))
            }
            None => (renderer.render(&sources, &light_options), None),
        };

        expect_outcomes(sources.len(), light_outcomes.len())?;
        if let Some(outcomes) = &dark_outcomes {
            expect_outcomes(sources.len(), outcomes.len())?;
        }

        let ctx = MergeContext {
            strategy: self.strategy,
            default_scheme: self
                .color_scheme
                .or(collected.color_scheme)
                .unwrap_or_default(),
            fallback: self.fallback.as_deref(),
            file: self.file_path.as_deref(),
        };

        // stage everything before touching the tree: an unhandled failure
        // must abort with the document unmodified
        let mut staged = Vec::with_capacity(collected.instances.len());
        let mut darks = dark_outcomes.map(Vec::into_iter);
        for (instance, light) in collected.instances.iter().zip(light_outcomes) {
            let dark = darks.as_mut().and_then(Iterator::next);
            staged.push((instance, merge::build_replacement(&ctx, instance, light, dark)?));
        }
        Ok(substitute::apply(staged))
    }

    fn render_options(&self, scheme: ColorScheme) -> RenderOptions {
        let prefix = match scheme {
            ColorScheme::Light => self.prefix.clone(),
            ColorScheme::Dark => format!("{}-dark", self.prefix),
        };
        RenderOptions {
            screenshot: self.strategy.is_raster(),
            prefix,
            mermaid_config: self.mermaid_config.clone(),
            css: self.css.clone(),
        }
    }

    /// Options for the dark batch, or `None` when only one batch runs.
    fn dark_options(&self) -> Option<RenderOptions> {
        if !self.strategy.supports_color_schemes() {
            return None;
        }
        let config = match &self.dark {
            DarkMode::Disabled => return None,
            DarkMode::Auto => dark_theme(self.mermaid_config.as_ref()),
            DarkMode::Config(config) => config.clone(),
        };
        let mut options = self.render_options(ColorScheme::Dark);
        options.mermaid_config = Some(config);
        Some(options)
    }
}

/// Light configuration with the mermaid `theme` field forced to `"dark"`.
fn dark_theme(light: Option<&Value>) -> Value {
    let mut config = match light {
        Some(Value::Object(map)) => map.clone(),
        _ => Map::new(),
    };
    config.insert("theme".to_owned(), Value::from("dark"));
    Value::Object(config)
}

fn expect_outcomes(expected: usize, actual: usize) -> Result<()> {
    if expected == actual {
        return Ok(());
    }
    Err(ProcessError::OutcomeMismatch { expected, actual })
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Mutex;

    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::renderer::{RenderError, RenderOutcome, RenderedDiagram};
    use crate::tree::{Properties, PropertyValue};

    /// Succeeds for every source except those containing `boom`, records
    /// every batch it receives.
    #[derive(Default)]
    struct StubRenderer {
        calls: Mutex<Vec<(Vec<String>, RenderOptions)>>,
    }

    impl StubRenderer {
        fn calls(&self) -> Vec<(Vec<String>, RenderOptions)> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl DiagramRenderer for StubRenderer {
        fn render(&self, sources: &[String], options: &RenderOptions) -> Vec<RenderOutcome> {
            self.calls
                .lock()
                .unwrap()
                .push((sources.to_vec(), options.clone()));
            sources
                .iter()
                .enumerate()
                .map(|(index, source)| {
                    if source.contains("boom") {
                        return Err(RenderError::new(format!("cannot render: {source}")));
                    }
                    Ok(RenderedDiagram {
                        svg: format!(
                            r#"<svg xmlns="http://www.w3.org/2000/svg" id="{}-{index}"/>"#,
                            options.prefix
                        ),
                        screenshot: options.screenshot.then(|| b"raster".to_vec()),
                        ..RenderedDiagram::default()
                    })
                })
                .collect()
        }
    }

    /// Breaks the one-outcome-per-input contract.
    struct MiscountingRenderer;

    impl DiagramRenderer for MiscountingRenderer {
        fn render(&self, _: &[String], _: &RenderOptions) -> Vec<RenderOutcome> {
            Vec::new()
        }
    }

    fn mermaid_code(source: &str) -> Node {
        Node::element(
            "code",
            Properties::from([(
                "class".to_owned(),
                PropertyValue::from("language-mermaid"),
            )]),
            vec![Node::text(source)],
        )
    }

    fn document(children: Vec<Node>) -> (Node, Node) {
        let body = Node::element("body", Properties::new(), children);
        let tree = Node::root(vec![Node::element(
            "html",
            Properties::new(),
            vec![body.clone()],
        )]);
        (tree, body)
    }

    fn scheme_meta(content: &str) -> Node {
        Node::element(
            "meta",
            Properties::from([
                ("content".to_owned(), PropertyValue::from(content)),
                ("name".to_owned(), PropertyValue::from("color-scheme")),
            ]),
            Vec::new(),
        )
    }

    #[test]
    fn test_document_without_diagrams_needs_no_renderer() {
        let (tree, body) = document(vec![Node::element(
            "p",
            Properties::new(),
            vec![Node::text("prose only")],
        )]);
        let processor = MermaidProcessor::new();

        let replaced = processor.process(&tree).unwrap();

        assert_eq!(replaced, 0);
        assert_eq!(body.children().len(), 1);
    }

    #[test]
    fn test_missing_renderer_fails_before_rendering() {
        let (tree, body) = document(vec![mermaid_code("graph TD;")]);
        let processor = MermaidProcessor::new();

        let error = processor.process(&tree).unwrap_err();

        assert!(matches!(
            error,
            ProcessError::MissingRenderer {
                strategy: Strategy::InlineSvg
            }
        ));
        assert_eq!(body.children()[0].text_content(), "graph TD;");
    }

    #[test]
    fn test_pre_mermaid_rewrites_to_the_client_block() {
        let pre = Node::element(
            "pre",
            Properties::new(),
            vec![Node::text("\n"), mermaid_code("graph TD;"), Node::text("\n")],
        );
        let (tree, body) = document(vec![pre]);
        let processor = MermaidProcessor::new().strategy(Strategy::PreMermaid);

        let replaced = processor.process(&tree).unwrap();
        assert_eq!(replaced, 1);

        let children = body.children();
        assert_eq!(children.len(), 1);
        let block = children[0].as_element().unwrap();
        assert_eq!(block.tag_name, "pre");
        assert_eq!(
            block.property("class"),
            Some(&PropertyValue::from(vec!["mermaid"]))
        );
        assert_eq!(children[0].text_content(), "graph TD;");

        // the rewritten block is already in target form
        assert_eq!(processor.process(&tree).unwrap(), 0);
    }

    #[test]
    fn test_inline_svg_replaces_the_block() {
        let (tree, body) = document(vec![mermaid_code("graph TD;")]);
        let processor = MermaidProcessor::new().renderer(Arc::new(StubRenderer::default()));

        let replaced = processor.process(&tree).unwrap();

        assert_eq!(replaced, 1);
        let children = body.children();
        let element = children[0].as_element().unwrap();
        assert_eq!(element.tag_name, "svg");
        assert_eq!(
            element.property("id"),
            Some(&PropertyValue::from("mermaid-0"))
        );
    }

    #[test]
    fn test_inline_svg_ignores_a_dark_request() {
        let (tree, _) = document(vec![mermaid_code("graph TD;")]);
        let renderer = Arc::new(StubRenderer::default());
        let processor = MermaidProcessor::new()
            .dark(true)
            .renderer(Arc::clone(&renderer) as Arc<dyn DiagramRenderer>);

        processor.process(&tree).unwrap();

        let calls = renderer.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1.prefix, "mermaid");
        assert_eq!(calls[0].1.mermaid_config, None);
    }

    #[test]
    fn test_sources_are_batched_in_document_order() {
        let (tree, _) = document(vec![
            Node::element("p", Properties::new(), vec![mermaid_code("graph TD; A-->B")]),
            Node::element("p", Properties::new(), vec![mermaid_code("graph LR; C-->D")]),
        ]);
        let renderer = Arc::new(StubRenderer::default());
        let processor =
            MermaidProcessor::new().renderer(Arc::clone(&renderer) as Arc<dyn DiagramRenderer>);

        let replaced = processor.process(&tree).unwrap();

        assert_eq!(replaced, 2);
        let calls = renderer.calls();
        assert_eq!(
            calls[0].0,
            vec!["graph TD; A-->B".to_owned(), "graph LR; C-->D".to_owned()]
        );
    }

    #[test]
    fn test_dual_theme_issues_two_differently_configured_batches() {
        let (tree, body) = document(vec![mermaid_code("graph TD;")]);
        let renderer = Arc::new(StubRenderer::default());
        let processor = MermaidProcessor::new()
            .strategy(Strategy::ImgSvg)
            .dark(true)
            .renderer(Arc::clone(&renderer) as Arc<dyn DiagramRenderer>);

        processor.process(&tree).unwrap();

        let calls = renderer.calls();
        assert_eq!(calls.len(), 2);
        let light = calls.iter().find(|(_, o)| o.prefix == "mermaid").unwrap();
        let dark = calls
            .iter()
            .find(|(_, o)| o.prefix == "mermaid-dark")
            .unwrap();
        assert_eq!(light.1.mermaid_config, None);
        assert_eq!(dark.1.mermaid_config, Some(json!({"theme": "dark"})));

        let body_children = body.children();
        let picture = body_children[0].as_element().unwrap();
        assert_eq!(picture.tag_name, "picture");

        let children = body_children[0].children();
        let source = children[0].as_element().unwrap();
        assert_eq!(
            source.property("media"),
            Some(&PropertyValue::from("(prefers-color-scheme: dark)"))
        );
        match source.property("srcset") {
            Some(PropertyValue::String(srcset)) => assert!(srcset.contains("mermaid-dark-0")),
            other => panic!("missing srcset: {other:?}"),
        }
        match children[1].as_element().unwrap().property("src") {
            Some(PropertyValue::String(src)) => assert!(src.contains("id='mermaid-0'")),
            other => panic!("missing src: {other:?}"),
        }
    }

    #[test]
    fn test_auto_dark_extends_the_light_configuration() {
        let (tree, _) = document(vec![mermaid_code("graph TD;")]);
        let renderer = Arc::new(StubRenderer::default());
        let processor = MermaidProcessor::new()
            .strategy(Strategy::ImgSvg)
            .mermaid_config(json!({"fontFamily": "mono", "theme": "neutral"}))
            .dark(true)
            .renderer(Arc::clone(&renderer) as Arc<dyn DiagramRenderer>);

        processor.process(&tree).unwrap();

        let calls = renderer.calls();
        let dark = calls
            .iter()
            .find(|(_, o)| o.prefix == "mermaid-dark")
            .unwrap();
        assert_eq!(
            dark.1.mermaid_config,
            Some(json!({"fontFamily": "mono", "theme": "dark"}))
        );
    }

    #[test]
    fn test_explicit_dark_configuration_is_used_as_is() {
        let (tree, _) = document(vec![mermaid_code("graph TD;")]);
        let renderer = Arc::new(StubRenderer::default());
        let processor = MermaidProcessor::new()
            .strategy(Strategy::ImgSvg)
            .dark(json!({"theme": "forest"}))
            .renderer(Arc::clone(&renderer) as Arc<dyn DiagramRenderer>);

        processor.process(&tree).unwrap();

        let calls = renderer.calls();
        let dark = calls
            .iter()
            .find(|(_, o)| o.prefix == "mermaid-dark")
            .unwrap();
        assert_eq!(dark.1.mermaid_config, Some(json!({"theme": "forest"})));
    }

    #[test]
    fn test_document_hint_flips_the_default_scheme() {
        let (tree, body) = document(vec![scheme_meta("dark"), mermaid_code("graph TD;")]);
        let processor = MermaidProcessor::new()
            .strategy(Strategy::ImgSvg)
            .dark(true)
            .renderer(Arc::new(StubRenderer::default()));

        processor.process(&tree).unwrap();

        let picture_children = body.children()[1].children();
        let source = picture_children[0].as_element().unwrap();
        assert_eq!(
            source.property("media"),
            Some(&PropertyValue::from("(prefers-color-scheme: light)"))
        );
    }

    #[test]
    fn test_explicit_scheme_overrides_the_document_hint() {
        let (tree, body) = document(vec![scheme_meta("dark"), mermaid_code("graph TD;")]);
        let processor = MermaidProcessor::new()
            .strategy(Strategy::ImgSvg)
            .color_scheme(ColorScheme::Light)
            .dark(true)
            .renderer(Arc::new(StubRenderer::default()));

        processor.process(&tree).unwrap();

        let picture_children = body.children()[1].children();
        let source = picture_children[0].as_element().unwrap();
        assert_eq!(
            source.property("media"),
            Some(&PropertyValue::from("(prefers-color-scheme: dark)"))
        );
    }

    #[test]
    fn test_raster_strategy_requests_screenshots() {
        let (tree, body) = document(vec![mermaid_code("graph TD;")]);
        let renderer = Arc::new(StubRenderer::default());
        let processor = MermaidProcessor::new()
            .strategy(Strategy::ImgPng)
            .renderer(Arc::clone(&renderer) as Arc<dyn DiagramRenderer>);

        processor.process(&tree).unwrap();

        assert!(renderer.calls()[0].1.screenshot);
        match body.children()[0].as_element().unwrap().property("src") {
            Some(PropertyValue::String(src)) => {
                assert!(src.starts_with("data:image/png;base64,"));
            }
            other => panic!("missing src: {other:?}"),
        }
    }

    #[test]
    fn test_unhandled_failure_leaves_the_tree_unmodified() {
        let (tree, body) = document(vec![
            Node::element("p", Properties::new(), vec![mermaid_code("graph TD;")]),
            Node::element("p", Properties::new(), vec![mermaid_code("boom")]),
        ]);
        let processor = MermaidProcessor::new().renderer(Arc::new(StubRenderer::default()));

        let error = processor.process(&tree).unwrap_err();

        match error {
            ProcessError::Diagram(failure) => {
                assert_eq!(failure.reason, "cannot render: boom");
                assert_eq!(
                    failure.ancestors,
                    vec!["root", "html", "body", "p", "code"]
                );
            }
            other => panic!("unexpected error: {other}"),
        }
        // the first diagram rendered fine, but nothing was applied
        assert_eq!(body.children()[0].text_content(), "graph TD;");
        assert_eq!(body.children()[1].text_content(), "boom");
    }

    #[test]
    fn test_marked_container_failure_reports_a_four_step_chain() {
        let pre = Node::element(
            "pre",
            Properties::from([("class".to_owned(), PropertyValue::from("mermaid"))]),
            vec![Node::text("boom, not a diagram")],
        );
        let (tree, body) = document(vec![pre]);
        let processor = MermaidProcessor::new().renderer(Arc::new(StubRenderer::default()));

        let error = processor.process(&tree).unwrap_err();

        match error {
            ProcessError::Diagram(failure) => {
                assert_eq!(failure.ancestors, vec!["root", "html", "body", "pre"]);
                assert_eq!(failure.reason, "cannot render: boom, not a diagram");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(body.children()[0].text_content(), "boom, not a diagram");
    }

    #[test]
    fn test_fallback_decides_between_replacement_and_removal() {
        let (tree, body) = document(vec![mermaid_code("boom"), mermaid_code("boom boom")]);
        let fallback = |_: &Node, source: &str, _: &RenderError, _: Option<&Path>| {
            if source == "boom" {
                Some(Node::text("diagram unavailable"))
            } else {
                None
            }
        };
        let processor = MermaidProcessor::new()
            .fallback(fallback)
            .renderer(Arc::new(StubRenderer::default()));

        let replaced = processor.process(&tree).unwrap();

        assert_eq!(replaced, 2);
        let children = body.children();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].as_text(), Some("diagram unavailable"));
    }

    #[test]
    fn test_file_path_reaches_the_fallback() {
        let (tree, body) = document(vec![mermaid_code("boom")]);
        let fallback = |_: &Node, _: &str, _: &RenderError, file: Option<&Path>| {
            file.map(|path| Node::text(path.display().to_string()))
        };
        let processor = MermaidProcessor::new()
            .fallback(fallback)
            .file_path("docs/page.html")
            .renderer(Arc::new(StubRenderer::default()));

        processor.process(&tree).unwrap();

        assert_eq!(body.children()[0].as_text(), Some("docs/page.html"));
    }

    #[test]
    fn test_renderer_breaking_the_outcome_contract_is_an_error() {
        let (tree, body) = document(vec![mermaid_code("graph TD;")]);
        let processor = MermaidProcessor::new().renderer(Arc::new(MiscountingRenderer));

        let error = processor.process(&tree).unwrap_err();

        assert!(matches!(
            error,
            ProcessError::OutcomeMismatch {
                expected: 1,
                actual: 0
            }
        ));
        assert_eq!(body.children()[0].text_content(), "graph TD;");
    }

    #[test]
    fn test_custom_prefix_flows_into_both_batches() {
        let (tree, _) = document(vec![mermaid_code("graph TD;")]);
        let renderer = Arc::new(StubRenderer::default());
        let processor = MermaidProcessor::new()
            .strategy(Strategy::ImgSvg)
            .prefix("figure")
            .dark(true)
            .renderer(Arc::clone(&renderer) as Arc<dyn DiagramRenderer>);

        processor.process(&tree).unwrap();

        let calls = renderer.calls();
        let prefixes: Vec<_> = calls.iter().map(|(_, o)| o.prefix.as_str()).collect();
        assert!(prefixes.contains(&"figure"));
        assert!(prefixes.contains(&"figure-dark"));
    }

    #[test]
    fn test_css_is_forwarded_to_the_renderer() {
        let (tree, _) = document(vec![mermaid_code("graph TD;")]);
        let renderer = Arc::new(StubRenderer::default());
        let processor = MermaidProcessor::new()
            .css(".node { stroke: none; }")
            .renderer(Arc::clone(&renderer) as Arc<dyn DiagramRenderer>);

        processor.process(&tree).unwrap();

        assert_eq!(
            renderer.calls()[0].1.css.as_deref(),
            Some(".node { stroke: none; }")
        );
    }
}
