//! Replacement construction.
//!
//! Combines the per-instance light outcome and optional dark outcome into
//! the node that takes the diagram block's place, or routes a failure
//! through the configured fallback. Construction never touches the tree;
//! the caller applies the staged replacements afterwards.

use std::path::Path;

use crate::collect::DiagramInstance;
use crate::consts::MERMAID_CLASS;
use crate::datauri;
use crate::error::{DiagramFailure, Result};
use crate::renderer::{ErrorFallback, RenderError, RenderOutcome, RenderedDiagram};
use crate::strategy::{ColorScheme, Strategy};
use crate::svg;
use crate::tree::{Node, Properties, PropertyValue};

/// What happens to an instance's slot in its parent.
#[derive(Debug)]
pub(crate) enum Replacement {
    /// Overwrite the slot with this node.
    Node(Node),
    /// Delete the slot, shifting later siblings down.
    Remove,
}

/// Per-run inputs the merger needs besides the outcomes themselves.
pub(crate) struct MergeContext<'a> {
    pub(crate) strategy: Strategy,
    /// Resolved default scheme: explicit configuration, else document hint,
    /// else light.
    pub(crate) default_scheme: ColorScheme,
    pub(crate) fallback: Option<&'a dyn ErrorFallback>,
    pub(crate) file: Option<&'a Path>,
}

/// Combine outcomes into the instance's replacement.
///
/// The light outcome is examined before the dark one: exactly one failure
/// is surfaced per instance even when both batches failed.
pub(crate) fn build_replacement(
    ctx: &MergeContext<'_>,
    instance: &DiagramInstance,
    light: RenderOutcome,
    dark: Option<RenderOutcome>,
) -> Result<Replacement> {
    let light = match light {
        Ok(diagram) => diagram,
        Err(error) => return recover(ctx, instance, &error),
    };
    let dark = match dark.transpose() {
        Ok(diagram) => diagram,
        Err(error) => return recover(ctx, instance, &error),
    };

    match ctx.strategy {
        Strategy::PreMermaid => Ok(Replacement::Node(client_block(&instance.source))),
        Strategy::InlineSvg => match svg::to_node(&light.svg) {
            Ok(node) => Ok(Replacement::Node(node)),
            Err(error) => {
                let error =
                    RenderError::new(format!("renderer produced unparseable SVG: {error}"));
                recover(ctx, instance, &error)
            }
        },
        Strategy::ImgPng | Strategy::ImgSvg => {
            match compose_image(ctx, &light, dark.as_ref()) {
                Ok(node) => Ok(Replacement::Node(node)),
                Err(error) => recover(ctx, instance, &error),
            }
        }
    }
}

/// Canonical client-side rendering form: a bare `pre` with the diagram
/// keyword marker and the literal source as its only child.
pub(crate) fn client_block(source: &str) -> Node {
    Node::element(
        "pre",
        Properties::from([(
            "class".to_owned(),
            PropertyValue::from(vec![MERMAID_CLASS]),
        )]),
        vec![Node::text(source)],
    )
}

/// Plain image, or a `picture` pairing the default scheme's image with a
/// media-conditioned source for the inverse scheme.
fn compose_image(
    ctx: &MergeContext<'_>,
    light: &RenderedDiagram,
    dark: Option<&RenderedDiagram>,
) -> std::result::Result<Node, RenderError> {
    // a dark default without a dark outcome degrades to the plain image
    let Some(dark) = dark else {
        return image_element(ctx.strategy, light);
    };
    let (primary, inverse) = match ctx.default_scheme {
        ColorScheme::Light => (light, dark),
        ColorScheme::Dark => (dark, light),
    };

    let media = format!("(prefers-color-scheme: {})", ctx.default_scheme.inverse());
    let source = Node::element(
        "source",
        Properties::from([
            ("media".to_owned(), PropertyValue::from(media)),
            (
                "srcset".to_owned(),
                PropertyValue::from(encoded_source(ctx.strategy, inverse)?),
            ),
        ]),
        Vec::new(),
    );
    let image = image_element(ctx.strategy, primary)?;
    Ok(Node::element(
        "picture",
        Properties::new(),
        vec![source, image],
    ))
}

/// One `img` element. `alt` and `src` are always present; the metadata
/// attributes are omitted when the renderer supplied no value.
fn image_element(
    strategy: Strategy,
    diagram: &RenderedDiagram,
) -> std::result::Result<Node, RenderError> {
    let mut properties = Properties::new();
    properties.insert(
        "alt".to_owned(),
        PropertyValue::from(diagram.description.as_deref().unwrap_or_default()),
    );
    if let Some(height) = diagram.height {
        properties.insert("height".to_owned(), PropertyValue::from(height));
    }
    if let Some(id) = &diagram.id {
        properties.insert("id".to_owned(), PropertyValue::from(id.as_str()));
    }
    properties.insert(
        "src".to_owned(),
        PropertyValue::from(encoded_source(strategy, diagram)?),
    );
    if let Some(title) = &diagram.title {
        properties.insert("title".to_owned(), PropertyValue::from(title.as_str()));
    }
    if let Some(width) = diagram.width {
        properties.insert("width".to_owned(), PropertyValue::from(width));
    }
    Ok(Node::element("img", properties, Vec::new()))
}

fn encoded_source(
    strategy: Strategy,
    diagram: &RenderedDiagram,
) -> std::result::Result<String, RenderError> {
    if strategy.is_raster() {
        let Some(screenshot) = &diagram.screenshot else {
            return Err(RenderError::new(
                "renderer produced no raster payload for an img-png replacement",
            ));
        };
        Ok(datauri::png(screenshot))
    } else {
        Ok(datauri::svg(&diagram.svg))
    }
}

/// Route a failure through the fallback, or escalate it to a fatal error
/// carrying the instance's positional context.
fn recover(
    ctx: &MergeContext<'_>,
    instance: &DiagramInstance,
    error: &RenderError,
) -> Result<Replacement> {
    if let Some(fallback) = ctx.fallback {
        let replacement = fallback.recover(&instance.node, &instance.source, error, ctx.file);
        return Ok(match replacement {
            Some(node) => Replacement::Node(node),
            None => Replacement::Remove,
        });
    }
    Err(DiagramFailure::new(
        error.to_string(),
        ctx.strategy.as_str(),
        instance.breadcrumbs(),
    )
    .into())
}
