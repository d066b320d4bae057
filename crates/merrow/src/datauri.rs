//! Data-URI encoding for rendered diagram payloads.
//!
//! Raster payloads embed as base64. Vector payloads embed as percent-encoded
//! UTF-8, which stays smaller than base64 for text and keeps the markup
//! legible inside the attribute.

use base64::Engine;
use base64::prelude::BASE64_STANDARD;
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};

/// Characters that cannot travel bare inside a `src` attribute URI.
/// Double quotes never reach the encoder: they are converted to single
/// quotes first, which keeps the payload compact.
const URI_HOSTILE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'[')
    .add(b'\\')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

/// Encode a raster payload as a base64 PNG data URI.
pub(crate) fn png(bytes: &[u8]) -> String {
    let base64 = BASE64_STANDARD.encode(bytes);
    format!("data:image/png;base64,{base64}")
}

/// Encode an SVG document as a percent-encoded data URI.
pub(crate) fn svg(svg: &str) -> String {
    let body = svg.trim().replace('"', "'");
    format!(
        "data:image/svg+xml,{}",
        utf8_percent_encode(&body, URI_HOSTILE)
    )
}
