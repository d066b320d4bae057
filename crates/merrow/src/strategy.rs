//! Output strategies and color schemes.
//!
//! The strategy decides what a matched diagram block turns into:
//!
//! - [`Strategy::ImgPng`]: an `<img>` with a base64 PNG data URI
//! - [`Strategy::ImgSvg`]: an `<img>` with an SVG data URI
//! - [`Strategy::InlineSvg`]: the rendered SVG element spliced in directly
//! - [`Strategy::PreMermaid`]: a normalized `<pre class="mermaid">` block
//!   left for a client-side renderer
//!
//! The set is closed; every decision point dispatches over it with an
//! exhaustive `match`.

use std::fmt;
use std::str::FromStr;

use crate::error::ProcessError;

/// How matched diagram blocks are replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum Strategy {
    /// Raster image with an embedded PNG data URI.
    ImgPng,
    /// Vector image with an embedded SVG data URI.
    ImgSvg,
    /// Rendered SVG element spliced into the tree (default).
    #[default]
    InlineSvg,
    /// Raw block re-synthesized for client-side rendering.
    PreMermaid,
}

impl Strategy {
    /// All strategies, in token order.
    pub const ALL: [Self; 4] = [Self::ImgPng, Self::ImgSvg, Self::InlineSvg, Self::PreMermaid];

    /// Return the strategy as its configuration token.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ImgPng => "img-png",
            Self::ImgSvg => "img-svg",
            Self::InlineSvg => "inline-svg",
            Self::PreMermaid => "pre-mermaid",
        }
    }

    /// Whether this strategy can merge a light and a dark render into one
    /// replacement. Only the image strategies can; the others ignore a dark
    /// request.
    #[must_use]
    pub fn supports_color_schemes(self) -> bool {
        matches!(self, Self::ImgPng | Self::ImgSvg)
    }

    /// Whether this strategy consumes a raster screenshot payload.
    #[must_use]
    pub fn is_raster(self) -> bool {
        matches!(self, Self::ImgPng)
    }

    /// Comma-separated list of the valid tokens, in fixed order.
    pub(crate) fn token_list() -> String {
        Self::ALL.map(Self::as_str).join(", ")
    }
}

impl FromStr for Strategy {
    type Err = ProcessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "img-png" => Ok(Self::ImgPng),
            "img-svg" => Ok(Self::ImgSvg),
            "inline-svg" => Ok(Self::InlineSvg),
            "pre-mermaid" => Ok(Self::PreMermaid),
            _ => Err(ProcessError::UnknownStrategy { found: s.to_owned() }),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Preferred color scheme of the final document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ColorScheme {
    /// Light scheme (the fallback when nothing else is resolved).
    #[default]
    Light,
    /// Dark scheme.
    Dark,
}

impl ColorScheme {
    /// Parse a scheme token as found in `meta[name="color-scheme"]` content.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "light" => Some(Self::Light),
            "dark" => Some(Self::Dark),
            _ => None,
        }
    }

    /// Return the scheme as its token.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Dark => "dark",
        }
    }

    /// The opposite scheme.
    #[must_use]
    pub fn inverse(self) -> Self {
        match self {
            Self::Light => Self::Dark,
            Self::Dark => Self::Light,
        }
    }
}

impl fmt::Display for ColorScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
