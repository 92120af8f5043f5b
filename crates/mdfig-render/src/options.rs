//! Render options.
//!
//! Every option that changes the rendered pixels lives in [`RenderOptions`]
//! and takes part in the diagram fingerprint. Each option type exposes a
//! `canonical` string used for hashing; those strings are part of the cache
//! key format and must not change without bumping the key domain.

use std::fmt;

pub use mdfig_cache::ImageFormat;

use crate::consts::{DEFAULT_DPI, STANDARD_DPI};

/// Color theme passed to the rendering engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Theme {
    /// Engine default theme.
    #[default]
    Default,
    Dark,
    Forest,
    Neutral,
}

impl Theme {
    /// Parse a theme name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "default" => Some(Self::Default),
            "dark" => Some(Self::Dark),
            "forest" => Some(Self::Forest),
            "neutral" => Some(Self::Neutral),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Dark => "dark",
            Self::Forest => "forest",
            Self::Neutral => "neutral",
        }
    }
}

/// How the output size is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SizePolicy {
    /// Natural diagram size rendered at the given DPI.
    Dpi(u32),
    /// Exact output dimensions in pixels.
    Fixed { width: u32, height: u32 },
}

impl Default for SizePolicy {
    fn default() -> Self {
        Self::Dpi(DEFAULT_DPI)
    }
}

impl SizePolicy {
    /// Effective DPI. Fixed sizes render at the standard DPI.
    #[must_use]
    pub fn dpi(self) -> u32 {
        match self {
            Self::Dpi(dpi) => dpi,
            Self::Fixed { .. } => STANDARD_DPI,
        }
    }

    fn canonical(self) -> String {
        match self {
            Self::Dpi(dpi) => format!("dpi:{dpi}"),
            Self::Fixed { width, height } => format!("fixed:{width}x{height}"),
        }
    }
}

/// Background fill behind the diagram.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Background {
    #[default]
    Transparent,
    White,
    /// Any CSS color understood by the engine (e.g. `#f5f5f5`).
    Color(String),
}

impl Background {
    /// Parse a background value: `transparent`, `white`, or a color.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "" => None,
            "transparent" => Some(Self::Transparent),
            "white" => Some(Self::White),
            color => Some(Self::Color(color.to_owned())),
        }
    }

    /// Value passed to the engine.
    #[must_use]
    pub fn as_engine_value(&self) -> &str {
        match self {
            Self::Transparent => "transparent",
            Self::White => "white",
            Self::Color(color) => color,
        }
    }

    fn canonical(&self) -> String {
        match self {
            Self::Transparent => "transparent".to_owned(),
            Self::White => "white".to_owned(),
            Self::Color(color) => format!("color:{color}"),
        }
    }
}

/// Options that affect rendered output.
///
/// Defaults: SVG, engine default theme, 192 DPI, transparent background.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct RenderOptions {
    pub format: ImageFormat,
    pub theme: Theme,
    pub size: SizePolicy,
    pub background: Background,
}

impl RenderOptions {
    #[must_use]
    pub fn with_format(mut self, format: ImageFormat) -> Self {
        self.format = format;
        self
    }

    #[must_use]
    pub fn with_theme(mut self, theme: Theme) -> Self {
        self.theme = theme;
        self
    }

    #[must_use]
    pub fn with_size(mut self, size: SizePolicy) -> Self {
        self.size = size;
        self
    }

    #[must_use]
    pub fn with_background(mut self, background: Background) -> Self {
        self.background = background;
        self
    }

    /// Canonical fields in fixed hashing order: format, theme, size, background.
    pub(crate) fn canonical_fields(&self) -> [String; 4] {
        [
            self.format.as_str().to_owned(),
            self.theme.as_str().to_owned(),
            self.size.canonical(),
            self.background.canonical(),
        ]
    }
}

impl fmt::Display for RenderOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [format, theme, size, background] = self.canonical_fields();
        write!(f, "{format}/{theme}/{size}/{background}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = RenderOptions::default();

        assert_eq!(options.format, ImageFormat::Svg);
        assert_eq!(options.theme, Theme::Default);
        assert_eq!(options.size, SizePolicy::Dpi(192));
        assert_eq!(options.background, Background::Transparent);
    }

    #[test]
    fn test_builder_order_does_not_matter() {
        let a = RenderOptions::default()
            .with_theme(Theme::Dark)
            .with_format(ImageFormat::Png);
        let b = RenderOptions::default()
            .with_format(ImageFormat::Png)
            .with_theme(Theme::Dark);

        assert_eq!(a, b);
        assert_eq!(a.canonical_fields(), b.canonical_fields());
    }

    #[test]
    fn test_theme_parse() {
        assert_eq!(Theme::parse("dark"), Some(Theme::Dark));
        assert_eq!(Theme::parse("forest"), Some(Theme::Forest));
        assert_eq!(Theme::parse("solarized"), None);
    }

    #[test]
    fn test_background_parse() {
        assert_eq!(Background::parse("transparent"), Some(Background::Transparent));
        assert_eq!(Background::parse("white"), Some(Background::White));
        assert_eq!(
            Background::parse("#fafafa"),
            Some(Background::Color("#fafafa".to_owned()))
        );
        assert_eq!(Background::parse(""), None);
    }

    #[test]
    fn test_size_policy_dpi() {
        assert_eq!(SizePolicy::Dpi(300).dpi(), 300);
        assert_eq!(
            SizePolicy::Fixed {
                width: 800,
                height: 600
            }
            .dpi(),
            96
        );
    }

    #[test]
    fn test_display() {
        let options = RenderOptions::default().with_size(SizePolicy::Fixed {
            width: 640,
            height: 480,
        });
        assert_eq!(options.to_string(), "svg/default/fixed:640x480/transparent");
    }
}
