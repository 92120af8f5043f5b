//! Output image formats.

/// Output format for rendered diagrams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ImageFormat {
    /// Vector output (default).
    #[default]
    Svg,
    /// Raster output.
    Png,
}

impl ImageFormat {
    /// Parse format from an attribute or config value.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "svg" => Some(Self::Svg),
            "png" => Some(Self::Png),
            _ => None,
        }
    }

    /// Return format as string representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Svg => "svg",
            Self::Png => "png",
        }
    }

    /// MIME type of images in this format.
    #[must_use]
    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Svg => "image/svg+xml",
            Self::Png => "image/png",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_svg() {
        assert_eq!(ImageFormat::default(), ImageFormat::Svg);
    }

    #[test]
    fn test_parse() {
        assert_eq!(ImageFormat::parse("svg"), Some(ImageFormat::Svg));
        assert_eq!(ImageFormat::parse("png"), Some(ImageFormat::Png));
        assert_eq!(ImageFormat::parse("jpeg"), None);
        assert_eq!(ImageFormat::parse(""), None);
    }

    #[test]
    fn test_as_str_round_trips_through_parse() {
        for format in [ImageFormat::Svg, ImageFormat::Png] {
            assert_eq!(ImageFormat::parse(format.as_str()), Some(format));
        }
    }
}
