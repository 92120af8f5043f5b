//! Diagram sources and their cache keys.

use mdfig_cache::{Fingerprint, Fingerprinter};

use crate::consts::DIAGRAM_KEY_DOMAIN;
use crate::language::DiagramLanguage;
use crate::options::RenderOptions;

/// A diagram extracted from a document.
///
/// Identity for caching is `(language, source, options)`. `index` only records
/// the position in the document and is ignored by the fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagramSource {
    /// Diagram source text as written in the document.
    pub source: String,
    /// Zero-based position in the document.
    pub index: usize,
    pub language: DiagramLanguage,
    pub options: RenderOptions,
}

impl DiagramSource {
    /// Create a diagram with default render options.
    #[must_use]
    pub fn new(index: usize, language: DiagramLanguage, source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            index,
            language,
            options: RenderOptions::default(),
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: RenderOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn key(&self) -> DiagramKey<'_> {
        DiagramKey {
            source: &self.source,
            language: self.language,
            options: &self.options,
        }
    }

    /// Cache fingerprint of this diagram.
    #[must_use]
    pub fn fingerprint(&self) -> Fingerprint {
        self.key().fingerprint()
    }
}

/// Diagram parameters for cache key computation.
///
/// Contains everything that affects the rendered output.
#[derive(Debug, Clone, Copy)]
pub struct DiagramKey<'a> {
    pub source: &'a str,
    pub language: DiagramLanguage,
    pub options: &'a RenderOptions,
}

impl DiagramKey<'_> {
    /// Compute the content fingerprint for this key.
    ///
    /// # Hash Format
    ///
    /// SHA-256 over length-prefixed fields in this order: key domain,
    /// language endpoint, format, theme, size policy, background, source.
    #[must_use]
    pub fn fingerprint(&self) -> Fingerprint {
        let [format, theme, size, background] = self.options.canonical_fields();
        Fingerprinter::new(DIAGRAM_KEY_DOMAIN)
            .field(self.language.endpoint())
            .field(format)
            .field(theme)
            .field(size)
            .field(background)
            .field(self.source)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::{Background, ImageFormat, SizePolicy, Theme};

    fn mermaid(source: &str) -> DiagramSource {
        DiagramSource::new(0, DiagramLanguage::Mermaid, source)
    }

    #[test]
    fn test_fingerprint_is_deterministic() {
        let a = mermaid("graph TD;A-->B");
        let b = mermaid("graph TD;A-->B");

        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint(), a.fingerprint());
    }

    #[test]
    fn test_index_is_not_part_of_identity() {
        let a = mermaid("graph TD;A-->B");
        let mut b = a.clone();
        b.index = 7;

        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_source_matters() {
        assert_ne!(
            mermaid("graph TD;A-->B").fingerprint(),
            mermaid("graph TD;C-->D").fingerprint()
        );
    }

    #[test]
    fn test_language_matters() {
        let a = DiagramSource::new(0, DiagramLanguage::PlantUml, "A -> B");
        let b = DiagramSource::new(0, DiagramLanguage::C4PlantUml, "A -> B");

        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_every_option_matters() {
        let base = mermaid("graph TD;A-->B");
        let variants = [
            RenderOptions::default().with_format(ImageFormat::Png),
            RenderOptions::default().with_theme(Theme::Dark),
            RenderOptions::default().with_size(SizePolicy::Dpi(96)),
            RenderOptions::default().with_size(SizePolicy::Fixed {
                width: 800,
                height: 600,
            }),
            RenderOptions::default().with_background(Background::White),
        ];

        for options in variants {
            let changed = base.clone().with_options(options.clone());
            assert_ne!(
                base.fingerprint(),
                changed.fingerprint(),
                "options {options} should change the fingerprint"
            );
        }
    }

    #[test]
    fn test_option_construction_order_is_irrelevant() {
        let a = mermaid("x").with_options(
            RenderOptions::default()
                .with_background(Background::White)
                .with_theme(Theme::Forest),
        );
        let b = mermaid("x").with_options(
            RenderOptions::default()
                .with_theme(Theme::Forest)
                .with_background(Background::White),
        );

        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_pinned_fingerprint() {
        // Fingerprints must survive process restarts and releases.
        let fp = mermaid("graph TD;A-->B").fingerprint();

        assert_eq!(
            fp.to_hex(),
            "ef29368367a3017fc6c661b93f50f6fed87aa7a262833a67cd576326d3788de4"
        );
        assert_eq!(fp.short(), "ef29368367a3");
    }
}
