//! Supported diagram languages.
//!
//! The language picks the engine endpoint a session renders with and decides
//! whether the source needs PlantUML preparation before it is sent.

use std::fmt;

/// Diagram language of a fenced block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagramLanguage {
    PlantUml,
    C4PlantUml,
    Mermaid,
    GraphViz,
    Ditaa,
    BlockDiag,
    SeqDiag,
    ActDiag,
    NwDiag,
    PacketDiag,
    RackDiag,
    Erd,
    Nomnoml,
    Svgbob,
    Vega,
    VegaLite,
    WaveDrom,
}

/// Fence names and the language they select. `dot` is an alias.
const FENCE_NAMES: &[(&str, DiagramLanguage)] = &[
    ("plantuml", DiagramLanguage::PlantUml),
    ("c4plantuml", DiagramLanguage::C4PlantUml),
    ("mermaid", DiagramLanguage::Mermaid),
    ("graphviz", DiagramLanguage::GraphViz),
    ("dot", DiagramLanguage::GraphViz),
    ("ditaa", DiagramLanguage::Ditaa),
    ("blockdiag", DiagramLanguage::BlockDiag),
    ("seqdiag", DiagramLanguage::SeqDiag),
    ("actdiag", DiagramLanguage::ActDiag),
    ("nwdiag", DiagramLanguage::NwDiag),
    ("packetdiag", DiagramLanguage::PacketDiag),
    ("rackdiag", DiagramLanguage::RackDiag),
    ("erd", DiagramLanguage::Erd),
    ("nomnoml", DiagramLanguage::Nomnoml),
    ("svgbob", DiagramLanguage::Svgbob),
    ("vega", DiagramLanguage::Vega),
    ("vegalite", DiagramLanguage::VegaLite),
    ("wavedrom", DiagramLanguage::WaveDrom),
];

impl DiagramLanguage {
    /// Parse a language from a code fence info word.
    ///
    /// Accepts the bare name (`mermaid`) and the `kroki-` prefixed form
    /// (`kroki-mermaid`) used by `MkDocs` Kroki plugin documents.
    #[must_use]
    pub fn from_fence(name: &str) -> Option<Self> {
        let name = name.strip_prefix("kroki-").unwrap_or(name);
        FENCE_NAMES
            .iter()
            .find(|(candidate, _)| *candidate == name)
            .map(|(_, language)| *language)
    }

    /// Engine endpoint name (path segment on a Kroki server).
    #[must_use]
    pub fn endpoint(self) -> &'static str {
        match self {
            Self::PlantUml => "plantuml",
            Self::C4PlantUml => "c4plantuml",
            Self::Mermaid => "mermaid",
            Self::GraphViz => "graphviz",
            Self::Ditaa => "ditaa",
            Self::BlockDiag => "blockdiag",
            Self::SeqDiag => "seqdiag",
            Self::ActDiag => "actdiag",
            Self::NwDiag => "nwdiag",
            Self::PacketDiag => "packetdiag",
            Self::RackDiag => "rackdiag",
            Self::Erd => "erd",
            Self::Nomnoml => "nomnoml",
            Self::Svgbob => "svgbob",
            Self::Vega => "vega",
            Self::VegaLite => "vegalite",
            Self::WaveDrom => "wavedrom",
        }
    }

    /// Whether the source gets PlantUML DPI/theme directives injected.
    #[must_use]
    pub fn is_plantuml(self) -> bool {
        matches!(self, Self::PlantUml | Self::C4PlantUml)
    }
}

impl fmt::Display for DiagramLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.endpoint())
    }
}
