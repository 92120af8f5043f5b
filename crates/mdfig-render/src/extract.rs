//! Diagram extraction from Markdown.
//!
//! Fenced code blocks whose info string names a diagram language become
//! [`DiagramSource`]s. Attributes after the language override the document
//! defaults for that block:
//!
//! ````markdown
//! ```plantuml format=png theme=dark
//! @startuml
//! Alice -> Bob
//! @enduml
//! ```
//! ````
//!
//! Supported attributes: `format` (`svg` | `png`), `theme`, `background`.

use std::collections::HashMap;

use pulldown_cmark::{CodeBlockKind, Event, Parser, Tag, TagEnd};

use crate::diagram::DiagramSource;
use crate::language::DiagramLanguage;
use crate::options::{Background, ImageFormat, RenderOptions, Theme};

/// Split a fence info string into the language and `key=value` attributes.
fn parse_fence_info(info: &str) -> (&str, HashMap<&str, &str>) {
    let mut words = info.split_whitespace();
    let language = words.next().unwrap_or_default();
    let attrs = words
        .filter_map(|word| word.split_once('='))
        .map(|(key, value)| (key, value.trim_matches(|c| c == '"' || c == '\'')))
        .collect();
    (language, attrs)
}

/// Apply per-block attributes on top of the document defaults.
fn block_options(
    defaults: &RenderOptions,
    attrs: &HashMap<&str, &str>,
    index: usize,
) -> RenderOptions {
    let mut options = defaults.clone();
    for (&key, &value) in attrs {
        let applied = match key {
            "format" => ImageFormat::parse(value).map(|format| options.format = format),
            "theme" => Theme::parse(value).map(|theme| options.theme = theme),
            "background" => Background::parse(value).map(|bg| options.background = bg),
            _ => Some(()),
        };
        if applied.is_none() {
            tracing::warn!(diagram = index, key, value, "Ignoring invalid diagram attribute");
        }
    }
    options
}

/// Extract diagram blocks from Markdown in document order.
///
/// Code blocks in other languages are skipped. Indices count diagrams only,
/// starting at zero.
#[must_use]
pub fn extract_diagrams(markdown: &str, defaults: &RenderOptions) -> Vec<DiagramSource> {
    let mut diagrams = Vec::new();
    let mut current: Option<(DiagramLanguage, RenderOptions, String)> = None;

    for event in Parser::new(markdown) {
        match event {
            Event::Start(Tag::CodeBlock(CodeBlockKind::Fenced(info))) => {
                let (name, attrs) = parse_fence_info(&info);
                if let Some(language) = DiagramLanguage::from_fence(name) {
                    let options = block_options(defaults, &attrs, diagrams.len());
                    current = Some((language, options, String::new()));
                }
            }
            Event::Text(text) => {
                if let Some((_, _, source)) = current.as_mut() {
                    source.push_str(&text);
                }
            }
            Event::End(TagEnd::CodeBlock) => {
                if let Some((language, options, source)) = current.take() {
                    let index = diagrams.len();
                    diagrams.push(DiagramSource::new(index, language, source).with_options(options));
                }
            }
            _ => {}
        }
    }

    tracing::debug!(diagrams = diagrams.len(), "Extracted diagrams");
    diagrams
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_parse_fence_info() {
        let (language, attrs) = parse_fence_info("plantuml format=png theme=\"dark\"");
        assert_eq!(language, "plantuml");
        assert_eq!(attrs.get("format"), Some(&"png"));
        assert_eq!(attrs.get("theme"), Some(&"dark"));

        let (language, attrs) = parse_fence_info("");
        assert_eq!(language, "");
        assert!(attrs.is_empty());
    }

    #[test]
    fn test_extracts_diagrams_in_order() {
        let markdown = "\
# Guide

```mermaid
graph TD;A-->B
```

```rust
fn main() {}
```

```kroki-plantuml
@startuml
A -> B
@enduml
```
";
        let diagrams = extract_diagrams(markdown, &RenderOptions::default());

        assert_eq!(diagrams.len(), 2);
        assert_eq!(diagrams[0].index, 0);
        assert_eq!(diagrams[0].language, DiagramLanguage::Mermaid);
        assert_eq!(diagrams[0].source, "graph TD;A-->B\n");
        assert_eq!(diagrams[1].index, 1);
        assert_eq!(diagrams[1].language, DiagramLanguage::PlantUml);
        assert_eq!(diagrams[1].source, "@startuml\nA -> B\n@enduml\n");
    }

    #[test]
    fn test_attributes_override_defaults() {
        let markdown = "```graphviz format=png theme=forest background=white\ndigraph { a -> b }\n```\n";
        let defaults = RenderOptions::default().with_theme(Theme::Dark);

        let diagrams = extract_diagrams(markdown, &defaults);

        assert_eq!(
            diagrams[0].options,
            RenderOptions::default()
                .with_format(ImageFormat::Png)
                .with_theme(Theme::Forest)
                .with_background(Background::White)
        );
    }

    #[test]
    fn test_invalid_attributes_keep_defaults() {
        let markdown = "```mermaid format=gif theme=solarized\ngraph TD;A-->B\n```\n";
        let defaults = RenderOptions::default().with_theme(Theme::Neutral);

        let diagrams = extract_diagrams(markdown, &defaults);

        assert_eq!(diagrams[0].options, defaults);
    }

    #[test]
    fn test_indented_code_blocks_are_ignored() {
        let markdown = "Text\n\n    graph TD;A-->B\n";
        assert!(extract_diagrams(markdown, &RenderOptions::default()).is_empty());
    }
}
