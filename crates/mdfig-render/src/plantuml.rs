//! `PlantUML` source preparation.
//!
//! `PlantUML` ignores the engine-level options Kroki forwards to other
//! languages, so resolution and colors are expressed as `skinparam` lines
//! placed right after `@startuml`.

use crate::options::{Background, RenderOptions, Theme};

/// Build the `skinparam` block for the given options.
fn directives(options: &RenderOptions) -> String {
    let mut block = format!(
        "skinparam dpi {}\nskinparam defaultFontName Roboto\n",
        options.size.dpi()
    );
    match &options.background {
        Background::Transparent => block.push_str("skinparam backgroundColor transparent\n"),
        Background::White => block.push_str("skinparam backgroundColor white\n"),
        Background::Color(color) => {
            block.push_str("skinparam backgroundColor ");
            block.push_str(color);
            block.push('\n');
        }
    }
    if options.theme == Theme::Dark {
        block.push_str("skinparam monochrome reverse\n");
    }
    block
}

/// Inject rendering directives into `PlantUML` source.
///
/// The block goes on the line after `@startuml` (or `@startc4` style
/// headers sharing the `@start` prefix). Sources without a start line get
/// the block prepended, which `PlantUML` accepts for most diagram types.
#[must_use]
pub fn prepare_source(source: &str, options: &RenderOptions) -> String {
    let block = directives(options);
    let insert_at = source.find("@start").and_then(|start| {
        source[start..]
            .find('\n')
            .map(|newline| start + newline + 1)
    });

    match insert_at {
        Some(pos) => {
            let mut out = String::with_capacity(source.len() + block.len());
            out.push_str(&source[..pos]);
            out.push_str(&block);
            out.push_str(&source[pos..]);
            out
        }
        None => format!("{block}{source}"),
    }
}
