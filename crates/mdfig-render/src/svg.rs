//! SVG post-processing applied to engine output.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::consts::STANDARD_DPI;

/// Opening tag of the root `<svg>` element.
static ROOT_TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<svg\b[^>]*>").unwrap());

/// `width="136"` / `height="210px"` attributes.
static DIMENSION_ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(\s)(width|height)="(\d+(?:\.\d+)?)(?:px)?""#).unwrap()
});

/// `width:136px` / `height: 210px` inside a style attribute.
static DIMENSION_STYLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"([;"\s])(width|height)(:\s*)(\d+(?:\.\d+)?)px"#).unwrap());

/// Web font imports pulled in by `PlantUML` themes.
static FONT_IMPORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"@import\s+url\([^)]*fonts\.googleapis\.com[^)]*\)\s*;?").unwrap()
});

/// Prepare a rendered SVG for embedding.
///
/// Drops remote font imports so the image renders offline, then scales the
/// root element's dimensions from `dpi` back to CSS pixels.
#[must_use]
pub fn finalize_svg(svg: &str, dpi: u32) -> String {
    let svg = FONT_IMPORT_RE.replace_all(svg, "");
    scale_root_dimensions(&svg, dpi)
}

/// Scale `width`/`height` of the root `<svg>` tag by `STANDARD_DPI / dpi`.
///
/// Only the root tag is touched; nested elements keep their own geometry.
/// The `viewBox` is left alone so the drawing scales with the viewport.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
#[must_use]
pub fn scale_root_dimensions(svg: &str, dpi: u32) -> String {
    if dpi == STANDARD_DPI || dpi == 0 {
        return svg.to_owned();
    }
    let Some(tag) = ROOT_TAG_RE.find(svg) else {
        return svg.to_owned();
    };

    let factor = f64::from(STANDARD_DPI) / f64::from(dpi);
    let scale = |raw: &str| -> u32 {
        let value: f64 = raw.parse().unwrap_or(0.0);
        (value * factor).round() as u32
    };

    let scaled = DIMENSION_ATTR_RE.replace_all(tag.as_str(), |caps: &Captures| {
        format!(r#"{}{}="{}""#, &caps[1], &caps[2], scale(&caps[3]))
    });
    let scaled = DIMENSION_STYLE_RE.replace_all(&scaled, |caps: &Captures| {
        format!("{}{}{}{}px", &caps[1], &caps[2], &caps[3], scale(&caps[4]))
    });

    let mut out = String::with_capacity(svg.len());
    out.push_str(&svg[..tag.start()]);
    out.push_str(&scaled);
    out.push_str(&svg[tag.end()..]);
    out
}
