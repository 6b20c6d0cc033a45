//! SVG minification.
//!
//! Drops the XML prolog, doctype, comments and `<metadata>`, collapses
//! whitespace between tags, and removes a root `viewBox` that only restates
//! `width`/`height`. Element ids are never touched.

use std::sync::LazyLock;

use regex::Regex;

static PROLOG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<\?xml.*?\?>|<!DOCTYPE[^>]*>").expect("Invalid prolog regex"));

static COMMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("Invalid comment regex"));

static METADATA_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<metadata\b.*?</metadata>|<metadata\b[^>]*/>").expect("Invalid metadata regex")
});

static BETWEEN_TAGS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r">\s+<").expect("Invalid whitespace regex"));

static ROOT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<svg\b[^>]*>").expect("Invalid root regex"));

static ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\s(?P<name>[\w:-]+)\s*=\s*(?:"(?P<dq>[^"]*)"|'(?P<sq>[^']*)')"#)
        .expect("Invalid attribute regex")
});

pub fn optimize(svg: &str) -> String {
    let svg = PROLOG_RE.replace_all(svg, "");
    let svg = COMMENT_RE.replace_all(&svg, "");
    let svg = METADATA_RE.replace_all(&svg, "");

    // Whitespace inside text content is significant.
    let svg = if svg.contains("<text") {
        svg.into_owned()
    } else {
        BETWEEN_TAGS_RE.replace_all(&svg, "><").into_owned()
    };

    remove_redundant_viewbox(svg.trim())
}

fn remove_redundant_viewbox(svg: &str) -> String {
    let Some(root) = ROOT_RE.find(svg) else {
        return svg.to_string();
    };
    let tag = root.as_str();

    let mut width = None;
    let mut height = None;
    let mut viewbox = None;
    for caps in ATTR_RE.captures_iter(tag) {
        let Some(whole) = caps.get(0) else { continue };
        let value = caps
            .name("dq")
            .or_else(|| caps.name("sq"))
            .map(|m| m.as_str())
            .unwrap_or("");
        match &caps["name"] {
            "width" => width = parse_length(value),
            "height" => height = parse_length(value),
            "viewBox" => viewbox = Some((whole.range(), value.to_string())),
            _ => {}
        }
    }

    let (Some(w), Some(h), Some((range, value))) = (width, height, viewbox) else {
        return svg.to_string();
    };

    let numbers: Vec<f64> = value
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse().ok())
        .collect();
    if numbers != [0.0, 0.0, w, h] {
        return svg.to_string();
    }

    let mut new_tag = String::with_capacity(tag.len());
    new_tag.push_str(&tag[..range.start]);
    new_tag.push_str(&tag[range.end..]);

    format!("{}{}{}", &svg[..root.start()], new_tag, &svg[root.end()..])
}

/// Unitless or px length.
fn parse_length(value: &str) -> Option<f64> {
    value.trim().trim_end_matches("px").parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn strips_noise_but_keeps_ids() {
        let svg = r#"<?xml version="1.0" encoding="UTF-8"?>
<!-- Generator: Sketch -->
<svg xmlns="http://www.w3.org/2000/svg" width="24" height="24" viewBox="0 0 24 24">
  <metadata><rdf:RDF/></metadata>
  <g id="icon-close">
    <path id="cross" d="M0 0L24 24"/>
  </g>
</svg>
"#;

        assert_eq!(
            optimize(svg),
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="24" height="24"><g id="icon-close"><path id="cross" d="M0 0L24 24"/></g></svg>"#
        );
    }

    #[test]
    fn keeps_viewbox_that_scales() {
        let svg = r#"<svg width="48" height="48" viewBox="0 0 24 24"><path d="M0 0"/></svg>"#;
        assert_eq!(optimize(svg), svg);
    }

    #[test]
    fn keeps_viewbox_without_dimensions() {
        let svg = r#"<svg viewBox="0 0 24 24"><path d="M0 0"/></svg>"#;
        assert_eq!(optimize(svg), svg);
    }

    #[test]
    fn preserves_text_whitespace() {
        let svg = "<svg><text>a  <tspan>b</tspan> c</text></svg>";
        assert_eq!(optimize(svg), svg);
    }
}
