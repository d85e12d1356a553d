//! HTML parser adapter built on the `scraper` crate.
//!
//! Walks the DOM once, emitting readable text with block-level line
//! breaks and recording h1-h6 headings with their offsets into the
//! emitted text.

use std::path::Path;

use scraper::{ElementRef, Html, Selector};

use super::adapter::{ParseError, ParserAdapter, ParserOutput};
use crate::models::{Heading, StructuralHints};

/// Elements whose text content is never part of the document body.
const SKIPPED_TAGS: &[&str] = &["script", "style", "noscript", "head", "template"];

/// Elements that force a line break after their content.
const BLOCK_TAGS: &[&str] = &[
    "p", "div", "section", "article", "header", "footer", "li", "tr", "table", "ul", "ol",
    "blockquote", "pre", "figure",
];

pub struct HtmlAdapter;

impl HtmlAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for HtmlAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl ParserAdapter for HtmlAdapter {
    fn id(&self) -> &'static str {
        "html"
    }

    fn priority(&self) -> u8 {
        0
    }

    fn supports(&self, mime: &str) -> bool {
        mime == "text/html" || mime == "application/xhtml+xml"
    }

    fn parse(&self, path: &Path) -> Result<ParserOutput, ParseError> {
        let raw = std::fs::read_to_string(path)?;
        let doc = Html::parse_document(&raw);

        let mut text = String::new();
        let mut headings = Vec::new();
        walk(doc.root_element(), &mut text, &mut headings);

        let table_sel = Selector::parse("table").unwrap();
        let img_sel = Selector::parse("img").unwrap();
        let hints = StructuralHints {
            headings,
            table_count: doc.select(&table_sel).count(),
            image_count: doc.select(&img_sel).count(),
            page_count: None,
        };

        Ok(ParserOutput { text, hints })
    }
}

/// Heading level for hN tags, or None.
fn heading_level(tag: &str) -> Option<u8> {
    match tag {
        "h1" => Some(1),
        "h2" => Some(2),
        "h3" => Some(3),
        "h4" => Some(4),
        "h5" => Some(5),
        "h6" => Some(6),
        _ => None,
    }
}

fn walk(el: ElementRef<'_>, out: &mut String, headings: &mut Vec<Heading>) {
    for child in el.children() {
        if let Some(text) = child.value().as_text() {
            append_text(out, text);
            continue;
        }

        let Some(child_el) = ElementRef::wrap(child) else {
            continue;
        };
        let tag = child_el.value().name();

        if SKIPPED_TAGS.contains(&tag) {
            continue;
        }

        if tag == "br" {
            ensure_newline(out);
            continue;
        }

        if let Some(level) = heading_level(tag) {
            ensure_newline(out);
            let title = collapse_ws(&child_el.text().collect::<String>());
            if !title.is_empty() {
                headings.push(Heading {
                    level,
                    text: title.clone(),
                    offset: out.len(),
                });
                out.push_str(&title);
                out.push('\n');
            }
            continue;
        }

        walk(child_el, out, headings);

        if BLOCK_TAGS.contains(&tag) {
            ensure_newline(out);
        }
    }
}

/// Append inline text, collapsing whitespace runs against the tail.
fn append_text(out: &mut String, text: &str) {
    let collapsed = collapse_ws(text);
    if collapsed.is_empty() {
        return;
    }
    if !out.is_empty() && !out.ends_with(char::is_whitespace) {
        out.push(' ');
    }
    out.push_str(&collapsed);
}

fn ensure_newline(out: &mut String) {
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
}

fn collapse_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
