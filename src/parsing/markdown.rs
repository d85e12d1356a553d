//! Markdown parser adapter.
//!
//! A line scanner, not a full CommonMark implementation: ATX headings
//! outside code fences become structural hints, pipe tables and image
//! links are counted, and the text is passed through unchanged so
//! offsets stay valid.

use std::path::Path;

use super::adapter::{ParseError, ParserAdapter, ParserOutput};
use crate::models::{Heading, StructuralHints};

pub struct MarkdownAdapter;

impl MarkdownAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for MarkdownAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl ParserAdapter for MarkdownAdapter {
    fn id(&self) -> &'static str {
        "markdown"
    }

    fn priority(&self) -> u8 {
        0
    }

    fn supports(&self, mime: &str) -> bool {
        mime == "text/markdown" || mime == "text/x-markdown"
    }

    fn parse(&self, path: &Path) -> Result<ParserOutput, ParseError> {
        let text = std::fs::read_to_string(path)?;
        let hints = scan(&text);
        Ok(ParserOutput { text, hints })
    }
}

fn scan(text: &str) -> StructuralHints {
    let mut headings = Vec::new();
    let mut table_count = 0usize;
    let mut image_count = 0usize;

    let mut in_fence = false;
    let mut in_table = false;
    let mut offset = 0usize;

    for line in text.split_inclusive('\n') {
        let stripped = line.trim_end_matches('\n');
        let trimmed = stripped.trim_start();

        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_fence = !in_fence;
            in_table = false;
            offset += line.len();
            continue;
        }

        if !in_fence {
            if let Some((level, title)) = atx_heading(trimmed) {
                headings.push(Heading {
                    level,
                    text: title,
                    offset: offset + (line.len() - line.trim_start().len()),
                });
                in_table = false;
            } else if is_table_row(trimmed) {
                if !in_table {
                    table_count += 1;
                    in_table = true;
                }
            } else {
                in_table = false;
            }

            image_count += stripped.matches("![").count();
        }

        offset += line.len();
    }

    StructuralHints {
        headings,
        table_count,
        image_count,
        page_count: None,
    }
}

/// "## Title" → (2, "Title"). Up to six hashes, space required.
fn atx_heading(line: &str) -> Option<(u8, String)> {
    let hashes = line.chars().take_while(|&c| c == '#').count();
    if hashes == 0 || hashes > 6 {
        return None;
    }
    let rest = &line[hashes..];
    if !rest.starts_with(' ') && !rest.is_empty() {
        return None;
    }
    let title = rest.trim().trim_end_matches('#').trim().to_string();
    if title.is_empty() {
        return None;
    }
    Some((hashes as u8, title))
}

fn is_table_row(line: &str) -> bool {
    line.starts_with('|') && line.matches('|').count() >= 2
}
