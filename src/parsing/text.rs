//! Plain-text parser adapter.

use std::path::Path;

use super::adapter::{detect_text_headings, ParseError, ParserAdapter, ParserOutput};
use crate::models::StructuralHints;

pub struct PlainTextAdapter;

impl PlainTextAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PlainTextAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl ParserAdapter for PlainTextAdapter {
    fn id(&self) -> &'static str {
        "text"
    }

    fn priority(&self) -> u8 {
        0
    }

    fn supports(&self, mime: &str) -> bool {
        mime == "text/plain"
    }

    fn parse(&self, path: &Path) -> Result<ParserOutput, ParseError> {
        let bytes = std::fs::read(path)?;
        // Tolerate mixed encodings rather than failing the attempt.
        let text = String::from_utf8_lossy(&bytes).to_string();
        let hints = StructuralHints {
            headings: detect_text_headings(&text),
            table_count: 0,
            image_count: 0,
            page_count: None,
        };
        Ok(ParserOutput { text, hints })
    }
}
