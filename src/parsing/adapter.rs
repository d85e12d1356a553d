//! Parser adapter seam and registry.
//!
//! Each adapter wraps one concrete parsing engine behind a narrow
//! interface: take a file path, return raw text plus best-effort
//! structural hints. Adapters must not raise for recoverable
//! conditions; they return an error descriptor and the arbiter records
//! the attempt as failed.

use std::path::Path;
use std::sync::Arc;

use thiserror::Error;

use crate::models::{Heading, StructuralHints};

/// Errors an adapter can report for one parse call.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("unsupported file type: {0}")]
    UnsupportedFileType(String),

    #[error("external tool not found: {0}")]
    ToolNotFound(String),

    #[error("extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("malformed document: {0}")]
    Malformed(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Raw text plus structural hints from one parsing engine.
#[derive(Debug, Clone)]
pub struct ParserOutput {
    pub text: String,
    pub hints: StructuralHints,
}

/// One concrete parsing engine.
pub trait ParserAdapter: Send + Sync {
    /// Stable identifier recorded on attempts and in the arbitration
    /// summary.
    fn id(&self) -> &'static str;

    /// Tie-break priority within a file type; lower wins. Structured-
    /// layout parsers sit before generic extractors.
    fn priority(&self) -> u8;

    /// Whether this adapter applies to the given MIME type.
    fn supports(&self, mime: &str) -> bool;

    /// Parse the file. Recoverable conditions come back as `Err`, not
    /// panics; the arbiter isolates each call regardless.
    fn parse(&self, path: &Path) -> Result<ParserOutput, ParseError>;
}

/// Registry of every known adapter, queried per file type.
#[derive(Clone)]
pub struct ParserRegistry {
    adapters: Vec<Arc<dyn ParserAdapter>>,
}

impl ParserRegistry {
    /// Empty registry, for tests that inject stub adapters.
    pub fn empty() -> Self {
        Self {
            adapters: Vec::new(),
        }
    }

    /// Registry with every built-in adapter.
    pub fn with_defaults() -> Self {
        use super::docx::DocxAdapter;
        use super::html::HtmlAdapter;
        use super::markdown::MarkdownAdapter;
        use super::pdf::{PdfLayoutAdapter, PdfRawAdapter};
        use super::text::PlainTextAdapter;

        let mut registry = Self::empty();
        registry.register(Arc::new(PdfLayoutAdapter::new()));
        registry.register(Arc::new(PdfRawAdapter::new()));
        registry.register(Arc::new(HtmlAdapter::new()));
        registry.register(Arc::new(MarkdownAdapter::new()));
        registry.register(Arc::new(DocxAdapter::new()));
        registry.register(Arc::new(PlainTextAdapter::new()));
        registry
    }

    pub fn register(&mut self, adapter: Arc<dyn ParserAdapter>) {
        self.adapters.push(adapter);
    }

    /// Adapters applicable to a MIME type, in priority order.
    pub fn for_mime(&self, mime: &str) -> Vec<Arc<dyn ParserAdapter>> {
        let mut matched: Vec<_> = self
            .adapters
            .iter()
            .filter(|a| a.supports(mime))
            .cloned()
            .collect();
        matched.sort_by_key(|a| a.priority());
        matched
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

/// Heading heuristic for flat text formats (PDF text dumps, plain
/// text): numbered headings like "2.1 Capacity" or short ALL-CAPS
/// lines. Best-effort by design; the tree builder tolerates noise.
pub(crate) fn detect_text_headings(text: &str) -> Vec<Heading> {
    let mut headings = Vec::new();
    let mut offset = 0usize;

    for line in text.split_inclusive('\n') {
        let trimmed = line.trim_end_matches('\n').trim();
        if let Some(heading) = classify_heading_line(trimmed) {
            headings.push(Heading {
                level: heading.0,
                text: heading.1,
                offset: offset + leading_ws(line),
            });
        }
        offset += line.len();
    }
    headings
}

fn leading_ws(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

fn classify_heading_line(line: &str) -> Option<(u8, String)> {
    if line.is_empty() || line.chars().count() > 80 {
        return None;
    }

    // Numbered heading: "3 Title", "3.1 Title", "3.1.2 Title".
    let mut parts = line.splitn(2, ' ');
    let number = parts.next().unwrap_or("");
    let rest = parts.next().unwrap_or("").trim();
    if !rest.is_empty() && is_section_number(number) {
        let level = number.trim_end_matches('.').matches('.').count() as u8 + 1;
        return Some((level.min(6), format!("{} {}", number, rest)));
    }

    // Short ALL-CAPS line with at least two letters reads as a
    // top-level heading in text dumps.
    let letters: Vec<char> = line.chars().filter(|c| c.is_alphabetic()).collect();
    if letters.len() >= 2
        && letters.iter().all(|c| c.is_uppercase())
        && !line.ends_with('.')
        && line.split_whitespace().count() <= 8
    {
        return Some((1, line.to_string()));
    }

    None
}

/// "3", "3.", "3.1", "3.1.2" — digits separated by dots, optionally
/// dot-terminated.
fn is_section_number(s: &str) -> bool {
    let core = s.trim_end_matches('.');
    if core.is_empty() {
        return false;
    }
    core.split('.').all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
}
