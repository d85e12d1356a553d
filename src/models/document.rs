//! Document models for parser arbitration.
//!
//! Parsing a file produces one `ParseAttempt` per registered adapter;
//! the arbiter scores them and collapses the set into a single
//! `ArbitratedDocument`, which every later stage consumes.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// How many characters of extracted text are kept as the
/// confidence-relevant sample on each attempt.
pub const SAMPLE_CHARS: usize = 2000;

/// A heading found by a parser, with its byte offset into the
/// extracted text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heading {
    /// Heading level, 1-based (h1 = 1).
    pub level: u8,
    /// Heading text with markup stripped.
    pub text: String,
    /// Byte offset of the heading line in the extracted text.
    pub offset: usize,
}

/// Best-effort structural metadata returned alongside raw text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuralHints {
    /// Headings in document order.
    pub headings: Vec<Heading>,
    /// Number of tables detected.
    pub table_count: usize,
    /// Number of embedded images detected.
    pub image_count: usize,
    /// Page count, when the format has pages.
    pub page_count: Option<u32>,
}

impl StructuralHints {
    /// Images per page, treating pageless formats as a single page.
    pub fn images_per_page(&self) -> f64 {
        let pages = self.page_count.unwrap_or(1).max(1) as f64;
        self.image_count as f64 / pages
    }
}

/// One parser's output for a file, scored and frozen.
///
/// Attempts are immutable once scored; the arbiter owns them for the
/// duration of a single arbitration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseAttempt {
    /// Identifier of the adapter that produced this attempt.
    pub parser_id: String,
    /// Raw extracted text (empty when the attempt failed).
    pub text: String,
    /// Structural hints reported by the adapter.
    pub hints: StructuralHints,
    /// Leading sample of the text used for quality heuristics.
    pub sample: String,
    /// Quality score in [0, 1]. Zero for failed attempts.
    pub quality_score: f64,
    /// Whether the adapter returned output at all.
    pub succeeded: bool,
    /// Error descriptor when the adapter failed.
    pub error: Option<String>,
}

impl ParseAttempt {
    /// Build a successful, not-yet-scored attempt.
    pub fn succeeded(parser_id: &str, text: String, hints: StructuralHints) -> Self {
        let sample: String = text.chars().take(SAMPLE_CHARS).collect();
        Self {
            parser_id: parser_id.to_string(),
            text,
            hints,
            sample,
            quality_score: 0.0,
            succeeded: true,
            error: None,
        }
    }

    /// Build a failed attempt carrying its error descriptor.
    pub fn failed(parser_id: &str, error: String) -> Self {
        Self {
            parser_id: parser_id.to_string(),
            text: String::new(),
            hints: StructuralHints::default(),
            sample: String::new(),
            quality_score: 0.0,
            succeeded: false,
            error: Some(error),
        }
    }
}

/// The arbitrated result of parsing one file: the chosen text plus the
/// metadata later stages need.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArbitratedDocument {
    /// Path of the source file.
    pub source_file: PathBuf,
    /// SHA-256 of the source file content, used as the cache key for
    /// this stage.
    pub content_hash: String,
    /// Adapter (or OCR engine) whose text was chosen.
    pub chosen_parser_id: String,
    /// Authoritative document text.
    pub text: String,
    /// Structural hints from the chosen attempt.
    pub hints: StructuralHints,
    /// Whether the document was classified as a scanned image.
    pub is_scanned: bool,
    /// Best non-OCR quality score, kept for diagnostics when the OCR
    /// path overrode the selection.
    pub runner_up_score: Option<f64>,
}

impl ArbitratedDocument {
    /// Compute the SHA-256 content hash used to key the parse cache.
    pub fn compute_hash(content: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(content);
        hex::encode(hasher.finalize())
    }
}

/// Condensed view of one attempt for the persisted arbitration summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptSummary {
    pub parser_id: String,
    pub quality_score: f64,
    pub succeeded: bool,
    pub text_len: usize,
    pub error: Option<String>,
}

impl From<&ParseAttempt> for AttemptSummary {
    fn from(attempt: &ParseAttempt) -> Self {
        Self {
            parser_id: attempt.parser_id.clone(),
            quality_score: attempt.quality_score,
            succeeded: attempt.succeeded,
            text_len: attempt.text.len(),
            error: attempt.error.clone(),
        }
    }
}

/// Persisted record of an arbitration: every attempt with its score,
/// plus the outcome. Downstream consumers read this instead of
/// re-running parsers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArbitrationSummary {
    pub attempts: Vec<AttemptSummary>,
    pub chosen_parser_id: String,
    pub is_scanned: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_hash_stable() {
        let a = ArbitratedDocument::compute_hash(b"hello");
        let b = ArbitratedDocument::compute_hash(b"hello");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, ArbitratedDocument::compute_hash(b"hello "));
    }

    #[test]
    fn test_images_per_page_defaults_to_one_page() {
        let hints = StructuralHints {
            image_count: 4,
            page_count: None,
            ..Default::default()
        };
        assert_eq!(hints.images_per_page(), 4.0);
    }

    #[test]
    fn test_failed_attempt_has_no_text() {
        let attempt = ParseAttempt::failed("pdf-raw", "boom".into());
        assert!(!attempt.succeeded);
        assert!(attempt.text.is_empty());
        assert_eq!(attempt.error.as_deref(), Some("boom"));
    }
}
