//! Scanned-document detection.
//!
//! A scanned document yields almost no extractable text but plenty of
//! page images; detection looks only at text density and image-tag
//! density so it works with any parser's hints.

use crate::models::StructuralHints;

/// Below this many extracted characters per page the document is
/// treated as scanned outright.
const SPARSE_CHARS_PER_PAGE: f64 = 50.0;

/// Image tags per page above which the document is treated as scanned
/// regardless of text density.
const DENSE_IMAGES_PER_PAGE: f64 = 5.0;

/// Combined thresholds: moderately sparse text plus several images per
/// page also indicates a scan.
const COMBINED_CHARS_PER_PAGE: f64 = 100.0;
const COMBINED_IMAGES_PER_PAGE: f64 = 3.0;

/// Decides whether a document needs the full-page OCR path.
#[derive(Debug, Clone, Default)]
pub struct ScanDetector;

impl ScanDetector {
    pub fn new() -> Self {
        Self
    }

    /// True when the document looks like page images rather than
    /// extractable text.
    pub fn is_scanned(&self, hints: &StructuralHints, text: &str) -> bool {
        let pages = hints.page_count.unwrap_or(1).max(1) as f64;
        let chars_per_page = text.chars().filter(|c| !c.is_whitespace()).count() as f64 / pages;
        let images_per_page = hints.images_per_page();

        if chars_per_page < SPARSE_CHARS_PER_PAGE {
            return true;
        }
        if images_per_page > DENSE_IMAGES_PER_PAGE {
            return true;
        }
        chars_per_page < COMBINED_CHARS_PER_PAGE && images_per_page > COMBINED_IMAGES_PER_PAGE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hints(pages: u32, images: usize) -> StructuralHints {
        StructuralHints {
            page_count: Some(pages),
            image_count: images,
            ..Default::default()
        }
    }

    #[test]
    fn test_sparse_text_is_scanned() {
        // 3 pages at 20 chars/page with 8 image tags/page.
        let detector = ScanDetector::new();
        let text = "a".repeat(60);
        assert!(detector.is_scanned(&hints(3, 24), &text));
    }

    #[test]
    fn test_dense_text_no_images_is_not_scanned() {
        let detector = ScanDetector::new();
        let text = "word ".repeat(500);
        assert!(!detector.is_scanned(&hints(2, 0), &text));
    }

    #[test]
    fn test_image_density_alone_triggers() {
        let detector = ScanDetector::new();
        let text = "word ".repeat(500); // plenty of text
        assert!(detector.is_scanned(&hints(2, 13), &text));
    }

    #[test]
    fn test_combined_threshold() {
        let detector = ScanDetector::new();
        // 80 chars/page (above sparse, below combined) with 4 images/page.
        let text = "a".repeat(160);
        assert!(detector.is_scanned(&hints(2, 8), &text));
        // Same text density without the images stays un-scanned.
        assert!(!detector.is_scanned(&hints(2, 0), &"a ".repeat(380)));
    }

    #[test]
    fn test_missing_page_count_treated_as_single_page() {
        let detector = ScanDetector::new();
        let mut h = hints(1, 0);
        h.page_count = None;
        assert!(detector.is_scanned(&h, "tiny"));
    }
}
